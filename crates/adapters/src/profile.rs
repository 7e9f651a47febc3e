// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile service adapter.

use crate::error::ProfileError;
use crate::ProfileService;
use async_trait::async_trait;
use pf_core::RowData;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A resolved profile record.
///
/// Field mapping is deliberately tolerant: the upstream API has drifted
/// over time and different endpoints name the same field differently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub user_id: Option<i64>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub profile_image: Option<String>,
    pub bio: String,
    pub total_bookings: i64,
    pub total_reviews: i64,
    pub average_rating: f64,
    /// Everything else the API returned, preserved for template fill.
    pub extra: RowData,
}

fn str_of(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value.get(*key).and_then(Value::as_str).map(str::to_string).filter(|s| !s.is_empty())
    })
}

fn int_of(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_i64))
}

fn float_of(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_f64))
}

impl Profile {
    /// Map an upstream API response, falling back to the queried
    /// identifier for the username.
    pub fn from_api(value: &Value, fallback_username: &str) -> Self {
        let first_name = str_of(value, &["first_name"]).unwrap_or_default();
        let last_name = str_of(value, &["last_name"]).unwrap_or_default();
        let display_name = str_of(value, &["display_name", "name"])
            .unwrap_or_else(|| format!("{first_name} {last_name}").trim().to_string());

        let extra = match value {
            Value::Object(map) => map.clone(),
            _ => RowData::new(),
        };

        Self {
            user_id: int_of(value, &["user_id", "id"]),
            username: str_of(value, &["username"]).unwrap_or_else(|| fallback_username.to_string()),
            first_name,
            last_name,
            display_name,
            profile_image: str_of(value, &["profile_pic", "picture", "profile_image"]),
            bio: str_of(value, &["bio", "description"]).unwrap_or_default(),
            total_bookings: int_of(value, &["total_bookings", "bookings_count"]).unwrap_or(0),
            total_reviews: int_of(value, &["total_reviews", "reviews_count"]).unwrap_or(0),
            average_rating: float_of(value, &["average_rating", "rating"]).unwrap_or(0.0),
            extra,
        }
    }

    /// Flatten into a template row. Canonical keys win over whatever the
    /// raw API response carried.
    pub fn to_row(&self) -> RowData {
        let mut row = self.extra.clone();
        row.insert("username".into(), Value::String(self.username.clone()));
        row.insert("first_name".into(), Value::String(self.first_name.clone()));
        row.insert("last_name".into(), Value::String(self.last_name.clone()));
        row.insert("display_name".into(), Value::String(self.display_name.clone()));
        row.insert("name".into(), Value::String(self.display_name.clone()));
        row.insert("bio".into(), Value::String(self.bio.clone()));
        row.insert(
            "profile_pic".into(),
            Value::String(self.profile_image.clone().unwrap_or_default()),
        );
        row.insert("total_bookings".into(), Value::from(self.total_bookings));
        row.insert("total_reviews".into(), Value::from(self.total_reviews));
        row.insert("average_rating".into(), Value::from(self.average_rating));
        if let Some(user_id) = self.user_id {
            row.insert("user_id".into(), Value::from(user_id));
        }
        row
    }
}

/// HTTP profile service client.
pub struct HttpProfileService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    async fn fetch(&self, url: &str, identifier: &str) -> Result<Profile, ProfileError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProfileError::NotFound { identifier: identifier.to_string() });
        }
        if !status.is_success() {
            return Err(ProfileError::Status { status: status.as_u16() });
        }
        let body: Value = response.json().await?;
        debug!(identifier, "profile fetched");
        Ok(Profile::from_api(&body, identifier))
    }
}

#[async_trait]
impl ProfileService for HttpProfileService {
    async fn fetch_by_username(&self, username: &str) -> Result<Profile, ProfileError> {
        let url = format!("{}/fetchByUsername/?username={username}", self.base_url);
        self.fetch(&url, username).await
    }

    async fn fetch_by_user_id(&self, user_id: i64) -> Result<Profile, ProfileError> {
        let url = format!("{}/api/users/{user_id}", self.base_url);
        self.fetch(&url, &user_id.to_string()).await
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
