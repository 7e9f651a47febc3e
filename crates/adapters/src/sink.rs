// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System-of-record sink: two chained webhook calls per artifact.

use crate::error::SinkError;
use crate::Sink;
use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// One artifact push request.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPush {
    pub user_id: i64,
    pub artifact_url: String,
    pub campaign_name: String,
}

/// HTTP sink client. The first call creates the media record, the second
/// triggers the share record referencing it by external id.
pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    async fn post_json(
        &self,
        stage: &'static str,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<(), SinkError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Webhook { stage, status: status.as_u16() });
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn push(&self, push: &ArtifactPush) -> Result<(), SinkError> {
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let external_id = format!("{}-{}-{}", push.campaign_name, push.user_id, unix_ms);

        self.post_json(
            "create_media",
            "/create-video/",
            &json!({
                "external_id": external_id,
                "url": push.artifact_url,
                "status": "COMPLETED",
                "user": push.user_id,
            }),
        )
        .await?;
        debug!(user_id = push.user_id, external_id, "media record created");

        self.post_json(
            "trigger_share",
            "/creatomate-webhook/",
            &json!({
                "id": external_id,
                "status": "succeeded",
                "output_format": "jpg",
                "template_tags": [format!("-ms-{}", push.campaign_name)],
                "template_id": format!("email-forge-{}", push.campaign_name),
                "modifications": {
                    "campaign": push.campaign_name,
                    "title": push.campaign_name.replace('-', " ").to_uppercase(),
                    "description": format!("Poster: {}", push.campaign_name),
                    "tag": "custom",
                },
                "metadata": format!("email-forge-{}-{}", push.user_id, unix_ms),
            }),
        )
        .await?;
        debug!(user_id = push.user_id, external_id, "share record triggered");

        Ok(())
    }
}
