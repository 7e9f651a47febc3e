// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-item pipeline: resolve → fill → rasterize → overlay → upload.
//!
//! Every stage returns a tagged result; a stage error becomes the item's
//! [`FailureKind`] and the job continues. Nothing in here unwinds.

use crate::overlay;
use crate::runtime::{now_ms, Runtime};
use pf_adapters::{
    fetch_image_bytes, BlobStore, ProfileError, ProfileService, Rasterizer, RasterizeError,
};
use pf_core::{
    template, FailureKind, Identifier, ItemClose, ItemId, JobEnvelope, RowData,
};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

/// One expanded work-item, ready to process.
#[derive(Debug, Clone)]
pub(crate) struct ItemSpec {
    pub item_id: ItemId,
    pub index: usize,
    pub identifier: String,
    pub source: ItemSource,
}

#[derive(Debug, Clone)]
pub(crate) enum ItemSource {
    Identifier(Identifier),
    Row(RowData),
    TemplateParam(RowData),
}

/// Pipeline output: the terminal close for the item plus failure-record
/// context when the item failed.
pub(crate) struct ItemResult {
    pub close: ItemClose,
    pub failure_details: Map<String, Value>,
    pub template_snapshot: Option<String>,
}

impl ItemResult {
    fn ok(close: ItemClose) -> Self {
        Self { close, failure_details: Map::new(), template_snapshot: None }
    }
}

/// Drive one item to its terminal outcome.
pub(crate) async fn process_item(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    spec: &ItemSpec,
) -> ItemResult {
    let started = Instant::now();
    let elapsed_ms = |started: Instant| started.elapsed().as_millis() as i64;

    // Resolve the data row and presentation fields
    let resolved = match resolve_source(runtime, spec).await {
        Ok(resolved) => resolved,
        Err(err) => {
            let close = ItemClose::failure(
                FailureKind::ProfileFetch,
                err.to_string(),
                elapsed_ms(started),
            );
            return ItemResult {
                close,
                failure_details: spec_details(spec),
                template_snapshot: None,
            };
        }
    };

    // Fill the template; purely syntactic, cannot fail
    let html = template::fill(&envelope.template, &resolved.row);

    // Rasterize under the configured deadline
    let settings = &runtime.settings;
    let png = match runtime
        .caps
        .rasterizer
        .render_png(&html, envelope.dims, settings.device_scale, settings.rasterize_timeout)
        .await
    {
        Ok(png) => png,
        Err(err) => {
            let kind = match err {
                RasterizeError::Timeout => FailureKind::Timeout,
                RasterizeError::Failed(_) => FailureKind::HtmlConversion,
            };
            let mut result = ItemResult {
                close: ItemClose::failure(kind, err.to_string(), elapsed_ms(started)),
                failure_details: spec_details(spec),
                template_snapshot: None,
            };
            if matches!(spec.source, ItemSource::Row(_)) {
                result.template_snapshot = Some(envelope.template.clone());
            }
            return result;
        }
    };

    // Overlay composition is best-effort: a bad logo never fails the item
    let png = apply_overlays(runtime, envelope, &resolved, png).await;

    // Upload; the derived URL is recomputed deterministically from the key
    let key = format!("jobs/{}/{}_{}.png", envelope.job_id, spec.identifier, now_ms());
    let blob = match runtime.caps.blobs.put_png(&key, &png).await {
        Ok(blob) => blob,
        Err(err) => {
            return ItemResult {
                close: ItemClose::failure(FailureKind::Upload, err.to_string(), elapsed_ms(started)),
                failure_details: spec_details(spec),
                template_snapshot: None,
            };
        }
    };

    debug!(job_id = %envelope.job_id, item = %spec.item_id, key = %blob.key, "item rendered");
    let mut close = ItemClose::success(blob.url, blob.key, elapsed_ms(started));
    if let Some(display_name) = resolved.display_name {
        close = close.display_name(display_name);
    }
    if let Some(user_id) = resolved.user_id {
        close.metadata.insert("user_id".to_string(), Value::from(user_id));
    }
    ItemResult::ok(close)
}

struct ResolvedItem {
    row: RowData,
    display_name: Option<String>,
    user_id: Option<i64>,
    profile_image: Option<String>,
}

async fn resolve_source(
    runtime: &Runtime,
    spec: &ItemSpec,
) -> Result<ResolvedItem, ProfileError> {
    match &spec.source {
        ItemSource::Identifier(identifier) => {
            let profiles = &runtime.caps.profiles;
            let profile = match identifier {
                Identifier::Username(username) => profiles.fetch_by_username(username).await?,
                Identifier::UserId(user_id) => profiles.fetch_by_user_id(*user_id).await?,
            };
            Ok(ResolvedItem {
                row: profile.to_row(),
                display_name: Some(profile.display_name.clone()),
                user_id: profile.user_id,
                profile_image: profile.profile_image.clone(),
            })
        }
        ItemSource::Row(row) => {
            let mut user_id = extract_user_id(row);
            let mut display_name = row_display_name(row);
            let mut profile_image = row_profile_image(row);

            // Rows without a user id fall back to a best-effort lookup so
            // the export job can still reference the account
            if user_id.is_none() {
                if let Ok(profile) =
                    runtime.caps.profiles.fetch_by_username(&spec.identifier).await
                {
                    user_id = profile.user_id;
                    if display_name.is_none() && !profile.display_name.is_empty() {
                        display_name = Some(profile.display_name.clone());
                    }
                    if profile_image.is_none() {
                        profile_image = profile.profile_image.clone();
                    }
                }
            }

            Ok(ResolvedItem { row: row.clone(), display_name, user_id, profile_image })
        }
        ItemSource::TemplateParam(custom_data) => Ok(ResolvedItem {
            row: custom_data.clone(),
            display_name: None,
            user_id: extract_user_id(custom_data),
            profile_image: None,
        }),
    }
}

async fn apply_overlays(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    resolved: &ResolvedItem,
    png: Vec<u8>,
) -> Vec<u8> {
    if envelope.params.skip_overlays {
        return png;
    }
    let logo_source = envelope.params.logo_handle.as_deref();
    let profile_source = resolved.profile_image.as_deref().filter(|s| !s.trim().is_empty());
    if logo_source.is_none() && profile_source.is_none() {
        return png;
    }

    let logo = fetch_overlay_input(runtime, envelope, "logo", logo_source).await;
    let profile = fetch_overlay_input(runtime, envelope, "profile image", profile_source).await;
    if logo.is_none() && profile.is_none() {
        return png;
    }

    match overlay::compose(&png, logo.as_deref(), profile.as_deref()) {
        Ok(composited) => composited,
        Err(err) => {
            warn!(job_id = %envelope.job_id, error = %err, "overlay composition failed, using base image");
            png
        }
    }
}

async fn fetch_overlay_input(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    what: &str,
    source: Option<&str>,
) -> Option<Vec<u8>> {
    let source = source?;
    match fetch_image_bytes(&runtime.http, source).await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(job_id = %envelope.job_id, what, error = %err, "overlay input fetch failed");
            None
        }
    }
}

/// Pull a numeric user id out of a row: `user_id`, `userid`, or `id`
/// columns, case- and whitespace-insensitive, tolerant of `"123.0"`.
pub(crate) fn extract_user_id(row: &RowData) -> Option<i64> {
    for (key, value) in row {
        let normalized = key.trim().to_ascii_lowercase().replace(' ', "");
        if normalized != "user_id" && normalized != "userid" && normalized != "id" {
            continue;
        }
        match value {
            Value::Number(number) => {
                if let Some(id) = number.as_i64() {
                    return Some(id);
                }
            }
            Value::String(raw) => {
                let raw = raw.trim();
                if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
                    continue;
                }
                if let Ok(parsed) = raw.parse::<f64>() {
                    return Some(parsed as i64);
                }
            }
            _ => {}
        }
    }
    None
}

fn row_string(row: &RowData, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        row.get(*key).and_then(Value::as_str).map(str::to_string).filter(|s| !s.trim().is_empty())
    })
}

pub(crate) fn row_display_name(row: &RowData) -> Option<String> {
    row_string(row, &["display_name", "name"])
}

fn row_profile_image(row: &RowData) -> Option<String> {
    row_string(row, &["profile_pic", "profile_picture", "avatar", "image", "photo"])
}

/// Identifier for a row: the username column when present, a stable
/// row label otherwise.
pub(crate) fn row_identifier(row: &RowData, index: usize) -> String {
    row_string(row, &["username", "Username"]).unwrap_or_else(|| format!("row_{}", index + 1))
}

fn spec_details(spec: &ItemSpec) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("index".to_string(), Value::from(spec.index as i64));
    if let ItemSource::Row(row) = &spec.source {
        details.insert("row".to_string(), Value::Object(row.clone()));
    }
    details
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
