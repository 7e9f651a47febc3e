// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy and append-only failure records.

use crate::item::ItemId;
use crate::job::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Classification of a per-item (or sink) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rasterizer deadline exceeded.
    Timeout,
    /// Rasterizer returned a non-timeout error.
    HtmlConversion,
    /// Blob store put failed.
    Upload,
    /// Profile service unreachable or returned an error status.
    ProfileFetch,
    /// Export only: no user id available for the artifact.
    MissingUserId,
    /// Export only: downstream create or trigger returned non-2xx.
    WebhookFailed,
    /// Store write failed after retries.
    Store,
    /// Catch-all.
    Unknown,
}

impl FailureKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(FailureKind::Timeout),
            "html_conversion" => Some(FailureKind::HtmlConversion),
            "upload" => Some(FailureKind::Upload),
            "profile_fetch" => Some(FailureKind::ProfileFetch),
            "missing_user_id" => Some(FailureKind::MissingUserId),
            "webhook_failed" => Some(FailureKind::WebhookFailed),
            "store" => Some(FailureKind::Store),
            "unknown" => Some(FailureKind::Unknown),
            _ => None,
        }
    }
}

crate::simple_display! {
    FailureKind {
        Timeout => "timeout",
        HtmlConversion => "html_conversion",
        Upload => "upload",
        ProfileFetch => "profile_fetch",
        MissingUserId => "missing_user_id",
        WebhookFailed => "webhook_failed",
        Store => "store",
        Unknown => "unknown",
    }
}

/// An append-only failure record as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub job_id: JobId,
    pub item_id: Option<ItemId>,
    pub identifier: String,
    pub kind: FailureKind,
    pub error_message: String,
    pub details: Map<String, serde_json::Value>,
    /// Snapshot of the template the item was rendered with, for post-mortems.
    pub template_snapshot: Option<String>,
    pub created_at_ms: u64,
}

/// Fields for appending a failure record.
#[derive(Debug, Clone)]
pub struct NewFailure {
    pub job_id: JobId,
    pub item_id: Option<ItemId>,
    pub identifier: String,
    pub kind: FailureKind,
    pub error_message: String,
    pub details: Map<String, serde_json::Value>,
    pub template_snapshot: Option<String>,
}

impl NewFailure {
    pub fn new(job_id: JobId, kind: FailureKind, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id,
            item_id: None,
            identifier: identifier.into(),
            kind,
            error_message: message.into(),
            details: Map::new(),
            template_snapshot: None,
        }
    }

    crate::setters! {
        set {
            details: Map<String, serde_json::Value>,
        }
        option {
            item_id: ItemId,
            template_snapshot: String,
        }
    }
}
