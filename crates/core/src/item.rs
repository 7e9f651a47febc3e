// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-item identifier and lifecycle.

use crate::failure::FailureKind;
use crate::id::IdBuf;
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Identifier of one work-item within a job.
///
/// Deliberately *not* random: derived from the item's position in the
/// envelope so that a redelivered envelope expands to the same
/// `(job_id, item_id)` keys. That pair is the dedup point for
/// at-least-once consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub IdBuf);

impl ItemId {
    pub const PREFIX: &'static str = "item-";

    /// Build the item id for the given zero-based envelope position.
    pub fn from_index(index: usize) -> Self {
        Self(IdBuf::new(&format!("{}{:05}", Self::PREFIX, index)))
    }

    pub fn from_string(id: impl AsRef<str>) -> Self {
        Self(IdBuf::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for ItemId {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl std::borrow::Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

/// Status of a single work-item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "processing" => Some(ItemStatus::Processing),
            "completed" => Some(ItemStatus::Completed),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

crate::simple_display! {
    ItemStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

/// One work-item as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: crate::job::JobId,
    pub item_id: ItemId,
    /// Free-form input: a username, a stringified numeric id, or a row index.
    pub input_identifier: String,
    pub status: ItemStatus,
    pub display_name: Option<String>,
    pub artifact_url: Option<String>,
    pub artifact_key: Option<String>,
    pub processing_ms: Option<i64>,
    pub error_message: Option<String>,
    pub metadata: Map<String, serde_json::Value>,
}

impl WorkItem {
    pub fn succeeded(&self) -> bool {
        self.status == ItemStatus::Completed
    }
}

/// Fields written when a worker claims an item (`pending → processing`).
#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_id: ItemId,
    pub input_identifier: String,
    pub display_name: Option<String>,
    pub metadata: Map<String, serde_json::Value>,
}

impl NewItem {
    pub fn new(item_id: ItemId, input_identifier: impl Into<String>) -> Self {
        Self {
            item_id,
            input_identifier: input_identifier.into(),
            display_name: None,
            metadata: Map::new(),
        }
    }

    crate::setters! {
        set {
            metadata: Map<String, serde_json::Value>,
        }
        option {
            display_name: String,
        }
    }
}

/// Terminal fields written when an item finishes, successfully or not.
#[derive(Debug, Clone)]
pub struct ItemClose {
    pub status: ItemStatus,
    pub display_name: Option<String>,
    pub artifact_url: Option<String>,
    pub artifact_key: Option<String>,
    pub processing_ms: i64,
    pub error: Option<(FailureKind, String)>,
    /// Merged into the item's metadata (e.g. a user id resolved
    /// mid-pipeline, needed later by the export job).
    pub metadata: Map<String, serde_json::Value>,
}

impl ItemClose {
    pub fn success(artifact_url: String, artifact_key: String, processing_ms: i64) -> Self {
        Self {
            status: ItemStatus::Completed,
            display_name: None,
            artifact_url: Some(artifact_url),
            artifact_key: Some(artifact_key),
            processing_ms,
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>, processing_ms: i64) -> Self {
        Self {
            status: ItemStatus::Failed,
            display_name: None,
            artifact_url: None,
            artifact_key: None,
            processing_ms,
            error: Some((kind, message.into())),
            metadata: Map::new(),
        }
    }

    crate::setters! {
        set {
            metadata: Map<String, serde_json::Value>,
        }
        option {
            display_name: String,
        }
    }
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
