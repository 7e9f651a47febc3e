// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus envelopes: the self-contained job specification published to the
//! requests topic, plus the summary messages for the results and errors
//! topics.
//!
//! One envelope per job (not per item); the worker expands it on dequeue.
//! Envelopes are always keyed by `job_id` so a job routes to one partition.

use crate::dims::Dimensions;
use crate::identifiers::Identifier;
use crate::job::{JobId, JobKind};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// A data row: column name → value. Values may be nested maps, resolved
/// by dotted template paths.
pub type RowData = Map<String, serde_json::Value>;

/// Rendering knobs carried on the envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub skip_overlays: bool,
    /// Campaign logo: an embedded data URL or an HTTP URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_handle: Option<String>,
}

/// One artifact to push downstream in an export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactExport {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub artifact_url: String,
}

/// Kind-specific item specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    ByIdentifier { identifiers: Vec<Identifier> },
    ByRow { rows: Vec<RowData>, columns: Vec<String> },
    ByTemplateParam { template_id: String, custom_data: RowData },
    Export { artifacts: Vec<ArtifactExport> },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::ByIdentifier { .. } => JobKind::ByIdentifier,
            JobPayload::ByRow { .. } => JobKind::ByRow,
            JobPayload::ByTemplateParam { .. } => JobKind::ByTemplateParam,
            JobPayload::Export { .. } => JobKind::Export,
        }
    }

    /// Number of work-items this payload expands to.
    pub fn len(&self) -> usize {
        match self {
            JobPayload::ByIdentifier { identifiers } => identifiers.len(),
            JobPayload::ByRow { rows, .. } => rows.len(),
            JobPayload::ByTemplateParam { .. } => 1,
            JobPayload::Export { artifacts } => artifacts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The message published to the requests topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub campaign_name: String,
    /// Template text, `{{…}}`-normalized at ingress.
    pub template: String,
    pub dims: Dimensions,
    #[serde(default)]
    pub params: JobParams,
    #[serde(flatten)]
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, serde_json::Value>,
    pub queued_at_ms: u64,
}

impl JobEnvelope {
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    pub fn total(&self) -> i64 {
        self.payload.len() as i64
    }
}

/// Per-job summary published to the results topic after aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub job_id: JobId,
    pub success_count: i64,
    pub failure_count: i64,
    pub elapsed_ms: u64,
    pub timestamp_ms: u64,
}

/// Terminal job failure published to the errors topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub job_id: JobId,
    pub error: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, serde_json::Value>,
    pub timestamp_ms: u64,
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
