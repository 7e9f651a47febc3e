// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, state machine, and counters.

use crate::dims::Dimensions;
use serde::{Deserialize, Serialize};
use serde_json::Map;

crate::define_id! {
    /// Unique identifier for a batch generation job.
    ///
    /// Client-visible: returned from submission and used to key bus
    /// envelopes, hub events, and stream subscriptions.
    pub struct JobId("job-");
}

/// Lifecycle state of a job.
///
/// Transitions are CAS-guarded in the store:
/// `pending → queued → processing → {completed, failed, cancelled}`,
/// with `cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Check if the job can accept no further mutations.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// Parse the canonical lowercase form (inverse of `Display`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "queued" => Some(JobState::Queued),
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }
}

crate::simple_display! {
    JobState {
        Pending => "pending",
        Queued => "queued",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// How a job's work-items are specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A free-form list of usernames / numeric user ids, resolved against
    /// the profile service per item.
    ByIdentifier,
    /// Explicit data rows (e.g. an uploaded CSV) filled into the template.
    ByRow,
    /// A degenerate single-item job carrying one set of template parameters.
    ByTemplateParam,
    /// Post-generation export: push finished artifacts to the system of
    /// record. No rasterization.
    Export,
}

impl JobKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "by_identifier" => Some(JobKind::ByIdentifier),
            "by_row" => Some(JobKind::ByRow),
            "by_template_param" => Some(JobKind::ByTemplateParam),
            "export" => Some(JobKind::Export),
            _ => None,
        }
    }
}

crate::simple_display! {
    JobKind {
        ByIdentifier => "by_identifier",
        ByRow => "by_row",
        ByTemplateParam => "by_template_param",
        Export => "export",
    }
}

/// Aggregate per-job progress counters.
///
/// Invariants (enforced by the store): `processed == success + failure`
/// after every update, and `processed <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total: i64,
    pub processed: i64,
    pub success: i64,
    pub failure: i64,
}

impl JobCounters {
    pub fn new(total: i64) -> Self {
        Self { total, ..Self::default() }
    }

    /// All items have reached a terminal status.
    pub fn is_drained(&self) -> bool {
        self.processed >= self.total
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64 * 1000.0).round() / 10.0
        }
    }
}

/// Policy for the terminal state of a job that drained naturally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// A job that ran all its items to their own terminal status is
    /// `completed`, however many of them failed. The counters carry the
    /// partial-failure information.
    #[default]
    NaturalDrain,
    /// A drained job with zero successes and at least one failure is
    /// `failed` instead.
    FailWhenAllFailed,
}

impl CompletionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "natural_drain" => Some(CompletionPolicy::NaturalDrain),
            "fail_when_all_failed" => Some(CompletionPolicy::FailWhenAllFailed),
            _ => None,
        }
    }

    /// Terminal state for a drained job with the given counters.
    pub fn terminal_state(&self, counters: &JobCounters) -> JobState {
        match self {
            CompletionPolicy::NaturalDrain => JobState::Completed,
            CompletionPolicy::FailWhenAllFailed => {
                if counters.success == 0 && counters.failure > 0 {
                    JobState::Failed
                } else {
                    JobState::Completed
                }
            }
        }
    }
}

/// A job as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub campaign_name: String,
    pub state: JobState,
    pub counters: JobCounters,
    /// Immutable input template (already `{{…}}`-normalized at ingress).
    pub template: String,
    pub dims: Dimensions,
    pub skip_overlays: bool,
    pub model: Option<String>,
    pub logo_handle: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Map<String, serde_json::Value>,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Everything needed to create a job row in `pending`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub kind: JobKind,
    pub campaign_name: String,
    pub total: i64,
    pub template: String,
    pub dims: Dimensions,
    pub skip_overlays: bool,
    pub model: Option<String>,
    pub logo_handle: Option<String>,
    pub metadata: Map<String, serde_json::Value>,
}

impl NewJob {
    pub fn builder(id: JobId, kind: JobKind, total: i64) -> NewJobBuilder {
        NewJobBuilder {
            id,
            kind,
            total,
            campaign_name: String::new(),
            template: String::new(),
            dims: Dimensions::default(),
            skip_overlays: false,
            model: None,
            logo_handle: None,
            metadata: Map::new(),
        }
    }
}

pub struct NewJobBuilder {
    id: JobId,
    kind: JobKind,
    total: i64,
    campaign_name: String,
    template: String,
    dims: Dimensions,
    skip_overlays: bool,
    model: Option<String>,
    logo_handle: Option<String>,
    metadata: Map<String, serde_json::Value>,
}

impl NewJobBuilder {
    crate::setters! {
        into {
            campaign_name: String,
            template: String,
        }
        set {
            dims: Dimensions,
            skip_overlays: bool,
            metadata: Map<String, serde_json::Value>,
        }
        option {
            model: String,
            logo_handle: String,
        }
    }

    pub fn build(self) -> NewJob {
        NewJob {
            id: self.id,
            kind: self.kind,
            campaign_name: self.campaign_name,
            total: self.total,
            template: self.template,
            dims: self.dims,
            skip_overlays: self.skip_overlays,
            model: self.model,
            logo_handle: self.logo_handle,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
