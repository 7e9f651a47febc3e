// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub events: the closed vocabulary delivered to subscribed streams.

use crate::job::{JobCounters, JobId, JobState};
use crate::log::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Per-item summary carried on the terminal `job_completed` event.
///
/// Full item rows stay a store read; this mirrors what the worker
/// accumulated while draining the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Events delivered to subscribed streams.
///
/// Serializes with `{"event": "name", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    /// First event on every subscription.
    Connected { message: String },

    /// Catch-up snapshot of persisted state for clients connecting mid-job.
    Status {
        state: JobState,
        total: i64,
        processed: i64,
        success_count: i64,
        failure_count: i64,
        percent_complete: f64,
    },

    Progress {
        processed: i64,
        total: i64,
        success_count: i64,
        failure_count: i64,
        percent_complete: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_item: Option<String>,
        phase: String,
    },

    PosterCompleted {
        identifier: String,
        artifact_url: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    JobCompleted {
        success_count: i64,
        failure_count: i64,
        total_time_ms: u64,
        results: Vec<ItemSummary>,
    },

    JobFailed {
        error: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        details: Map<String, serde_json::Value>,
    },

    Log {
        level: LogLevel,
        message: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        details: Map<String, serde_json::Value>,
    },

    Heartbeat { status: String },
}

impl HubEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Connected { .. } => "connected",
            HubEvent::Status { .. } => "status",
            HubEvent::Progress { .. } => "progress",
            HubEvent::PosterCompleted { .. } => "poster_completed",
            HubEvent::JobCompleted { .. } => "job_completed",
            HubEvent::JobFailed { .. } => "job_failed",
            HubEvent::Log { .. } => "log",
            HubEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Terminal events close the stream after delivery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HubEvent::JobCompleted { .. } | HubEvent::JobFailed { .. })
    }

    /// Coalescing events may be dropped under backpressure; the newest
    /// snapshot supersedes older ones.
    pub fn is_coalescing(&self) -> bool {
        matches!(self, HubEvent::Progress { .. } | HubEvent::Heartbeat { .. })
    }

    /// Build a progress event from counters.
    pub fn progress(counters: &JobCounters, current_item: Option<String>, phase: impl Into<String>) -> Self {
        HubEvent::Progress {
            processed: counters.processed,
            total: counters.total,
            success_count: counters.success,
            failure_count: counters.failure,
            percent_complete: counters.percent_complete(),
            current_item,
            phase: phase.into(),
        }
    }

    /// Build a status catch-up event from persisted state.
    pub fn status(state: JobState, counters: &JobCounters) -> Self {
        HubEvent::Status {
            state,
            total: counters.total,
            processed: counters.processed,
            success_count: counters.success,
            failure_count: counters.failure,
            percent_complete: counters.percent_complete(),
        }
    }

    pub fn heartbeat() -> Self {
        HubEvent::Heartbeat { status: "alive".to_string() }
    }
}

/// A hub event bound to its job and emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub job_id: JobId,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub body: HubEvent,
}

impl EventRecord {
    pub fn new(job_id: JobId, timestamp_ms: u64, body: HubEvent) -> Self {
        Self { job_id, timestamp_ms, body }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
