// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pf-storage: durable, transactional storage and read model.
//!
//! The [`Store`] trait is the source of truth for recovery: CAS-guarded
//! job transitions, idempotent item upserts keyed `(job_id, item_id)`,
//! and counters that commit in the same transaction as the item row they
//! describe. [`PgStore`] is the Postgres realization; `MemStore` (behind
//! the `test-support` feature) implements identical semantics in memory.

mod pg;
mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod mem;

pub use pg::PgStore;

use async_trait::async_trait;
use pf_core::{
    FailureRecord, ItemClose, ItemId, ItemStatus, Job, JobCounters, JobId, JobState, LogEntry,
    LogLevel, NewFailure, NewItem, NewJob, WorkItem,
};
use serde_json::Map;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// CAS transition found a different current state. Callers use the
    /// observed state to decide between resume, skip, and abort.
    #[error("state mismatch: expected {expected}, found {actual}")]
    StateMismatch { expected: JobState, actual: JobState },

    #[error("counter update would exceed total for {0}")]
    CounterOverflow(JobId),

    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Result of claiming a work-item for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The item row is now `processing`.
    Started,
    /// The item already reached a terminal status; a redelivered envelope
    /// must skip it without side effects.
    AlreadyClosed(ItemStatus),
}

/// Result of closing a work-item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseOutcome {
    /// Item closed and counters bumped in the same transaction; the
    /// returned counters are the post-update values.
    Applied(JobCounters),
    /// The item was already terminal; nothing changed.
    AlreadyClosed,
    /// The item row was closed but the job is no longer `processing`
    /// (cancelled mid-flight): the outcome is not counted and must not
    /// be surfaced to subscribers.
    Discarded,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled { prior: JobState },
    AlreadyTerminal(JobState),
}

/// Per-item statistics for a job, derived from the work-item rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JobStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub avg_processing_ms: Option<f64>,
}

/// The §4.1 storage contract.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a job in `pending`. Errors with [`StoreError::DuplicateJob`]
    /// if the id already exists.
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError>;

    /// CAS transition. `queued → processing` stamps `started_at`; any
    /// terminal target stamps `completed_at` in the same statement.
    async fn transition_job(
        &self,
        job_id: &JobId,
        from: JobState,
        to: JobState,
    ) -> Result<(), StoreError>;

    /// Terminal CAS from any non-terminal state to `failed`, recording the
    /// error message. Returns `false` when the job was already terminal.
    async fn fail_job(&self, job_id: &JobId, error: &str) -> Result<bool, StoreError>;

    /// Terminal CAS from any non-terminal state to `cancelled`.
    async fn cancel_job(&self, job_id: &JobId) -> Result<CancelOutcome, StoreError>;

    /// Idempotent claim of a work-item (`pending → processing`), creating
    /// the row when absent. Terminal rows are never reopened.
    async fn start_item(&self, job_id: &JobId, item: &NewItem) -> Result<StartOutcome, StoreError>;

    /// Move an item to its terminal status and bump the job counters in
    /// one transaction.
    async fn close_item(
        &self,
        job_id: &JobId,
        item_id: &ItemId,
        close: &ItemClose,
    ) -> Result<CloseOutcome, StoreError>;

    /// Atomic counter increment honoring `processed <= total`. Exposed for
    /// callers that manage item rows themselves; the worker path goes
    /// through [`Store::close_item`] so counters and item rows commit
    /// together.
    async fn bump_counters(
        &self,
        job_id: &JobId,
        processed: i64,
        success: i64,
        failure: i64,
    ) -> Result<JobCounters, StoreError>;

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(
        &self,
        state: Option<JobState>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError>;

    async fn get_items(&self, job_id: &JobId) -> Result<Vec<WorkItem>, StoreError>;

    async fn get_stats(&self, job_id: &JobId) -> Result<JobStats, StoreError>;

    async fn append_log(
        &self,
        job_id: &JobId,
        level: LogLevel,
        message: &str,
        details: Map<String, serde_json::Value>,
    ) -> Result<(), StoreError>;

    async fn get_logs(
        &self,
        job_id: &JobId,
        level: Option<LogLevel>,
        limit: i64,
    ) -> Result<Vec<LogEntry>, StoreError>;

    async fn record_failure(&self, failure: &NewFailure) -> Result<(), StoreError>;

    async fn get_failures(&self, job_id: &JobId) -> Result<Vec<FailureRecord>, StoreError>;
}
