// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Store`] with the same semantics as [`crate::PgStore`].
//!
//! Test substrate for the engine and gateway crates; not used in
//! production.

use crate::{CancelOutcome, CloseOutcome, JobStats, StartOutcome, Store, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use pf_core::{
    FailureRecord, ItemClose, ItemId, ItemStatus, Job, JobCounters, JobId, JobState, LogEntry,
    LogLevel, NewFailure, NewItem, NewJob, WorkItem,
};
use serde_json::Map;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct JobRecord {
    job: Job,
    items: BTreeMap<String, WorkItem>,
    logs: Vec<LogEntry>,
    failures: Vec<FailureRecord>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobRecord>,
}

/// In-memory store. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_job(&self, new_job: &NewJob) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(new_job.id.as_str()) {
            return Err(StoreError::DuplicateJob(new_job.id));
        }
        let job = Job {
            id: new_job.id,
            kind: new_job.kind,
            campaign_name: new_job.campaign_name.clone(),
            state: JobState::Pending,
            counters: JobCounters::new(new_job.total),
            template: new_job.template.clone(),
            dims: new_job.dims,
            skip_overlays: new_job.skip_overlays,
            model: new_job.model.clone(),
            logo_handle: new_job.logo_handle.clone(),
            error_message: None,
            metadata: new_job.metadata.clone(),
            created_at_ms: now_ms(),
            started_at_ms: None,
            completed_at_ms: None,
        };
        inner.jobs.insert(
            new_job.id.as_str().to_string(),
            JobRecord { job, items: BTreeMap::new(), logs: Vec::new(), failures: Vec::new() },
        );
        Ok(())
    }

    async fn transition_job(
        &self,
        job_id: &JobId,
        from: JobState,
        to: JobState,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or(StoreError::JobNotFound(*job_id))?;
        if record.job.state != from {
            return Err(StoreError::StateMismatch { expected: from, actual: record.job.state });
        }
        record.job.state = to;
        if to == JobState::Processing {
            record.job.started_at_ms = Some(now_ms());
        }
        if to.is_terminal() {
            record.job.completed_at_ms = Some(now_ms());
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: &JobId, error: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or(StoreError::JobNotFound(*job_id))?;
        if record.job.state.is_terminal() {
            return Ok(false);
        }
        record.job.state = JobState::Failed;
        record.job.error_message = Some(error.to_string());
        record.job.completed_at_ms = Some(now_ms());
        Ok(true)
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<CancelOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or(StoreError::JobNotFound(*job_id))?;
        let prior = record.job.state;
        if prior.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(prior));
        }
        record.job.state = JobState::Cancelled;
        record.job.error_message = Some("cancelled by user".to_string());
        record.job.completed_at_ms = Some(now_ms());
        Ok(CancelOutcome::Cancelled { prior })
    }

    async fn start_item(&self, job_id: &JobId, item: &NewItem) -> Result<StartOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or(StoreError::JobNotFound(*job_id))?;

        match record.items.get_mut(item.item_id.as_str()) {
            Some(existing) if existing.status.is_terminal() => {
                Ok(StartOutcome::AlreadyClosed(existing.status))
            }
            Some(existing) => {
                existing.status = ItemStatus::Processing;
                if existing.display_name.is_none() {
                    existing.display_name = item.display_name.clone();
                }
                Ok(StartOutcome::Started)
            }
            None => {
                record.items.insert(
                    item.item_id.as_str().to_string(),
                    WorkItem {
                        job_id: *job_id,
                        item_id: item.item_id,
                        input_identifier: item.input_identifier.clone(),
                        status: ItemStatus::Processing,
                        display_name: item.display_name.clone(),
                        artifact_url: None,
                        artifact_key: None,
                        processing_ms: None,
                        error_message: None,
                        metadata: item.metadata.clone(),
                    },
                );
                Ok(StartOutcome::Started)
            }
        }
    }

    async fn close_item(
        &self,
        job_id: &JobId,
        item_id: &ItemId,
        close: &ItemClose,
    ) -> Result<CloseOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or(StoreError::JobNotFound(*job_id))?;

        if let Some(existing) = record.items.get(item_id.as_str()) {
            if existing.status.is_terminal() {
                return Ok(CloseOutcome::AlreadyClosed);
            }
        }

        let item = record
            .items
            .entry(item_id.as_str().to_string())
            .or_insert_with(|| WorkItem {
                job_id: *job_id,
                item_id: *item_id,
                input_identifier: String::new(),
                status: ItemStatus::Pending,
                display_name: None,
                artifact_url: None,
                artifact_key: None,
                processing_ms: None,
                error_message: None,
                metadata: Map::new(),
            });
        item.status = close.status;
        if close.display_name.is_some() {
            item.display_name = close.display_name.clone();
        }
        item.artifact_url = close.artifact_url.clone();
        item.artifact_key = close.artifact_key.clone();
        item.processing_ms = Some(close.processing_ms);
        item.error_message = close.error.as_ref().map(|(_, message)| message.clone());
        for (key, value) in &close.metadata {
            item.metadata.insert(key.clone(), value.clone());
        }

        let counters = &mut record.job.counters;
        if record.job.state != JobState::Processing || counters.processed >= counters.total {
            return Ok(CloseOutcome::Discarded);
        }
        counters.processed += 1;
        match close.status {
            ItemStatus::Completed => counters.success += 1,
            _ => counters.failure += 1,
        }
        Ok(CloseOutcome::Applied(*counters))
    }

    async fn bump_counters(
        &self,
        job_id: &JobId,
        processed: i64,
        success: i64,
        failure: i64,
    ) -> Result<JobCounters, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or(StoreError::JobNotFound(*job_id))?;
        let counters = &mut record.job.counters;
        if counters.processed + processed > counters.total {
            return Err(StoreError::CounterOverflow(*job_id));
        }
        counters.processed += processed;
        counters.success += success;
        counters.failure += failure;
        Ok(*counters)
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.get(job_id.as_str()).map(|r| r.job.clone()))
    }

    async fn list_jobs(
        &self,
        state: Option<JobState>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .map(|r| r.job.clone())
            .filter(|job| state.map(|s| job.state == s).unwrap_or(true))
            .collect();
        jobs.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_items(&self, job_id: &JobId) -> Result<Vec<WorkItem>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .jobs
            .get(job_id.as_str())
            .map(|r| r.items.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_stats(&self, job_id: &JobId) -> Result<JobStats, StoreError> {
        let inner = self.inner.lock();
        let mut stats = JobStats::default();
        let Some(record) = inner.jobs.get(job_id.as_str()) else {
            return Ok(stats);
        };
        let mut time_sum = 0i64;
        let mut time_count = 0i64;
        for item in record.items.values() {
            stats.total += 1;
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
            if let Some(ms) = item.processing_ms {
                time_sum += ms;
                time_count += 1;
            }
        }
        if time_count > 0 {
            stats.avg_processing_ms = Some(time_sum as f64 / time_count as f64);
        }
        Ok(stats)
    }

    async fn append_log(
        &self,
        job_id: &JobId,
        level: LogLevel,
        message: &str,
        details: Map<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.jobs.get_mut(job_id.as_str()) {
            record.logs.push(LogEntry {
                job_id: *job_id,
                level,
                message: message.to_string(),
                details,
                created_at_ms: now_ms(),
            });
        }
        Ok(())
    }

    async fn get_logs(
        &self,
        job_id: &JobId,
        level: Option<LogLevel>,
        limit: i64,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .jobs
            .get(job_id.as_str())
            .map(|r| {
                r.logs
                    .iter()
                    .rev()
                    .filter(|entry| level.map(|l| entry.level == l).unwrap_or(true))
                    .take(limit.max(0) as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_failure(&self, failure: &NewFailure) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.jobs.get_mut(failure.job_id.as_str()) {
            record.failures.push(FailureRecord {
                job_id: failure.job_id,
                item_id: failure.item_id,
                identifier: failure.identifier.clone(),
                kind: failure.kind,
                error_message: failure.error_message.clone(),
                details: failure.details.clone(),
                template_snapshot: failure.template_snapshot.clone(),
                created_at_ms: now_ms(),
            });
        }
        Ok(())
    }

    async fn get_failures(&self, job_id: &JobId) -> Result<Vec<FailureRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .jobs
            .get(job_id.as_str())
            .map(|r| r.failures.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
