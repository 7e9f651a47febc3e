// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-of-drain aggregation: `processed == total` becomes the job's
//! terminal state, and exactly one terminal event is published.
//!
//! Fused into the worker's end-of-batch but specified independently:
//! the `processing → terminal` CAS is the exactly-once guard, so a
//! redelivered envelope that races a finished job never re-emits.

use crate::runtime::{now_ms, Runtime};
use crate::EngineError;
use pf_bus::Bus;
use pf_core::{HubEvent, ItemSummary, JobId, JobState, LogLevel};
use pf_storage::{Store, StoreError};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

pub(crate) async fn finalize(
    runtime: &Runtime,
    job_id: &JobId,
    elapsed: Duration,
    results: Vec<ItemSummary>,
) -> Result<(), EngineError> {
    let Some(job) = runtime.store.get_job(job_id).await? else {
        return Ok(());
    };
    match job.state {
        JobState::Processing => {}
        // Cancelled jobs already emitted their terminal event at cancel
        // time; any other state means someone else finalized first
        _ => return Ok(()),
    }

    let counters = job.counters;
    if !counters.is_drained() {
        warn!(
            job_id = %job_id,
            processed = counters.processed,
            total = counters.total,
            "handler finished with open items, leaving job processing"
        );
        return Ok(());
    }

    let elapsed_ms = elapsed.as_millis() as u64;
    let terminal = runtime.settings.completion_policy.terminal_state(&counters);

    if terminal == JobState::Failed {
        let message = format!("all {} items failed", counters.failure);
        if !runtime.store.fail_job(job_id, &message).await? {
            return Ok(());
        }
        runtime.log(*job_id, LogLevel::Error, &format!("Job failed: {message}"), Map::new()).await;
        let error = pf_core::ErrorMessage {
            job_id: *job_id,
            error: message.clone(),
            details: Map::new(),
            timestamp_ms: now_ms(),
        };
        if let Err(err) = runtime.bus.publish_error(&error).await {
            warn!(job_id = %job_id, error = %err, "failed to publish job error");
        }
        runtime
            .emit(*job_id, HubEvent::JobFailed { error: message, details: Map::new() })
            .await;
        return Ok(());
    }

    match runtime.store.transition_job(job_id, JobState::Processing, JobState::Completed).await {
        Ok(()) => {}
        // Lost the race; the winner already emitted the terminal event
        Err(StoreError::StateMismatch { .. }) => return Ok(()),
        Err(err) => return Err(err.into()),
    }

    let mut details = Map::new();
    details.insert("elapsed_ms".to_string(), Value::from(elapsed_ms));
    runtime
        .log(
            *job_id,
            LogLevel::Info,
            &format!(
                "Job completed: {} success, {} failures",
                counters.success, counters.failure
            ),
            details,
        )
        .await;

    let result = pf_core::ResultMessage {
        job_id: *job_id,
        success_count: counters.success,
        failure_count: counters.failure,
        elapsed_ms,
        timestamp_ms: now_ms(),
    };
    if let Err(err) = runtime.bus.publish_result(&result).await {
        warn!(job_id = %job_id, error = %err, "failed to publish job result");
    }

    runtime
        .emit(
            *job_id,
            HubEvent::JobCompleted {
                success_count: counters.success,
                failure_count: counters.failure,
                total_time_ms: elapsed_ms,
                results,
            },
        )
        .await;
    info!(
        job_id = %job_id,
        success = counters.success,
        failed = counters.failure,
        elapsed_ms,
        "job completed"
    );
    Ok(())
}
