// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator cancellation.
//!
//! Cancel is observable immediately at the job level: the terminal CAS
//! happens here, the worker notices between batches, and per-item
//! results that land afterwards are discarded at the counter level.

use crate::runtime::{now_ms, Runtime};
use crate::EngineError;
use pf_bus::Bus;
use pf_core::{HubEvent, JobId, LogLevel};
use pf_storage::{CancelOutcome, Store, StoreError};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Client-visible cancel result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// Cancel a job. Idempotent on terminal jobs: cancelling one succeeds
/// with the message `"already terminal"`.
pub async fn cancel_job(runtime: &Runtime, job_id: &JobId) -> Result<CancelResponse, EngineError> {
    match runtime.store.cancel_job(job_id).await {
        Ok(CancelOutcome::Cancelled { prior }) => {
            info!(job_id = %job_id, %prior, "job cancelled by user");
            runtime.log(*job_id, LogLevel::Warning, "Job cancelled by user", Map::new()).await;

            let error = pf_core::ErrorMessage {
                job_id: *job_id,
                error: "cancelled by user".to_string(),
                details: Map::new(),
                timestamp_ms: now_ms(),
            };
            if let Err(err) = runtime.bus.publish_error(&error).await {
                warn!(job_id = %job_id, error = %err, "failed to publish cancel error");
            }

            let mut details = Map::new();
            details.insert("prior_state".to_string(), Value::String(prior.to_string()));
            runtime
                .emit(
                    *job_id,
                    HubEvent::JobFailed { error: "cancelled by user".to_string(), details },
                )
                .await;

            Ok(CancelResponse {
                success: true,
                message: format!("job cancelled (was {prior})"),
            })
        }
        Ok(CancelOutcome::AlreadyTerminal(state)) => {
            info!(job_id = %job_id, %state, "cancel on terminal job is a no-op");
            Ok(CancelResponse { success: true, message: "already terminal".to_string() })
        }
        Err(StoreError::JobNotFound(_)) => {
            Ok(CancelResponse { success: false, message: "job not found".to_string() })
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
