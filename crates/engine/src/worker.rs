// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope consumption: drive every work-item of a job to a terminal
//! status.
//!
//! Items inside a batch run concurrently; the commit-and-emit section is
//! serialized per job so counters and events never regress. Redelivered
//! envelopes resume idempotently through the store's item upserts.

use crate::pipeline::{self, row_display_name, row_identifier, ItemSource, ItemSpec};
use crate::runtime::Runtime;
use crate::{aggregate, export, EngineError};
use pf_core::{
    HubEvent, ItemId, ItemStatus, ItemSummary, JobEnvelope, JobId, JobPayload, JobState,
    LogLevel, NewFailure, NewItem, RowData,
};
use pf_bus::Bus;
use pf_storage::{CloseOutcome, StartOutcome, Store, StoreError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Pause between item batches.
const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Consumes job envelopes and runs them to completion.
pub struct Worker {
    runtime: Arc<Runtime>,
}

impl Worker {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Process one envelope to its job-level conclusion. Returning `Ok`
    /// means the message may be acknowledged; per-item failures never
    /// surface here.
    pub async fn handle_envelope(&self, envelope: &JobEnvelope) -> Result<(), EngineError> {
        let runtime = &*self.runtime;
        let job_id = envelope.job_id;

        let Some(job) = runtime.store.get_job(&job_id).await? else {
            warn!(job_id = %job_id, "envelope for unknown job, acknowledging");
            return Ok(());
        };
        if job.state.is_terminal() {
            debug!(job_id = %job_id, state = %job.state, "redelivered envelope for terminal job");
            return Ok(());
        }
        if !self.claim(&job_id, job.state).await? {
            return Ok(());
        }

        let started = Instant::now();
        let counters = runtime
            .store
            .get_job(&job_id)
            .await?
            .map(|job| job.counters)
            .unwrap_or_default();
        runtime.emit(job_id, HubEvent::progress(&counters, None, "starting")).await;
        runtime
            .log(
                job_id,
                LogLevel::Info,
                &format!("Job processing started - {} posters to generate", envelope.total()),
                Map::new(),
            )
            .await;

        let run = match &envelope.payload {
            JobPayload::Export { artifacts } => export::run(runtime, envelope, artifacts).await,
            _ => self.run_generation(envelope).await,
        };

        match run {
            Ok(results) => aggregate::finalize(runtime, &job_id, started.elapsed(), results).await,
            Err(err) => self.fail_envelope(&job_id, err).await,
        }
    }

    /// Take ownership of the job. `true` means proceed; `false` means the
    /// envelope is stale and should be acknowledged without work.
    async fn claim(&self, job_id: &JobId, observed: JobState) -> Result<bool, EngineError> {
        let store = &self.runtime.store;

        // The envelope can arrive before the dispatcher's queued CAS
        // commits; bring the row forward first.
        if observed == JobState::Pending {
            match store.transition_job(job_id, JobState::Pending, JobState::Queued).await {
                Ok(()) | Err(StoreError::StateMismatch { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        match store.transition_job(job_id, JobState::Queued, JobState::Processing).await {
            Ok(()) => Ok(true),
            // Another worker already started; resume is idempotent via
            // the item-level upserts
            Err(StoreError::StateMismatch { actual: JobState::Processing, .. }) => Ok(true),
            Err(StoreError::StateMismatch { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn run_generation(
        &self,
        envelope: &JobEnvelope,
    ) -> Result<Vec<ItemSummary>, EngineError> {
        let runtime = &*self.runtime;
        let job_id = envelope.job_id;

        let specs = expand(envelope)?;
        let batch_size = runtime.settings.batch_size.max(1);
        let total_batches = specs.len().div_ceil(batch_size);
        let gate = Mutex::new(Vec::new());

        for (batch_index, chunk) in specs.chunks(batch_size).enumerate() {
            // Cancel is observed between batches: the current batch
            // drains, no further batches are scheduled
            let Some(job) = runtime.store.get_job(&job_id).await? else {
                return Err(StoreError::JobNotFound(job_id).into());
            };
            if job.state != JobState::Processing {
                info!(job_id = %job_id, state = %job.state, "job no longer processing, stopping batches");
                return Ok(gate.into_inner());
            }

            if batch_index > 0 {
                tokio::time::sleep(INTER_BATCH_PAUSE).await;
            }
            runtime
                .log(
                    job_id,
                    LogLevel::Info,
                    &format!("Processing batch {}/{total_batches}", batch_index + 1),
                    Map::new(),
                )
                .await;

            let results = futures_util::future::join_all(
                chunk.iter().map(|spec| self.process_one(envelope, spec, &gate)),
            )
            .await;
            for result in results {
                result?;
            }
        }

        Ok(gate.into_inner())
    }

    async fn process_one(
        &self,
        envelope: &JobEnvelope,
        spec: &ItemSpec,
        gate: &Mutex<Vec<ItemSummary>>,
    ) -> Result<(), EngineError> {
        let runtime = &*self.runtime;
        let job_id = envelope.job_id;

        let mut new_item = NewItem::new(spec.item_id, spec.identifier.clone());
        if let ItemSource::Row(row) = &spec.source {
            if let Some(display_name) = row_display_name(row) {
                new_item = new_item.display_name(display_name);
            }
        }
        match runtime.store.start_item(&job_id, &new_item).await? {
            StartOutcome::Started => {}
            // Redelivery: the item already ran to terminal, skip silently
            StartOutcome::AlreadyClosed(status) => {
                debug!(job_id = %job_id, item = %spec.item_id, %status, "item already terminal, skipping");
                return Ok(());
            }
        }

        let result = pipeline::process_item(runtime, envelope, spec).await;
        finalize_item(runtime, envelope, spec.item_id, &spec.identifier, result, gate).await
    }

    /// Envelope-level failure: expansion failed or the store stopped
    /// accepting counter updates. The whole job fails.
    async fn fail_envelope(&self, job_id: &JobId, err: EngineError) -> Result<(), EngineError> {
        let runtime = &*self.runtime;
        let message = err.to_string();
        error!(job_id = %job_id, error = %message, "job failed");

        if !runtime.store.fail_job(job_id, &message).await? {
            return Ok(());
        }

        let failure = NewFailure::new(*job_id, pf_core::FailureKind::Unknown, "", message.clone());
        if let Err(err) = runtime.store.record_failure(&failure).await {
            warn!(job_id = %job_id, error = %err, "failed to record job failure");
        }
        runtime
            .log(*job_id, LogLevel::Error, &format!("Job failed: {message}"), Map::new())
            .await;

        let error_message = pf_core::ErrorMessage {
            job_id: *job_id,
            error: message.clone(),
            details: Map::new(),
            timestamp_ms: crate::runtime::now_ms(),
        };
        if let Err(err) = runtime.bus.publish_error(&error_message).await {
            warn!(job_id = %job_id, error = %err, "failed to publish job error");
        }
        runtime
            .emit(*job_id, HubEvent::JobFailed { error: message, details: Map::new() })
            .await;
        Ok(())
    }
}

/// Close an item and surface its outcome: failure record, log line,
/// `poster_completed`, and a progress snapshot, all under the per-job
/// gate so observed progress is strictly increasing.
pub(crate) async fn finalize_item(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    item_id: ItemId,
    identifier: &str,
    result: pipeline::ItemResult,
    gate: &Mutex<Vec<ItemSummary>>,
) -> Result<(), EngineError> {
    let job_id = envelope.job_id;
    let mut summaries = gate.lock().await;

    let outcome = runtime.store.close_item(&job_id, &item_id, &result.close).await?;
    let counters = match outcome {
        CloseOutcome::Applied(counters) => counters,
        // Redelivered or landed after cancel: nothing is surfaced
        CloseOutcome::AlreadyClosed | CloseOutcome::Discarded => {
            debug!(job_id = %job_id, item = %item_id, ?outcome, "item close not counted");
            return Ok(());
        }
    };

    let success = result.close.status == ItemStatus::Completed;
    let artifact_url = result.close.artifact_url.clone().unwrap_or_default();
    let error = result.close.error.as_ref().map(|(_, message)| message.clone());

    if let Some((kind, message)) = &result.close.error {
        let mut failure = NewFailure::new(job_id, *kind, identifier, message.clone())
            .item_id(item_id)
            .details(result.failure_details.clone());
        if let Some(snapshot) = &result.template_snapshot {
            failure = failure.template_snapshot(snapshot.clone());
        }
        if let Err(err) = runtime.store.record_failure(&failure).await {
            warn!(job_id = %job_id, error = %err, "failed to record item failure");
        }
        runtime
            .log(job_id, LogLevel::Warning, &format!("{identifier} failed: {message}"), Map::new())
            .await;
    } else {
        runtime
            .log(
                job_id,
                LogLevel::Debug,
                &format!("{identifier} completed ({}/{})", counters.processed, counters.total),
                Map::new(),
            )
            .await;
    }

    // Both events strictly after the terminal row committed; the counter
    // snapshot goes first, then the per-item announcement
    runtime
        .emit(job_id, HubEvent::progress(&counters, Some(identifier.to_string()), "processing"))
        .await;
    runtime
        .emit(
            job_id,
            HubEvent::PosterCompleted {
                identifier: identifier.to_string(),
                artifact_url: artifact_url.clone(),
                success,
                error: error.clone(),
            },
        )
        .await;

    summaries.push(ItemSummary {
        identifier: identifier.to_string(),
        artifact_url: (!artifact_url.is_empty()).then_some(artifact_url),
        success,
        error,
    });
    Ok(())
}

/// Expand an envelope into ordered item specs with deterministic ids.
fn expand(envelope: &JobEnvelope) -> Result<Vec<ItemSpec>, EngineError> {
    let specs: Vec<ItemSpec> = match &envelope.payload {
        JobPayload::ByIdentifier { identifiers } => identifiers
            .iter()
            .enumerate()
            .map(|(index, identifier)| ItemSpec {
                item_id: ItemId::from_index(index),
                index,
                identifier: identifier.to_string(),
                source: ItemSource::Identifier(identifier.clone()),
            })
            .collect(),
        JobPayload::ByRow { rows, .. } => rows
            .iter()
            .enumerate()
            .map(|(index, row)| ItemSpec {
                item_id: ItemId::from_index(index),
                index,
                identifier: row_identifier(row, index),
                source: ItemSource::Row(row.clone()),
            })
            .collect(),
        JobPayload::ByTemplateParam { custom_data, .. } => vec![ItemSpec {
            item_id: ItemId::from_index(0),
            index: 0,
            identifier: template_identifier(custom_data, &envelope.metadata),
            source: ItemSource::TemplateParam(custom_data.clone()),
        }],
        // Export envelopes take the dedicated path in export::run
        JobPayload::Export { .. } => Vec::new(),
    };

    if specs.is_empty() {
        return Err(EngineError::EmptyJob);
    }
    Ok(specs)
}

/// Identifier for a one-shot template item: the entity the parameters
/// describe, when one is named.
fn template_identifier(custom_data: &RowData, metadata: &Map<String, Value>) -> String {
    let from_value = |value: &Value| match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    custom_data
        .get("entity_id")
        .or_else(|| custom_data.get("testimonial_id"))
        .and_then(from_value)
        .or_else(|| metadata.get("id").and_then(from_value))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
