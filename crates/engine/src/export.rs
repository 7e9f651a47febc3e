// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-generation export: push finished artifacts to the system of
//! record through the sink capability.
//!
//! Runs as its own job kind through the same worker, so it inherits the
//! lifecycle, progress, and cancel semantics. No rasterization.

use crate::pipeline::ItemResult;
use crate::runtime::{now_ms, Runtime};
use crate::{worker, EngineError};
use pf_adapters::{data_url_to_bytes, is_data_url, ArtifactPush, BlobStore, Sink, SinkError};
use pf_core::{
    ArtifactExport, FailureKind, ItemClose, ItemId, ItemStatus, ItemSummary, JobEnvelope,
    JobState, LogLevel, NewItem,
};
use pf_storage::{StartOutcome, Store, StoreError};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Export fan-out per batch.
const EXPORT_BATCH_SIZE: usize = 10;
/// Pause between export batches; the downstream API is rate-sensitive.
const EXPORT_BATCH_PAUSE: Duration = Duration::from_secs(2);

pub(crate) async fn run(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    artifacts: &[ArtifactExport],
) -> Result<Vec<ItemSummary>, EngineError> {
    let job_id = envelope.job_id;
    if artifacts.is_empty() {
        return Err(EngineError::EmptyJob);
    }

    let total_batches = artifacts.len().div_ceil(EXPORT_BATCH_SIZE);
    let gate = Mutex::new(Vec::new());

    for (batch_index, chunk) in artifacts.chunks(EXPORT_BATCH_SIZE).enumerate() {
        let Some(job) = runtime.store.get_job(&job_id).await? else {
            return Err(StoreError::JobNotFound(job_id).into());
        };
        if job.state != JobState::Processing {
            info!(job_id = %job_id, state = %job.state, "export no longer processing, stopping batches");
            return Ok(gate.into_inner());
        }

        if batch_index > 0 {
            tokio::time::sleep(EXPORT_BATCH_PAUSE).await;
        }
        runtime
            .log(
                job_id,
                LogLevel::Info,
                &format!("Exporting batch {}/{total_batches}", batch_index + 1),
                Map::new(),
            )
            .await;

        let results =
            futures_util::future::join_all(chunk.iter().enumerate().map(|(offset, artifact)| {
                let index = batch_index * EXPORT_BATCH_SIZE + offset;
                process_one(runtime, envelope, index, artifact, &gate)
            }))
            .await;
        for result in results {
            result?;
        }
    }

    Ok(gate.into_inner())
}

async fn process_one(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    index: usize,
    artifact: &ArtifactExport,
    gate: &Mutex<Vec<ItemSummary>>,
) -> Result<(), EngineError> {
    let job_id = envelope.job_id;
    let item_id = ItemId::from_index(index);

    let mut new_item = NewItem::new(item_id, artifact.identifier.clone());
    if let Some(user_id) = artifact.user_id {
        new_item.metadata.insert("user_id".to_string(), Value::from(user_id));
    }
    match runtime.store.start_item(&job_id, &new_item).await? {
        StartOutcome::Started => {}
        StartOutcome::AlreadyClosed(status) => {
            debug!(job_id = %job_id, item = %item_id, %status, "artifact already exported, skipping");
            return Ok(());
        }
    }

    let result = push_artifact(runtime, envelope, artifact).await;
    worker::finalize_item(runtime, envelope, item_id, &artifact.identifier, result, gate).await
}

async fn push_artifact(
    runtime: &Runtime,
    envelope: &JobEnvelope,
    artifact: &ArtifactExport,
) -> ItemResult {
    let started = Instant::now();
    let fail = |kind: FailureKind, message: String, started: Instant| {
        let mut details = Map::new();
        details.insert("identifier".to_string(), Value::String(artifact.identifier.clone()));
        details.insert("artifact_url".to_string(), Value::String(artifact.artifact_url.clone()));
        ItemResult {
            close: ItemClose::failure(kind, message, started.elapsed().as_millis() as i64),
            failure_details: details,
            template_snapshot: None,
        }
    };

    // Artifacts without an account cannot be attached downstream
    let Some(user_id) = artifact.user_id else {
        return fail(
            FailureKind::MissingUserId,
            "no user_id provided for artifact".to_string(),
            started,
        );
    };

    // Data-URL artifacts are uploaded first; only the resulting URL is
    // sent downstream
    let mut final_url = artifact.artifact_url.clone();
    let mut artifact_key = None;
    if is_data_url(&final_url) {
        let bytes = match data_url_to_bytes(&final_url) {
            Ok(bytes) => bytes,
            Err(err) => {
                return fail(FailureKind::Unknown, format!("invalid artifact data url: {err}"), started)
            }
        };
        let key = format!("jobs/{}/{}_{}.png", envelope.job_id, artifact.identifier, now_ms());
        match runtime.caps.blobs.put_png(&key, &bytes).await {
            Ok(blob) => {
                final_url = blob.url;
                artifact_key = Some(blob.key);
            }
            Err(err) => {
                return fail(FailureKind::Unknown, format!("artifact upload failed: {err}"), started)
            }
        }
    }

    let push = ArtifactPush {
        user_id,
        artifact_url: final_url.clone(),
        campaign_name: envelope.campaign_name.clone(),
    };
    match runtime.caps.sink.push(&push).await {
        Ok(()) => {
            let mut metadata = Map::new();
            metadata.insert("user_id".to_string(), Value::from(user_id));
            ItemResult {
                close: ItemClose {
                    status: ItemStatus::Completed,
                    display_name: None,
                    artifact_url: Some(final_url),
                    artifact_key,
                    processing_ms: started.elapsed().as_millis() as i64,
                    error: None,
                    metadata,
                },
                failure_details: Map::new(),
                template_snapshot: None,
            }
        }
        Err(err @ SinkError::Webhook { .. }) => {
            fail(FailureKind::WebhookFailed, err.to_string(), started)
        }
        Err(err) => fail(FailureKind::Unknown, err.to_string(), started),
    }
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
