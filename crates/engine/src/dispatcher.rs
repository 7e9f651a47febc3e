// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job submission: validate, shard, persist, enqueue.
//!
//! One self-contained envelope per job. The row stays `pending` until the
//! broker acknowledges the publish; only then does it move to `queued`,
//! so a failed publish leaves the submission retryable.

use crate::runtime::{now_ms, Runtime};
use crate::EngineError;
use pf_bus::Bus;
use pf_core::{
    parse_identifiers, template, ArtifactExport, Dimensions, JobEnvelope, JobId, JobParams,
    JobPayload, JobState, LogLevel, NewJob, RowData,
};
use pf_storage::Store;
use serde_json::Map;
use std::sync::Arc;
use tracing::info;

/// The client-visible submission receipt.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: JobId,
    pub state: JobState,
    pub total: i64,
    pub created_at_ms: u64,
    pub stream_endpoint: String,
}

/// Accepts submissions and hands them to the bus.
pub struct Dispatcher {
    runtime: Arc<Runtime>,
}

impl Dispatcher {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Submit a job from a free-form identifier list.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_by_identifier(
        &self,
        campaign_name: &str,
        identifier_list: &str,
        template: &str,
        dims: Dimensions,
        params: JobParams,
        metadata: Map<String, serde_json::Value>,
    ) -> Result<JobTicket, EngineError> {
        let identifiers = parse_identifiers(identifier_list);
        if identifiers.is_empty() {
            return Err(EngineError::EmptyJob);
        }
        self.submit(
            campaign_name,
            template,
            dims,
            params,
            metadata,
            JobPayload::ByIdentifier { identifiers },
        )
        .await
    }

    /// Submit a job from explicit data rows.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_by_row(
        &self,
        campaign_name: &str,
        rows: Vec<RowData>,
        columns: Vec<String>,
        template: &str,
        dims: Dimensions,
        params: JobParams,
        metadata: Map<String, serde_json::Value>,
    ) -> Result<JobTicket, EngineError> {
        if rows.is_empty() {
            return Err(EngineError::EmptyJob);
        }
        self.submit(
            campaign_name,
            template,
            dims,
            params,
            metadata,
            JobPayload::ByRow { rows, columns },
        )
        .await
    }

    /// Submit a one-shot generation carrying a single set of template
    /// parameters. The template text is resolved by the caller; the
    /// envelope stays self-contained.
    pub async fn submit_template_generation(
        &self,
        template_id: &str,
        template: &str,
        dims: Dimensions,
        custom_data: RowData,
        metadata: Map<String, serde_json::Value>,
    ) -> Result<JobTicket, EngineError> {
        self.submit(
            template_id,
            template,
            dims,
            JobParams { skip_overlays: true, ..JobParams::default() },
            metadata,
            JobPayload::ByTemplateParam { template_id: template_id.to_string(), custom_data },
        )
        .await
    }

    /// Submit an export job pushing finished artifacts downstream.
    pub async fn submit_export(
        &self,
        campaign_name: &str,
        artifacts: Vec<ArtifactExport>,
        metadata: Map<String, serde_json::Value>,
    ) -> Result<JobTicket, EngineError> {
        if artifacts.is_empty() {
            return Err(EngineError::EmptyJob);
        }
        self.submit(
            campaign_name,
            "",
            Dimensions::default(),
            JobParams { skip_overlays: true, ..JobParams::default() },
            metadata,
            JobPayload::Export { artifacts },
        )
        .await
    }

    async fn submit(
        &self,
        campaign_name: &str,
        template_text: &str,
        dims: Dimensions,
        params: JobParams,
        metadata: Map<String, serde_json::Value>,
        payload: JobPayload,
    ) -> Result<JobTicket, EngineError> {
        let runtime = &self.runtime;
        let job_id = JobId::new();
        let kind = payload.kind();
        let total = payload.len() as i64;
        // Legacy {{name}} tokens become {name} once, at ingress
        let template_text = template::normalize_tokens(template_text);

        let mut builder = NewJob::builder(job_id, kind, total)
            .campaign_name(campaign_name)
            .template(template_text.clone())
            .dims(dims)
            .skip_overlays(params.skip_overlays)
            .metadata(metadata.clone());
        if let Some(model) = &params.model {
            builder = builder.model(model.clone());
        }
        if let Some(logo) = &params.logo_handle {
            builder = builder.logo_handle(logo.clone());
        }
        let new_job = builder.build();

        runtime.store.create_job(&new_job).await?;
        runtime
            .log(
                job_id,
                LogLevel::Info,
                &format!("Job created with {total} items"),
                details(&[("campaign_name", campaign_name), ("kind", &kind.to_string())]),
            )
            .await;

        let envelope = JobEnvelope {
            job_id,
            campaign_name: campaign_name.to_string(),
            template: template_text,
            dims,
            params,
            payload,
            metadata,
            queued_at_ms: now_ms(),
        };

        // A failed publish leaves the row pending; re-submission is allowed
        if let Err(err) = runtime.bus.publish_request(&envelope).await {
            runtime
                .log(job_id, LogLevel::Error, &format!("Failed to queue job: {err}"), Map::new())
                .await;
            return Err(err.into());
        }

        runtime.store.transition_job(&job_id, JobState::Pending, JobState::Queued).await?;
        runtime.log(job_id, LogLevel::Info, "Job queued for processing", Map::new()).await;
        info!(job_id = %job_id, %kind, total, "job submitted");

        Ok(JobTicket {
            job_id,
            state: JobState::Queued,
            total,
            created_at_ms: now_ms(),
            stream_endpoint: format!("/api/batch/jobs/{job_id}/stream"),
        })
    }
}

fn details(pairs: &[(&str, &str)]) -> Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
