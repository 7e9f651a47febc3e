// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-scoped resource bundle.
//!
//! Everything is constructor-injected and shared behind `Arc`; there are
//! no module-level singletons, so tests wire in fakes freely.

use pf_adapters::{BlobStore, ProfileService, Rasterizer, Sink};
use pf_bus::Bus;
use pf_core::{HubEvent, JobId, LogLevel, Settings};
use pf_hub::EventHub;
use pf_storage::Store;
use serde_json::Map;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// External capabilities the pipeline renders and exports through.
#[derive(Clone)]
pub struct Capabilities {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub blobs: Arc<dyn BlobStore>,
    pub profiles: Arc<dyn ProfileService>,
    pub sink: Arc<dyn Sink>,
}

/// Shared engine resources.
pub struct Runtime {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) bus: Arc<dyn Bus>,
    pub(crate) hub: EventHub,
    pub(crate) caps: Capabilities,
    /// Client for overlay input fetches (logo and profile images).
    pub(crate) http: reqwest::Client,
    pub(crate) settings: Settings,
}

impl Runtime {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<dyn Bus>,
        hub: EventHub,
        caps: Capabilities,
        settings: Settings,
    ) -> Self {
        Self { store, bus, hub, caps, http: reqwest::Client::new(), settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Publish a hub event; progress events are additionally mirrored to
    /// the bus progress topic for external consumers (best effort).
    pub(crate) async fn emit(&self, job_id: JobId, event: HubEvent) {
        if matches!(event, HubEvent::Progress { .. }) {
            let record = pf_core::EventRecord::new(job_id, now_ms(), event.clone());
            if let Err(err) = self.bus.publish_progress(&record).await {
                warn!(job_id = %job_id, error = %err, "progress mirror publish failed");
            }
        }
        self.hub.emit(job_id, event).await;
    }

    /// Append a job log line and stream it to subscribers.
    pub(crate) async fn log(
        &self,
        job_id: JobId,
        level: LogLevel,
        message: &str,
        details: Map<String, serde_json::Value>,
    ) {
        if let Err(err) = self.store.append_log(&job_id, level, message, details.clone()).await {
            warn!(job_id = %job_id, error = %err, "failed to append job log");
        }
        self.hub
            .emit(job_id, HubEvent::Log { level, message: message.to_string(), details })
            .await;
    }
}
