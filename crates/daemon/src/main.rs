// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pfd: the PosterForge worker daemon.
//!
//! Builds the process-scoped resources (store, bus, hub, capability
//! adapters), then consumes job envelopes until interrupted. Offsets are
//! committed only after the handler returns, so an interrupted job is
//! redelivered and resumed through the store's idempotent item upserts.

use pf_adapters::{
    BlobStore, ChromiumRasterizer, DataUrlBlobStore, HttpProfileService, HttpSink, S3BlobStore,
};
use pf_bus::{decode_envelope, KafkaBus};
use pf_core::Settings;
use pf_engine::{Capabilities, Runtime, Worker};
use pf_hub::EventHub;
use pf_storage::PgStore;
use rdkafka::consumer::{CommitMode, Consumer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Profile API used when `PF_PROFILE_API_BASE` is not set.
const DEFAULT_PROFILE_API: &str = "https://gcp.galactus.run";
/// System-of-record API used when `PF_SINK_BASE_URL` is not set.
const DEFAULT_SINK_API: &str = "https://gcp.gravitron.run";

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error(transparent)]
    Store(#[from] pf_storage::StoreError),

    #[error(transparent)]
    Bus(#[from] pf_bus::BusError),

    #[error(transparent)]
    Hub(#[from] pf_hub::HubError),

    #[error(transparent)]
    Blob(#[from] pf_adapters::BlobError),
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    info!(brokers = %settings.bus_brokers, group = %settings.consumer_group, "pfd starting");

    let store = PgStore::connect(&settings.store_dsn).await?;
    store.migrate().await?;

    let bus = KafkaBus::connect(&settings.bus_brokers)?;
    bus.ensure_topics().await?;

    let hub = match &settings.cache_url {
        Some(cache_url) => EventHub::federated(cache_url).await?,
        None => {
            warn!("no cache configured, hub events stay in-process");
            EventHub::in_process()
        }
    };

    let blobs: Arc<dyn BlobStore> = if settings.blob.is_configured() {
        Arc::new(S3BlobStore::connect(&settings.blob).await?)
    } else {
        warn!("blob store not configured, artifacts fall back to data URLs");
        Arc::new(DataUrlBlobStore::new())
    };

    let profile_base =
        settings.profile_api_base.clone().unwrap_or_else(|| DEFAULT_PROFILE_API.to_string());
    let sink_base = settings.sink_base_url.clone().unwrap_or_else(|| DEFAULT_SINK_API.to_string());

    let caps = Capabilities {
        rasterizer: Arc::new(ChromiumRasterizer::from_env()),
        blobs,
        profiles: Arc::new(HttpProfileService::new(profile_base)),
        sink: Arc::new(HttpSink::new(sink_base)),
    };

    let runtime = Arc::new(Runtime::new(
        Arc::new(store),
        Arc::new(bus.clone()),
        hub.clone(),
        caps,
        settings.clone(),
    ));
    let worker = Worker::new(runtime);

    let consumer = bus.requests_consumer(&settings.consumer_group)?;
    info!("worker consuming");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            message = consumer.recv() => {
                let message = match message {
                    Ok(message) => message,
                    Err(err) => {
                        error!(error = %err, "consumer receive failed");
                        continue;
                    }
                };
                let envelope = match decode_envelope(&message) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        // Malformed messages cannot be reprocessed; skip past them
                        warn!(error = %err, "skipping malformed envelope");
                        if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                            warn!(error = %err, "commit failed");
                        }
                        continue;
                    }
                };
                match worker.handle_envelope(&envelope).await {
                    Ok(()) => {
                        // At-least-once: commit only after the handler returns
                        if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                            warn!(job_id = %envelope.job_id, error = %err, "commit failed");
                        }
                    }
                    Err(err) => {
                        // Leave the offset uncommitted; the envelope is
                        // redelivered and resumes idempotently
                        error!(job_id = %envelope.job_id, error = %err, "envelope handling failed");
                    }
                }
            }
        }
    }

    hub.close();
    info!("pfd stopped");
    Ok(())
}
