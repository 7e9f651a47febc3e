// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! The core reads a fixed set of `PF_*` variables; every knob has a
//! default suitable for local development.

use crate::job::CompletionPolicy;
use std::time::Duration;

/// Blob store credentials and addressing.
#[derive(Debug, Clone, Default)]
pub struct BlobSettings {
    pub bucket: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
    /// CDN base; artifact URLs are `{base_url}/{key}` when set.
    pub base_url: Option<String>,
}

impl BlobSettings {
    /// All four required fields are present.
    pub fn is_configured(&self) -> bool {
        self.bucket.is_some()
            && self.access_key.is_some()
            && self.secret_key.is_some()
            && self.base_url.is_some()
    }
}

/// Process-wide settings, read once at startup and passed through the
/// call graph.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Kafka-compatible broker list.
    pub bus_brokers: String,
    /// Redis URL for cross-process event federation. `None` degrades the
    /// hub to in-process dispatch.
    pub cache_url: Option<String>,
    /// Postgres DSN.
    pub store_dsn: String,
    pub blob: BlobSettings,
    /// Per-envelope item fan-out (the B knob).
    pub batch_size: usize,
    pub consumer_group: String,
    pub rasterize_timeout: Duration,
    pub device_scale: f64,
    pub profile_api_base: Option<String>,
    pub sink_base_url: Option<String>,
    pub completion_policy: CompletionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bus_brokers: "localhost:19092".to_string(),
            cache_url: None,
            store_dsn: "postgresql://localhost:5432/posterforge".to_string(),
            blob: BlobSettings {
                region: "us-east-1".to_string(),
                ..BlobSettings::default()
            },
            batch_size: 8,
            consumer_group: "poster-generation-workers".to_string(),
            rasterize_timeout: Duration::from_secs(60),
            device_scale: 1.0,
            profile_api_base: None,
            sink_base_url: None,
            completion_policy: CompletionPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bus_brokers: env_or("PF_BUS_BROKERS", &defaults.bus_brokers),
            cache_url: env_opt("PF_CACHE_URL"),
            store_dsn: env_or("PF_STORE_DSN", &defaults.store_dsn),
            blob: BlobSettings {
                bucket: env_opt("PF_BLOB_BUCKET"),
                access_key: env_opt("PF_BLOB_ACCESS_KEY"),
                secret_key: env_opt("PF_BLOB_SECRET_KEY"),
                region: env_or("PF_BLOB_REGION", &defaults.blob.region),
                base_url: env_opt("PF_BLOB_BASE_URL"),
            },
            batch_size: env_parse("PF_BATCH_SIZE").unwrap_or(defaults.batch_size).max(1),
            consumer_group: env_or("PF_CONSUMER_GROUP", &defaults.consumer_group),
            rasterize_timeout: env_parse("PF_RASTERIZE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rasterize_timeout),
            device_scale: env_parse("PF_DEVICE_SCALE").unwrap_or(defaults.device_scale),
            profile_api_base: env_opt("PF_PROFILE_API_BASE"),
            sink_base_url: env_opt("PF_SINK_BASE_URL"),
            completion_policy: env_opt("PF_COMPLETION_POLICY")
                .and_then(|s| CompletionPolicy::parse(&s))
                .unwrap_or(defaults.completion_policy),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
