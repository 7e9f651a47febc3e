// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pf-bus: durable, ordered, at-least-once message delivery.
//!
//! Envelopes are keyed by `job_id`, so every message belonging to one job
//! routes to one partition and per-job ordering is preserved. Offsets are
//! committed only after the handler returns; the store's item upsert is
//! the dedup point for redeliveries.

mod kafka;

#[cfg(any(test, feature = "test-support"))]
pub mod mem;

pub use kafka::{decode_envelope, KafkaBus};

use async_trait::async_trait;
use pf_core::{ErrorMessage, EventRecord, JobEnvelope, ResultMessage};

/// Job envelopes, one per submission.
pub const TOPIC_REQUESTS: &str = "poster.generation.requests";
/// Per-job summaries after aggregation.
pub const TOPIC_RESULTS: &str = "poster.generation.results";
/// Mirror of progress events for external consumers.
pub const TOPIC_PROGRESS: &str = "poster.generation.progress";
/// Terminal job failures.
pub const TOPIC_ERRORS: &str = "poster.generation.errors";

/// Bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("broker error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("message on {topic} has no payload")]
    EmptyPayload { topic: String },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Publish side of the bus. Completion is reported only after the broker
/// acknowledges the write.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a job envelope to the requests topic, keyed by `job_id`.
    async fn publish_request(&self, envelope: &JobEnvelope) -> Result<(), BusError>;

    /// Publish the post-aggregation summary to the results topic.
    async fn publish_result(&self, result: &ResultMessage) -> Result<(), BusError>;

    /// Publish a terminal job failure to the errors topic.
    async fn publish_error(&self, error: &ErrorMessage) -> Result<(), BusError>;

    /// Mirror a progress event to the progress topic. The pipeline never
    /// reads these back; they exist for external consumers.
    async fn publish_progress(&self, event: &EventRecord) -> Result<(), BusError>;
}
