// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Bus`] that records published messages for tests.

use crate::{Bus, BusError, TOPIC_ERRORS, TOPIC_PROGRESS, TOPIC_REQUESTS, TOPIC_RESULTS};
use async_trait::async_trait;
use parking_lot::Mutex;
use pf_core::{ErrorMessage, EventRecord, JobEnvelope, ResultMessage};
use std::sync::Arc;

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: &'static str,
    pub key: String,
    pub value: serde_json::Value,
}

/// In-memory bus. Cheap to clone; all clones share the record.
#[derive(Clone, Default)]
pub struct MemBus {
    published: Arc<Mutex<Vec<Published>>>,
    fail_publishes: Arc<Mutex<bool>>,
}

impl MemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail, for submission-failure paths.
    pub fn fail_publishes(&self, fail: bool) {
        *self.fail_publishes.lock() = fail;
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// Messages recorded on a given topic.
    pub fn on_topic(&self, topic: &str) -> Vec<Published> {
        self.published.lock().iter().filter(|p| p.topic == topic).cloned().collect()
    }

    /// Envelopes recorded on the requests topic.
    pub fn requests(&self) -> Vec<JobEnvelope> {
        self.on_topic(TOPIC_REQUESTS)
            .into_iter()
            .filter_map(|p| serde_json::from_value(p.value).ok())
            .collect()
    }

    fn record<T: serde::Serialize>(
        &self,
        topic: &'static str,
        key: &str,
        value: &T,
    ) -> Result<(), BusError> {
        if *self.fail_publishes.lock() {
            return Err(BusError::Kafka(rdkafka::error::KafkaError::Canceled));
        }
        self.published.lock().push(Published {
            topic,
            key: key.to_string(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }
}

#[async_trait]
impl Bus for MemBus {
    async fn publish_request(&self, envelope: &JobEnvelope) -> Result<(), BusError> {
        self.record(TOPIC_REQUESTS, envelope.job_id.as_str(), envelope)
    }

    async fn publish_result(&self, result: &ResultMessage) -> Result<(), BusError> {
        self.record(TOPIC_RESULTS, result.job_id.as_str(), result)
    }

    async fn publish_error(&self, error: &ErrorMessage) -> Result<(), BusError> {
        self.record(TOPIC_ERRORS, error.job_id.as_str(), error)
    }

    async fn publish_progress(&self, event: &EventRecord) -> Result<(), BusError> {
        self.record(TOPIC_PROGRESS, event.job_id.as_str(), event)
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
