// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kafka/Redpanda realization of the [`Bus`] contract.

use crate::{Bus, BusError, TOPIC_ERRORS, TOPIC_PROGRESS, TOPIC_REQUESTS, TOPIC_RESULTS};
use async_trait::async_trait;
use pf_core::{ErrorMessage, EventRecord, JobEnvelope, ResultMessage};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Kafka-backed bus. Cheap to clone; clones share one producer.
#[derive(Clone)]
pub struct KafkaBus {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaBus {
    /// Build the idempotent producer against the given broker list.
    pub fn connect(brokers: &str) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("linger.ms", "10")
            .set("message.timeout.ms", "30000")
            .create()?;
        info!(brokers, "bus producer connected");
        Ok(Self { producer, brokers: brokers.to_string() })
    }

    /// Create the four topics with their retention windows. Existing
    /// topics are left untouched.
    pub async fn ensure_topics(&self) -> Result<(), BusError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;

        let topics = [
            // requests: 24h
            NewTopic::new(TOPIC_REQUESTS, 3, TopicReplication::Fixed(1))
                .set("retention.ms", "86400000"),
            // results: 1h
            NewTopic::new(TOPIC_RESULTS, 3, TopicReplication::Fixed(1))
                .set("retention.ms", "3600000"),
            // progress: 1h
            NewTopic::new(TOPIC_PROGRESS, 3, TopicReplication::Fixed(1))
                .set("retention.ms", "3600000"),
            // errors: 7d
            NewTopic::new(TOPIC_ERRORS, 1, TopicReplication::Fixed(1))
                .set("retention.ms", "604800000"),
        ];

        let results = admin.create_topics(topics.iter(), &AdminOptions::new()).await?;
        for result in results {
            match result {
                Ok(topic) => info!(topic, "created topic"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic, "topic already exists")
                }
                Err((topic, code)) => {
                    warn!(topic, ?code, "could not create topic");
                }
            }
        }
        Ok(())
    }

    /// Group consumer over the requests topic.
    ///
    /// Auto-commit is off: the caller commits each message only after its
    /// handler returns, which is what makes delivery at-least-once.
    pub fn requests_consumer(&self, group_id: &str) -> Result<StreamConsumer, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .create()?;
        consumer.subscribe(&[TOPIC_REQUESTS])?;
        info!(group_id, topic = TOPIC_REQUESTS, "bus consumer subscribed");
        Ok(consumer)
    }

    async fn publish_json<T: Serialize + Sync>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(), BusError> {
        let payload = serde_json::to_vec(value)?;
        self.producer
            .send(
                FutureRecord::to(topic).key(key).payload(&payload),
                Timeout::After(PUBLISH_TIMEOUT),
            )
            .await
            .map_err(|(err, _message): (KafkaError, _)| err)?;
        debug!(topic, key, "published");
        Ok(())
    }
}

#[async_trait]
impl Bus for KafkaBus {
    async fn publish_request(&self, envelope: &JobEnvelope) -> Result<(), BusError> {
        self.publish_json(TOPIC_REQUESTS, envelope.job_id.as_str(), envelope).await
    }

    async fn publish_result(&self, result: &ResultMessage) -> Result<(), BusError> {
        self.publish_json(TOPIC_RESULTS, result.job_id.as_str(), result).await
    }

    async fn publish_error(&self, error: &ErrorMessage) -> Result<(), BusError> {
        self.publish_json(TOPIC_ERRORS, error.job_id.as_str(), error).await
    }

    async fn publish_progress(&self, event: &EventRecord) -> Result<(), BusError> {
        self.publish_json(TOPIC_PROGRESS, event.job_id.as_str(), event).await
    }
}

/// Decode a requests-topic message into an envelope.
pub fn decode_envelope(message: &BorrowedMessage<'_>) -> Result<JobEnvelope, BusError> {
    let payload = message.payload().ok_or_else(|| BusError::EmptyPayload {
        topic: message.topic().to_string(),
    })?;
    Ok(serde_json::from_slice(payload)?)
}
