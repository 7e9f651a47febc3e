// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process federation over a Redis pub/sub channel.
//!
//! The channel is the authoritative path between processes; the
//! in-process subscriber map is only a local demux.

use crate::{HubError, HubInner};
use futures_util::StreamExt;
use pf_core::EventRecord;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Channel all hub events ride on.
const CHANNEL: &str = "pf:events";

#[derive(Clone)]
pub(crate) struct Federation {
    conn: ConnectionManager,
}

impl Federation {
    /// Connect publisher and background subscriber. The returned task
    /// demultiplexes channel messages onto the local queues until aborted.
    pub(crate) async fn connect(
        cache_url: &str,
        inner: Arc<HubInner>,
    ) -> Result<(Self, JoinHandle<()>), HubError> {
        let client = redis::Client::open(cache_url)?;
        let conn = client.get_connection_manager().await?;

        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(CHANNEL).await?;
        info!(channel = CHANNEL, "hub federation subscribed");

        let task = tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "unreadable federated message");
                        continue;
                    }
                };
                match serde_json::from_str::<EventRecord>(&payload) {
                    Ok(record) => inner.dispatch_local(&record).await,
                    Err(err) => warn!(error = %err, "malformed federated event"),
                }
            }
            error!("hub federation stream ended");
        });

        Ok((Self { conn }, task))
    }

    pub(crate) async fn publish(&self, record: &EventRecord) -> Result<(), HubError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(CHANNEL, payload).await?;
        Ok(())
    }
}
