// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test wiring: a runtime over the in-memory store/bus and fake
//! capabilities.

use crate::dispatcher::Dispatcher;
use crate::runtime::{Capabilities, Runtime};
use crate::worker::Worker;
use pf_adapters::fakes::{FakeBlobStore, FakeProfileService, FakeRasterizer, FakeSink};
use pf_bus::mem::MemBus;
use pf_core::{EventRecord, HubEvent, RowData, Settings};
use pf_hub::{EventHub, Subscription};
use pf_storage::mem::MemStore;
use std::sync::Arc;

pub(crate) struct TestContext {
    pub runtime: Arc<Runtime>,
    pub store: MemStore,
    pub bus: MemBus,
    pub hub: EventHub,
    pub blobs: FakeBlobStore,
    pub profiles: FakeProfileService,
    pub sink: FakeSink,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = MemStore::new();
        let bus = MemBus::new();
        let hub = EventHub::in_process();
        let blobs = FakeBlobStore::new();
        let profiles = FakeProfileService::new();
        let sink = FakeSink::new();

        let caps = Capabilities {
            rasterizer: Arc::new(FakeRasterizer::new()),
            blobs: Arc::new(blobs.clone()),
            profiles: Arc::new(profiles.clone()),
            sink: Arc::new(sink.clone()),
        };
        let runtime = Arc::new(Runtime::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            hub.clone(),
            caps,
            settings,
        ));

        Self { runtime, store, bus, hub, blobs, profiles, sink }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.runtime.clone())
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.runtime.clone())
    }
}

/// Build a row from string pairs.
pub(crate) fn row(pairs: &[(&str, &str)]) -> RowData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

/// Drain a subscription until (and including) the terminal event.
/// Everything must already be queued; panics if the stream dries up
/// first.
pub(crate) async fn collect_until_terminal(sub: &Subscription) -> Vec<EventRecord> {
    let mut events = Vec::new();
    loop {
        let record = match sub.next().await {
            Some(record) => record,
            None => panic!("subscription closed before a terminal event"),
        };
        let terminal = record.body.is_terminal();
        events.push(record);
        if terminal {
            return events;
        }
    }
}

/// The `processed` values of all progress events, in order.
pub(crate) fn progress_values(events: &[EventRecord]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|record| match &record.body {
            HubEvent::Progress { processed, .. } => Some(*processed),
            _ => None,
        })
        .collect()
}

/// Names of the non-log events, in order.
pub(crate) fn event_names(events: &[EventRecord]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|record| !matches!(record.body, HubEvent::Log { .. }))
        .map(|record| record.body.name())
        .collect()
}
