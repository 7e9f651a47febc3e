// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pf-engine: the job orchestration core.
//!
//! The [`Dispatcher`] validates and shards submissions into one bus
//! envelope per job; the [`Worker`] consumes envelopes and drives every
//! work-item to a terminal status through the per-item pipeline
//! (template fill → rasterize → overlay → upload); the aggregator turns
//! drained counters into the job's terminal state and publishes the
//! single terminal event.

mod aggregate;
mod cancel;
mod dispatcher;
mod export;
mod overlay;
mod pipeline;
mod runtime;
mod worker;

#[cfg(test)]
mod test_helpers;

pub use cancel::{cancel_job, CancelResponse};
pub use dispatcher::{Dispatcher, JobTicket};
pub use runtime::{Capabilities, Runtime};
pub use worker::Worker;

use pf_bus::BusError;
use pf_storage::StoreError;

/// Engine errors.
///
/// Per-item failures never surface here; they are recorded on the item
/// and counted. An `EngineError` escaping the worker is an
/// envelope-level failure that fails the whole job.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("submission contains no work items")]
    EmptyJob,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
