// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pf-wire: the client-facing stream bridge.
//!
//! A [`StreamGateway`] converts one hub subscription into a long-lived
//! sequence of named SSE frames for a single client: catch-up `status`
//! on open, verbatim forwarding, heartbeats during silence, a probe of
//! persistent state that recovers lost terminal events, and a clean
//! close after `job_completed`/`job_failed`.

mod sse;
mod stream;

pub use sse::SseFrame;
pub use stream::{JobStream, StreamGateway};

use pf_core::JobId;
use pf_storage::StoreError;

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
