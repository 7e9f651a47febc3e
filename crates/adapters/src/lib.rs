// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pf-adapters: external capabilities behind small trait seams.
//!
//! The pipeline core only sees [`Rasterizer`], [`BlobStore`],
//! [`ProfileService`], and [`Sink`]; the process wires in the real
//! adapters here, and tests wire in the fakes exported behind the
//! `test-support` feature.

mod blob;
mod error;
mod fetch;
mod profile;
mod rasterizer;
mod sink;

#[cfg(any(test, feature = "test-support"))]
pub mod fakes;

pub use blob::{DataUrlBlobStore, S3BlobStore, StoredBlob};
pub use error::{BlobError, ImageFetchError, ProfileError, RasterizeError, SinkError};
pub use fetch::{bytes_to_data_url, data_url_to_bytes, fetch_image_bytes, is_data_url};
pub use profile::{HttpProfileService, Profile};
pub use rasterizer::ChromiumRasterizer;
pub use sink::{ArtifactPush, HttpSink};

use async_trait::async_trait;
use pf_core::Dimensions;
use std::time::Duration;

/// Turns HTML into a PNG of exactly `dims` at the given device scale.
///
/// Implementations must honor the deadline and surface its expiry as
/// [`RasterizeError::Timeout`].
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn render_png(
        &self,
        html: &str,
        dims: Dimensions,
        scale: f64,
        deadline: Duration,
    ) -> Result<Vec<u8>, RasterizeError>;
}

/// Stores PNG bytes at a key and returns the public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_png(&self, key: &str, bytes: &[u8]) -> Result<StoredBlob, BlobError>;
}

/// Resolves an identifier to a profile record.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch_by_username(&self, username: &str) -> Result<Profile, ProfileError>;
    async fn fetch_by_user_id(&self, user_id: i64) -> Result<Profile, ProfileError>;
}

/// Pushes one finished artifact to the downstream system of record.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn push(&self, push: &ArtifactPush) -> Result<(), SinkError>;
}
