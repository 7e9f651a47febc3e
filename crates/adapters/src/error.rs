// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability error types.

/// Rasterizer failures.
#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    /// The render deadline expired.
    #[error("render deadline exceeded")]
    Timeout,

    #[error("html conversion failed: {0}")]
    Failed(String),
}

/// Blob store failures.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob store is not configured")]
    NotConfigured,

    #[error("upload failed: {0}")]
    Put(String),
}

/// Profile service failures.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile not found: {identifier}")]
    NotFound { identifier: String },

    #[error("profile service returned status {status}")]
    Status { status: u16 },

    #[error("profile service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// System-of-record push failures.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{stage} call failed with status {status}")]
    Webhook { stage: &'static str, status: u16 },

    #[error("sink unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// Failures fetching overlay input images.
#[derive(Debug, thiserror::Error)]
pub enum ImageFetchError {
    #[error("malformed data url")]
    BadDataUrl,

    #[error("decode failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("fetch returned status {status}")]
    Status { status: u16 },

    #[error("fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
}
