// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blob store adapters: S3 and the local data-URL fallback.

use crate::error::BlobError;
use crate::fetch::bytes_to_data_url;
use crate::BlobStore;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use pf_core::BlobSettings;
use tracing::{debug, info};

/// A stored artifact: its public URL and the key it lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    pub key: String,
}

/// S3-backed blob store. URLs are derived from the configured CDN base.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    base_url: String,
}

impl S3BlobStore {
    /// Build a client from settings; errors when any required field is
    /// missing.
    pub async fn connect(settings: &BlobSettings) -> Result<Self, BlobError> {
        let (Some(bucket), Some(access_key), Some(secret_key), Some(base_url)) = (
            settings.bucket.clone(),
            settings.access_key.clone(),
            settings.secret_key.clone(),
            settings.base_url.clone(),
        ) else {
            return Err(BlobError::NotConfigured);
        };

        let credentials = Credentials::new(access_key, secret_key, None, None, "pf-env");
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        info!(bucket, "blob store connected");

        Ok(Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_png(&self, key: &str, bytes: &[u8]) -> Result<StoredBlob, BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type("image/png")
            .send()
            .await
            .map_err(|e| BlobError::Put(e.to_string()))?;
        debug!(key, bytes = bytes.len(), "blob stored");

        Ok(StoredBlob { url: format!("{}/{}", self.base_url, key), key: key.to_string() })
    }
}

/// Development fallback used when S3 is not configured: the "URL" is the
/// PNG itself as a data URL, so downstream consumers still resolve it.
#[derive(Default)]
pub struct DataUrlBlobStore;

impl DataUrlBlobStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlobStore for DataUrlBlobStore {
    async fn put_png(&self, key: &str, bytes: &[u8]) -> Result<StoredBlob, BlobError> {
        Ok(StoredBlob { url: bytes_to_data_url(bytes), key: key.to_string() })
    }
}
