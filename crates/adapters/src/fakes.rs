// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake capability adapters for tests.
//!
//! `FakeRasterizer` emits real PNG bytes at the requested dimensions so
//! pipeline tests can assert on decoded pixel sizes; the other fakes
//! record calls and inject scripted failures.

use crate::error::{BlobError, ProfileError, RasterizeError, SinkError};
use crate::profile::Profile;
use crate::sink::ArtifactPush;
use crate::{BlobStore, ProfileService, Rasterizer, Sink, StoredBlob};
use async_trait::async_trait;
use parking_lot::Mutex;
use pf_core::Dimensions;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// HTML marker that makes [`FakeRasterizer`] report a deadline expiry.
pub const TIMEOUT_MARKER: &str = "FORCE_TIMEOUT";
/// HTML marker that makes [`FakeRasterizer`] report a conversion error.
pub const RENDER_ERROR_MARKER: &str = "FORCE_RENDER_ERROR";

/// Rasterizer that encodes a solid PNG of exactly the requested size.
#[derive(Default, Clone)]
pub struct FakeRasterizer;

impl FakeRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn render_png(
        &self,
        html: &str,
        dims: Dimensions,
        scale: f64,
        _deadline: Duration,
    ) -> Result<Vec<u8>, RasterizeError> {
        if html.contains(TIMEOUT_MARKER) {
            return Err(RasterizeError::Timeout);
        }
        if html.contains(RENDER_ERROR_MARKER) {
            return Err(RasterizeError::Failed("forced conversion error".to_string()));
        }

        let width = (dims.width as f64 * scale).round() as u32;
        let height = (dims.height as f64 * scale).round() as u32;
        let bitmap = image::RgbaImage::from_pixel(width, height, image::Rgba([240, 240, 240, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(bitmap)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .map_err(|e| RasterizeError::Failed(e.to_string()))?;
        Ok(bytes.into_inner())
    }
}

/// In-memory blob store; URLs use the `mem://` scheme.
#[derive(Default, Clone)]
pub struct FakeBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_puts: Arc<Mutex<bool>>,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        *self.fail_puts.lock() = fail;
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put_png(&self, key: &str, bytes: &[u8]) -> Result<StoredBlob, BlobError> {
        if *self.fail_puts.lock() {
            return Err(BlobError::Put("forced upload failure".to_string()));
        }
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
        Ok(StoredBlob { url: format!("mem://{key}"), key: key.to_string() })
    }
}

/// Profile service over a preloaded map; unknown identifiers are 404s.
#[derive(Default, Clone)]
pub struct FakeProfileService {
    by_username: Arc<Mutex<HashMap<String, Profile>>>,
    by_user_id: Arc<Mutex<HashMap<i64, Profile>>>,
}

impl FakeProfileService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        if let Some(user_id) = profile.user_id {
            self.by_user_id.lock().insert(user_id, profile.clone());
        }
        self.by_username.lock().insert(profile.username.clone(), profile);
    }
}

#[async_trait]
impl ProfileService for FakeProfileService {
    async fn fetch_by_username(&self, username: &str) -> Result<Profile, ProfileError> {
        self.by_username
            .lock()
            .get(username)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound { identifier: username.to_string() })
    }

    async fn fetch_by_user_id(&self, user_id: i64) -> Result<Profile, ProfileError> {
        self.by_user_id
            .lock()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound { identifier: user_id.to_string() })
    }
}

/// Sink that records pushes and fails for scripted user ids.
#[derive(Default, Clone)]
pub struct FakeSink {
    pushes: Arc<Mutex<Vec<ArtifactPush>>>,
    fail_for: Arc<Mutex<HashSet<i64>>>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, user_id: i64) {
        self.fail_for.lock().insert(user_id);
    }

    pub fn pushes(&self) -> Vec<ArtifactPush> {
        self.pushes.lock().clone()
    }
}

#[async_trait]
impl Sink for FakeSink {
    async fn push(&self, push: &ArtifactPush) -> Result<(), SinkError> {
        if self.fail_for.lock().contains(&push.user_id) {
            return Err(SinkError::Webhook { stage: "create_media", status: 502 });
        }
        self.pushes.lock().push(push.clone());
        Ok(())
    }
}
