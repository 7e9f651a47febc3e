// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless-Chromium rasterizer.
//!
//! One short-lived browser invocation per item: the HTML is staged in a
//! temp directory, rendered with `--headless --screenshot`, and the
//! directory is dropped on every exit path. The deadline covers the
//! whole invocation; expiry kills the process.

use crate::error::RasterizeError;
use crate::Rasterizer;
use async_trait::async_trait;
use pf_core::template::is_complete_document;
use pf_core::Dimensions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Rasterizer driving a headless Chromium binary.
pub struct ChromiumRasterizer {
    binary: PathBuf,
}

impl ChromiumRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// `PF_CHROMIUM_BIN` or the `chromium` on PATH.
    pub fn from_env() -> Self {
        let binary = std::env::var("PF_CHROMIUM_BIN").unwrap_or_else(|_| "chromium".to_string());
        Self::new(binary)
    }
}

/// Wrap a bare fragment in a host document whose content box matches the
/// requested dimensions. Complete documents pass through untouched.
fn host_document(html: &str, dims: Dimensions) -> String {
    if is_complete_document(html) {
        return html.to_string();
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>\n\
         * {{ margin: 0; padding: 0; box-sizing: border-box; }}\n\
         html, body {{ width: {w}px; height: {h}px; overflow: hidden; }}\n\
         </style>\n</head>\n<body>\n{html}\n</body>\n</html>",
        w = dims.width,
        h = dims.height,
    )
}

#[async_trait]
impl Rasterizer for ChromiumRasterizer {
    async fn render_png(
        &self,
        html: &str,
        dims: Dimensions,
        scale: f64,
        deadline: Duration,
    ) -> Result<Vec<u8>, RasterizeError> {
        let staging = tempfile::tempdir().map_err(|e| RasterizeError::Failed(e.to_string()))?;
        let page_path = staging.path().join("page.html");
        let shot_path = staging.path().join("shot.png");

        tokio::fs::write(&page_path, host_document(html, dims))
            .await
            .map_err(|e| RasterizeError::Failed(e.to_string()))?;

        let mut command = Command::new(&self.binary);
        command
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .arg(format!("--force-device-scale-factor={scale}"))
            .arg(format!("--window-size={},{}", dims.width, dims.height))
            .arg(format!("--screenshot={}", shot_path.display()))
            .arg(format!("file://{}", page_path.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| RasterizeError::Failed(e.to_string()))?;
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RasterizeError::Failed(e.to_string()))?,
            // kill_on_drop reaps the browser when the future is dropped
            Err(_) => return Err(RasterizeError::Timeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RasterizeError::Failed(format!(
                "chromium exited with {}: {}",
                output.status,
                pf_core::short(stderr.trim(), 400),
            )));
        }

        let bytes = tokio::fs::read(&shot_path)
            .await
            .map_err(|e| RasterizeError::Failed(format!("no screenshot produced: {e}")))?;
        debug!(bytes = bytes.len(), %dims, "screenshot captured");
        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "rasterizer_tests.rs"]
mod tests;
