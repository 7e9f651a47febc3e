// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay input fetching: data URLs and HTTP sources.

use crate::error::ImageFetchError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub fn is_data_url(source: &str) -> bool {
    source.starts_with("data:")
}

/// Decode a `data:image/...;base64,...` URL into raw bytes.
pub fn data_url_to_bytes(data_url: &str) -> Result<Vec<u8>, ImageFetchError> {
    let (_, encoded) = data_url.split_once(',').ok_or(ImageFetchError::BadDataUrl)?;
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Encode PNG bytes as a data URL.
pub fn bytes_to_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

/// Fetch image bytes from a data URL or an HTTP source.
pub async fn fetch_image_bytes(
    client: &reqwest::Client,
    source: &str,
) -> Result<Vec<u8>, ImageFetchError> {
    if is_data_url(source) {
        return data_url_to_bytes(source);
    }
    let response = client.get(source).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ImageFetchError::Status { status: status.as_u16() });
    }
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
