// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay composition on raw pixel buffers.
//!
//! The campaign logo lands top-right, the profile photo bottom-left as a
//! white-ringed circle. Never re-invokes the rasterizer.

use image::imageops::FilterType;
use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Logo width in pixels; height follows the aspect ratio.
const LOGO_WIDTH: u32 = 70;
/// Profile photo diameter in pixels.
const PROFILE_DIAMETER: u32 = 100;
/// White ring around the profile photo.
const PROFILE_BORDER: u32 = 3;
/// Distance from the poster edges.
const PADDING: u32 = 20;

/// Composite the optional logo and profile photo onto the base PNG.
pub(crate) fn compose(
    base_png: &[u8],
    logo_png: Option<&[u8]>,
    profile_png: Option<&[u8]>,
) -> Result<Vec<u8>, image::ImageError> {
    let mut base = image::load_from_memory(base_png)?.to_rgba8();

    if let Some(logo_png) = logo_png {
        let logo = image::load_from_memory(logo_png)?;
        let aspect = logo.height() as f64 / logo.width().max(1) as f64;
        let height = ((LOGO_WIDTH as f64 * aspect).round() as u32).max(1);
        let logo = logo.resize_exact(LOGO_WIDTH, height, FilterType::Lanczos3).to_rgba8();
        let x = base.width().saturating_sub(LOGO_WIDTH + PADDING);
        imageops::overlay(&mut base, &logo, x as i64, PADDING as i64);
    }

    if let Some(profile_png) = profile_png {
        let badge = circular_badge(profile_png)?;
        let y = base.height().saturating_sub(badge.height() + PADDING);
        imageops::overlay(&mut base, &badge, PADDING as i64, y as i64);
    }

    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(base).write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Crop the photo to a circle and ring it in white.
fn circular_badge(profile_png: &[u8]) -> Result<RgbaImage, image::ImageError> {
    let photo = image::load_from_memory(profile_png)?
        .resize_exact(PROFILE_DIAMETER, PROFILE_DIAMETER, FilterType::Lanczos3)
        .to_rgba8();

    let size = PROFILE_DIAMETER + PROFILE_BORDER * 2;
    let center = size as f64 / 2.0;
    let outer_radius = size as f64 / 2.0;
    let inner_radius = PROFILE_DIAMETER as f64 / 2.0;

    let badge = RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f64 + 0.5 - center;
        let dy = y as f64 + 0.5 - center;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance <= inner_radius {
            let px = x.saturating_sub(PROFILE_BORDER).min(PROFILE_DIAMETER - 1);
            let py = y.saturating_sub(PROFILE_BORDER).min(PROFILE_DIAMETER - 1);
            *photo.get_pixel(px, py)
        } else if distance <= outer_radius {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    Ok(badge)
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
