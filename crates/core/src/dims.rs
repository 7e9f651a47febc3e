// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poster dimensions and the named size table.

use serde::{Deserialize, Serialize};

/// Output bitmap dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Dimensions {
    /// The instagram-square default used when no size is specified.
    fn default() -> Self {
        Self::new(1080, 1080)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resolve a named poster size. Unknown names fall back to the
/// instagram-square default.
pub fn poster_size_dimensions(name: &str) -> Dimensions {
    match name {
        "instagram-square" => Dimensions::new(1080, 1080),
        "instagram-portrait" => Dimensions::new(1080, 1350),
        "instagram-story" => Dimensions::new(1080, 1920),
        "linkedin-post" => Dimensions::new(1200, 1200),
        "twitter-post" => Dimensions::new(1200, 675),
        "facebook-post" => Dimensions::new(1200, 630),
        "a4-portrait" => Dimensions::new(2480, 3508),
        _ => Dimensions::default(),
    }
}

#[cfg(test)]
#[path = "dims_tests.rs"]
mod tests;
