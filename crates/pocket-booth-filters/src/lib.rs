#![warn(missing_docs)]
//! # pocket-booth-filters
//!
//! ## Purpose
//! Pure pixel transforms applied to captured photo-booth shots.
//!
//! ## Responsibilities
//! - Define the closed set of selectable filters ([`FilterKind`]).
//! - Transform RGBA buffers in place ([`apply_filter`]).
//! - Provide CSS-style descriptors for the live viewfinder
//!   ([`FilterKind::css_descriptor`]).
//!
//! ## Data flow
//! Capture session crops a frame -> [`apply_filter`] rewrites its RGB channels
//! -> the frame is encoded and appended to the strip.
//!
//! ## Ownership and lifetimes
//! Filters borrow the caller's buffer mutably and never allocate a second
//! frame-sized buffer.
//!
//! ## Error model
//! Buffers whose length is not a multiple of four are rejected with
//! [`FilterError::InvalidBufferLength`] before any pixel is touched.
//!
//! ## Example
//! ```rust
//! use pocket_booth_filters::{FilterKind, apply_filter};
//!
//! let mut pixel = vec![30, 60, 90, 200];
//! apply_filter(&mut pixel, FilterKind::BlackAndWhite).unwrap();
//! assert_eq!(pixel, vec![60, 60, 60, 200]);
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Luma weights used by the saturation stages.
const LUMA_R: f32 = 0.2989;
const LUMA_G: f32 = 0.5870;
const LUMA_B: f32 = 0.1140;

const TRIPPY_SATURATION: f32 = 2.0;
const TRIPPY_CONTRAST: f32 = 1.2;
const CONTRAST_MIDPOINT: f32 = 128.0;
const BLUE_TINT_SATURATION: f32 = 1.5;

/// Filters a user can pick before a capture session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Identity transform.
    #[default]
    Normal,
    /// Unweighted channel average.
    BlackAndWhite,
    /// Inverted, hue-rotated, oversaturated, high-contrast look.
    Trippy,
    /// Sepia base shifted toward blue.
    BlueTint,
}

impl FilterKind {
    /// Every selectable filter in display order.
    pub const ALL: [FilterKind; 4] = [
        FilterKind::Normal,
        FilterKind::BlackAndWhite,
        FilterKind::Trippy,
        FilterKind::BlueTint,
    ];

    /// Human-readable filter name.
    pub fn display_name(self) -> &'static str {
        match self {
            FilterKind::Normal => "Normal",
            FilterKind::BlackAndWhite => "Black & White",
            FilterKind::Trippy => "Trippy",
            FilterKind::BlueTint => "Blue Tint",
        }
    }

    /// CSS filter string approximating the still-image transform.
    ///
    /// Viewfinders use this for real-time preview without per-pixel work; it
    /// matches [`apply_filter`] visually but not bit-for-bit.
    pub fn css_descriptor(self) -> &'static str {
        match self {
            FilterKind::Normal => "none",
            FilterKind::BlackAndWhite => "grayscale(100%)",
            FilterKind::Trippy => "invert(100%) hue-rotate(180deg) saturate(200%) contrast(120%)",
            FilterKind::BlueTint => "sepia(50%) hue-rotate(180deg) saturate(150%)",
        }
    }

    /// Stable identifier used in settings and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Normal => "normal",
            FilterKind::BlackAndWhite => "blackAndWhite",
            FilterKind::Trippy => "trippy",
            FilterKind::BlueTint => "blueTint",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = FilterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "normal" | "none" => Ok(FilterKind::Normal),
            "blackandwhite" | "bw" | "grayscale" => Ok(FilterKind::BlackAndWhite),
            "trippy" => Ok(FilterKind::Trippy),
            "bluetint" | "blue" => Ok(FilterKind::BlueTint),
            _ => Err(FilterError::UnknownFilter(raw.to_string())),
        }
    }
}

/// Applies `filter` to an RGBA buffer in place.
///
/// Alpha bytes are never modified and the buffer length never changes.
///
/// # Errors
/// Returns [`FilterError::InvalidBufferLength`] when `rgba.len()` is not a
/// multiple of four.
pub fn apply_filter(rgba: &mut [u8], filter: FilterKind) -> Result<(), FilterError> {
    if rgba.len() % 4 != 0 {
        return Err(FilterError::InvalidBufferLength(rgba.len()));
    }

    let transform: fn([f32; 3]) -> [f32; 3] = match filter {
        FilterKind::Normal => return Ok(()),
        FilterKind::BlackAndWhite => black_and_white,
        FilterKind::Trippy => trippy,
        FilterKind::BlueTint => blue_tint,
    };

    for px in rgba.chunks_exact_mut(4) {
        let [r, g, b] = transform([f32::from(px[0]), f32::from(px[1]), f32::from(px[2])]);
        px[0] = clamp_channel(r);
        px[1] = clamp_channel(g);
        px[2] = clamp_channel(b);
    }

    Ok(())
}

/// Returns a filtered copy of `rgba`, leaving the input untouched.
///
/// # Errors
/// Same as [`apply_filter`].
pub fn filtered(rgba: &[u8], filter: FilterKind) -> Result<Vec<u8>, FilterError> {
    let mut out = rgba.to_vec();
    apply_filter(&mut out, filter)?;
    Ok(out)
}

fn black_and_white([r, g, b]: [f32; 3]) -> [f32; 3] {
    let avg = (r + g + b) / 3.0;
    [avg, avg, avg]
}

fn trippy([r, g, b]: [f32; 3]) -> [f32; 3] {
    let inverted = [255.0 - r, 255.0 - g, 255.0 - b];
    // 180 degree hue rotation approximated by swapping red and blue.
    let rotated = [inverted[2], inverted[1], inverted[0]];
    let saturated = saturate(rotated, TRIPPY_SATURATION);
    saturated.map(|c| (c - CONTRAST_MIDPOINT) * TRIPPY_CONTRAST + CONTRAST_MIDPOINT)
}

fn blue_tint([r, g, b]: [f32; 3]) -> [f32; 3] {
    let sepia_r = r * 0.393 + g * 0.769 + b * 0.189;
    let sepia_g = r * 0.349 + g * 0.686 + b * 0.168;
    let sepia_b = r * 0.272 + g * 0.534 + b * 0.131;

    let shifted = [sepia_b * 0.5, sepia_g * 0.8, sepia_r * 1.2];
    saturate(shifted, BLUE_TINT_SATURATION)
}

fn saturate(rgb: [f32; 3], factor: f32) -> [f32; 3] {
    let gray = luma(rgb);
    rgb.map(|c| gray + (c - gray) * factor)
}

fn luma([r, g, b]: [f32; 3]) -> f32 {
    LUMA_R * r + LUMA_G * g + LUMA_B * b
}

fn clamp_channel(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0).round() as u8
}

/// Filter engine errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    /// RGBA buffers must contain whole pixels.
    #[error("invalid rgba buffer length {0}; expected a multiple of 4")]
    InvalidBufferLength(usize),
    /// Filter name does not match any known filter.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
}
