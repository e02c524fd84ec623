#![warn(missing_docs)]
//! # pocket-booth-strip
//!
//! ## Purpose
//! Composes the vertical photo strip from the JPEG shots of one session.
//!
//! ## Responsibilities
//! - Compute strip geometry ([`StripLayout`]).
//! - Decode every shot concurrently and join before drawing.
//! - Draw shots top-to-bottom in capture order and return JPEG bytes.
//!
//! ## Data flow
//! [`pocket_booth_core::PhotoStrip`] photos -> [`compose_strip`] ->
//! [`ComposedStrip`] consumed by download/export and the upload client.
//!
//! ## Ownership and lifetimes
//! Decoded images live only inside one [`compose_strip`] call; the output
//! owns its JPEG buffer so uploads can run after the strip is dropped.
//!
//! ## Error model
//! An empty or oversized photo list fails with [`StripError::InvalidPhotoCount`];
//! a shot that fails to decode fails the whole composition with
//! [`StripError::Decode`]. Photos are never silently omitted.

use std::thread;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use pocket_booth_core::{StripLength, StripPhoto, encode_rgba_jpeg};
use thiserror::Error;
use tracing::debug;

/// JPEG quality of the composited strip.
pub const STRIP_JPEG_QUALITY: u8 = 95;

/// Geometry and background of a composited strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    /// Side of each square photo on the strip.
    pub photo_size: u32,
    /// Border around the whole strip.
    pub outer_margin: u32,
    /// Spacing between consecutive photos.
    pub gap: u32,
    /// Opaque RGBA fill drawn before the photos.
    pub background: [u8; 4],
}

impl Default for StripLayout {
    fn default() -> Self {
        Self {
            photo_size: 400,
            outer_margin: 40,
            gap: 15,
            background: [0, 0, 0, 255],
        }
    }
}

impl StripLayout {
    /// Canvas width: `photo_size + 2 * outer_margin`.
    pub fn canvas_width(&self) -> u32 {
        self.photo_size + 2 * self.outer_margin
    }

    /// Canvas height for `photo_count` photos:
    /// `n * photo_size + (n - 1) * gap + 2 * outer_margin`.
    pub fn canvas_height(&self, photo_count: usize) -> u32 {
        let n = photo_count as u32;
        n * self.photo_size + n.saturating_sub(1) * self.gap + 2 * self.outer_margin
    }

    /// Top-left corner of the photo at `index`.
    pub fn slot_origin(&self, index: usize) -> (u32, u32) {
        let y = self.outer_margin + index as u32 * (self.photo_size + self.gap);
        (self.outer_margin, y)
    }
}

/// Encoded strip image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedStrip {
    /// Strip width in pixels.
    pub width: u32,
    /// Strip height in pixels.
    pub height: u32,
    /// JPEG bytes.
    pub jpeg: Vec<u8>,
}

/// Composes a vertical strip from capture-ordered photos.
///
/// All photos are decoded on scoped threads that are joined before any
/// drawing happens, so output is deterministic regardless of decode
/// completion order.
///
/// # Errors
/// Returns [`StripError::InvalidPhotoCount`] unless `1..=4` photos are given,
/// [`StripError::Decode`] when any photo fails to decode, and
/// [`StripError::Encode`] when the final JPEG cannot be produced.
pub fn compose_strip(
    photos: &[StripPhoto],
    layout: &StripLayout,
) -> Result<ComposedStrip, StripError> {
    let canvas = render_strip(photos, layout)?;
    let (width, height) = canvas.dimensions();
    let jpeg = encode_rgba_jpeg(canvas.as_raw(), width, height, STRIP_JPEG_QUALITY)
        .map_err(|error| StripError::Encode(error.to_string()))?;

    debug!(width, height, photos = photos.len(), bytes = jpeg.len(), "strip composed");
    Ok(ComposedStrip { width, height, jpeg })
}

/// Renders the strip into an RGBA canvas without encoding it.
///
/// # Errors
/// Same as [`compose_strip`] minus encoding failures.
pub fn render_strip(photos: &[StripPhoto], layout: &StripLayout) -> Result<RgbaImage, StripError> {
    if StripLength::new(photos.len()).is_err() {
        return Err(StripError::InvalidPhotoCount(photos.len()));
    }

    let decoded = decode_all(photos)?;

    let mut canvas = RgbaImage::from_pixel(
        layout.canvas_width(),
        layout.canvas_height(photos.len()),
        Rgba(layout.background),
    );

    for (index, image) in decoded.iter().enumerate() {
        let (x, y) = layout.slot_origin(index);
        let scaled;
        let tile = if image.dimensions() == (layout.photo_size, layout.photo_size) {
            image
        } else {
            scaled = imageops::resize(
                image,
                layout.photo_size,
                layout.photo_size,
                FilterType::Triangle,
            );
            &scaled
        };
        imageops::replace(&mut canvas, tile, i64::from(x), i64::from(y));
    }

    Ok(canvas)
}

fn decode_all(photos: &[StripPhoto]) -> Result<Vec<RgbaImage>, StripError> {
    thread::scope(|scope| {
        let handles: Vec<_> = photos
            .iter()
            .map(|photo| scope.spawn(move || decode_photo(photo)))
            .collect();

        // Joined in spawn order, which is capture order.
        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| match handle.join() {
                Ok(Ok(image)) => Ok(image),
                Ok(Err(reason)) => Err(StripError::Decode { index, reason }),
                Err(_) => Err(StripError::Decode {
                    index,
                    reason: "decoder thread panicked".to_string(),
                }),
            })
            .collect()
    })
}

fn decode_photo(photo: &StripPhoto) -> Result<RgbaImage, String> {
    image::load_from_memory_with_format(&photo.jpeg, ImageFormat::Jpeg)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|error| error.to_string())
}

/// Error type for strip composition.
#[derive(Debug, Error)]
pub enum StripError {
    /// Strips hold one to four photos.
    #[error("invalid photo count {0}; expected 1..=4")]
    InvalidPhotoCount(usize),
    /// A source photo could not be decoded.
    #[error("failed to decode photo {index}: {reason}")]
    Decode {
        /// Capture index of the failing photo.
        index: usize,
        /// Decoder message.
        reason: String,
    },
    /// The composited canvas could not be encoded.
    #[error("strip encoding failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for strip layout and ordering.

    use pocket_booth_core::CaptureFrame;

    use super::*;

    fn solid_photo(value: u8) -> StripPhoto {
        CaptureFrame::new(8, 8, 0, [value, value, value, 255].repeat(64))
            .expect("frame should be valid")
            .to_jpeg(100)
            .expect("jpeg should encode")
    }

    #[test]
    fn layout_matches_margin_and_gap_formula() {
        let layout = StripLayout::default();
        assert_eq!(layout.canvas_width(), 480);
        assert_eq!(layout.canvas_height(4), 4 * 400 + 3 * 15 + 80);
        assert_eq!(layout.canvas_height(1), 480);
        assert_eq!(layout.slot_origin(2), (40, 40 + 2 * 415));
    }

    #[test]
    fn photos_are_drawn_in_capture_order() {
        let layout = StripLayout {
            photo_size: 8,
            outer_margin: 2,
            gap: 1,
            background: [0, 0, 0, 255],
        };
        let photos = vec![solid_photo(20), solid_photo(240)];

        let canvas = render_strip(&photos, &layout).expect("strip should render");
        assert_eq!(canvas.dimensions(), (12, 2 * 8 + 1 + 4));

        let top = canvas.get_pixel(6, 6).0[0];
        let (_, second_y) = layout.slot_origin(1);
        let bottom = canvas.get_pixel(6, second_y + 4).0[0];
        assert!(top < 60, "first photo is dark, got {top}");
        assert!(bottom > 200, "second photo is bright, got {bottom}");

        // Margins keep the background.
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn rejects_empty_photo_list() {
        let error = compose_strip(&[], &StripLayout::default()).unwrap_err();
        assert!(matches!(error, StripError::InvalidPhotoCount(0)));
    }
}
