#![warn(missing_docs)]
//! # pocket-booth-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `pocket-booth` workspace.
//!
//! ## Responsibilities
//! - Represent square capture frames and their JPEG-encoded strip photos.
//! - Validate strip lengths and assemble immutable [`PhotoStrip`] records.
//! - Hold the insertion-ordered [`Gallery`] of finished strips.
//!
//! ## Data flow
//! Capture code emits [`CaptureFrame`] values, encodes them into
//! [`StripPhoto`]s, and once a sequence completes builds a [`PhotoStrip`]
//! that is appended to the [`Gallery`].
//!
//! ## Ownership and lifetimes
//! Frames, photos and strips own their buffers (`Vec<u8>`) so strips can
//! outlive the capture session that produced them.
//!
//! ## Error model
//! Shape mismatches, out-of-range strip lengths and codec failures return
//! [`CoreError`] variants.
//!
//! ## Example
//! ```rust
//! use pocket_booth_core::{CaptureFrame, Gallery, PhotoStrip, StripLength};
//!
//! let length = StripLength::new(2).unwrap();
//! let mut photos = Vec::new();
//! for index in 0..length.get() {
//!     let frame = CaptureFrame::new(2, 2, index as u64, vec![128; 16]).unwrap();
//!     photos.push(frame.to_jpeg(90).unwrap());
//! }
//!
//! let mut gallery = Gallery::new();
//! let id = gallery.push(PhotoStrip::new(photos, 1_700_000_000_000).unwrap());
//! assert_eq!(gallery.len(), 1);
//! assert!(gallery.delete(id).is_some());
//! assert!(gallery.is_empty());
//! ```

use std::fmt;

use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use time::OffsetDateTime;

/// JPEG quality used for individual shots.
pub const SHOT_JPEG_QUALITY: u8 = 90;

/// Number of shots in one strip, always within `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StripLength(usize);

impl StripLength {
    /// Smallest allowed strip.
    pub const MIN: usize = 1;
    /// Largest allowed strip.
    pub const MAX: usize = 4;

    /// Creates a validated strip length.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidStripLength`] outside `1..=4`.
    pub fn new(shots: usize) -> Result<Self, CoreError> {
        if !(Self::MIN..=Self::MAX).contains(&shots) {
            return Err(CoreError::InvalidStripLength(shots));
        }
        Ok(Self(shots))
    }

    /// Returns the shot count.
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for StripLength {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

/// One square still image cropped from the live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFrame {
    width: u32,
    height: u32,
    captured_at_ms: u64,
    rgba: Vec<u8>,
}

impl CaptureFrame {
    /// Constructs a validated frame.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidFrameShape`] when the pixel buffer length is
    /// not exactly `width * height * 4`, and [`CoreError::EmptyFrame`] for a
    /// zero-sized geometry.
    pub fn new(
        width: u32,
        height: u32,
        captured_at_ms: u64,
        rgba: Vec<u8>,
    ) -> Result<Self, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::EmptyFrame);
        }

        let expected_len = required_rgba_len(width, height)?;
        if rgba.len() != expected_len {
            return Err(CoreError::InvalidFrameShape {
                expected: expected_len,
                actual: rgba.len(),
            });
        }

        Ok(Self {
            width,
            height,
            captured_at_ms,
            rgba,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Capture time in Unix epoch milliseconds.
    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    /// Raw RGBA pixels in row-major order.
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Returns `true` when width equals height.
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Encodes the frame as a JPEG strip photo.
    ///
    /// Alpha is dropped; JPEG carries RGB only.
    ///
    /// # Errors
    /// Returns [`CoreError::Encode`] when the JPEG encoder fails.
    pub fn to_jpeg(&self, quality: u8) -> Result<StripPhoto, CoreError> {
        let jpeg = encode_rgba_jpeg(&self.rgba, self.width, self.height, quality)?;
        Ok(StripPhoto {
            width: self.width,
            height: self.height,
            captured_at_ms: self.captured_at_ms,
            jpeg,
        })
    }
}

/// One JPEG-encoded shot stored inside a strip.
#[derive(Clone, PartialEq, Eq)]
pub struct StripPhoto {
    /// Encoded width in pixels.
    pub width: u32,
    /// Encoded height in pixels.
    pub height: u32,
    /// Capture time of the source frame.
    pub captured_at_ms: u64,
    /// JPEG bytes.
    pub jpeg: Vec<u8>,
}

impl fmt::Debug for StripPhoto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripPhoto")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("captured_at_ms", &self.captured_at_ms)
            .field("jpeg_len", &self.jpeg.len())
            .finish()
    }
}

/// Unique strip identifier derived from the creation time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StripId(pub u64);

impl fmt::Display for StripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Photos from one completed capture sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoStrip {
    id: StripId,
    photos: Vec<StripPhoto>,
    timestamp: String,
    date: String,
}

impl PhotoStrip {
    /// Builds a strip from capture-ordered photos.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidStripLength`] unless `1..=4` photos are
    /// given, and [`CoreError::StripInvariantViolation`] when photos are not
    /// square or do not share one size.
    pub fn new(photos: Vec<StripPhoto>, created_at_ms: u64) -> Result<Self, CoreError> {
        StripLength::new(photos.len())?;

        let first = &photos[0];
        for photo in &photos {
            if photo.width != photo.height {
                return Err(CoreError::StripInvariantViolation(
                    "strip photos must be square".to_string(),
                ));
            }
            if photo.width != first.width {
                return Err(CoreError::StripInvariantViolation(
                    "strip photos must share one size".to_string(),
                ));
            }
        }

        let (timestamp, date) = display_time(created_at_ms);
        Ok(Self {
            id: StripId(created_at_ms),
            photos,
            timestamp,
            date,
        })
    }

    /// Strip identifier.
    pub fn id(&self) -> StripId {
        self.id
    }

    /// Photos in capture order.
    pub fn photos(&self) -> &[StripPhoto] {
        &self.photos
    }

    /// Creation time of day (`HH:MM:SS`, UTC).
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Creation date (`YYYY-MM-DD`, UTC).
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Default download name, `photo-strip-<id>.jpg`.
    pub fn file_name(&self) -> String {
        format!("photo-strip-{}.jpg", self.id)
    }
}

/// Insertion-ordered collection of finished strips.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    strips: Vec<PhotoStrip>,
}

impl Gallery {
    /// Creates an empty gallery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strip and returns its id.
    ///
    /// Ids are creation timestamps, so two strips created within the same
    /// millisecond would collide; the later one is bumped forward until its
    /// id is unique.
    pub fn push(&mut self, mut strip: PhotoStrip) -> StripId {
        while self.get(strip.id).is_some() {
            strip.id = StripId(strip.id.0.saturating_add(1));
        }
        let id = strip.id;
        self.strips.push(strip);
        id
    }

    /// Removes a strip by id, returning it when present.
    pub fn delete(&mut self, id: StripId) -> Option<PhotoStrip> {
        let position = self.strips.iter().position(|strip| strip.id == id)?;
        Some(self.strips.remove(position))
    }

    /// Looks up a strip by id.
    pub fn get(&self, id: StripId) -> Option<&PhotoStrip> {
        self.strips.iter().find(|strip| strip.id == id)
    }

    /// Most recently appended strip.
    pub fn latest(&self) -> Option<&PhotoStrip> {
        self.strips.last()
    }

    /// Strips in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PhotoStrip> {
        self.strips.iter()
    }

    /// Number of strips.
    pub fn len(&self) -> usize {
        self.strips.len()
    }

    /// Returns `true` when no strips are stored.
    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}

/// Encodes an RGBA buffer as JPEG, dropping alpha.
///
/// # Errors
/// Returns [`CoreError::InvalidFrameShape`] on a length mismatch and
/// [`CoreError::Encode`] when the encoder fails.
pub fn encode_rgba_jpeg(
    rgba: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, CoreError> {
    let expected_len = required_rgba_len(width, height)?;
    if rgba.len() != expected_len {
        return Err(CoreError::InvalidFrameShape {
            expected: expected_len,
            actual: rgba.len(),
        });
    }

    let mut rgb = Vec::with_capacity((rgba.len() / 4) * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(&rgb, width, height, image::ColorType::Rgb8.into())
        .map_err(|error| CoreError::Encode(error.to_string()))?;
    Ok(jpeg)
}

/// Returns `(HH:MM:SS, YYYY-MM-DD)` in UTC for an epoch-millisecond instant.
pub fn display_time(epoch_ms: u64) -> (String, String) {
    let nanos = i128::from(epoch_ms) * 1_000_000;
    let at = OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH);

    (
        format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second()),
        format!("{:04}-{:02}-{:02}", at.year(), at.month() as u8, at.day()),
    )
}

/// Error type for core domain validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Frame buffer shape does not match declared geometry.
    #[error("invalid frame shape: expected {expected} bytes, got {actual}")]
    InvalidFrameShape {
        /// Expected RGBA byte count.
        expected: usize,
        /// Actual RGBA byte count.
        actual: usize,
    },
    /// Frames need a non-zero geometry.
    #[error("frame has zero width or height")]
    EmptyFrame,
    /// Strips hold between one and four photos.
    #[error("invalid strip length {0}; expected 1..=4")]
    InvalidStripLength(usize),
    /// Strip photo invariants were violated.
    #[error("strip invariant violation: {0}")]
    StripInvariantViolation(String),
    /// Frame dimensions overflow the addressable buffer size.
    #[error("frame dimensions overflow")]
    Overflow,
    /// JPEG encoding failed.
    #[error("jpeg encoding failed: {0}")]
    Encode(String),
}

fn required_rgba_len(width: u32, height: u32) -> Result<usize, CoreError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(CoreError::Overflow)
}
