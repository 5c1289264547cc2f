// SPDX-License-Identifier: MPL-2.0
//! Core media types for the domain layer.
//!
//! These types represent pure data: stream descriptions read from a container
//! and presentation-ready frames handed to the render layer. Nothing here
//! holds native memory.

use super::time::{FrameRate, TimeBase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Kind of elementary stream inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count, used to rank video streams.
    #[must_use]
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Immutable description of one stream, captured when the container is opened.
///
/// All tick conversions for the stream go through [`StreamInfo::time_base`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Index of the stream inside its container.
    pub index: usize,
    pub media_type: MediaType,
    pub time_base: TimeBase,
    pub avg_frame_rate: FrameRate,
    /// Stream duration in its own ticks, if the container reports one.
    pub duration_ticks: Option<i64>,
    /// Pixel dimensions for video streams.
    pub resolution: Option<Resolution>,
    /// Nominal bit rate in bits per second (0 when unknown).
    pub bit_rate: u64,
    pub codec_name: String,
    /// True for cover art and other still images stored as a video stream.
    pub attached_picture: bool,
}

impl StreamInfo {
    /// Stream duration in seconds, converted with the stream's own time base.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_ticks
            .filter(|ticks| *ticks > 0)
            .map(|ticks| self.time_base.ticks_to_secs(ticks))
    }

    /// Average frame rate, or `fallback` when the stream reports none.
    #[must_use]
    pub fn fps_or(&self, fallback: f64) -> f64 {
        self.avg_frame_rate.fps().unwrap_or(fallback)
    }

    /// Converts a timestamp in this stream's ticks to seconds.
    #[must_use]
    pub fn ticks_to_secs(&self, ticks: i64) -> f64 {
        self.time_base.ticks_to_secs(ticks)
    }

    #[must_use]
    pub fn secs_to_ticks(&self, secs: f64) -> i64 {
        self.time_base.secs_to_ticks(secs)
    }
}

/// Picks the stream most likely intended for playback.
///
/// Video streams rank attached pictures (cover art) last, then prefer the
/// larger pixel area, then the higher bit rate, then the lower index. For
/// every other media type the first stream of that type wins. The result is
/// deterministic for identical input.
#[must_use]
pub fn select_best_stream(streams: &[StreamInfo], media_type: MediaType) -> Option<&StreamInfo> {
    let mut candidates = streams.iter().filter(|s| s.media_type == media_type);

    if media_type != MediaType::Video {
        return candidates.next();
    }

    candidates.max_by(|a, b| {
        let rank = |s: &StreamInfo| {
            (
                !s.attached_picture,
                s.resolution.map_or(0, Resolution::area),
                s.bit_rate,
            )
        };
        // Reverse index order so that ties resolve to the earlier stream.
        rank(a).cmp(&rank(b)).then_with(|| b.index.cmp(&a.index))
    })
}

/// Pixel layout of a [`PresentableFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPixelFormat {
    #[default]
    Rgba,
    Bgra,
}

impl OutputPixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// Resampling filter used when converting frames for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingQuality {
    FastBilinear,
    Bilinear,
    #[default]
    Bicubic,
}

/// A decoded frame converted to a packed software pixel format.
///
/// Pixel data is shared behind an `Arc`, so clones are cheap and returning the
/// same frame twice does not copy pixels.
///
/// # Example
///
/// ```
/// use seekframe::domain::media::{OutputPixelFormat, PresentableFrame};
/// use std::sync::Arc;
///
/// let pixels = vec![0u8; 4 * 2 * 4];
/// let frame = PresentableFrame::new(4, 2, OutputPixelFormat::Rgba, Arc::new(pixels), 1.5);
///
/// assert_eq!(frame.width(), 4);
/// assert_eq!(frame.pts_secs(), 1.5);
/// ```
#[derive(Debug, Clone)]
pub struct PresentableFrame {
    width: u32,
    height: u32,
    format: OutputPixelFormat,
    data: Arc<Vec<u8>>,
    pts_secs: f64,
}

impl PresentableFrame {
    /// Creates a frame from tightly packed pixel rows.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match `width * height * bytes_per_pixel`.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        format: OutputPixelFormat,
        data: Arc<Vec<u8>>,
        pts_secs: f64,
    ) -> Self {
        let expected_len = (width as usize) * (height as usize) * format.bytes_per_pixel();
        assert_eq!(
            data.len(),
            expected_len,
            "pixel data length mismatch: expected {expected_len}, got {}",
            data.len()
        );

        Self {
            width,
            height,
            format,
            data,
            pts_secs,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    #[must_use]
    pub fn format(&self) -> OutputPixelFormat {
        self.format
    }

    /// Packed pixel rows, without padding.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the pixel data.
    #[must_use]
    pub fn data_arc(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }

    /// Presentation timestamp of the source frame, in seconds.
    #[must_use]
    pub fn pts_secs(&self) -> f64 {
        self.pts_secs
    }

    /// Presentation timestamp as a `Duration` (negative timestamps clamp to zero).
    #[must_use]
    pub fn position(&self) -> Duration {
        super::time::secs_to_duration(self.pts_secs)
    }

    /// True when both frames share the same pixel buffer.
    #[must_use]
    pub fn shares_pixels_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl PartialEq for PresentableFrame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self.data == other.data
    }
}
