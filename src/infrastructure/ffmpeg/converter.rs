// SPDX-License-Identifier: MPL-2.0
//! Presentation conversion over `swscale`.

use std::sync::Arc;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{self, Flags};

use super::frame::VideoFrame;
use crate::application::port::{FormatConverter, MediaFrame};
use crate::config::OutputSettings;
use crate::domain::media::{OutputPixelFormat, PresentableFrame, ScalingQuality};
use crate::error::{DecodeError, Result};

/// Converts decoded frames into packed RGBA/BGRA at their native size.
///
/// Hardware frames are downloaded into a reused staging frame first. The
/// scaler is rebuilt whenever the input format or dimensions change.
pub struct FfmpegConverter {
    output: OutputSettings,
    scaler: Option<scaling::Context>,
    staging: VideoFrame,
    converted: ffmpeg_next::frame::Video,
    rebuilds: u64,
}

// SAFETY: The scaler and frames are exclusively owned and only used through
// `&mut self`.
unsafe impl Send for FfmpegConverter {}

impl FfmpegConverter {
    #[must_use]
    pub fn new(output: OutputSettings) -> Self {
        Self {
            output,
            scaler: None,
            staging: VideoFrame::empty(),
            converted: ffmpeg_next::frame::Video::empty(),
            rebuilds: 0,
        }
    }

    /// How many times the scaler has been (re)created.
    #[must_use]
    pub fn scaler_rebuilds(&self) -> u64 {
        self.rebuilds
    }

    fn ensure_scaler(
        scaler: &mut Option<scaling::Context>,
        rebuilds: &mut u64,
        output: OutputSettings,
        format: Pixel,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let stale = scaler.as_ref().is_none_or(|s| {
            let input = s.input();
            input.format != format || input.width != width || input.height != height
        });
        if !stale {
            return Ok(());
        }

        let context = scaling::Context::get(
            format,
            width,
            height,
            target_pixel(output.pixel_format),
            width,
            height,
            scaling_flags(output.scaling),
        )
        .map_err(|e| DecodeError::ConversionFailed(format!("scaler for {format:?} {width}x{height}: {e}")))?;

        tracing::debug!(?format, width, height, "scaler rebuilt");
        *scaler = Some(context);
        *rebuilds += 1;
        Ok(())
    }
}

impl FormatConverter for FfmpegConverter {
    type Frame = VideoFrame;

    fn convert(&mut self, frame: &VideoFrame, pts_secs: f64) -> Result<PresentableFrame> {
        let source = if frame.is_hardware() {
            frame.download_into(&mut self.staging)?;
            self.staging.as_inner()
        } else {
            frame.as_inner()
        };

        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 || source.format() == Pixel::None {
            return Err(DecodeError::ConversionFailed("frame has no pixels".into()).into());
        }

        Self::ensure_scaler(
            &mut self.scaler,
            &mut self.rebuilds,
            self.output,
            source.format(),
            width,
            height,
        )?;
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(DecodeError::ConversionFailed("scaler not initialized".into()).into());
        };

        scaler
            .run(source, &mut self.converted)
            .map_err(|e| DecodeError::ConversionFailed(format!("scaling failed: {e}")))?;

        let pixels = packed_rows(&self.converted, self.output.pixel_format.bytes_per_pixel());
        Ok(PresentableFrame::new(
            width,
            height,
            self.output.pixel_format,
            Arc::new(pixels),
            pts_secs,
        ))
    }
}

/// Copies plane 0 row by row, dropping the stride padding.
fn packed_rows(frame: &ffmpeg_next::frame::Video, bytes_per_pixel: usize) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width * bytes_per_pixel;

    let mut pixels = Vec::with_capacity(row_len * height);
    for y in 0..height {
        let row_start = y * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_len]);
    }
    pixels
}

fn target_pixel(format: OutputPixelFormat) -> Pixel {
    match format {
        OutputPixelFormat::Rgba => Pixel::RGBA,
        OutputPixelFormat::Bgra => Pixel::BGRA,
    }
}

fn scaling_flags(quality: ScalingQuality) -> Flags {
    match quality {
        ScalingQuality::FastBilinear => Flags::FAST_BILINEAR,
        ScalingQuality::Bilinear => Flags::BILINEAR,
        ScalingQuality::Bicubic => Flags::BICUBIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_abs_diff_eq, F64_EPSILON};

    fn gray_frame(width: u32, height: u32, luma: u8) -> VideoFrame {
        let mut frame = VideoFrame::yuv420p(width, height);
        frame.data_mut(0).fill(luma);
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        frame
    }

    #[test]
    fn converts_gray_yuv_to_rgba() {
        let mut converter = FfmpegConverter::new(OutputSettings::default());
        let frame = converter.convert(&gray_frame(32, 16, 235), 1.25).expect("convert");

        assert_eq!(frame.width(), 32);
        assert_eq!(frame.height(), 16);
        assert_eq!(frame.data().len(), 32 * 16 * 4);
        assert_abs_diff_eq!(frame.pts_secs(), 1.25, epsilon = F64_EPSILON);
        // Limited-range white maps to (near) full white, alpha opaque.
        let pixel = &frame.data()[..4];
        assert!(pixel[0] > 240 && pixel[1] > 240 && pixel[2] > 240);
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn scaler_rebuilds_only_on_change() {
        let mut converter = FfmpegConverter::new(OutputSettings::default());
        converter.convert(&gray_frame(32, 16, 16), 0.0).expect("first");
        converter.convert(&gray_frame(32, 16, 16), 0.1).expect("same size");
        assert_eq!(converter.scaler_rebuilds(), 1);

        converter.convert(&gray_frame(64, 32, 16), 0.2).expect("resized");
        assert_eq!(converter.scaler_rebuilds(), 2);
    }

    #[test]
    fn bgra_output_swaps_channels() {
        let output = OutputSettings {
            pixel_format: OutputPixelFormat::Bgra,
            scaling: ScalingQuality::Bilinear,
        };
        let mut converter = FfmpegConverter::new(output);
        let frame = converter.convert(&gray_frame(16, 16, 128), 0.0).expect("convert");
        assert_eq!(frame.format(), OutputPixelFormat::Bgra);
        assert_eq!(frame.data().len(), 16 * 16 * 4);
    }

    #[test]
    fn empty_frame_is_a_conversion_error() {
        let mut converter = FfmpegConverter::new(OutputSettings::default());
        let err = converter.convert(&VideoFrame::empty(), 0.0).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Decode(DecodeError::ConversionFailed(_))
        ));
    }
}
