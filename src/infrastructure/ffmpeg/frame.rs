// SPDX-License-Identifier: MPL-2.0
//! Decoded video frame owning its native pixel memory.
//!
//! A frame is either a host frame (pixels in system memory) or a hardware
//! frame (pixels on the accelerator, referenced through `hw_frames_ctx`).
//! Hardware pixels are never aliased into host memory: reading them requires
//! an explicit [`VideoFrame::download_into`].

use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;

use crate::application::port::MediaFrame;
use crate::domain::media::Resolution;
use crate::error::{DecodeError, Error, Result};

/// A decoded video frame.
///
/// Memory is released when the frame is dropped or refilled by the decoder.
pub struct VideoFrame {
    inner: ffmpeg_next::frame::Video,
}

impl VideoFrame {
    /// An unallocated frame, ready to receive decoder output.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: ffmpeg_next::frame::Video::empty(),
        }
    }

    /// A host frame with allocated planes, used to feed encoders.
    #[must_use]
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            inner: ffmpeg_next::frame::Video::new(format, width, height),
        }
    }

    /// Planar YUV 4:2:0, the layout the muxer encodes from.
    #[must_use]
    pub fn yuv420p(width: u32, height: u32) -> Self {
        Self::new(Pixel::YUV420P, width, height)
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.inner.width(), self.inner.height())
    }

    #[must_use]
    pub fn format(&self) -> Pixel {
        self.inner.format()
    }

    /// True until a decoder has written into the frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.inner.set_pts(pts);
    }

    /// Bytes per row of `plane`, padding included.
    #[must_use]
    pub fn stride(&self, plane: usize) -> usize {
        self.inner.stride(plane)
    }

    /// Raw bytes of a host plane.
    #[must_use]
    pub fn data(&self, plane: usize) -> &[u8] {
        self.inner.data(plane)
    }

    /// Mutable bytes of a host plane.
    pub fn data_mut(&mut self, plane: usize) -> &mut [u8] {
        self.inner.data_mut(plane)
    }

    /// Copies hardware pixels into `target` in host memory.
    ///
    /// `target` receives the device's preferred software format along with
    /// this frame's timestamps and properties. Host frames are not accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::DownloadFailed`] when the frame is not a
    /// hardware frame or the transfer fails.
    pub fn download_into(&self, target: &mut VideoFrame) -> Result<()> {
        if !self.is_hardware() {
            return Err(DecodeError::DownloadFailed("frame is not a hardware frame".into()).into());
        }

        // SAFETY: Both frames are owned and valid. The target is unreferenced
        // first so av_hwframe_transfer_data allocates fresh host buffers.
        unsafe {
            let dst = target.inner.as_mut_ptr();
            let src = self.inner.as_ptr();
            ffi::av_frame_unref(dst);

            let ret = ffi::av_hwframe_transfer_data(dst, src, 0);
            if ret < 0 {
                return Err(transfer_error(ret));
            }
            let ret = ffi::av_frame_copy_props(dst, src);
            if ret < 0 {
                return Err(transfer_error(ret));
            }
        }

        tracing::trace!(format = ?target.format(), "downloaded hardware frame");
        Ok(())
    }

    pub(crate) fn as_inner(&self) -> &ffmpeg_next::frame::Video {
        &self.inner
    }

    pub(crate) fn as_inner_mut(&mut self) -> &mut ffmpeg_next::frame::Video {
        &mut self.inner
    }
}

fn transfer_error(code: i32) -> Error {
    match ffmpeg_next::Error::from(code) {
        ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::ENOMEM => {
            Error::ResourceExhausted("hardware frame download".into())
        }
        other => DecodeError::DownloadFailed(other.to_string()).into(),
    }
}

impl Default for VideoFrame {
    fn default() -> Self {
        Self::empty()
    }
}

impl MediaFrame for VideoFrame {
    fn pts(&self) -> Option<i64> {
        self.inner.timestamp().or_else(|| self.inner.pts())
    }

    fn is_hardware(&self) -> bool {
        // SAFETY: Reading a field of an owned, valid AVFrame.
        unsafe { !(*self.inner.as_ptr()).hw_frames_ctx.is_null() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_not_hardware() {
        let frame = VideoFrame::empty();
        assert!(frame.is_empty());
        assert!(!frame.is_hardware());
        assert!(frame.pts().is_none());
    }

    #[test]
    fn yuv420p_frame_has_three_planes() {
        let frame = VideoFrame::yuv420p(64, 48);
        assert_eq!(frame.resolution(), Resolution::new(64, 48));
        assert_eq!(frame.format(), Pixel::YUV420P);
        assert!(frame.stride(0) >= 64);
        assert!(frame.stride(1) >= 32);
        assert!(frame.data(2).len() >= 32 * 24);
    }

    #[test]
    fn pts_roundtrips_through_setter() {
        let mut frame = VideoFrame::yuv420p(16, 16);
        frame.set_pts(Some(42));
        assert_eq!(frame.pts(), Some(42));
    }

    #[test]
    fn download_rejects_host_frames() {
        let frame = VideoFrame::yuv420p(16, 16);
        let mut target = VideoFrame::empty();
        let err = frame.download_into(&mut target).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::DownloadFailed(_))));
    }
}
