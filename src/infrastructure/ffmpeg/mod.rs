// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` adapters implementing the application ports.
//!
//! [`FfmpegBackend`] ties [`FfmpegDemuxer`], [`FfmpegDecoder`] and
//! [`FfmpegConverter`] together for [`MediaResource`]. The `open_media*`
//! functions are the usual entry points.
//!
//! # Example
//!
//! ```ignore
//! use seekframe::infrastructure::ffmpeg::open_media;
//!
//! let mut media = open_media("clip.mp4")?;
//! for i in 0..30 {
//!     let frame = media.get_frame_at(f64::from(i) / 30.0)?;
//! }
//! media.dispose()?;
//! ```

use std::path::Path;
use std::sync::Once;

use crate::application::port::{ByteSource, MediaBackend};
use crate::application::MediaResource;
use crate::config::{DecoderConfig, OutputSettings};
use crate::domain::media::StreamInfo;
use crate::error::{Error, Result};

pub mod audio;
pub mod converter;
pub mod decoder;
pub mod demuxer;
pub mod frame;
pub mod hardware;
mod io;
pub mod muxer;
pub mod packet;

pub use audio::{AudioFormat, AudioTrack, Resampler};
pub use converter::FfmpegConverter;
pub use decoder::FfmpegDecoder;
pub use demuxer::FfmpegDemuxer;
pub use frame::VideoFrame;
pub use hardware::{FrameConstraints, FramePool, HardwareDevice};
pub use muxer::{Muxer, VideoEncoderSettings};
pub use packet::FfmpegPacket;

/// A media resource decoded through `FFmpeg`.
pub type FfmpegMediaResource = MediaResource<FfmpegBackend>;

/// Static flag to ensure `FFmpeg` is initialized only once.
static FFMPEG_INIT: Once = Once::new();

/// Initializes `FFmpeg` and lowers its log level to errors.
///
/// Safe to call any number of times; only the first call does work.
///
/// # Errors
///
/// Returns [`Error::Io`] if `FFmpeg` fails to initialize.
pub fn init_ffmpeg() -> Result<()> {
    let mut init_result: Result<()> = Ok(());

    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            init_result = Err(Error::Io(format!("FFmpeg initialization failed: {e}")));
            return;
        }

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_ERROR);
        }
    });

    init_result
}

/// Production [`MediaBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    type Demuxer = FfmpegDemuxer;
    type Decoder = FfmpegDecoder;
    type Converter = FfmpegConverter;

    fn open_demuxer(&self, path: &Path) -> Result<FfmpegDemuxer> {
        FfmpegDemuxer::open(path)
    }

    fn open_decoder(
        &self,
        demuxer: &FfmpegDemuxer,
        stream: &StreamInfo,
        config: &DecoderConfig,
    ) -> Result<FfmpegDecoder> {
        FfmpegDecoder::open(demuxer, stream, config)
    }

    fn open_converter(&self, _stream: &StreamInfo, output: &OutputSettings) -> Result<FfmpegConverter> {
        Ok(FfmpegConverter::new(*output))
    }
}

/// Opens `path` with the default configuration.
///
/// # Errors
///
/// Returns an [`OpenError`](crate::error::OpenError) when the file cannot be opened.
pub fn open_media(path: impl AsRef<Path>) -> Result<FfmpegMediaResource> {
    open_media_with(path, DecoderConfig::default())
}

/// Opens `path` with `config`.
///
/// # Errors
///
/// Returns an [`OpenError`](crate::error::OpenError) when the file cannot be opened.
pub fn open_media_with(path: impl AsRef<Path>, config: DecoderConfig) -> Result<FfmpegMediaResource> {
    MediaResource::open(FfmpegBackend, path, config)
}

/// Opens a container read through `source`.
///
/// The resource has no path; [`MediaResource::set_path`] can later point it
/// at a file.
///
/// # Errors
///
/// Returns an [`OpenError`](crate::error::OpenError) when probing fails.
pub fn open_media_source(
    source: Box<dyn ByteSource>,
    format_hint: Option<&str>,
    config: DecoderConfig,
) -> Result<FfmpegMediaResource> {
    let demuxer = FfmpegDemuxer::open_source(source, format_hint)?;
    Ok(MediaResource::from_demuxer(FfmpegBackend, demuxer, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_ffmpeg().expect("first init");
        init_ffmpeg().expect("second init");
    }

    #[test]
    fn open_media_missing_file_fails() {
        let result = open_media("/nonexistent/clip.mp4");
        assert!(matches!(result, Err(Error::Open(_))));
    }

    fn assert_send<T: Send>() {}

    #[test]
    fn resource_is_send() {
        assert_send::<FfmpegMediaResource>();
    }
}
