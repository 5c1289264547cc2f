// SPDX-License-Identifier: MPL-2.0
//! Factory port tying a demuxer, decoder and converter family together.
//!
//! The application layer never names a concrete codec library. A
//! [`MediaBackend`] opens the three collaborators for one media resource; the
//! FFmpeg adapter is the production implementation and tests plug in a
//! synthetic one.

use super::demux::Demuxer;
use super::video::{FormatConverter, VideoDecoder};
use crate::config::{DecoderConfig, OutputSettings};
use crate::domain::media::StreamInfo;
use crate::error::Result;
use std::path::Path;

/// Packet type produced by a backend's demuxer.
pub type PacketOf<B> = <<B as MediaBackend>::Demuxer as Demuxer>::Packet;

/// Frame type produced by a backend's decoder.
pub type FrameOf<B> = <<B as MediaBackend>::Decoder as VideoDecoder>::Frame;

/// Opens the native objects behind a media resource.
pub trait MediaBackend {
    type Demuxer: Demuxer;
    type Decoder: VideoDecoder<Packet = <Self::Demuxer as Demuxer>::Packet>;
    type Converter: FormatConverter<Frame = <Self::Decoder as VideoDecoder>::Frame>;

    /// Opens the container at `path` and reads its stream headers.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError`](crate::error::OpenError) for missing files,
    /// unrecognised containers and unreadable headers.
    fn open_demuxer(&self, path: &Path) -> Result<Self::Demuxer>;

    /// Opens a decoder for `stream`, trying hardware acceleration first when
    /// the configuration allows it.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::UnsupportedCodec`](crate::error::OpenError::UnsupportedCodec)
    /// when no decoder exists for the stream.
    fn open_decoder(
        &self,
        demuxer: &Self::Demuxer,
        stream: &StreamInfo,
        config: &DecoderConfig,
    ) -> Result<Self::Decoder>;

    /// Creates a converter producing frames in the configured output format.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the converter cannot be set up.
    fn open_converter(&self, stream: &StreamInfo, output: &OutputSettings)
        -> Result<Self::Converter>;
}
