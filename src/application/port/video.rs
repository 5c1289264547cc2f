// SPDX-License-Identifier: MPL-2.0
//! Video decoding and conversion port definitions.
//!
//! These traits split decoding into the steps the frame resolver drives
//! itself: feeding packets, draining frames into caller-owned slots, and
//! converting one chosen frame for presentation.
//!
//! # Design Notes
//!
//! - Decoders are **stateful**: they buffer packets and reorder frames, so
//!   [`VideoDecoder::flush`] is required after every demuxer seek.
//! - Frames are written into slots owned by the caller (the frame cache); a
//!   decoder never hands out references into its own buffers.
//! - Methods are synchronous and block the calling thread.

use crate::domain::hardware::HardwareDeviceKind;
use crate::domain::media::PresentableFrame;
use crate::error::Result;

/// A decoded frame that owns its pixel memory.
pub trait MediaFrame: Send {
    /// Presentation timestamp in the stream's ticks, if the frame has one.
    fn pts(&self) -> Option<i64>;

    /// True when the pixels live in accelerator memory and must be downloaded
    /// before CPU-side processing.
    fn is_hardware(&self) -> bool;
}

/// Port for packet-in, frame-out video decoding.
///
/// # Lifecycle
///
/// 1. [`VideoDecoder::send_packet`] compressed data
/// 2. [`VideoDecoder::receive_frame`] until it returns `false`
/// 3. Repeat; at end of input call [`VideoDecoder::send_eof`] once and drain
/// 4. After a seek, [`VideoDecoder::flush`] before sending new packets
pub trait VideoDecoder: Send {
    type Packet;
    type Frame: MediaFrame;

    /// Allocates an empty frame slot.
    fn new_frame(&self) -> Self::Frame;

    /// The hardware device frames are decoded on, if any.
    fn hardware_device(&self) -> Option<HardwareDeviceKind>;

    /// Feeds one compressed packet.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::PacketRejected`](crate::error::DecodeError::PacketRejected)
    /// when the codec refuses the data.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<()>;

    /// Signals end of input so buffered frames can be drained.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the codec cannot enter draining mode.
    fn send_eof(&mut self) -> Result<()>;

    /// Writes the next decoded frame into `frame`.
    ///
    /// `Ok(false)` means more packets are needed (or the decoder is fully
    /// drained); it is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::FrameFailed`](crate::error::DecodeError::FrameFailed)
    /// on corrupt data.
    fn receive_frame(&mut self, frame: &mut Self::Frame) -> Result<bool>;

    /// Discards internal reordering state. Required after any seek.
    fn flush(&mut self);

    /// Releases the codec context and any hardware device.
    ///
    /// # Errors
    ///
    /// Returns every failure met while releasing native state.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Port for turning a decoded frame into a [`PresentableFrame`].
pub trait FormatConverter: Send {
    type Frame: MediaFrame;

    /// Converts `frame` (downloading it from hardware first when needed).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::DownloadFailed`](crate::error::DecodeError::DownloadFailed)
    /// or [`DecodeError::ConversionFailed`](crate::error::DecodeError::ConversionFailed).
    fn convert(&mut self, frame: &Self::Frame, pts_secs: f64) -> Result<PresentableFrame>;
}
