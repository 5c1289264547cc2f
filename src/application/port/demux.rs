// SPDX-License-Identifier: MPL-2.0
//! Container demuxing port.
//!
//! A [`Demuxer`] splits a container into per-stream compressed packets. It is
//! opened once per media resource and outlives any decoder attached to it.
//!
//! # Design Notes
//!
//! - Packets are reused: callers allocate one with [`Demuxer::new_packet`] and
//!   pass it to every [`Demuxer::read`] call. The previous contents are
//!   released on each read.
//! - Seeking is keyframe aligned and backward biased. After a successful seek
//!   any decoder fed from this demuxer must be flushed before its output
//!   timestamps can be trusted.

use crate::domain::media::{select_best_stream, MediaType, StreamInfo};
use crate::error::Result;

/// A compressed packet that knows which stream it belongs to.
pub trait StreamPacket: Send {
    /// Index of the owning stream in the container.
    fn stream_index(&self) -> usize;

    /// Presentation timestamp in the owning stream's ticks.
    fn pts(&self) -> Option<i64>;
}

/// Port for reading packets out of a container.
pub trait Demuxer: Send {
    type Packet: StreamPacket;

    /// Every stream in the container, indexed by stream index.
    fn streams(&self) -> &[StreamInfo];

    /// The stream most likely intended for playback of `media_type`.
    ///
    /// Deterministic for identical input.
    fn find_best_stream(&self, media_type: MediaType) -> Option<&StreamInfo> {
        select_best_stream(self.streams(), media_type)
    }

    /// Container duration in seconds, 0.0 when unknown.
    fn duration_secs(&self) -> f64;

    /// Allocates an empty packet for use with [`Demuxer::read`].
    fn new_packet(&self) -> Self::Packet;

    /// Fills `packet` with the next packet of any stream.
    ///
    /// Returns `Ok(false)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the underlying source fails.
    fn read(&mut self, packet: &mut Self::Packet) -> Result<bool>;

    /// Seeks to the nearest keyframe at or before `secs` in `stream`.
    ///
    /// Returns `Ok(false)` when the source is not seekable.
    ///
    /// # Errors
    ///
    /// Returns an error when a seekable source fails to seek.
    fn seek(&mut self, stream: &StreamInfo, secs: f64) -> Result<bool>;

    /// Releases the container and its byte source.
    ///
    /// # Errors
    ///
    /// Returns every failure met while closing the underlying source.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
