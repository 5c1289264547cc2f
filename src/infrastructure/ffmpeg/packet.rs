// SPDX-License-Identifier: MPL-2.0
//! Reusable compressed packet.

use ffmpeg_next::ffi;

use crate::application::port::StreamPacket;

/// One compressed packet, refilled by every [`Demuxer::read`](crate::application::port::Demuxer::read).
///
/// The previous payload is released before each refill, so a packet never
/// holds data past the decode call that consumed it.
pub struct FfmpegPacket {
    inner: ffmpeg_next::Packet,
}

impl FfmpegPacket {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: ffmpeg_next::Packet::empty(),
        }
    }

    /// Drops the current payload, keeping the allocation.
    pub fn clear(&mut self) {
        // SAFETY: The packet is owned; av_packet_unref resets it to blank.
        unsafe { ffi::av_packet_unref(self.inner.as_mut_ptr()) };
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    #[must_use]
    pub fn is_key(&self) -> bool {
        self.inner.is_key()
    }

    pub(crate) fn as_inner(&self) -> &ffmpeg_next::Packet {
        &self.inner
    }

    pub(crate) fn as_inner_mut(&mut self) -> &mut ffmpeg_next::Packet {
        &mut self.inner
    }
}

impl Default for FfmpegPacket {
    fn default() -> Self {
        Self::empty()
    }
}

impl StreamPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.inner.stream()
    }

    fn pts(&self) -> Option<i64> {
        self.inner.pts()
    }
}
