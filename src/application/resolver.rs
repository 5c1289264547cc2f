// SPDX-License-Identifier: MPL-2.0
//! Timestamp-driven frame resolution.
//!
//! [`FrameResolver`] answers "which decoded frame belongs at time T?" for one
//! video stream. It owns the decoder, the rolling [`FrameCache`] and the
//! presentation converter; the demuxer is borrowed per call because it
//! outlives the decoder (see [`MediaResource`](super::resource::MediaResource)).
//!
//! # Algorithm
//!
//! 1. Clamp the target to `[0, duration]`.
//! 2. Look up the nearest cached frame. Within half a frame period (by
//!    default) it is returned as-is and no decode work happens. The same
//!    holds when the target lies inside the run decoded since the last seek
//!    and a frame of that run sits at or before it: the stream has no frame
//!    between that one and its cached successor.
//! 3. Otherwise decide between seeking and decoding forward. The resolver
//!    seeks when the target lies behind the nearest frame or the decoder
//!    position, when it lies more than the forward threshold (5 s by
//!    default) ahead of either, or when the decoder position is unknown.
//! 4. Decode until a frame at or after the target is committed, or the
//!    stream is exhausted (the decoder is drained once at end of stream).
//! 5. Look up the nearest frame again, download and convert it, and remember
//!    the conversion so repeated requests for the same frame are free.
//!
//! # Thread Safety
//!
//! Not thread-safe. Callers serialize access, e.g. one render thread per
//! resource or a mutex around [`FrameResolver::resolve`].

use std::ops::AddAssign;

use crate::application::frame_cache::{FrameCache, FrameId};
use crate::application::port::{
    Demuxer, FormatConverter, FrameOf, MediaBackend, PacketOf, StreamPacket, VideoDecoder,
};
use crate::config::DecoderConfig;
use crate::domain::hardware::HardwareDeviceKind;
use crate::domain::media::{PresentableFrame, StreamInfo};
use crate::error::{DisposeError, Error, Result};

/// Counters describing the work done by a resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Successful demuxer seeks.
    pub seeks: u64,
    /// Decoder flushes (one per successful seek).
    pub flushes: u64,
    /// Packets handed to the decoder.
    pub packets_sent: u64,
    /// Frames received from the decoder.
    pub frames_decoded: u64,
    /// Requests answered from the cache without decoding.
    pub cache_hits: u64,
    /// Requests that had to decode (or at least try to).
    pub cache_misses: u64,
    /// Packet and frame errors tolerated by the decode loop.
    pub decode_errors: u64,
    /// Frames converted for presentation.
    pub conversions: u64,
}

impl ResolveStats {
    /// Returns the cache hit rate as a percentage (0.0 - 100.0).
    // Allow cast_precision_loss: request counts stay far below 2^52.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }
}

impl AddAssign for ResolveStats {
    fn add_assign(&mut self, other: Self) {
        self.seeks += other.seeks;
        self.flushes += other.flushes;
        self.packets_sent += other.packets_sent;
        self.frames_decoded += other.frames_decoded;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
        self.decode_errors += other.decode_errors;
        self.conversions += other.conversions;
    }
}

/// Why the resolver decided to seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekReason {
    /// The target lies before the cached frames or the decoder position.
    Backward,
    /// The target lies beyond the forward threshold.
    FarForward,
    /// The decoder's read position is not known (e.g. a freshly reopened decoder).
    UnknownPosition,
}

/// Decides whether a cache miss at `target_secs` needs a seek.
///
/// `nearest_distance` is `target - nearest_frame_pts` for the nearest cached
/// frame, if any. `position_secs` is the timestamp of the last frame the
/// decoder produced, `None` when unknown.
#[must_use]
pub fn seek_decision(
    nearest_distance: Option<f64>,
    position_secs: Option<f64>,
    target_secs: f64,
    tolerance_secs: f64,
    forward_threshold_secs: f64,
) -> Option<SeekReason> {
    let Some(position) = position_secs else {
        return Some(SeekReason::UnknownPosition);
    };

    if let Some(distance) = nearest_distance {
        if distance < -tolerance_secs {
            return Some(SeekReason::Backward);
        }
        if distance > forward_threshold_secs {
            return Some(SeekReason::FarForward);
        }
    }

    let gap = target_secs - position;
    if gap < -tolerance_secs {
        Some(SeekReason::Backward)
    } else if gap > forward_threshold_secs {
        Some(SeekReason::FarForward)
    } else {
        None
    }
}

/// Where a new resolver's decoder starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// The demuxer has not been read from; decoding starts at the stream start.
    StreamStart,
    /// The demuxer has been read by an earlier decoder; the first request seeks.
    Unknown,
}

/// Resolves timestamps to presentable frames for one video stream.
pub struct FrameResolver<B: MediaBackend> {
    decoder: B::Decoder,
    converter: B::Converter,
    cache: FrameCache<FrameOf<B>>,
    /// Reused for every demuxer read.
    packet: PacketOf<B>,
    stream: StreamInfo,
    /// Upper clamp bound; infinite when the duration is unknown.
    duration_secs: f64,
    tolerance_secs: f64,
    forward_threshold_secs: f64,
    /// Timestamp of the last frame the decoder produced.
    position_secs: Option<f64>,
    /// Timestamp of the first frame produced since the last seek.
    run_start_secs: Option<f64>,
    /// End of stream has been signalled to the decoder since the last seek.
    eof_sent: bool,
    /// Cleared once the demuxer reports it cannot seek.
    seekable: bool,
    /// Last converted frame, keyed by the cache entry it came from.
    presented: Option<(FrameId, PresentableFrame)>,
    stats: ResolveStats,
}

impl<B: MediaBackend> FrameResolver<B> {
    /// Creates a resolver for `stream`.
    ///
    /// `duration_secs` is the clamp bound for requests; `None` (unknown
    /// duration) disables the upper clamp.
    pub fn new(
        demuxer: &B::Demuxer,
        decoder: B::Decoder,
        converter: B::Converter,
        stream: StreamInfo,
        duration_secs: Option<f64>,
        start: StartPosition,
        config: &DecoderConfig,
    ) -> Self {
        let config = config.sanitized();
        let fps = stream.fps_or(config.fallback_frame_rate);
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            config.fallback_frame_rate
        };
        let cache = FrameCache::new(config.frame_cache_capacity, stream.time_base, || {
            decoder.new_frame()
        });
        let duration_secs = duration_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(f64::INFINITY);

        Self {
            packet: demuxer.new_packet(),
            cache,
            decoder,
            converter,
            stream,
            duration_secs,
            tolerance_secs: config.frame_tolerance_periods / fps,
            forward_threshold_secs: config.seek_forward_threshold_secs,
            position_secs: match start {
                StartPosition::StreamStart => Some(0.0),
                StartPosition::Unknown => None,
            },
            run_start_secs: None,
            eof_sent: false,
            seekable: true,
            presented: None,
            stats: ResolveStats::default(),
        }
    }

    /// The stream this resolver decodes.
    #[must_use]
    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    /// Cache-hit tolerance in seconds.
    #[must_use]
    pub fn tolerance_secs(&self) -> f64 {
        self.tolerance_secs
    }

    #[must_use]
    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    #[must_use]
    pub fn hardware_device(&self) -> Option<HardwareDeviceKind> {
        self.decoder.hardware_device()
    }

    /// Clamps a requested timestamp into `[0, duration]`. NaN maps to 0.
    #[must_use]
    pub fn clamp_target(&self, requested_secs: f64) -> f64 {
        if requested_secs.is_nan() {
            0.0
        } else {
            requested_secs.clamp(0.0, self.duration_secs)
        }
    }

    /// Returns the frame nearest to `requested_secs`.
    ///
    /// `Ok(None)` means the stream produced no frame at all.
    ///
    /// # Errors
    ///
    /// - [`Error::SeekUnsupported`] the first time a needed seek is refused;
    ///   later requests decode forward only.
    /// - [`Error::Io`] when the demuxer fails to read or seek.
    /// - [`Error::ResourceExhausted`] when a native allocation fails.
    /// - [`Error::Decode`] when the chosen frame cannot be converted.
    pub fn resolve(
        &mut self,
        demuxer: &mut B::Demuxer,
        requested_secs: f64,
    ) -> Result<Option<PresentableFrame>> {
        let target = self.clamp_target(requested_secs);

        let distance = self.cache.find_nearest(target).map(|n| n.distance_secs);
        if distance.is_some_and(|d| d.abs() <= self.tolerance_secs) || self.decoded_around(target) {
            self.stats.cache_hits += 1;
            return self.present(target);
        }
        self.stats.cache_misses += 1;

        if let Some(reason) = seek_decision(
            distance,
            self.position_secs,
            target,
            self.tolerance_secs,
            self.forward_threshold_secs,
        ) {
            self.seek(demuxer, target, reason)?;
        }

        self.decode_until(demuxer, target)?;
        self.present(target)
    }

    /// True when decoding more cannot bring a frame closer to `target`.
    ///
    /// Frames of the current run are decoded in order and the cache keeps the
    /// most recent ones, so a cached run frame at or before the target is
    /// followed in the cache by the first frame after it.
    fn decoded_around(&self, target: f64) -> bool {
        let (Some(start), Some(position)) = (self.run_start_secs, self.position_secs) else {
            return false;
        };
        target <= position
            && self
                .cache
                .latest_at_or_before(target)
                .is_some_and(|pts| pts >= start)
    }

    fn seek(&mut self, demuxer: &mut B::Demuxer, target: f64, reason: SeekReason) -> Result<()> {
        if !self.seekable {
            tracing::debug!(?reason, target, "source not seekable, decoding forward");
            return Ok(());
        }

        tracing::debug!(?reason, target, position = ?self.position_secs, "seeking");
        if !demuxer.seek(&self.stream, target)? {
            self.seekable = false;
            tracing::warn!(
                stream = self.stream.index,
                "source is not seekable, falling back to forward-only decoding"
            );
            return Err(Error::SeekUnsupported);
        }

        self.decoder.flush();
        self.stats.seeks += 1;
        self.stats.flushes += 1;
        self.eof_sent = false;
        self.position_secs = None;
        self.run_start_secs = None;
        Ok(())
    }

    /// Decodes until a frame at or after `target` is committed or the stream ends.
    fn decode_until(&mut self, demuxer: &mut B::Demuxer, target: f64) -> Result<()> {
        let frames_before = self.stats.frames_decoded;
        let packets_before = self.stats.packets_sent;

        loop {
            let slot = self.cache.reserve();
            let received = self.decoder.receive_frame(slot);
            if let Some(true) = self.tolerate("receive frame", received)? {
                self.stats.frames_decoded += 1;
                if let Some(pts) = self.cache.commit() {
                    self.position_secs = Some(pts);
                    self.run_start_secs.get_or_insert(pts);
                    if pts >= target {
                        break;
                    }
                }
                continue;
            }

            // Decoder needs input (or is fully drained).
            if self.eof_sent {
                break;
            }
            if self.read_stream_packet(demuxer)? {
                let sent = self.decoder.send_packet(&self.packet);
                if self.tolerate("send packet", sent)?.is_some() {
                    self.stats.packets_sent += 1;
                }
            } else {
                let drained = self.decoder.send_eof();
                self.tolerate("send end of stream", drained)?;
                self.eof_sent = true;
            }
        }

        tracing::debug!(
            target,
            frames = self.stats.frames_decoded - frames_before,
            packets = self.stats.packets_sent - packets_before,
            position = ?self.position_secs,
            end_of_stream = self.eof_sent,
            "decode loop finished"
        );
        Ok(())
    }

    /// Reads packets until one belongs to this resolver's stream.
    fn read_stream_packet(&mut self, demuxer: &mut B::Demuxer) -> Result<bool> {
        while demuxer.read(&mut self.packet)? {
            if self.packet.stream_index() == self.stream.index {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Logs and counts recoverable decode failures; resource exhaustion stays fatal.
    fn tolerate<T>(&mut self, step: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error @ Error::ResourceExhausted(_)) => Err(error),
            Err(error) => {
                self.stats.decode_errors += 1;
                tracing::warn!(step, %error, stream = self.stream.index, "decode step failed, continuing");
                Ok(None)
            }
        }
    }

    /// Converts the cached frame nearest to `target`, reusing the last conversion.
    fn present(&mut self, target: f64) -> Result<Option<PresentableFrame>> {
        let Some(nearest) = self.cache.find_nearest(target) else {
            return Ok(None);
        };

        if let Some((id, frame)) = &self.presented {
            if *id == nearest.id {
                return Ok(Some(frame.clone()));
            }
        }

        let id = nearest.id;
        let frame = self.converter.convert(nearest.frame, nearest.pts_secs)?;
        self.stats.conversions += 1;
        self.presented = Some((id, frame.clone()));
        Ok(Some(frame))
    }

    /// Releases the decoder and every cached frame.
    ///
    /// # Errors
    ///
    /// Returns an aggregate of every release failure.
    pub fn close(self) -> Result<()> {
        let mut failures = DisposeError::new();
        // Cached frames may reference the decoder's hardware pool; drop them first.
        drop(self.cache);
        drop(self.presented);
        failures.collect("decoder", self.decoder.close());
        failures.into_result()
    }
}
