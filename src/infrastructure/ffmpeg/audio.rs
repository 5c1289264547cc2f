// SPDX-License-Identifier: MPL-2.0
//! Audio decoding into an [`AudioQueue`].
//!
//! [`Resampler`] converts whatever the codec produces into packed `f32` at a
//! fixed rate and channel count. [`AudioTrack`] owns its own demuxer, decodes
//! the best audio stream and keeps the queue topped up on request.

use std::path::Path;
use std::sync::Arc;

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::error::{EAGAIN, ENOMEM};
use ffmpeg_next::ChannelLayout;

use super::demuxer::FfmpegDemuxer;
use super::packet::FfmpegPacket;
use crate::application::audio_queue::{AudioQueue, DecodedAudio};
use crate::application::port::{Demuxer, StreamPacket};
use crate::config::{DEFAULT_AUDIO_CHANNELS, DEFAULT_AUDIO_QUEUE_SECS, DEFAULT_AUDIO_SAMPLE_RATE};
use crate::domain::media::{MediaType, StreamInfo};
use crate::error::{DecodeError, Error, OpenError, Result};

/// Sample rate and channel count audio is resampled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    /// 1 = mono; anything else is downmixed to stereo.
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            channels: DEFAULT_AUDIO_CHANNELS,
        }
    }
}

impl AudioFormat {
    fn channel_layout(self) -> ChannelLayout {
        match self.channels {
            1 => ChannelLayout::MONO,
            _ => ChannelLayout::STEREO,
        }
    }

    fn effective_channels(self) -> u16 {
        if self.channels == 1 {
            1
        } else {
            2
        }
    }
}

/// Converts decoded audio frames to interleaved `f32`.
pub struct Resampler {
    context: resampling::Context,
    target: AudioFormat,
    output: ffmpeg_next::frame::Audio,
}

// SAFETY: The resampling context and frame are exclusively owned and only
// used through `&mut self`.
unsafe impl Send for Resampler {}

impl Resampler {
    /// Creates a resampler matching `decoder`'s output.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ConversionFailed`] for unsupported layouts.
    pub fn for_decoder(decoder: &ffmpeg_next::decoder::Audio, target: AudioFormat) -> Result<Self> {
        let context = resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            Sample::F32(SampleType::Packed),
            target.channel_layout(),
            target.sample_rate,
        )
        .map_err(|e| DecodeError::ConversionFailed(format!("resampler: {e}")))?;

        Ok(Self {
            context,
            target: AudioFormat {
                channels: target.effective_channels(),
                ..target
            },
            output: ffmpeg_next::frame::Audio::empty(),
        })
    }

    #[must_use]
    pub fn target(&self) -> AudioFormat {
        self.target
    }

    /// Resamples `frame`, stamping the result with `pts_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ConversionFailed`] when resampling fails.
    pub fn run(&mut self, frame: &ffmpeg_next::frame::Audio, pts_secs: f64) -> Result<DecodedAudio> {
        self.context
            .run(frame, &mut self.output)
            .map_err(|e| DecodeError::ConversionFailed(format!("resampling failed: {e}")))?;

        Ok(DecodedAudio {
            samples: Arc::new(interleaved_samples(&self.output, self.target.channels)),
            sample_rate: self.target.sample_rate,
            channels: self.target.channels,
            pts_secs,
        })
    }
}

/// Reads packed little-endian `f32` samples out of plane 0.
fn interleaved_samples(frame: &ffmpeg_next::frame::Audio, channels: u16) -> Vec<f32> {
    let count = frame.samples() * usize::from(channels);
    let data = frame.data(0);
    data.chunks_exact(4)
        .take(count)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Decodes the best audio stream of a file into a bounded queue.
pub struct AudioTrack {
    demuxer: FfmpegDemuxer,
    decoder: ffmpeg_next::decoder::Audio,
    resampler: Resampler,
    stream: StreamInfo,
    queue: AudioQueue,
    packet: FfmpegPacket,
    decoded: ffmpeg_next::frame::Audio,
    /// Buffer the queue had no room for.
    pending: Option<DecodedAudio>,
    /// Buffers ending before this point are dropped (set by seeks).
    skip_until_secs: Option<f64>,
    eof_sent: bool,
    finished: bool,
}

// SAFETY: Every native context is exclusively owned and only used through
// `&mut self` from one thread at a time.
unsafe impl Send for AudioTrack {}

impl AudioTrack {
    /// Opens `path` and its best audio stream.
    ///
    /// Returns `Ok(None)` when the file has no audio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] when the file or codec cannot be opened.
    pub fn open(path: &Path, target: AudioFormat) -> Result<Option<Self>> {
        Self::from_demuxer(FfmpegDemuxer::open(path)?, target)
    }

    /// Decodes audio from an already opened demuxer, which the track takes over.
    ///
    /// # Errors
    ///
    /// Same as [`AudioTrack::open`].
    pub fn from_demuxer(demuxer: FfmpegDemuxer, target: AudioFormat) -> Result<Option<Self>> {
        let Some(stream) = demuxer.find_best_stream(MediaType::Audio).cloned() else {
            return Ok(None);
        };
        let native = demuxer
            .native_stream(stream.index)
            .ok_or_else(|| OpenError::InvalidHeaders(format!("stream {} missing", stream.index)))?;

        let context = ffmpeg_next::codec::context::Context::from_parameters(native.parameters())
            .map_err(|e| OpenError::InvalidHeaders(e.to_string()))?;
        let decoder = context
            .decoder()
            .audio()
            .map_err(|e| OpenError::UnsupportedCodec(format!("{}: {e}", stream.codec_name)))?;
        let resampler = Resampler::for_decoder(&decoder, target)?;
        let format = resampler.target();

        tracing::info!(
            stream = stream.index,
            codec = %stream.codec_name,
            source_rate = decoder.rate(),
            target_rate = format.sample_rate,
            channels = format.channels,
            "audio track opened"
        );

        Ok(Some(Self {
            packet: demuxer.new_packet(),
            demuxer,
            decoder,
            resampler,
            stream,
            queue: AudioQueue::with_duration(DEFAULT_AUDIO_QUEUE_SECS, format.sample_rate, format.channels),
            decoded: ffmpeg_next::frame::Audio::empty(),
            pending: None,
            skip_until_secs: None,
            eof_sent: false,
            finished: false,
        }))
    }

    #[must_use]
    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    /// Format of the samples in the queue.
    #[must_use]
    pub fn format(&self) -> AudioFormat {
        self.resampler.target()
    }

    #[must_use]
    pub fn queue(&self) -> &AudioQueue {
        &self.queue
    }

    /// The queue, for draining samples.
    pub fn queue_mut(&mut self) -> &mut AudioQueue {
        &mut self.queue
    }

    /// True once the stream is fully decoded and nothing is pending.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished && self.pending.is_none()
    }

    /// Decodes until the queue is full or the stream ends.
    ///
    /// Returns the number of buffers queued by this call. Corrupt packets
    /// and frames are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the demuxer fails and
    /// [`Error::ResourceExhausted`] when the codec runs out of memory.
    pub fn fill(&mut self) -> Result<usize> {
        let mut queued = 0;
        loop {
            if let Some(audio) = self.pending.take() {
                if !self.queue.push(audio.clone()) {
                    self.pending = Some(audio);
                    return Ok(queued);
                }
                queued += 1;
            }
            if self.finished {
                return Ok(queued);
            }

            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => {
                    self.resample_decoded();
                    continue;
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.finished = true;
                    continue;
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {}
                Err(ffmpeg_next::Error::Other { errno }) if errno == ENOMEM => {
                    return Err(Error::ResourceExhausted("audio decoder".into()));
                }
                Err(error) => {
                    tracing::warn!(%error, "audio frame skipped");
                    continue;
                }
            }

            if self.eof_sent {
                self.finished = true;
                continue;
            }
            self.feed_next_packet()?;
        }
    }

    fn resample_decoded(&mut self) {
        let pts_secs = self
            .decoded
            .timestamp()
            .map_or(0.0, |ticks| self.stream.ticks_to_secs(ticks));

        match self.resampler.run(&self.decoded, pts_secs) {
            Ok(audio) if audio.sample_count() == 0 => {}
            Ok(audio) => {
                let stale = self
                    .skip_until_secs
                    .is_some_and(|target| audio.pts_secs + audio.duration_secs() < target);
                if stale {
                    return;
                }
                self.skip_until_secs = None;
                self.pending = Some(audio);
            }
            Err(error) => tracing::warn!(%error, "audio resampling failed"),
        }
    }

    fn feed_next_packet(&mut self) -> Result<()> {
        loop {
            if !self.demuxer.read(&mut self.packet)? {
                if let Err(error) = self.decoder.send_eof() {
                    tracing::debug!(%error, "audio decoder rejected end of stream");
                }
                self.eof_sent = true;
                return Ok(());
            }
            if self.packet.stream_index() != self.stream.index {
                continue;
            }
            match self.decoder.send_packet(self.packet.as_inner()) {
                Ok(()) => return Ok(()),
                Err(ffmpeg_next::Error::Other { errno }) if errno == ENOMEM => {
                    return Err(Error::ResourceExhausted("audio decoder".into()));
                }
                Err(error) => {
                    tracing::warn!(%error, "audio packet rejected");
                    return Ok(());
                }
            }
        }
    }

    /// Repositions to `secs`, dropping everything queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeekUnsupported`] for non-seekable sources.
    pub fn seek(&mut self, secs: f64) -> Result<()> {
        if !self.demuxer.seek(&self.stream, secs)? {
            return Err(Error::SeekUnsupported);
        }
        self.decoder.flush();
        self.queue.clear();
        self.pending = None;
        self.skip_until_secs = Some(secs);
        self.eof_sent = false;
        self.finished = false;
        Ok(())
    }

    /// Releases the decoder and demuxer.
    ///
    /// # Errors
    ///
    /// Returns the demuxer's close failure, if any.
    pub fn close(self) -> Result<()> {
        let Self { demuxer, decoder, .. } = self;
        drop(decoder);
        demuxer.close()
    }
}
