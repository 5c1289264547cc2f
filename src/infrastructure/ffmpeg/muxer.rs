// SPDX-License-Identifier: MPL-2.0
//! Encode-and-write path: one video stream into a new container.
//!
//! The mirror image of the demuxer. Frames go through an encoder, the
//! resulting packets are rescaled from the encoder time base to the stream
//! time base and interleaved into the output, and [`Muxer::finish`] drains
//! the encoder and writes the trailer.

use std::ffi::{c_int, CString};
use std::path::Path;
use std::ptr;

use ffmpeg_next::ffi;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::Rational;

use super::frame::VideoFrame;
use super::io::IoContext;
use crate::application::port::ByteSource;
use crate::domain::media::Resolution;
use crate::domain::time::FrameRate;
use crate::error::{DecodeError, DisposeError, Error, OpenError, Result};

/// Encoder parameters for the single video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderSettings {
    /// `FFmpeg` encoder name, e.g. `"mpeg4"` or `"libx264"`.
    pub encoder: String,
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    /// Target bit rate in bits per second.
    pub bit_rate: usize,
    /// Keyframe interval in frames.
    pub gop_size: u32,
    pub max_b_frames: usize,
}

impl VideoEncoderSettings {
    /// MPEG-4 Part 2 at `resolution` and `fps`, one keyframe per second.
    #[must_use]
    pub fn mpeg4(resolution: Resolution, fps: i32) -> Self {
        Self {
            encoder: "mpeg4".to_string(),
            resolution,
            frame_rate: FrameRate::new(fps, 1),
            bit_rate: 2_000_000,
            gop_size: u32::try_from(fps).unwrap_or(1).max(1),
            max_b_frames: 0,
        }
    }
}

/// Writes one encoded video stream into a container.
pub struct Muxer {
    output: Output,
    encoder: ffmpeg_next::encoder::video::Encoder,
    /// Present when writing through a [`ByteSource`].
    io: Option<IoContext>,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    resolution: Resolution,
    next_pts: i64,
    packets_written: u64,
    finished: bool,
}

// SAFETY: The output and encoder contexts are exclusively owned and only used
// through `&mut self` from one thread at a time.
unsafe impl Send for Muxer {}

impl Muxer {
    /// Creates `path`, guessing the container from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::UnsupportedContainer`] when no muxer matches,
    /// [`OpenError::UnsupportedCodec`] for unknown encoders, and
    /// [`Error::Io`] when the header cannot be written.
    pub fn create(path: &Path, settings: &VideoEncoderSettings) -> Result<Self> {
        super::init_ffmpeg()?;
        let output = ffmpeg_next::format::output(&path)
            .map_err(|e| OpenError::UnsupportedContainer(format!("{}: {e}", path.display())))?;
        Self::with_output(output, None, settings)
    }

    /// Writes a `format` container (e.g. `"mp4"`, `"matroska"`) into `sink`.
    ///
    /// Formats that patch their header at the end need a seekable sink.
    ///
    /// # Errors
    ///
    /// Same as [`Muxer::create`].
    pub fn create_in(sink: Box<dyn ByteSource>, format: &str, settings: &VideoEncoderSettings) -> Result<Self> {
        super::init_ffmpeg()?;
        let mut io = IoContext::new(sink, true)?;
        let c_format = CString::new(format).map_err(|_| OpenError::UnsupportedContainer(format.to_string()))?;

        // SAFETY: The context is allocated by FFmpeg and wrapped immediately;
        // `pb` is cleared again before Output's destructor runs (see Drop).
        let output = unsafe {
            let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
            let ret = ffi::avformat_alloc_output_context2(&mut ctx, ptr::null(), c_format.as_ptr(), ptr::null());
            if ret < 0 || ctx.is_null() {
                return Err(OpenError::UnsupportedContainer(format.to_string()).into());
            }
            (*ctx).pb = io.as_mut_ptr();
            #[allow(clippy::cast_possible_wrap)]
            {
                (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
            }
            Output::wrap(ctx)
        };

        Self::with_output(output, Some(io), settings)
    }

    fn with_output(mut output: Output, io: Option<IoContext>, settings: &VideoEncoderSettings) -> Result<Self> {
        let (encoder, stream_index, encoder_time_base) = match Self::add_video_stream(&mut output, settings) {
            Ok(parts) => parts,
            Err(error) => {
                if io.is_some() {
                    // SAFETY: Clearing `pb` on an owned format context so its
                    // destructor does not close the custom AVIO context.
                    unsafe { (*output.as_mut_ptr()).pb = ptr::null_mut() };
                }
                return Err(error);
            }
        };

        let mut muxer = Self {
            output,
            encoder,
            io,
            stream_index,
            encoder_time_base,
            stream_time_base: encoder_time_base,
            resolution: settings.resolution,
            next_pts: 0,
            packets_written: 0,
            finished: false,
        };

        if let Err(error) = muxer.output.write_header() {
            muxer.finished = true;
            return Err(error.into());
        }
        // The container may pick its own stream time base while writing the header.
        if let Some(stream) = muxer.output.stream(stream_index) {
            muxer.stream_time_base = stream.time_base();
        }

        tracing::debug!(
            encoder = %settings.encoder,
            resolution = ?settings.resolution,
            time_base = ?muxer.stream_time_base,
            "muxer opened"
        );
        Ok(muxer)
    }

    fn add_video_stream(
        output: &mut Output,
        settings: &VideoEncoderSettings,
    ) -> Result<(ffmpeg_next::encoder::video::Encoder, usize, Rational)> {
        let codec = ffmpeg_next::encoder::find_by_name(&settings.encoder)
            .ok_or_else(|| OpenError::UnsupportedCodec(settings.encoder.clone()))?;
        if settings.frame_rate.fps().is_none() {
            return Err(Error::Config("encoder frame rate must be positive".into()));
        }
        let frame_rate = Rational::new(settings.frame_rate.numerator(), settings.frame_rate.denominator());
        let encoder_time_base = frame_rate.invert();

        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let mut stream = output.add_stream(codec)?;
        let stream_index = stream.index();

        let mut encoder = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(settings.resolution.width);
        encoder.set_height(settings.resolution.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_gop(settings.gop_size);
        encoder.set_max_b_frames(settings.max_b_frames);
        if global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder
            .open_as(codec)
            .map_err(|e| OpenError::UnsupportedCodec(format!("{}: {e}", settings.encoder)))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);
        stream.set_avg_frame_rate(frame_rate);

        Ok((encoder, stream_index, encoder_time_base))
    }

    /// A blank YUV 4:2:0 frame of the encoder's size.
    #[must_use]
    pub fn new_frame(&self) -> VideoFrame {
        VideoFrame::yuv420p(self.resolution.width, self.resolution.height)
    }

    /// Encodes `frame` as the next frame of the stream.
    ///
    /// Timestamps are assigned in presentation order, one frame period apart.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::EncodeFailed`] when the frame does not match
    /// the encoder or encoding fails, and [`Error::Io`] when writing fails.
    pub fn write_frame(&mut self, frame: &mut VideoFrame) -> Result<()> {
        if frame.resolution() != self.resolution || frame.format() != Pixel::YUV420P {
            return Err(DecodeError::EncodeFailed(format!(
                "expected {:?} yuv420p, got {:?} {:?}",
                self.resolution,
                frame.resolution(),
                frame.format()
            ))
            .into());
        }

        frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;
        self.encoder
            .send_frame(frame.as_inner())
            .map_err(|e| DecodeError::EncodeFailed(e.to_string()))?;
        self.write_pending_packets()
    }

    fn write_pending_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet.write_interleaved(&mut self.output)?;
                    self.packets_written += 1;
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => return Ok(()),
                Err(error) => return Err(DecodeError::EncodeFailed(error.to_string()).into()),
            }
        }
    }

    /// Frames accepted so far.
    #[must_use]
    pub fn frames_written(&self) -> i64 {
        self.next_pts
    }

    #[must_use]
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Drains the encoder, writes the trailer and closes the output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispose`] aggregating every failure; the output is
    /// released either way.
    pub fn finish(mut self) -> Result<()> {
        let mut failures = DisposeError::new();

        let drained = self
            .encoder
            .send_eof()
            .map_err(|e| Error::from(DecodeError::EncodeFailed(e.to_string())))
            .and_then(|()| self.write_pending_packets());
        failures.collect("encoder", drained);
        failures.collect("trailer", self.output.write_trailer().map_err(Error::from));
        self.finished = true;

        if let Some(mut io) = self.io.take() {
            io.flush();
            self.detach_io();
            failures.collect("byte sink", io.close());
        }

        tracing::debug!(frames = self.next_pts, packets = self.packets_written, "muxer finished");
        failures.into_result()
    }

    /// Unhooks the custom AVIO context so Output's destructor leaves it alone.
    fn detach_io(&mut self) {
        // SAFETY: Clearing `pb` on an owned format context.
        unsafe { (*self.output.as_mut_ptr()).pb = ptr::null_mut() };
    }
}

impl Drop for Muxer {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("muxer dropped without finish; output is incomplete");
        }
        if self.io.is_some() {
            self.detach_io();
        }
    }
}
