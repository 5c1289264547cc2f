// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` container demuxer.
//!
//! Opens a container from a file path or from any [`ByteSource`], captures
//! an immutable [`StreamInfo`] per stream, and reads packets into a reused
//! [`FfmpegPacket`].

use std::ffi::{c_int, CString};
use std::path::Path;
use std::ptr;

use ffmpeg_next::ffi;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::stream::Disposition;
use ffmpeg_next::util::error::{EAGAIN, ENOENT, ENOMEM};

use super::io::IoContext;
use super::packet::FfmpegPacket;
use crate::application::port::{ByteSource, Demuxer};
use crate::domain::media::{MediaType, Resolution, StreamInfo};
use crate::domain::time::{secs_to_micros, FrameRate, TimeBase};
use crate::error::{DisposeError, Error, OpenError, Result};

/// Demuxer over an `FFmpeg` format context.
pub struct FfmpegDemuxer {
    // Declared before `io`: the format context must close before its AVIO
    // context is freed.
    input: Input,
    io: Option<IoContext>,
    streams: Vec<StreamInfo>,
    seekable: bool,
}

// SAFETY: The format context and AVIO context are exclusively owned and only
// used through `&mut self`; a demuxer is driven by one thread at a time.
unsafe impl Send for FfmpegDemuxer {}

impl FfmpegDemuxer {
    /// Opens the container at `path` and reads its stream headers.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::NotFound`] for missing files, and
    /// [`OpenError::UnsupportedContainer`] or [`OpenError::InvalidHeaders`]
    /// when probing fails.
    pub fn open(path: &Path) -> Result<Self> {
        super::init_ffmpeg()?;

        if !path.exists() {
            return Err(OpenError::NotFound(path.display().to_string()).into());
        }

        let input = ffmpeg_next::format::input(&path).map_err(open_error)?;
        tracing::debug!(path = %path.display(), format = input.format().name(), "container opened");
        Ok(Self::from_input(input, None))
    }

    /// Opens a container read through `source`.
    ///
    /// `format_hint` names the container (e.g. `"mp4"`) when probing alone is
    /// not enough. Non-seekable sources open fine but report
    /// `Ok(false)` from [`Demuxer::seek`].
    ///
    /// # Errors
    ///
    /// Same as [`FfmpegDemuxer::open`], plus [`Error::ResourceExhausted`] when
    /// the native contexts cannot be allocated.
    pub fn open_source(source: Box<dyn ByteSource>, format_hint: Option<&str>) -> Result<Self> {
        super::init_ffmpeg()?;

        let mut io = IoContext::new(source, false)?;
        let input_format = match format_hint {
            Some(name) => find_input_format(name)?,
            None => ptr::null(),
        };

        // SAFETY: The format context is allocated here and handed to
        // avformat_open_input, which frees it on failure. The AVIO context
        // outlives it because both end up in the returned demuxer, with the
        // format context dropped first.
        let input = unsafe {
            let mut ctx = ffi::avformat_alloc_context();
            if ctx.is_null() {
                return Err(Error::ResourceExhausted("format context".to_string()));
            }
            (*ctx).pb = io.as_mut_ptr();
            #[allow(clippy::cast_possible_wrap)]
            {
                (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
            }

            let ret = ffi::avformat_open_input(&mut ctx, ptr::null(), input_format, ptr::null_mut());
            if ret < 0 {
                return Err(open_error(ffmpeg_next::Error::from(ret)));
            }

            let ret = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if ret < 0 {
                ffi::avformat_close_input(&mut ctx);
                return Err(open_error(ffmpeg_next::Error::from(ret)));
            }

            Input::wrap(ctx)
        };

        tracing::debug!(format = input.format().name(), "container opened from byte source");
        Ok(Self::from_input(input, Some(io)))
    }

    fn from_input(input: Input, io: Option<IoContext>) -> Self {
        let streams = input.streams().map(|stream| describe_stream(&stream)).collect();

        // SAFETY: Reading fields of the open format context.
        let seekable = unsafe {
            let pb = (*input.as_ptr()).pb;
            !pb.is_null() && (*pb).seekable != 0
        };

        Self {
            input,
            io,
            streams,
            seekable,
        }
    }

    /// True when [`Demuxer::seek`] can succeed.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Short name of the detected container format.
    #[must_use]
    pub fn format_name(&self) -> &str {
        self.input.format().name()
    }

    /// Native stream handle, used to open decoders.
    pub(crate) fn native_stream(&self, index: usize) -> Option<ffmpeg_next::format::stream::Stream<'_>> {
        self.input.stream(index)
    }
}

impl Demuxer for FfmpegDemuxer {
    type Packet = FfmpegPacket;

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    #[allow(clippy::cast_precision_loss)]
    fn duration_secs(&self) -> f64 {
        let duration = self.input.duration();
        if duration > 0 {
            duration as f64 / f64::from(ffi::AV_TIME_BASE)
        } else {
            0.0
        }
    }

    fn new_packet(&self) -> FfmpegPacket {
        FfmpegPacket::empty()
    }

    fn read(&mut self, packet: &mut FfmpegPacket) -> Result<bool> {
        loop {
            packet.clear();
            match packet.as_inner_mut().read(&mut self.input) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn seek(&mut self, stream: &StreamInfo, secs: f64) -> Result<bool> {
        if !self.seekable {
            return Ok(false);
        }

        // Container-level seek in AV_TIME_BASE units, landing on the last
        // keyframe at or before the target.
        let timestamp = secs_to_micros(secs.max(0.0));
        self.input.seek(timestamp, ..timestamp).map_err(|error| {
            tracing::warn!(stream = stream.index, secs, %error, "demuxer seek failed");
            Error::from(error)
        })?;
        Ok(true)
    }

    fn close(self) -> Result<()> {
        let mut failures = DisposeError::new();
        let Self { input, io, .. } = self;
        drop(input);
        if let Some(io) = io {
            failures.collect("byte source", io.close());
        }
        failures.into_result()
    }
}

fn describe_stream(stream: &ffmpeg_next::format::stream::Stream<'_>) -> StreamInfo {
    let params = stream.parameters();
    let media_type = match params.medium() {
        ffmpeg_next::media::Type::Video => MediaType::Video,
        ffmpeg_next::media::Type::Audio => MediaType::Audio,
        ffmpeg_next::media::Type::Subtitle => MediaType::Subtitle,
        ffmpeg_next::media::Type::Data => MediaType::Data,
        ffmpeg_next::media::Type::Attachment => MediaType::Attachment,
        ffmpeg_next::media::Type::Unknown => MediaType::Unknown,
    };

    // SAFETY: Reading plain fields of the stream's codec parameters.
    let (width, height, bit_rate) = unsafe {
        let par = params.as_ptr();
        ((*par).width, (*par).height, (*par).bit_rate)
    };

    let resolution = (media_type == MediaType::Video)
        .then(|| Resolution::new(u32::try_from(width).unwrap_or(0), u32::try_from(height).unwrap_or(0)))
        .filter(|r| !r.is_empty());

    let time_base = stream.time_base();
    let mut frame_rate = stream.avg_frame_rate();
    if frame_rate.numerator() == 0 || frame_rate.denominator() == 0 {
        frame_rate = stream.rate();
    }

    let duration = stream.duration();

    StreamInfo {
        index: stream.index(),
        media_type,
        time_base: TimeBase::new(time_base.numerator(), time_base.denominator()),
        avg_frame_rate: FrameRate::new(frame_rate.numerator(), frame_rate.denominator()),
        duration_ticks: (duration > 0 && duration != ffi::AV_NOPTS_VALUE).then_some(duration),
        resolution,
        bit_rate: u64::try_from(bit_rate).unwrap_or(0),
        codec_name: params.id().name().to_string(),
        attached_picture: stream.disposition().contains(Disposition::ATTACHED_PIC),
    }
}

fn find_input_format(name: &str) -> Result<*const ffi::AVInputFormat> {
    let c_name = CString::new(name).map_err(|_| OpenError::UnsupportedContainer(name.to_string()))?;
    // SAFETY: av_find_input_format only reads the NUL-terminated name.
    let format = unsafe { ffi::av_find_input_format(c_name.as_ptr()) };
    if format.is_null() {
        Err(OpenError::UnsupportedContainer(name.to_string()).into())
    } else {
        Ok(format)
    }
}

/// Maps an open failure onto the error taxonomy.
pub(crate) fn open_error(error: ffmpeg_next::Error) -> Error {
    match error {
        ffmpeg_next::Error::Other { errno } if errno == ENOENT => {
            OpenError::NotFound(error.to_string()).into()
        }
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => {
            Error::ResourceExhausted(error.to_string())
        }
        ffmpeg_next::Error::InvalidData | ffmpeg_next::Error::DemuxerNotFound => {
            OpenError::UnsupportedContainer(error.to_string()).into()
        }
        ffmpeg_next::Error::DecoderNotFound => OpenError::UnsupportedCodec(error.to_string()).into(),
        other => OpenError::from_message(&other.to_string()).into(),
    }
}
