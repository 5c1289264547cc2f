// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` video decoder with optional hardware acceleration.
//!
//! Hardware decoding is attempted only for streams whose software pixel
//! format is in [`SAFE_SOFTWARE_FORMATS`]. Candidate devices are tried in the
//! configured order; the first one that can be created, fits the stream and
//! opens with the codec wins. Any failure along the way falls back to
//! software decoding without surfacing an error.

use std::ffi::{c_int, c_void};

use ffmpeg_next::codec::Parameters;
use ffmpeg_next::ffi;
use ffmpeg_next::util::error::{EAGAIN, ENOMEM};

use super::demuxer::FfmpegDemuxer;
use super::frame::VideoFrame;
use super::hardware::{self, FramePool, HardwareDevice, Negotiation};
use super::packet::FfmpegPacket;
use crate::application::port::VideoDecoder;
use crate::config::DecoderConfig;
use crate::domain::hardware::HardwareDeviceKind;
use crate::domain::media::StreamInfo;
use crate::error::{DecodeError, Error, OpenError, Result};

/// Software formats accelerators reliably decode: 8/10-bit YUV 4:2:0.
pub const SAFE_SOFTWARE_FORMATS: [ffi::AVPixelFormat; 5] = [
    ffi::AVPixelFormat::AV_PIX_FMT_YUV420P,
    ffi::AVPixelFormat::AV_PIX_FMT_YUVJ420P,
    ffi::AVPixelFormat::AV_PIX_FMT_NV12,
    ffi::AVPixelFormat::AV_PIX_FMT_YUV420P10LE,
    ffi::AVPixelFormat::AV_PIX_FMT_P010LE,
];

/// Device, negotiation state and pool for one hardware-decoding codec.
struct HardwareSession {
    device: HardwareDevice,
    /// Owned; referenced by the codec context's `opaque`.
    negotiation: *mut Negotiation,
}

impl HardwareSession {
    fn negotiation(&self) -> &Negotiation {
        // SAFETY: Allocated with Box::into_raw and freed only in Drop.
        unsafe { &*self.negotiation }
    }
}

impl Drop for HardwareSession {
    fn drop(&mut self) {
        // SAFETY: The codec context that referenced this pointer is dropped
        // before the session (field order in FfmpegDecoder).
        unsafe { drop(Box::from_raw(self.negotiation)) };
    }
}

/// Video decoder over an `FFmpeg` codec context.
pub struct FfmpegDecoder {
    // Declared first so the codec closes before the hardware session it
    // points into.
    decoder: ffmpeg_next::decoder::Video,
    hardware: Option<HardwareSession>,
}

// SAFETY: The codec context, device and negotiation state are exclusively
// owned and only used through `&mut self` from one thread at a time.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    /// Opens a decoder for `stream` of `demuxer`.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::UnsupportedCodec`] when no decoder exists for the
    /// stream's codec, or [`OpenError::InvalidHeaders`] when its parameters
    /// are unusable.
    pub fn open(demuxer: &FfmpegDemuxer, stream: &StreamInfo, config: &DecoderConfig) -> Result<Self> {
        let native = demuxer
            .native_stream(stream.index)
            .ok_or_else(|| OpenError::InvalidHeaders(format!("stream {} missing", stream.index)))?;
        let parameters = native.parameters();
        let time_base = native.time_base();
        let codec = ffmpeg_next::decoder::find(parameters.id())
            .ok_or_else(|| OpenError::UnsupportedCodec(stream.codec_name.clone()))?;

        if config.hardware.enabled && is_safe_software_format(&parameters) {
            if let Some(decoder) = Self::open_hardware(&parameters, time_base, codec, stream, config) {
                return Ok(decoder);
            }
        }

        let context = new_context(&parameters, time_base)?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|error| OpenError::UnsupportedCodec(format!("{}: {error}", stream.codec_name)))?;
        tracing::debug!(codec = %stream.codec_name, "software decoder opened");

        Ok(Self {
            decoder,
            hardware: None,
        })
    }

    /// Tries each preferred device in order; `None` means decode in software.
    fn open_hardware(
        parameters: &Parameters,
        time_base: ffmpeg_next::Rational,
        codec: ffmpeg_next::Codec,
        stream: &StreamInfo,
        config: &DecoderConfig,
    ) -> Option<Self> {
        for &kind in &config.hardware.preferred_devices {
            let Some(hw_format) = hardware::hardware_pixel_format(codec, kind) else {
                tracing::debug!(%kind, codec = %stream.codec_name, "codec has no hardware config");
                continue;
            };
            let Some(device) = HardwareDevice::create(kind) else {
                continue;
            };
            if let (Some(constraints), Some(resolution)) = (device.constraints(), stream.resolution) {
                if !constraints.accepts(resolution) {
                    tracing::debug!(%kind, ?resolution, max = ?constraints.max, "stream exceeds device limits");
                    continue;
                }
            }

            match Self::open_with_device(parameters, time_base, device, hw_format, config) {
                Ok(decoder) => {
                    tracing::info!(%kind, codec = %stream.codec_name, "hardware decoding enabled");
                    return Some(decoder);
                }
                Err(error) => {
                    tracing::debug!(%kind, %error, "hardware decoder failed to open");
                }
            }
        }
        None
    }

    fn open_with_device(
        parameters: &Parameters,
        time_base: ffmpeg_next::Rational,
        device: HardwareDevice,
        hw_format: ffi::AVPixelFormat,
        config: &DecoderConfig,
    ) -> Result<Self> {
        let mut context = new_context(parameters, time_base)?;
        let negotiation = Box::into_raw(Box::new(Negotiation::new(&device, hw_format)));
        // Owns the negotiation state from here on, including on failure.
        let session = HardwareSession { device, negotiation };

        // SAFETY: The context is not open yet; the fields set here are read
        // by avcodec_open2 and the get_format callback. The negotiation state
        // outlives the codec context (see HardwareSession).
        unsafe {
            let ctx = context.as_mut_ptr();
            (*ctx).hw_device_ctx = session.device.new_ref();
            if (*ctx).hw_device_ctx.is_null() {
                return Err(Error::ResourceExhausted("hardware device reference".into()));
            }
            (*ctx).opaque = negotiation.cast::<c_void>();
            (*ctx).get_format = Some(hardware::get_format);
            // Every cached frame pins one surface.
            (*ctx).extra_hw_frames = c_int::try_from(config.frame_cache_capacity).unwrap_or(0);
        }

        let decoder = context.decoder().video()?;
        Ok(Self {
            decoder,
            hardware: Some(session),
        })
    }

    /// Pool of hardware surfaces, once the codec negotiated one.
    #[must_use]
    pub fn frame_pool(&self) -> Option<&FramePool> {
        self.hardware.as_ref().and_then(|h| h.negotiation().pool())
    }

    /// Software pixel format of decoded frames (the download format for
    /// hardware frames).
    #[must_use]
    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.decoder.format()
    }
}

impl VideoDecoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = VideoFrame;

    fn new_frame(&self) -> VideoFrame {
        VideoFrame::empty()
    }

    fn hardware_device(&self) -> Option<HardwareDeviceKind> {
        self.hardware
            .as_ref()
            .filter(|h| !h.negotiation().fell_back())
            .map(|h| h.device.kind())
    }

    fn send_packet(&mut self, packet: &FfmpegPacket) -> Result<()> {
        match self.decoder.send_packet(packet.as_inner()) {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(error) => Err(codec_error(error, DecodeError::PacketRejected)),
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(error) => Err(codec_error(error, DecodeError::PacketRejected)),
        }
    }

    fn receive_frame(&mut self, frame: &mut VideoFrame) -> Result<bool> {
        match self.decoder.receive_frame(frame.as_inner_mut()) {
            Ok(()) => Ok(true),
            Err(ffmpeg_next::Error::Eof) => Ok(false),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(false),
            Err(error) => Err(codec_error(error, DecodeError::FrameFailed)),
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn close(self) -> Result<()> {
        let hardware = self.hardware.as_ref().map(|h| h.device.kind());
        drop(self);
        tracing::debug!(?hardware, "decoder closed");
        Ok(())
    }
}

fn new_context(
    parameters: &Parameters,
    time_base: ffmpeg_next::Rational,
) -> Result<ffmpeg_next::codec::context::Context> {
    let mut context = ffmpeg_next::codec::context::Context::from_parameters(parameters.clone())
        .map_err(|error| OpenError::InvalidHeaders(error.to_string()))?;
    // SAFETY: Sets a plain field on an unopened context.
    unsafe {
        (*context.as_mut_ptr()).pkt_timebase = time_base.into();
    }
    Ok(context)
}

fn is_safe_software_format(parameters: &Parameters) -> bool {
    // SAFETY: Reads a plain field of the codec parameters.
    let format = unsafe { (*parameters.as_ptr()).format };
    SAFE_SOFTWARE_FORMATS
        .iter()
        .any(|safe| *safe as c_int == format)
}

fn codec_error(error: ffmpeg_next::Error, kind: fn(String) -> DecodeError) -> Error {
    match error {
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => {
            Error::ResourceExhausted(error.to_string())
        }
        other => kind(other.to_string()).into(),
    }
}
