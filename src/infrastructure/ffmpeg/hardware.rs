// SPDX-License-Identifier: MPL-2.0
//! Hardware decode devices, frame pools and format negotiation.
//!
//! A [`HardwareDevice`] wraps an `AVHWDeviceContext` reference. Decoders
//! attach it to their codec context and negotiate a hardware pixel format
//! through [`get_format`]; when negotiation succeeds a [`FramePool`] is sized
//! so the frame cache can hold decoded surfaces without starving the codec.
//!
//! Every failure in this module degrades to software decoding. Nothing here
//! returns an error.

use std::ffi::{c_int, CStr, CString};
use std::ptr;

use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;

use crate::domain::hardware::HardwareDeviceKind;
use crate::domain::media::Resolution;

/// `AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX`.
const HW_CONFIG_METHOD_DEVICE_CTX: c_int = 0x01;

/// `AV_PIX_FMT_FLAG_HWACCEL`.
const PIX_FMT_FLAG_HWACCEL: u64 = 1 << 3;

/// Device kinds compiled into the linked `FFmpeg`.
#[must_use]
pub fn available_kinds() -> Vec<HardwareDeviceKind> {
    let mut kinds = Vec::new();
    let mut device_type = ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;
    loop {
        // SAFETY: Iteration over a static table; the returned name is static.
        let name = unsafe {
            device_type = ffi::av_hwdevice_iterate_types(device_type);
            if device_type == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                break;
            }
            let name = ffi::av_hwdevice_get_type_name(device_type);
            if name.is_null() {
                continue;
            }
            CStr::from_ptr(name).to_string_lossy()
        };
        if let Some(kind) = HardwareDeviceKind::from_ffmpeg_name(&name) {
            kinds.push(kind);
        }
    }
    kinds
}

/// Native device type for `kind`, if the linked `FFmpeg` supports it.
#[must_use]
pub fn device_type(kind: HardwareDeviceKind) -> Option<ffi::AVHWDeviceType> {
    let name = CString::new(kind.ffmpeg_name()).ok()?;
    // SAFETY: The lookup only reads the NUL-terminated name.
    let device_type = unsafe { ffi::av_hwdevice_find_type_by_name(name.as_ptr()) };
    (device_type != ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE).then_some(device_type)
}

/// Hardware pixel format `codec` produces on `kind` through a device context.
pub(crate) fn hardware_pixel_format(
    codec: ffmpeg_next::Codec,
    kind: HardwareDeviceKind,
) -> Option<ffi::AVPixelFormat> {
    let wanted = device_type(kind)?;
    let mut index = 0;
    loop {
        // SAFETY: avcodec_get_hw_config returns null past the last entry;
        // entries are static codec descriptors.
        let config = unsafe { ffi::avcodec_get_hw_config(codec.as_ptr(), index) };
        if config.is_null() {
            return None;
        }
        // SAFETY: Non-null entries are valid for the lifetime of the codec.
        let (methods, config_type, pix_fmt) =
            unsafe { ((*config).methods, (*config).device_type, (*config).pix_fmt) };
        if methods & HW_CONFIG_METHOD_DEVICE_CTX != 0 && config_type == wanted {
            return Some(pix_fmt);
        }
        index += 1;
    }
}

/// True for pixel formats that only describe accelerator surfaces.
pub(crate) fn is_hardware_format(format: ffi::AVPixelFormat) -> bool {
    // SAFETY: av_pix_fmt_desc_get returns a static descriptor or null.
    unsafe {
        let desc = ffi::av_pix_fmt_desc_get(format);
        !desc.is_null() && (*desc).flags & PIX_FMT_FLAG_HWACCEL != 0
    }
}

/// Frame size limits reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConstraints {
    pub min: Resolution,
    pub max: Resolution,
    /// Host formats the device can download into.
    pub software_formats: Vec<Pixel>,
}

impl FrameConstraints {
    /// True when frames of `resolution` fit within the device limits.
    #[must_use]
    pub fn accepts(&self, resolution: Resolution) -> bool {
        resolution.width >= self.min.width
            && resolution.height >= self.min.height
            && resolution.width <= self.max.width
            && resolution.height <= self.max.height
    }
}

/// An open hardware acceleration device.
///
/// Owned by exactly one decoder. The codec context holds its own reference,
/// so dropping this value never invalidates frames still in flight.
pub struct HardwareDevice {
    kind: HardwareDeviceKind,
    ptr: *mut ffi::AVBufferRef,
}

// SAFETY: HardwareDevice is an RAII wrapper with exclusive ownership of one
// AVBufferRef. It is only touched by the decoder that owns it, which is in
// turn driven by a single thread at a time.
unsafe impl Send for HardwareDevice {}

impl HardwareDevice {
    /// Creates the default device of `kind`.
    ///
    /// Returns `None` when the device type is unknown to the linked `FFmpeg`
    /// or no such device exists on this machine.
    #[must_use]
    pub fn create(kind: HardwareDeviceKind) -> Option<Self> {
        let device_type = device_type(kind)?;
        let mut ptr: *mut ffi::AVBufferRef = ptr::null_mut();

        // SAFETY: A null device name and options select the default device.
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(&mut ptr, device_type, ptr::null(), ptr::null_mut(), 0)
        };

        if ret < 0 || ptr.is_null() {
            tracing::debug!(%kind, error = ret, "hardware device unavailable");
            return None;
        }
        tracing::debug!(%kind, "hardware device created");
        Some(Self { kind, ptr })
    }

    #[must_use]
    pub fn kind(&self) -> HardwareDeviceKind {
        self.kind
    }

    /// Frame limits of this device, if it reports any.
    #[must_use]
    pub fn constraints(&self) -> Option<FrameConstraints> {
        // SAFETY: The constraints struct is allocated by FFmpeg, read, then
        // released with av_hwframe_constraints_free.
        unsafe {
            let mut raw = ffi::av_hwdevice_get_hwframe_constraints(self.ptr, ptr::null());
            if raw.is_null() {
                return None;
            }

            let dimension = |value: c_int| u32::try_from(value).unwrap_or(0);
            let mut software_formats = Vec::new();
            let mut format = (*raw).valid_sw_formats;
            if !format.is_null() {
                while *format != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
                    software_formats.push(Pixel::from(*format));
                    format = format.add(1);
                }
            }

            let max_width = if (*raw).max_width > 0 { dimension((*raw).max_width) } else { u32::MAX };
            let max_height = if (*raw).max_height > 0 { dimension((*raw).max_height) } else { u32::MAX };
            let constraints = FrameConstraints {
                min: Resolution::new(dimension((*raw).min_width), dimension((*raw).min_height)),
                max: Resolution::new(max_width, max_height),
                software_formats,
            };

            ffi::av_hwframe_constraints_free(&mut raw);
            Some(constraints)
        }
    }

    /// A new reference for a codec context to own.
    pub(crate) fn new_ref(&self) -> *mut ffi::AVBufferRef {
        // SAFETY: ptr is a live buffer reference owned by self.
        unsafe { ffi::av_buffer_ref(self.ptr) }
    }
}

impl Drop for HardwareDevice {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Releases the reference taken in `create`.
            unsafe { ffi::av_buffer_unref(&mut self.ptr) };
        }
    }
}

/// Pool of hardware surfaces the decoder writes into.
///
/// Sized to the codec's own needs plus the frame cache capacity, since every
/// cached hardware frame pins one surface.
pub struct FramePool {
    ptr: *mut ffi::AVBufferRef,
}

// SAFETY: Same ownership rules as HardwareDevice.
unsafe impl Send for FramePool {}

impl FramePool {
    /// Builds and initializes a pool for `ctx` and attaches it.
    ///
    /// `avcodec_get_hw_frames_parameters` already adds the context's
    /// `extra_hw_frames` to the pool size.
    ///
    /// # Safety
    ///
    /// `ctx` must be a codec context inside its `get_format` callback and
    /// `device` a live device reference.
    unsafe fn attach(
        ctx: *mut ffi::AVCodecContext,
        device: *mut ffi::AVBufferRef,
        hw_format: ffi::AVPixelFormat,
    ) -> Option<Self> {
        let mut frames_ref: *mut ffi::AVBufferRef = ptr::null_mut();
        if ffi::avcodec_get_hw_frames_parameters(ctx, device, hw_format, &mut frames_ref) < 0 {
            return None;
        }

        if ffi::av_hwframe_ctx_init(frames_ref) < 0 {
            ffi::av_buffer_unref(&mut frames_ref);
            return None;
        }

        let own = ffi::av_buffer_ref(frames_ref);
        if own.is_null() {
            ffi::av_buffer_unref(&mut frames_ref);
            return None;
        }
        ffi::av_buffer_unref(&mut (*ctx).hw_frames_ctx);
        (*ctx).hw_frames_ctx = frames_ref;
        Some(Self { ptr: own })
    }

    fn frames(&self) -> &ffi::AVHWFramesContext {
        // SAFETY: An initialized frames reference always wraps an AVHWFramesContext.
        unsafe { &*(*self.ptr).data.cast::<ffi::AVHWFramesContext>() }
    }

    /// Surfaces preallocated by the pool (0 for dynamically sized pools).
    #[must_use]
    pub fn initial_size(&self) -> u32 {
        u32::try_from(self.frames().initial_pool_size).unwrap_or(0)
    }

    /// Host format frames download into.
    #[must_use]
    pub fn software_format(&self) -> Pixel {
        Pixel::from(self.frames().sw_format)
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        let frames = self.frames();
        Resolution::new(
            u32::try_from(frames.width).unwrap_or(0),
            u32::try_from(frames.height).unwrap_or(0),
        )
    }
}

impl Drop for FramePool {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Releases the reference taken in `attach`.
            unsafe { ffi::av_buffer_unref(&mut self.ptr) };
        }
    }
}

/// State shared with [`get_format`] through the codec context's `opaque`.
pub(crate) struct Negotiation {
    hw_format: ffi::AVPixelFormat,
    /// Borrowed from the decoder's [`HardwareDevice`], which outlives the codec.
    device: *mut ffi::AVBufferRef,
    pool: Option<FramePool>,
    fell_back: bool,
}

impl Negotiation {
    pub(crate) fn new(device: &HardwareDevice, hw_format: ffi::AVPixelFormat) -> Self {
        Self {
            hw_format,
            device: device.ptr,
            pool: None,
            fell_back: false,
        }
    }

    /// True when the codec did not offer the hardware format and decodes in software.
    pub(crate) fn fell_back(&self) -> bool {
        self.fell_back
    }

    pub(crate) fn pool(&self) -> Option<&FramePool> {
        self.pool.as_ref()
    }
}

/// `get_format` callback: picks the negotiated hardware format when offered,
/// otherwise the first software format in the codec's list.
///
/// # Safety
///
/// Installed only on codec contexts whose `opaque` points at a live
/// [`Negotiation`] (or is null).
pub(crate) unsafe extern "C" fn get_format(
    ctx: *mut ffi::AVCodecContext,
    formats: *const ffi::AVPixelFormat,
) -> ffi::AVPixelFormat {
    let state = (*ctx).opaque.cast::<Negotiation>();
    let mut software = ffi::AVPixelFormat::AV_PIX_FMT_NONE;
    let mut cursor = formats;

    while *cursor != ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        let format = *cursor;
        if let Some(state) = state.as_mut() {
            if format == state.hw_format {
                // Called again on mid-stream parameter changes; the old pool
                // no longer matches the stream.
                state.pool = FramePool::attach(ctx, state.device, format);
                state.fell_back = false;
                return format;
            }
        }
        if software == ffi::AVPixelFormat::AV_PIX_FMT_NONE && !is_hardware_format(format) {
            software = format;
        }
        cursor = cursor.add(1);
    }

    if let Some(state) = state.as_mut() {
        state.fell_back = true;
    }
    software
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_accept_within_bounds() {
        let constraints = FrameConstraints {
            min: Resolution::new(16, 16),
            max: Resolution::new(4096, 2304),
            software_formats: vec![Pixel::NV12],
        };
        assert!(constraints.accepts(Resolution::new(1920, 1080)));
        assert!(!constraints.accepts(Resolution::new(8192, 4320)));
        assert!(!constraints.accepts(Resolution::new(8, 8)));
    }

    #[test]
    fn available_kinds_are_known_names() {
        super::super::init_ffmpeg().expect("ffmpeg init");
        for kind in available_kinds() {
            assert!(device_type(kind).is_some(), "{kind} listed but not found");
        }
    }

    #[test]
    fn hardware_formats_are_flagged() {
        assert!(is_hardware_format(ffi::AVPixelFormat::AV_PIX_FMT_VAAPI));
        assert!(is_hardware_format(ffi::AVPixelFormat::AV_PIX_FMT_CUDA));
        assert!(!is_hardware_format(ffi::AVPixelFormat::AV_PIX_FMT_YUV420P));
        assert!(!is_hardware_format(ffi::AVPixelFormat::AV_PIX_FMT_NV12));
    }
}
