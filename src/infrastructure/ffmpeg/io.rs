// SPDX-License-Identifier: MPL-2.0
//! AVIO glue exposing a [`ByteSource`] to FFmpeg's container layer.
//!
//! FFmpeg drives the source through three C callbacks (read, write, seek).
//! The callbacks never unwind: I/O failures and panics inside the source are
//! turned into the negative error codes `libavformat` expects.

use std::ffi::{c_int, c_void};
use std::io::SeekFrom;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use ffmpeg_next::ffi;
use ffmpeg_next::util::error::{EIO, ENOSYS};

use crate::application::port::ByteSource;
use crate::error::{Error, Result};

/// Size of the buffer FFmpeg reads through.
const IO_BUFFER_SIZE: usize = 64 * 1024;

/// `whence` flag asking for the stream size instead of a seek.
const AVSEEK_SIZE: c_int = 0x10000;
/// `whence` flag allowing an expensive seek; irrelevant for byte sources.
const AVSEEK_FORCE: c_int = 0x20000;

const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;

/// Owns an `AVIOContext` and the byte source behind it.
///
/// Must outlive the format context it is attached to.
pub(crate) struct IoContext {
    ptr: *mut ffi::AVIOContext,
    opaque: *mut Box<dyn ByteSource>,
}

// SAFETY: The AVIO context and the boxed source are exclusively owned by this
// value and only touched through `&mut self` or by FFmpeg calls made while the
// owning demuxer/muxer is borrowed mutably. `ByteSource` itself is `Send`.
unsafe impl Send for IoContext {}

impl IoContext {
    /// Wraps `source` in a new AVIO context.
    ///
    /// With `writable` the write callback is installed (muxing). Non-seekable
    /// sources are flagged so FFmpeg never tries to seek them.
    pub(crate) fn new(source: Box<dyn ByteSource>, writable: bool) -> Result<Self> {
        let seekable = source.is_seekable();
        let opaque = Box::into_raw(Box::new(source));

        // SAFETY: The buffer is allocated with av_malloc as avio_alloc_context
        // requires; ownership moves into the context on success.
        unsafe {
            let buffer = ffi::av_malloc(IO_BUFFER_SIZE).cast::<u8>();
            if buffer.is_null() {
                drop(Box::from_raw(opaque));
                return Err(Error::ResourceExhausted("AVIO buffer".to_string()));
            }

            // Allow cast_possible_truncation/wrap: the buffer size is a small constant.
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let ptr = ffi::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                c_int::from(writable),
                opaque.cast::<c_void>(),
                Some(read_packet),
                if writable { Some(write_packet) } else { None },
                Some(seek),
            );
            if ptr.is_null() {
                ffi::av_free(buffer.cast::<c_void>());
                drop(Box::from_raw(opaque));
                return Err(Error::ResourceExhausted("AVIO context".to_string()));
            }

            if !seekable {
                (*ptr).seekable = 0;
            }

            Ok(Self { ptr, opaque })
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut ffi::AVIOContext {
        self.ptr
    }

    /// Flushes buffered writes into the source.
    pub(crate) fn flush(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: ptr is a live AVIO context owned by self.
            unsafe { ffi::avio_flush(self.ptr) };
        }
    }

    /// Frees the AVIO context and closes the byte source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the source fails to close.
    pub(crate) fn close(mut self) -> Result<()> {
        self.flush();
        self.free_context();
        let source = std::mem::replace(&mut self.opaque, ptr::null_mut());
        if source.is_null() {
            return Ok(());
        }
        // SAFETY: opaque came from Box::into_raw in `new` and is reclaimed once.
        let mut source = unsafe { Box::from_raw(source) };
        source.close().map_err(Error::from)
    }

    fn free_context(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // SAFETY: The context owns its (possibly reallocated) buffer, which
        // must be freed separately before the context itself.
        unsafe {
            ffi::av_freep(ptr::addr_of_mut!((*self.ptr).buffer).cast::<c_void>());
            ffi::avio_context_free(&mut self.ptr);
        }
        self.ptr = ptr::null_mut();
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        self.free_context();
        if !self.opaque.is_null() {
            // SAFETY: see `close`; the pointer is reclaimed exactly once.
            let mut source = unsafe { Box::from_raw(self.opaque) };
            self.opaque = ptr::null_mut();
            if let Err(error) = source.close() {
                tracing::warn!(%error, "byte source failed to close during drop");
            }
        }
    }
}

/// Runs `f` on the source behind `opaque`, mapping failures to `fallback`.
///
/// # Safety
///
/// `opaque` must be the pointer registered in [`IoContext::new`].
unsafe fn with_source<T>(
    opaque: *mut c_void,
    fallback: T,
    f: impl FnOnce(&mut dyn ByteSource) -> T,
) -> T {
    let source = &mut *opaque.cast::<Box<dyn ByteSource>>();
    catch_unwind(AssertUnwindSafe(|| f(source.as_mut()))).unwrap_or_else(|_| {
        tracing::warn!("byte source panicked inside an FFmpeg callback");
        fallback
    })
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    let Ok(len) = usize::try_from(buf_size) else {
        return ffi::AVERROR(EIO);
    };
    let out = std::slice::from_raw_parts_mut(buf, len);
    with_source(opaque, ffi::AVERROR(EIO), |source| match source.read(out) {
        Ok(0) => ffi::AVERROR_EOF,
        Ok(n) => c_int::try_from(n).unwrap_or(buf_size),
        Err(error) => {
            tracing::debug!(%error, "byte source read failed");
            ffi::AVERROR(EIO)
        }
    })
}

unsafe extern "C" fn write_packet(opaque: *mut c_void, buf: *const u8, buf_size: c_int) -> c_int {
    let Ok(len) = usize::try_from(buf_size) else {
        return ffi::AVERROR(EIO);
    };
    let data = std::slice::from_raw_parts(buf, len);
    with_source(opaque, ffi::AVERROR(EIO), |source| {
        let mut written = 0;
        while written < data.len() {
            match source.write(&data[written..]) {
                Ok(0) => return ffi::AVERROR(EIO),
                Ok(n) => written += n,
                Err(error) => {
                    tracing::debug!(%error, "byte source write failed");
                    return ffi::AVERROR(EIO);
                }
            }
        }
        buf_size
    })
}

unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let failure = i64::from(ffi::AVERROR(EIO));
    with_source(opaque, failure, |source| {
        if whence & AVSEEK_SIZE != 0 {
            return source
                .len()
                .and_then(|len| i64::try_from(len).ok())
                .unwrap_or(i64::from(ffi::AVERROR(ENOSYS)));
        }
        if !source.is_seekable() {
            return i64::from(ffi::AVERROR(ENOSYS));
        }

        let target = match whence & !AVSEEK_FORCE {
            SEEK_SET => match u64::try_from(offset) {
                Ok(offset) => SeekFrom::Start(offset),
                Err(_) => return failure,
            },
            SEEK_CUR => SeekFrom::Current(offset),
            SEEK_END => SeekFrom::End(offset),
            _ => return i64::from(ffi::AVERROR(ENOSYS)),
        };

        match source.seek(target) {
            Ok(position) => i64::try_from(position).unwrap_or(failure),
            Err(error) => {
                tracing::debug!(%error, "byte source seek failed");
                failure
            }
        }
    })
}
