// SPDX-License-Identifier: MPL-2.0
//! Media resource lifecycle and the render-facing interface.
//!
//! A [`MediaResource`] owns exactly one demuxer and, lazily, one
//! [`FrameResolver`] (decoder, frame cache and converter). The resolver is
//! created on the first frame request and can be released on its own under
//! memory pressure while stream metadata stays available.
//!
//! A resource whose file fails to open is *offline*: every frame request
//! returns `Ok(None)` until a new path is set.
//!
//! # Example
//!
//! ```ignore
//! use seekframe::infrastructure::ffmpeg::open_media;
//!
//! let mut media = open_media("clip.mp4")?;
//! if let Some(frame) = media.get_frame_at(1.5)? {
//!     println!("{}x{} @ {:.3}s", frame.width(), frame.height(), frame.pts_secs());
//! }
//! media.dispose()?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::port::{Demuxer, MediaBackend};
use crate::application::resolver::{FrameResolver, ResolveStats, StartPosition};
use crate::config::DecoderConfig;
use crate::domain::hardware::HardwareDeviceKind;
use crate::domain::media::{MediaType, PresentableFrame, Resolution, StreamInfo};
use crate::domain::time::secs_to_duration;
use crate::error::{DisposeError, Error, OpenError, Result};

/// A resource shared with a render thread; the mutex serializes frame requests.
pub type SharedMediaResource<B> = Arc<Mutex<MediaResource<B>>>;

/// Everything that exists only while the source is open.
struct OpenMedia<B: MediaBackend> {
    demuxer: B::Demuxer,
    video: Option<StreamInfo>,
    duration_secs: Option<f64>,
    resolver: Option<FrameResolver<B>>,
    /// No decoder has read from the demuxer yet.
    demuxer_untouched: bool,
}

impl<B: MediaBackend> OpenMedia<B> {
    fn new(demuxer: B::Demuxer) -> Self {
        let video = demuxer.find_best_stream(MediaType::Video).cloned();
        let container = demuxer.duration_secs();
        let duration_secs = video
            .as_ref()
            .and_then(StreamInfo::duration_secs)
            .or_else(|| (container > 0.0).then_some(container))
            .or_else(|| video.as_ref().filter(|s| s.attached_picture).map(|_| 0.0));

        if let Some(stream) = &video {
            tracing::info!(
                stream = stream.index,
                codec = %stream.codec_name,
                resolution = ?stream.resolution,
                fps = ?stream.avg_frame_rate.fps(),
                duration = ?duration_secs,
                "media opened"
            );
        } else {
            tracing::info!(streams = demuxer.streams().len(), "media opened without a video stream");
        }

        Self {
            demuxer,
            video,
            duration_secs,
            resolver: None,
            demuxer_untouched: true,
        }
    }

    fn close(self, failures: &mut DisposeError) {
        if let Some(resolver) = self.resolver {
            failures.collect("frame resolver", resolver.close());
        }
        failures.collect("demuxer", self.demuxer.close());
    }
}

/// One opened media file, as seen by the timeline and render layers.
pub struct MediaResource<B: MediaBackend> {
    backend: B,
    config: DecoderConfig,
    path: Option<PathBuf>,
    /// `None` while offline.
    media: Option<OpenMedia<B>>,
    last_error: Option<Error>,
    /// Last frame successfully returned.
    current: Option<PresentableFrame>,
    /// Statistics of resolvers already released.
    retired_stats: ResolveStats,
}

impl<B: MediaBackend> MediaResource<B> {
    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`OpenError`] if the file is missing, the container is not
    /// recognised or its headers cannot be read.
    pub fn open(backend: B, path: impl AsRef<Path>, config: DecoderConfig) -> Result<Self> {
        let resource = Self::open_or_offline(backend, path, config);
        if resource.is_offline() {
            return Err(resource
                .last_error
                .clone()
                .unwrap_or(Error::Open(OpenError::NoPath)));
        }
        Ok(resource)
    }

    /// Opens the file at `path`, producing an offline resource on failure.
    ///
    /// The failure is available from [`MediaResource::last_error`].
    pub fn open_or_offline(backend: B, path: impl AsRef<Path>, config: DecoderConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut resource = Self {
            backend,
            config: config.sanitized(),
            path: Some(path),
            media: None,
            last_error: None,
            current: None,
            retired_stats: ResolveStats::default(),
        };
        // Failure leaves the resource offline with the error recorded.
        let _ = resource.reopen();
        resource
    }

    /// Wraps a demuxer opened by other means (e.g. over a byte source).
    ///
    /// The resource has no path until [`MediaResource::set_path`] is called.
    pub fn from_demuxer(backend: B, demuxer: B::Demuxer, config: DecoderConfig) -> Self {
        Self {
            backend,
            config: config.sanitized(),
            path: None,
            media: Some(OpenMedia::new(demuxer)),
            last_error: None,
            current: None,
            retired_stats: ResolveStats::default(),
        }
    }

    fn reopen(&mut self) -> Result<()> {
        let opened = match &self.path {
            Some(path) => self.backend.open_demuxer(path),
            None => Err(OpenError::NoPath.into()),
        };
        match opened {
            Ok(demuxer) => {
                self.media = Some(OpenMedia::new(demuxer));
                self.last_error = None;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(path = ?self.path, %error, "media is offline");
                self.media = None;
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// The source file path, if the resource was opened from one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when the source could not be opened.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.media.is_none()
    }

    /// The error that took the resource offline.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The effective configuration, with out-of-range values clamped.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Every stream in the container (empty while offline).
    #[must_use]
    pub fn streams(&self) -> &[StreamInfo] {
        self.media.as_ref().map_or(&[], |media| media.demuxer.streams())
    }

    /// The video stream frames are resolved from.
    #[must_use]
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.media.as_ref().and_then(|media| media.video.as_ref())
    }

    /// Frame dimensions, or `None` without a video stream.
    #[must_use]
    pub fn resolution(&self) -> Option<Resolution> {
        self.video_stream().and_then(|stream| stream.resolution)
    }

    /// Media duration in seconds (0.0 when unknown or offline).
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.media
            .as_ref()
            .and_then(|media| media.duration_secs)
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        secs_to_duration(self.duration_secs())
    }

    /// True while a decoder is open.
    #[must_use]
    pub fn has_decoder(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|media| media.resolver.is_some())
    }

    /// The hardware device the open decoder uses, if any.
    #[must_use]
    pub fn hardware_device(&self) -> Option<HardwareDeviceKind> {
        self.media
            .as_ref()
            .and_then(|media| media.resolver.as_ref())
            .and_then(FrameResolver::hardware_device)
    }

    /// The last frame returned by [`MediaResource::get_frame_at`].
    #[must_use]
    pub fn current_frame(&self) -> Option<&PresentableFrame> {
        self.current.as_ref()
    }

    /// Work counters across every decoder this resource has opened.
    #[must_use]
    pub fn stats(&self) -> ResolveStats {
        let mut stats = self.retired_stats;
        if let Some(resolver) = self.media.as_ref().and_then(|m| m.resolver.as_ref()) {
            stats += resolver.stats();
        }
        stats
    }

    /// Returns the frame nearest to `secs`, opening the decoder on first use.
    ///
    /// Takes seconds as `f64` so negative and `NaN` timeline positions can be
    /// passed through and clamped; [`MediaResource::get_frame_at_duration`]
    /// accepts a [`Duration`].
    ///
    /// Returns `Ok(None)` when the resource is offline, has no video stream,
    /// or the stream yields no frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`] when no decoder can be opened; the resource goes offline.
    /// - [`Error::SeekUnsupported`] once for non-seekable sources.
    /// - [`Error::Io`], [`Error::Decode`] and [`Error::ResourceExhausted`] as
    ///   reported by the resolver. The last good frame stays available from
    ///   [`MediaResource::current_frame`].
    pub fn get_frame_at(&mut self, secs: f64) -> Result<Option<PresentableFrame>> {
        let Some(media) = self.media.as_mut() else {
            return Ok(None);
        };
        let Some(stream) = media.video.clone() else {
            return Ok(None);
        };

        if media.resolver.is_none() {
            match Self::open_resolver(&self.backend, &self.config, media, stream) {
                Ok(resolver) => media.resolver = Some(resolver),
                Err(error) => {
                    if matches!(error, Error::Open(_)) {
                        return Err(self.go_offline(error));
                    }
                    return Err(error);
                }
            }
        }

        let result = match media.resolver.as_mut() {
            Some(resolver) => resolver.resolve(&mut media.demuxer, secs),
            None => Ok(None),
        };

        if let Ok(Some(frame)) = &result {
            self.current = Some(frame.clone());
        }
        result
    }

    /// [`MediaResource::get_frame_at`] for a timeline position as a [`Duration`].
    ///
    /// # Errors
    ///
    /// As [`MediaResource::get_frame_at`].
    pub fn get_frame_at_duration(&mut self, position: Duration) -> Result<Option<PresentableFrame>> {
        self.get_frame_at(position.as_secs_f64())
    }

    fn open_resolver(
        backend: &B,
        config: &DecoderConfig,
        media: &mut OpenMedia<B>,
        stream: StreamInfo,
    ) -> Result<FrameResolver<B>> {
        let decoder = backend.open_decoder(&media.demuxer, &stream, config)?;
        let converter = backend.open_converter(&stream, &config.output)?;
        let start = if media.demuxer_untouched {
            StartPosition::StreamStart
        } else {
            StartPosition::Unknown
        };
        media.demuxer_untouched = false;

        Ok(FrameResolver::new(
            &media.demuxer,
            decoder,
            converter,
            stream,
            media.duration_secs,
            start,
            config,
        ))
    }

    /// Closes everything after an open failure; returns the error to report.
    fn go_offline(&mut self, error: Error) -> Error {
        let mut failures = DisposeError::new();
        if let Some(media) = self.media.take() {
            media.close(&mut failures);
        }
        self.last_error = Some(error.clone());
        with_teardown_failures(error, failures)
    }

    /// Releases the decoder, frame cache and converter, keeping the demuxer
    /// and stream metadata. The next frame request reopens them.
    ///
    /// # Errors
    ///
    /// Returns an aggregate of every release failure.
    pub fn release_decoder(&mut self) -> Result<()> {
        let Some(resolver) = self.media.as_mut().and_then(|m| m.resolver.take()) else {
            return Ok(());
        };
        self.retired_stats += resolver.stats();
        tracing::debug!(path = ?self.path, "decoder released");
        resolver.close()
    }

    /// Points the resource at a new file: everything is released and reopened.
    ///
    /// On failure the resource goes offline.
    ///
    /// # Errors
    ///
    /// Returns the open error, or an aggregate of release failures when
    /// tearing down the old file failed. When both happen the open error is
    /// the last entry of the aggregate and [`MediaResource::last_error`]
    /// holds it on its own.
    pub fn set_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut failures = DisposeError::new();
        if let Some(media) = self.media.take() {
            if let Some(resolver) = &media.resolver {
                self.retired_stats += resolver.stats();
            }
            media.close(&mut failures);
        }
        self.current = None;
        self.path = Some(path.as_ref().to_path_buf());

        match self.reopen() {
            Ok(()) => failures.into_result(),
            Err(error) => Err(with_teardown_failures(error, failures)),
        }
    }

    /// Converts into a handle that can be shared with a render thread.
    #[must_use]
    pub fn into_shared(self) -> SharedMediaResource<B> {
        Arc::new(Mutex::new(self))
    }

    /// Tears everything down, reporting every failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispose`] aggregating each failed release.
    pub fn dispose(self) -> Result<()> {
        let mut failures = DisposeError::new();
        if let Some(media) = self.media {
            media.close(&mut failures);
        }
        failures.into_result()
    }
}

/// Folds `error` into `failures`, or returns it alone when teardown was clean.
fn with_teardown_failures(error: Error, mut failures: DisposeError) -> Error {
    if failures.is_empty() {
        return error;
    }
    failures.push("open", &error);
    Error::Dispose(failures)
}
