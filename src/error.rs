// SPDX-License-Identifier: MPL-2.0
//! Error types for opening, decoding and tearing down media resources.
//!
//! Errors fall into a small taxonomy:
//!
//! - [`OpenError`]: the file or container cannot be used at all. Fatal to the
//!   resource, which is marked offline.
//! - [`DecodeError`]: a packet or frame could not be processed. The decode loop
//!   logs these and carries on.
//! - [`Error::SeekUnsupported`]: the source cannot seek. Reported once, after
//!   which decoding continues forward only.
//! - [`Error::ResourceExhausted`]: a native allocation failed. Never retried.
//! - [`DisposeError`]: every failure collected during teardown.
//!
//! Hardware acceleration failures are not errors; decoding silently falls back
//! to software.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Open Error: {0}")]
    Open(#[from] OpenError),

    #[error("Decode Error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Seek Error: source is not seekable")]
    SeekUnsupported,

    #[error("Resource Exhausted: {0}")]
    ResourceExhausted(String),

    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Dispose Error: {0}")]
    Dispose(#[from] DisposeError),
}

/// Reasons a media file could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    /// The file does not exist or cannot be read.
    #[error("file not found: {0}")]
    NotFound(String),

    /// No demuxer recognised the container.
    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),

    /// Stream headers could not be parsed.
    #[error("invalid stream headers: {0}")]
    InvalidHeaders(String),

    /// No decoder is available for the selected stream.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// The resource has no file path to open.
    #[error("no file path provided")]
    NoPath,
}

impl OpenError {
    /// Categorises an FFmpeg open failure.
    ///
    /// Used when `avformat_open_input` or `avformat_find_stream_info` fail
    /// and only the error code is known.
    #[must_use]
    pub fn from_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("no such file") || msg_lower.contains("permission denied") {
            return OpenError::NotFound(msg.to_string());
        }

        if msg_lower.contains("decoder") || msg_lower.contains("codec") {
            return OpenError::UnsupportedCodec(msg.to_string());
        }

        if msg_lower.contains("invalid data") || msg_lower.contains("unknown format") {
            return OpenError::UnsupportedContainer(msg.to_string());
        }

        OpenError::InvalidHeaders(msg.to_string())
    }
}

/// Failures while turning packets into presentable frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The codec rejected a packet.
    #[error("packet rejected: {0}")]
    PacketRejected(String),

    /// The codec failed while producing a frame.
    #[error("frame decoding failed: {0}")]
    FrameFailed(String),

    /// Downloading a hardware frame into host memory failed.
    #[error("hardware frame download failed: {0}")]
    DownloadFailed(String),

    /// Pixel format conversion failed.
    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    /// Encoding or writing an output packet failed.
    #[error("encoding failed: {0}")]
    EncodeFailed(String),
}

/// Aggregate of every failure collected while releasing native objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisposeError {
    failures: Vec<String>,
}

impl DisposeError {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failure, labelled with the component that produced it.
    pub fn push(&mut self, component: &str, error: &Error) {
        self.failures.push(format!("{component}: {error}"));
    }

    /// Runs a teardown step and records its failure, if any.
    pub fn collect(&mut self, component: &str, result: Result<()>) {
        if let Err(error) = result {
            tracing::warn!(component, %error, "disposal step failed");
            self.push(component, &error);
        }
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turns the aggregate into `Ok` when nothing failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispose`] when at least one step failed.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Dispose(self))
        }
    }

    /// Folds another aggregate into this one.
    pub fn merge(&mut self, other: DisposeError) {
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for DisposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DisposeError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<ffmpeg_next::Error> for Error {
    fn from(err: ffmpeg_next::Error) -> Self {
        match err {
            ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::ENOMEM => {
                Error::ResourceExhausted(err.to_string())
            }
            _ => Error::Io(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_io_error() {
        let err = Error::Io("disk failure".to_string());
        assert_eq!(format!("{err}"), "I/O Error: disk failure");
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_error = std::io::Error::other("boom");
        let err: Error = io_error.into();
        match err {
            Error::Io(message) => assert!(message.contains("boom")),
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn open_error_from_message_not_found() {
        let err = OpenError::from_message("No such file or directory");
        assert!(matches!(err, OpenError::NotFound(_)));
    }

    #[test]
    fn open_error_from_message_container() {
        let err = OpenError::from_message("Invalid data found when processing input");
        assert!(matches!(err, OpenError::UnsupportedContainer(_)));
    }

    #[test]
    fn open_error_from_message_codec() {
        let err = OpenError::from_message("Decoder not found");
        assert!(matches!(err, OpenError::UnsupportedCodec(_)));
    }

    #[test]
    fn open_error_from_message_defaults_to_headers() {
        let err = OpenError::from_message("something odd");
        assert!(matches!(err, OpenError::InvalidHeaders(_)));
    }

    #[test]
    fn dispose_error_collects_every_failure() {
        let mut aggregate = DisposeError::new();
        aggregate.collect("demuxer", Ok(()));
        aggregate.collect("decoder", Err(Error::Io("close failed".into())));
        aggregate.collect("converter", Err(Error::ResourceExhausted("oom".into())));

        assert_eq!(aggregate.failures().len(), 2);
        assert!(aggregate.failures()[0].starts_with("decoder:"));
        assert!(aggregate.failures()[1].starts_with("converter:"));

        let err = aggregate.into_result().unwrap_err();
        assert!(format!("{err}").contains("2 failure(s)"));
    }

    #[test]
    fn empty_dispose_error_is_ok() {
        assert!(DisposeError::new().into_result().is_ok());
    }

    #[test]
    fn merge_keeps_both_sides() {
        let mut left = DisposeError::new();
        left.push("a", &Error::SeekUnsupported);
        let mut right = DisposeError::new();
        right.push("b", &Error::SeekUnsupported);

        left.merge(right);
        assert_eq!(left.failures().len(), 2);
    }

    #[test]
    fn decode_error_converts_into_error() {
        let err: Error = DecodeError::PacketRejected("bad".into()).into();
        assert!(matches!(err, Error::Decode(DecodeError::PacketRejected(_))));
    }
}
