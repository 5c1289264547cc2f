// SPDX-License-Identifier: MPL-2.0
//! Infrastructure layer adapters.
//!
//! Concrete implementations of the port traits defined in
//! `application::port`, wrapping native libraries.
//!
//! # Available Adapters
//!
//! - [`ffmpeg`]: Demuxing, decoding (software and hardware), conversion,
//!   muxing and audio resampling via `FFmpeg`
//!
//! # Design Notes
//!
//! - Adapters implement traits from `application::port`
//! - Native handles are wrapped in RAII types and released deterministically
//! - Unsafe code stays inside this layer

pub mod ffmpeg;

pub use ffmpeg::{open_media, open_media_source, open_media_with, FfmpegBackend, FfmpegMediaResource};
