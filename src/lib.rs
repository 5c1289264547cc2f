// SPDX-License-Identifier: MPL-2.0
//! `seekframe` resolves arbitrary timestamps of a video file to decoded,
//! presentation-ready frames.
//!
//! A render loop asks a [`MediaResource`](application::MediaResource) for the
//! frame at some time. The resource keeps a small rolling cache of decoded
//! frames and decides per request whether to reuse one, decode forward, or
//! seek and then decode. Decoding goes through `FFmpeg`, with optional
//! hardware acceleration that silently falls back to software.
//!
//! # Layers
//!
//! - [`domain`]: plain media value types
//! - [`application`]: ports, the frame cache, the resolver and the resource lifecycle
//! - [`infrastructure`]: the `FFmpeg` adapters
//! - [`config`]: TOML-backed decoder tuning
//!
//! ```ignore
//! let mut media = seekframe::infrastructure::open_media("clip.mp4")?;
//! let frame = media.get_frame_at(12.5)?;
//! ```

#![doc(html_root_url = "https://docs.rs/seekframe/0.3.0")]

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_utils;

pub use application::{MediaResource, SharedMediaResource};
pub use error::{Error, Result};
