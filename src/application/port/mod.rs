// SPDX-License-Identifier: MPL-2.0
//! Port definitions (traits) for dependency inversion.
//!
//! This module defines the abstract interfaces the FFmpeg adapters implement.
//! The frame resolver and media resource only ever see these traits, which
//! keeps the seek-versus-decode logic testable without native libraries.
//!
//! # Available Ports
//!
//! - [`byte_source`]: Readable, writable and seekable byte streams
//! - [`demux`]: Container demuxing and keyframe seeking
//! - [`video`]: Video decoding and presentation conversion
//! - [`backend`]: Factory opening all of the above for one resource
//!
//! # Design Notes
//!
//! - All traits use domain types only (no `FFmpeg` types)
//! - Traits are `Send` so a resource can move to its render thread
//! - Methods return the crate [`Result`](crate::error::Result)
//! - No `async fn`: every call blocks the caller

pub mod backend;
pub mod byte_source;
pub mod demux;
pub mod video;

// Re-export main types for convenience
pub use backend::{FrameOf, MediaBackend, PacketOf};
pub use byte_source::{ByteSource, ForwardOnlySource, ReadSeekSource};
pub use demux::{Demuxer, StreamPacket};
pub use video::{FormatConverter, MediaFrame, VideoDecoder};
