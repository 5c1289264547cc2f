// SPDX-License-Identifier: MPL-2.0
//! Application layer - frame resolution and resource lifecycle.
//!
//! - [`port`]: Trait definitions (interfaces) the infrastructure implements
//! - [`frame_cache`]: Rolling buffer of decoded frames
//! - [`resolver`]: Seek-versus-decode orchestration for one stream
//! - [`resource`]: Lazily decoded media resources exposed to the render layer
//! - [`audio_queue`]: Bounded FIFO of resampled audio
//!
//! # Dependency Rule
//!
//! - Application layer depends on domain layer (uses domain types)
//! - Infrastructure layer implements application layer ports
//! - Nothing here names a concrete codec library

pub mod audio_queue;
pub mod frame_cache;
pub mod port;
pub mod resolver;
pub mod resource;

pub use audio_queue::{AudioQueue, DecodedAudio};
pub use frame_cache::{CacheStats, FrameCache, FrameId, Nearest};
pub use resolver::{seek_decision, FrameResolver, ResolveStats, SeekReason, StartPosition};
pub use resource::{MediaResource, SharedMediaResource};
