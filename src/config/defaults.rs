// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module is the single source of truth for the decoder's tuning knobs.
//! Constants are organized by category.
//!
//! # Categories
//!
//! - **Frame Cache**: Ring size of decoded frames kept per resource
//! - **Resolver**: Seek-versus-decode thresholds
//! - **Audio**: Resampler target and queue bounds

// ==========================================================================
// Frame Cache Defaults
// ==========================================================================

/// Default number of decoded frames kept per resource.
pub const DEFAULT_FRAME_CACHE_CAPACITY: usize = 8;

/// Minimum frame cache capacity.
///
/// Two slots are needed so that a fresh frame can be written while the
/// previously presented one is still readable.
pub const MIN_FRAME_CACHE_CAPACITY: usize = 2;

/// Maximum frame cache capacity.
pub const MAX_FRAME_CACHE_CAPACITY: usize = 64;

// ==========================================================================
// Resolver Defaults
// ==========================================================================

/// Forward gap (seconds) beyond which the resolver seeks instead of decoding through.
pub const DEFAULT_SEEK_FORWARD_THRESHOLD_SECS: f64 = 5.0;

/// Minimum forward seek threshold in seconds.
pub const MIN_SEEK_FORWARD_THRESHOLD_SECS: f64 = 0.5;

/// Maximum forward seek threshold in seconds.
pub const MAX_SEEK_FORWARD_THRESHOLD_SECS: f64 = 60.0;

/// Cache-hit tolerance, in native frame periods.
pub const DEFAULT_FRAME_TOLERANCE_PERIODS: f64 = 0.5;

/// Minimum cache-hit tolerance in frame periods.
pub const MIN_FRAME_TOLERANCE_PERIODS: f64 = 0.1;

/// Maximum cache-hit tolerance in frame periods.
pub const MAX_FRAME_TOLERANCE_PERIODS: f64 = 2.0;

/// Frame rate assumed when a stream reports none.
pub const DEFAULT_FALLBACK_FRAME_RATE: f64 = 30.0;

/// Minimum fallback frame rate.
pub const MIN_FALLBACK_FRAME_RATE: f64 = 1.0;

/// Maximum fallback frame rate.
pub const MAX_FALLBACK_FRAME_RATE: f64 = 240.0;

// ==========================================================================
// Audio Defaults
// ==========================================================================

/// Sample rate audio is resampled to.
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Channel count audio is resampled to.
pub const DEFAULT_AUDIO_CHANNELS: u16 = 2;

/// Audio queue bound, in seconds of resampled audio.
pub const DEFAULT_AUDIO_QUEUE_SECS: f64 = 2.0;

// ==========================================================================
// Compile-time Validation
// ==========================================================================

const _: () = {
    // Frame cache validation
    assert!(MIN_FRAME_CACHE_CAPACITY >= 2);
    assert!(MAX_FRAME_CACHE_CAPACITY >= MIN_FRAME_CACHE_CAPACITY);
    assert!(DEFAULT_FRAME_CACHE_CAPACITY >= MIN_FRAME_CACHE_CAPACITY);
    assert!(DEFAULT_FRAME_CACHE_CAPACITY <= MAX_FRAME_CACHE_CAPACITY);

    // Resolver validation
    assert!(MIN_SEEK_FORWARD_THRESHOLD_SECS > 0.0);
    assert!(DEFAULT_SEEK_FORWARD_THRESHOLD_SECS >= MIN_SEEK_FORWARD_THRESHOLD_SECS);
    assert!(DEFAULT_SEEK_FORWARD_THRESHOLD_SECS <= MAX_SEEK_FORWARD_THRESHOLD_SECS);
    assert!(MIN_FRAME_TOLERANCE_PERIODS > 0.0);
    assert!(DEFAULT_FRAME_TOLERANCE_PERIODS >= MIN_FRAME_TOLERANCE_PERIODS);
    assert!(DEFAULT_FRAME_TOLERANCE_PERIODS <= MAX_FRAME_TOLERANCE_PERIODS);
    assert!(DEFAULT_FALLBACK_FRAME_RATE >= MIN_FALLBACK_FRAME_RATE);
    assert!(DEFAULT_FALLBACK_FRAME_RATE <= MAX_FALLBACK_FRAME_RATE);

    // Audio validation
    assert!(DEFAULT_AUDIO_SAMPLE_RATE > 0);
    assert!(DEFAULT_AUDIO_CHANNELS > 0);
    assert!(DEFAULT_AUDIO_QUEUE_SECS > 0.0);
};
