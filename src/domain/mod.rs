// SPDX-License-Identifier: MPL-2.0
//! Domain layer - pure media value types.
//!
//! Nothing in this layer touches native memory or FFmpeg. The only external
//! dependency is `serde`, for the types that appear in configuration.
//!
//! # Modules
//!
//! - [`hardware`]: Hardware decode device descriptors ([`HardwareDeviceKind`](hardware::HardwareDeviceKind))
//! - [`media`]: Stream and frame types ([`StreamInfo`](media::StreamInfo),
//!   [`PresentableFrame`](media::PresentableFrame), [`Resolution`](media::Resolution))
//! - [`time`]: Rational time bases ([`TimeBase`](time::TimeBase), [`FrameRate`](time::FrameRate))

pub mod hardware;
pub mod media;
pub mod time;

pub use hardware::HardwareDeviceKind;
pub use media::{
    select_best_stream, MediaType, OutputPixelFormat, PresentableFrame, Resolution,
    ScalingQuality, StreamInfo,
};
pub use time::{FrameRate, TimeBase};
