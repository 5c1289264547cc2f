// SPDX-License-Identifier: MPL-2.0
//! Hardware acceleration device descriptors.
//!
//! The set of accelerators is closed: each variant names one FFmpeg
//! hardware device type. Selection is a "first candidate that works" fold over
//! a preference list, performed by the decoder adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hardware decode device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareDeviceKind {
    Cuda,
    Vaapi,
    Vdpau,
    Qsv,
    D3d11va,
    Dxva2,
    VideoToolbox,
    Vulkan,
    Drm,
}

impl HardwareDeviceKind {
    /// Every device kind, in no particular priority.
    pub const ALL: &'static [HardwareDeviceKind] = &[
        HardwareDeviceKind::Cuda,
        HardwareDeviceKind::Vaapi,
        HardwareDeviceKind::Vdpau,
        HardwareDeviceKind::Qsv,
        HardwareDeviceKind::D3d11va,
        HardwareDeviceKind::Dxva2,
        HardwareDeviceKind::VideoToolbox,
        HardwareDeviceKind::Vulkan,
        HardwareDeviceKind::Drm,
    ];

    /// Device kinds worth trying on the current platform, most preferred first.
    #[must_use]
    pub fn platform_defaults() -> Vec<HardwareDeviceKind> {
        if cfg!(target_os = "windows") {
            vec![
                HardwareDeviceKind::D3d11va,
                HardwareDeviceKind::Cuda,
                HardwareDeviceKind::Qsv,
                HardwareDeviceKind::Dxva2,
            ]
        } else if cfg!(target_os = "macos") {
            vec![HardwareDeviceKind::VideoToolbox]
        } else {
            vec![
                HardwareDeviceKind::Cuda,
                HardwareDeviceKind::Vaapi,
                HardwareDeviceKind::Vdpau,
            ]
        }
    }

    /// FFmpeg's name for this device type (as accepted by `-hwaccel`).
    #[must_use]
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            HardwareDeviceKind::Cuda => "cuda",
            HardwareDeviceKind::Vaapi => "vaapi",
            HardwareDeviceKind::Vdpau => "vdpau",
            HardwareDeviceKind::Qsv => "qsv",
            HardwareDeviceKind::D3d11va => "d3d11va",
            HardwareDeviceKind::Dxva2 => "dxva2",
            HardwareDeviceKind::VideoToolbox => "videotoolbox",
            HardwareDeviceKind::Vulkan => "vulkan",
            HardwareDeviceKind::Drm => "drm",
        }
    }

    /// Looks a device kind up by its FFmpeg name.
    #[must_use]
    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.ffmpeg_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for HardwareDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}
