//! Platform detection for camera sources

use std::env;
use std::path::Path;

/// Platform information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformInfo {
    /// macOS (Darwin)
    MacOS,

    /// Raspberry Pi (detected via /proc/device-tree)
    RaspberryPi,

    /// Generic Linux
    Linux,
}

/// Detects current platform
pub fn detect_platform() -> PlatformInfo {
    match env::consts::OS {
        "macos" => PlatformInfo::MacOS,
        "linux" if is_raspberry_pi() => PlatformInfo::RaspberryPi,
        _ => PlatformInfo::Linux,
    }
}

fn is_raspberry_pi() -> bool {
    Path::new("/proc/device-tree/model").exists()
        || Path::new("/sys/firmware/devicetree/base/model").exists()
}

/// Gets platform-specific camera device path for a numeric index
pub fn default_device_path(platform: PlatformInfo, camera_index: usize) -> String {
    match platform {
        PlatformInfo::MacOS => camera_index.to_string(),
        PlatformInfo::RaspberryPi | PlatformInfo::Linux => format!("/dev/video{}", camera_index),
    }
}

/// Turns a configured device selector into a source-specific path
///
/// A bare number is treated as a camera index; anything else is used as-is.
pub fn resolve_device_path(platform: PlatformInfo, selector: &str) -> String {
    match selector.trim().parse::<usize>() {
        Ok(index) => default_device_path(platform, index),
        Err(_) => selector.to_string(),
    }
}
