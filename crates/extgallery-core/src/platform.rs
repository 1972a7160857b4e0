//! Target platforms
//!
//! A catalog version is either platform neutral (`universal`, or no platform
//! at all) or built for one OS/architecture pair. The set of platforms an
//! entry publishes decides which builds a host may install.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::catalog::CatalogVersion;

/// Tag marking an entry that also runs in the browser host
pub const WEB_EXTENSION_TAG: &str = "__web_extension";

const WIN32_ARM64_FALLBACKS: &[TargetPlatform] = &[TargetPlatform::Win32X64];

/// Target platform of a catalog version or of the requesting host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetPlatform {
    Win32X64,
    Win32Arm64,
    LinuxX64,
    LinuxArm64,
    LinuxArmhf,
    AlpineX64,
    AlpineArm64,
    DarwinX64,
    DarwinArm64,
    Web,
    Universal,
    Unknown,
    Undefined,
    /// A platform string this client does not know about
    Other(String),
}

impl TargetPlatform {
    /// Parse a platform string as published by the registry
    pub fn parse(value: &str) -> Self {
        match value {
            "win32-x64" => Self::Win32X64,
            "win32-arm64" => Self::Win32Arm64,
            "linux-x64" => Self::LinuxX64,
            "linux-arm64" => Self::LinuxArm64,
            "linux-armhf" => Self::LinuxArmhf,
            "alpine-x64" => Self::AlpineX64,
            "alpine-arm64" => Self::AlpineArm64,
            "darwin-x64" => Self::DarwinX64,
            "darwin-arm64" => Self::DarwinArm64,
            "web" => Self::Web,
            "universal" => Self::Universal,
            "unknown" => Self::Unknown,
            "undefined" => Self::Undefined,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Win32X64 => "win32-x64",
            Self::Win32Arm64 => "win32-arm64",
            Self::LinuxX64 => "linux-x64",
            Self::LinuxArm64 => "linux-arm64",
            Self::LinuxArmhf => "linux-armhf",
            Self::AlpineX64 => "alpine-x64",
            Self::AlpineArm64 => "alpine-arm64",
            Self::DarwinX64 => "darwin-x64",
            Self::DarwinArm64 => "darwin-arm64",
            Self::Web => "web",
            Self::Universal => "universal",
            Self::Unknown => "unknown",
            Self::Undefined => "undefined",
            Self::Other(value) => value,
        }
    }

    /// Platform of the running process
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "windows" => "win32",
            "macos" => "darwin",
            "linux" => "linux",
            _ => return Self::Unknown,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            "arm" => "armhf",
            _ => return Self::Unknown,
        };
        Self::parse(&format!("{}-{}", os, arch))
    }

    /// True for `universal` and `undefined`, which run everywhere
    pub fn is_neutral(&self) -> bool {
        matches!(self, Self::Universal | Self::Undefined)
    }

    /// Platforms whose builds this platform can also run
    pub fn fallbacks(&self) -> &'static [TargetPlatform] {
        match self {
            Self::Win32Arm64 => WIN32_ARM64_FALLBACKS,
            _ => &[],
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TargetPlatform {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl Serialize for TargetPlatform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TargetPlatform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// Collect every platform an entry publishes.
///
/// Versions without a platform count as `universal`. The `web` platform is
/// governed by the entry's web tag rather than by the version list.
pub fn all_target_platforms(versions: &[CatalogVersion], tags: &[String]) -> Vec<TargetPlatform> {
    let mut platforms: Vec<TargetPlatform> = Vec::new();
    for version in versions {
        let platform = version.platform();
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }

    let web_capable = tags.iter().any(|tag| tag == WEB_EXTENSION_TAG);
    let web_index = platforms.iter().position(|p| *p == TargetPlatform::Web);
    match (web_capable, web_index) {
        (true, None) => platforms.push(TargetPlatform::Web),
        (false, Some(index)) => {
            platforms.remove(index);
        }
        _ => {}
    }

    platforms
}

/// A browser host cannot run an entry that publishes no web build
pub fn is_not_web_extension_in_web_platform(
    all_platforms: &[TargetPlatform],
    product_platform: &TargetPlatform,
) -> bool {
    *product_platform == TargetPlatform::Web && !all_platforms.contains(&TargetPlatform::Web)
}

/// Whether a build for `version_platform` may run on `product_platform`
pub fn is_target_platform_compatible(
    version_platform: &TargetPlatform,
    all_platforms: &[TargetPlatform],
    product_platform: &TargetPlatform,
) -> bool {
    if is_not_web_extension_in_web_platform(all_platforms, product_platform) {
        return false;
    }
    if version_platform.is_neutral() {
        return true;
    }
    if *version_platform == TargetPlatform::Unknown {
        return false;
    }
    if version_platform == product_platform {
        return true;
    }
    // Only fall back when no exact build exists for the product platform
    product_platform.fallbacks().contains(version_platform)
        && !all_platforms.contains(product_platform)
}
