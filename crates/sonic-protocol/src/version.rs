//! Protocol versions and the key used for contract resolution.

use std::fmt;
use std::str::FromStr;

use crate::{DeviceType, ParseValueError};

/// A protocol or firmware version with total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Create a new version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ParseValueError;

    /// Parse `MAJOR.MINOR.PATCH`, with or without a leading `v`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseValueError::new("Version", s);
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parts: Vec<&str> = digits.split('.').collect();
        if parts.len() != 3 {
            return Err(err());
        }
        let parse = |part: &str| part.parse::<u32>().map_err(|_| err());
        Ok(Version::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

/// Firmware build flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildFlavor {
    Release,
    Debug,
}

impl BuildFlavor {
    /// Map an `is_release` flag to a flavor.
    pub fn from_release(is_release: bool) -> Self {
        if is_release {
            BuildFlavor::Release
        } else {
            BuildFlavor::Debug
        }
    }

    /// Check if this is a release build.
    pub fn is_release(&self) -> bool {
        matches!(self, BuildFlavor::Release)
    }
}

impl fmt::Display for BuildFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildFlavor::Release => f.write_str("release"),
            BuildFlavor::Debug => f.write_str("debug"),
        }
    }
}

/// The key a protocol and its lookup table are resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolInfo {
    pub version: Version,
    pub device_type: DeviceType,
    pub is_release: bool,
    pub options: Option<String>,
}

impl ProtocolInfo {
    /// Create protocol info without options.
    pub fn new(device_type: DeviceType, version: Version, is_release: bool) -> Self {
        ProtocolInfo {
            version,
            device_type,
            is_release,
            options: None,
        }
    }

    /// Attach protocol options.
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Get the build flavor.
    pub fn build_flavor(&self) -> BuildFlavor {
        BuildFlavor::from_release(self.is_release)
    }
}

impl fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flavor = if self.is_release { "release" } else { "debug" };
        write!(f, "{} {} ({})", self.device_type, self.version, flavor)
    }
}
