//! Meta-exports: attribute values that differ between protocol versions,
//! device types and build flavors.
//!
//! An attribute is either a single value that applies everywhere or an
//! ordered list of alternatives, each tagged with a [`MetaExportDescriptor`].
//! Resolution picks the first alternative whose descriptor is satisfied.

use crate::{BuildFlavor, DeviceType, ProtocolInfo, Version};

/// Conditions under which an exported alternative applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaExportDescriptor {
    pub min_version: Version,
    pub deprecated_version: Option<Version>,
    pub device_types: Option<Vec<DeviceType>>,
    pub excluded_device_types: Option<Vec<DeviceType>>,
    pub build_flavor: Option<BuildFlavor>,
    pub options: Option<String>,
}

impl MetaExportDescriptor {
    /// A descriptor valid from `min_version` on, for every device.
    pub fn since(min_version: Version) -> Self {
        MetaExportDescriptor {
            min_version,
            deprecated_version: None,
            device_types: None,
            excluded_device_types: None,
            build_flavor: None,
            options: None,
        }
    }

    /// Restrict to the given device types.
    pub fn for_devices(mut self, devices: &[DeviceType]) -> Self {
        self.device_types = Some(devices.to_vec());
        self
    }

    /// Exclude the given device types.
    pub fn excluding(mut self, devices: &[DeviceType]) -> Self {
        self.excluded_device_types = Some(devices.to_vec());
        self
    }

    /// Mark as deprecated from `version` on.
    pub fn deprecated_in(mut self, version: Version) -> Self {
        self.deprecated_version = Some(version);
        self
    }

    /// Restrict to one build flavor.
    pub fn only(mut self, flavor: BuildFlavor) -> Self {
        self.build_flavor = Some(flavor);
        self
    }

    /// Restrict to protocols announcing the given options.
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Check if the descriptor is satisfied by the protocol info.
    pub fn is_valid(&self, info: &ProtocolInfo) -> bool {
        if self.min_version > info.version {
            return false;
        }
        if let Some(deprecated) = self.deprecated_version {
            if deprecated <= info.version {
                return false;
            }
        }
        if let Some(included) = &self.device_types {
            if !included.contains(&info.device_type) {
                return false;
            }
        }
        if let Some(excluded) = &self.excluded_device_types {
            if excluded.contains(&info.device_type) {
                return false;
            }
        }
        if let Some(flavor) = self.build_flavor {
            if flavor != info.build_flavor() {
                return false;
            }
        }
        if let Some(options) = &self.options {
            if info.options.as_deref() != Some(options.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One tagged alternative of an exported attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Alternative<T> {
    pub descriptor: MetaExportDescriptor,
    pub value: T,
}

/// An attribute that is either unconditional or chosen per protocol info.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Export<T> {
    Always(T),
    Alternatives(Vec<Alternative<T>>),
}

impl<T> Export<T> {
    /// Start an alternatives list with one tagged value.
    pub fn when(descriptor: MetaExportDescriptor, value: T) -> Self {
        Export::Alternatives(vec![Alternative { descriptor, value }])
    }

    /// Append another tagged alternative.
    ///
    /// An unconditional export becomes the first alternative, valid for every
    /// protocol info.
    pub fn or_when(self, descriptor: MetaExportDescriptor, value: T) -> Self {
        let mut alternatives = match self {
            Export::Always(v) => vec![Alternative {
                descriptor: MetaExportDescriptor::since(Version::default()),
                value: v,
            }],
            Export::Alternatives(list) => list,
        };
        alternatives.push(Alternative { descriptor, value });
        Export::Alternatives(alternatives)
    }

    /// Pick the first value whose descriptor is satisfied.
    pub fn resolve(&self, info: &ProtocolInfo) -> Option<&T> {
        match self {
            Export::Always(v) => Some(v),
            Export::Alternatives(list) => list
                .iter()
                .find(|alt| alt.descriptor.is_valid(info))
                .map(|alt| &alt.value),
        }
    }
}

impl<T> From<T> for Export<T> {
    fn from(value: T) -> Self {
        Export::Always(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(device_type: DeviceType, version: Version) -> ProtocolInfo {
        ProtocolInfo::new(device_type, version, true)
    }

    #[test]
    fn test_descriptor_min_and_deprecated() {
        let desc = MetaExportDescriptor::since(Version::new(1, 0, 0)).deprecated_in(Version::new(2, 0, 0));
        assert!(!desc.is_valid(&info(DeviceType::Descale, Version::new(0, 9, 0))));
        assert!(desc.is_valid(&info(DeviceType::Descale, Version::new(1, 5, 0))));
        assert!(!desc.is_valid(&info(DeviceType::Descale, Version::new(2, 0, 0))));
    }

    #[test]
    fn test_descriptor_device_lists() {
        let desc = MetaExportDescriptor::since(Version::new(1, 0, 0))
            .for_devices(&[DeviceType::MvpWorker, DeviceType::Descale])
            .excluding(&[DeviceType::Descale]);
        assert!(desc.is_valid(&info(DeviceType::MvpWorker, Version::new(1, 0, 0))));
        assert!(!desc.is_valid(&info(DeviceType::Descale, Version::new(1, 0, 0))));
        assert!(!desc.is_valid(&info(DeviceType::Crystal, Version::new(1, 0, 0))));
    }

    #[test]
    fn test_descriptor_build_flavor() {
        let desc = MetaExportDescriptor::since(Version::new(1, 0, 0)).only(BuildFlavor::Debug);
        let release = info(DeviceType::MvpWorker, Version::new(1, 0, 0));
        let mut debug = release.clone();
        debug.is_release = false;
        assert!(!desc.is_valid(&release));
        assert!(desc.is_valid(&debug));
    }

    #[test]
    fn test_export_resolution_order() {
        let export = Export::when(
            MetaExportDescriptor::since(Version::new(1, 0, 0)).for_devices(&[DeviceType::MvpWorker]),
            "worker",
        )
        .or_when(MetaExportDescriptor::since(Version::new(1, 0, 0)), "generic");

        let worker = info(DeviceType::MvpWorker, Version::new(1, 0, 0));
        let descale = info(DeviceType::Descale, Version::new(1, 0, 0));
        let ancient = info(DeviceType::Descale, Version::new(0, 1, 0));
        assert_eq!(export.resolve(&worker), Some(&"worker"));
        assert_eq!(export.resolve(&descale), Some(&"generic"));
        assert_eq!(export.resolve(&ancient), None);
    }
}
