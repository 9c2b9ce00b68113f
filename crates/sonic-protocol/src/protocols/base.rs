use crate::{ContractChange, DeviceType, EnumKind, ProtocolDelta, ProtocolInfo, Version};

/// Root of the chain: supports every device and contributes no contracts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base;

impl ProtocolDelta for Base {
    fn version(&self) -> Version {
        Version::new(0, 0, 0)
    }

    fn supports_device_type(&self, _device_type: DeviceType) -> bool {
        true
    }

    fn contracts_for(&self, _info: &ProtocolInfo) -> Vec<ContractChange> {
        Vec::new()
    }

    fn custom_data_types(&self) -> Vec<EnumKind> {
        vec![EnumKind::DeviceType, EnumKind::BuildType]
    }
}
