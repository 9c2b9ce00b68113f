//! Protocols and the protocol-list chain.
//!
//! Protocol versions are authored as deltas over their predecessor. A
//! [`ProtocolList`] holds the deltas oldest first and folds them into a
//! [`Protocol`] for a requested [`ProtocolInfo`]:
//!
//! 1. The newest delta decides whether the device type is supported at all.
//! 2. The fold starts at the oldest delta of the contiguous run (counting
//!    back from the newest) that supports the device type.
//! 3. Every delta whose version is not newer than the requested one merges
//!    its constant overrides and applies its contract changes.
//!
//! In release builds, non-release contracts are never inserted.

use std::collections::BTreeMap;

use crate::{
    CommandCode, CommandContract, ContractError, ContractResult, DeviceParamConstantType,
    DeviceParamConstants, DeviceType, EnumKind, ProtocolInfo, Version,
};

/// One change a protocol version applies to the contracts of its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractChange {
    /// Add a contract or replace the one with the same code.
    Upsert(CommandContract),
    /// Delete the contract with this code.
    Remove(CommandCode),
}

impl From<CommandContract> for ContractChange {
    fn from(contract: CommandContract) -> Self {
        ContractChange::Upsert(contract)
    }
}

/// A single protocol version, expressed as a delta over its predecessor.
pub trait ProtocolDelta {
    /// Get the version this delta introduces.
    fn version(&self) -> Version;

    /// Check if this version understands the device type.
    fn supports_device_type(&self, device_type: DeviceType) -> bool;

    /// Contract changes for the given protocol info.
    fn contracts_for(&self, info: &ProtocolInfo) -> Vec<ContractChange>;

    /// Constant overrides for the given protocol info.
    fn constants_for(&self, _info: &ProtocolInfo) -> Vec<(DeviceParamConstantType, i64)> {
        Vec::new()
    }

    /// Enumerations this version registers as custom data types.
    fn custom_data_types(&self) -> Vec<EnumKind> {
        Vec::new()
    }
}

/// The resolved contracts, constants and data types for one protocol info.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    pub info: ProtocolInfo,
    pub consts: DeviceParamConstants,
    pub command_contracts: BTreeMap<CommandCode, CommandContract>,
    pub custom_data_types: BTreeMap<&'static str, EnumKind>,
}

impl Protocol {
    /// Create an empty protocol with default constants.
    pub fn empty(info: ProtocolInfo) -> Self {
        Protocol {
            info,
            consts: DeviceParamConstants::default(),
            command_contracts: BTreeMap::new(),
            custom_data_types: BTreeMap::new(),
        }
    }

    /// Get the contract for a code.
    pub fn contract(&self, code: CommandCode) -> Option<&CommandContract> {
        self.command_contracts.get(&code)
    }

    fn apply(&mut self, delta: &dyn ProtocolDelta) {
        self.consts.merge(delta.constants_for(&self.info));

        for change in delta.contracts_for(&self.info) {
            match change {
                ContractChange::Remove(code) => {
                    self.command_contracts.remove(&code);
                }
                ContractChange::Upsert(contract) => {
                    if !self.info.is_release || contract.is_release {
                        self.command_contracts.insert(contract.code, contract);
                    }
                }
            }
        }

        for kind in delta.custom_data_types() {
            self.custom_data_types.insert(kind.type_name(), kind);
        }
    }
}

/// Protocol deltas ordered oldest first.
#[derive(Default)]
pub struct ProtocolList {
    deltas: Vec<Box<dyn ProtocolDelta + Send + Sync>>,
}

impl ProtocolList {
    /// Create an empty list.
    pub fn new() -> Self {
        ProtocolList::default()
    }

    /// Append a newer protocol version.
    pub fn then<D>(mut self, delta: D) -> Self
    where
        D: ProtocolDelta + Send + Sync + 'static,
    {
        self.deltas.push(Box::new(delta));
        self
    }

    /// Get the version of the newest delta.
    pub fn latest_version(&self) -> Option<Version> {
        self.deltas.last().map(|delta| delta.version())
    }

    /// Get all versions, oldest first.
    pub fn versions(&self) -> Vec<Version> {
        self.deltas.iter().map(|delta| delta.version()).collect()
    }

    /// Check if the newest version supports the device type.
    pub fn supports_device_type(&self, device_type: DeviceType) -> bool {
        self.deltas
            .last()
            .map_or(false, |delta| delta.supports_device_type(device_type))
    }

    /// Fold the chain into a protocol for the given info.
    pub fn build_protocol_for(&self, info: &ProtocolInfo) -> ContractResult<Protocol> {
        if !self.supports_device_type(info.device_type) {
            return Err(ContractError::UnsupportedDevice(info.device_type));
        }

        let start = self
            .deltas
            .iter()
            .rposition(|delta| !delta.supports_device_type(info.device_type))
            .map_or(0, |unsupported| unsupported + 1);

        let mut protocol = Protocol::empty(info.clone());
        for delta in &self.deltas[start..] {
            if delta.version() <= info.version {
                log::trace!("applying protocol {} for {}", delta.version(), info);
                protocol.apply(delta.as_ref());
            }
        }
        Ok(protocol)
    }
}

impl std::fmt::Debug for ProtocolList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolList")
            .field("versions", &self.versions())
            .finish()
    }
}
