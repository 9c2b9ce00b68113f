//! Error types for the sonic protocol.

use thiserror::Error;

use crate::{CommandCode, DeviceParamConstantType, DeviceType, FieldName, Version};

/// Errors that can occur while resolving contracts into a lookup table or
/// rendering a command against it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// No meta-export alternative is satisfied by the requested protocol info.
    #[error("no {attribute} export of command {code} matches {device_type} {version}")]
    UnresolvedExport {
        code: CommandCode,
        attribute: &'static str,
        device_type: DeviceType,
        version: Version,
    },

    /// A field limit references a constant the protocol does not define.
    #[error("constant {0} is referenced but not defined")]
    UnknownConstant(DeviceParamConstantType),

    /// The protocol chain does not cover the device type.
    #[error("device type {0} is not supported")]
    UnsupportedDevice(DeviceType),

    /// The command code has no entry in the lookup table.
    #[error("command {0} is not known")]
    UnknownCommand(CommandCode),

    /// The command arguments do not fit the contract.
    #[error("bad request for command {code}: {reason}")]
    BadRequest { code: CommandCode, reason: String },

    /// A field resolved to a minimum above its maximum.
    #[error("field {field} has min {min} above max {max}")]
    InvalidLimits { field: FieldName, min: i64, max: i64 },

    /// The answer layout did not produce a usable pattern.
    #[error("answer layout of command {code} is not a valid pattern: {reason}")]
    InvalidPattern { code: CommandCode, reason: String },
}

/// Result type alias for contract operations.
pub type ContractResult<T> = Result<T, ContractError>;

/// Errors that can occur while parsing a wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame has a known prefix but a malformed payload.
    #[error("malformed frame: {0:?}")]
    SyntaxError(String),

    /// The frame does not start with any known prefix.
    #[error("unknown frame prefix: {0:?}")]
    UnknownPrefix(String),
}

/// A textual value could not be parsed into a protocol type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {input:?}")]
pub struct ParseValueError {
    /// Name of the type that was being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub input: String,
}

impl ParseValueError {
    /// Create a new parse error for the given type name and input.
    pub fn new(kind: &'static str, input: impl Into<String>) -> Self {
        ParseValueError {
            kind,
            input: input.into(),
        }
    }
}
