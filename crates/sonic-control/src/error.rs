//! Error types for device sessions.

use std::io;
use std::time::Duration;

use sonic_protocol::{CommandCode, ContractError};
use thiserror::Error;

use crate::procedures::ProcedureType;

/// Errors of the communicator layer.
#[derive(Debug, Error)]
pub enum CommunicatorError {
    /// The session ended while the request was outstanding.
    #[error("disconnected from device")]
    Disconnected,

    /// No answer arrived in time.
    #[error("no answer within {0:?}")]
    Timeout(Duration),

    /// Writing the request to the stream failed.
    #[error("failed to write request: {0}")]
    WriteFailed(String),

    /// The stream ended in the middle of a frame.
    #[error("stream ended unexpectedly")]
    UnexpectedEof,

    /// The communicator has not been opened.
    #[error("communicator is not connected")]
    NotConnected,

    /// Every request id has an outstanding slot.
    #[error("no free request id")]
    SlotsExhausted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for communicator operations.
pub type CommunicatorResult<T> = Result<T, CommunicatorError>;

/// Errors of the device facade and the device builder.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Communicator(#[from] CommunicatorError),

    /// The device did not identify itself.
    #[error("device identification failed: {0}")]
    Identification(String),
}

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors of procedures and the procedure controller.
#[derive(Debug, Error)]
pub enum ProcedureError {
    /// Another procedure is running.
    #[error("procedure {0} is already running")]
    Busy(ProcedureType),

    #[error("procedure was cancelled")]
    Cancelled,

    /// The device does not offer the procedure.
    #[error("procedure {0} is not available on this device")]
    Unavailable(ProcedureType),

    #[error("invalid procedure arguments: {0}")]
    InvalidArgs(String),

    /// The device rejected a command or answered with something unexpected.
    #[error("command {code} failed: {message}")]
    CommandFailed { code: CommandCode, message: String },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Result type alias for procedure operations.
pub type ProcedureResult<T> = Result<T, ProcedureError>;

/// Errors loading a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
