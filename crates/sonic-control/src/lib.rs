//! SonicAmp Control
//!
//! Async session layer for SonicAmp devices on top of [`sonic_protocol`].
//!
//! ## Layers
//!
//! - [`transport`]: serial ports and child processes as byte streams.
//! - [`communicator`]: owns the stream, frames requests and pairs answers.
//! - [`Device`]: typed commands against the resolved lookup table; built by
//!   [`DeviceBuilder`], which identifies the firmware.
//! - [`Updater`]: polls the device status onto the [`EventBus`].
//! - [`procedures`] and [`ProcedureController`]: host-driven and
//!   firmware-driven procedures, one at a time.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sonic_control::{connection_from_config, DeviceBuilder, SessionConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::load("session.yaml")?;
//! let connection = connection_from_config(&config.transport);
//! let device = Arc::new(DeviceBuilder::new(config).build(connection).await?);
//! let answer = device.get_update().await;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod communicator;
pub mod config;
pub mod controller;
pub mod device;
pub mod device_builder;
pub mod error;
pub mod events;
pub mod executor;
pub mod procedures;
pub mod transport;
pub mod updater;

pub use communicator::{Communicator, CommunicatorKind, DeviceLogSink, SendOptions, TracingLogSink};
pub use config::{ProtocolSelection, SessionConfig, TransportConfig};
pub use controller::ProcedureController;
pub use device::{CommandRequest, Device, FirmwareInfo};
pub use device_builder::DeviceBuilder;
pub use error::{
    CommunicatorError, CommunicatorResult, ConfigError, DeviceError, DeviceResult, ProcedureError, ProcedureResult,
};
pub use events::{Event, EventBus};
pub use executor::CommandExecutor;
pub use procedures::{ProcedureArgs, ProcedureType};
pub use transport::{connection_from_config, Connection, ProcessConnection, SerialConnection, StreamConnection};
pub use updater::Updater;
