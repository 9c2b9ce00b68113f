//! Device discovery.
//!
//! The builder finds out which protocol the firmware speaks, resolves the
//! lookup table for it and puts the device into a defined state.

use std::sync::Arc;

use sonic_protocol::protocols::{legacy, legacy_protocol_builder, protocol_builder, v1_0_0};
use sonic_protocol::{Answer, Command, CommandCode, CommandLookupTable, DeviceType, FieldName, ProtocolInfo};
use tracing::{debug, info, warn};

use crate::communicator::{Communicator, CommunicatorKind, LegacyCommunicator, SerialCommunicator};
use crate::config::{ProtocolSelection, SessionConfig};
use crate::device::{Device, FirmwareInfo};
use crate::error::{DeviceError, DeviceResult};
use crate::events::EventBus;
use crate::executor::CommandExecutor;
use crate::transport::{Connection, DetachedConnection};

type Probe = (Arc<dyn Communicator>, CommandLookupTable);

/// Builds a [`Device`] from a connection.
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    config: SessionConfig,
    events: EventBus,
}

impl DeviceBuilder {
    pub fn new(config: SessionConfig) -> Self {
        DeviceBuilder {
            config,
            events: EventBus::default(),
        }
    }

    /// Publish the session events on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Connect, identify the device and bring it into a defined state.
    pub async fn build(&self, connection: Box<dyn Connection>) -> DeviceResult<Device> {
        let (communicator, table) = match self.config.protocol {
            ProtocolSelection::Sonic => self.connect_sonic(connection).await.map_err(|(e, _)| e)?,
            ProtocolSelection::Legacy => self.connect_legacy(connection).await?,
            ProtocolSelection::Auto => match self.connect_sonic(connection).await {
                Ok(probe) => probe,
                Err((e, connection)) => {
                    info!("device does not speak the sonic protocol ({}), trying legacy", e);
                    self.connect_legacy(connection).await?
                }
            },
        };

        let info = table.info().clone();
        info!(
            "the device is a {} with a {} build and understands protocol {}",
            info.device_type,
            info.build_flavor(),
            info.version
        );

        let executor = CommandExecutor::new(communicator, Arc::new(table));
        self.reset_state(&executor).await?;

        let mut firmware = FirmwareInfo::from_protocol(&info);
        if executor.table().contains(CommandCode::GET_INFO) {
            match executor.send_command(&Command::get_info()).await {
                Ok(answer) if answer.valid => firmware.update_from(&answer),
                Ok(answer) => warn!(message = %answer.message, "unexpected ?info answer"),
                Err(e) => warn!("failed to read firmware info: {}", e),
            }
        }
        info!("firmware: {}", firmware);

        Ok(Device::new(executor, firmware, self.events.clone()))
    }

    /// Stop running procedures and switch the signal off.
    async fn reset_state(&self, executor: &CommandExecutor) -> DeviceResult<()> {
        let table = Arc::clone(executor.table());
        let legacy = executor.communicator().kind() == CommunicatorKind::Legacy;

        if table.contains(CommandCode::SET_STOP) {
            executor.send_command(&Command::set_stop()).await?;
        }
        // Legacy firmware is not ready for `!OFF` right after connecting.
        if table.contains(CommandCode::SET_OFF) && !legacy {
            executor.send_command(&Command::set_off()).await?;
        }
        if !table.info().is_release && table.contains(CommandCode::SONIC_FORCE) {
            executor
                .send_command(&Command::new(CommandCode::SONIC_FORCE))
                .await?;
        }
        Ok(())
    }

    /// Identify the device with `?protocol`.
    ///
    /// On failure the connection is handed back for another attempt.
    async fn connect_sonic(
        &self,
        connection: Box<dyn Connection>,
    ) -> Result<Probe, (DeviceError, Box<dyn Connection>)> {
        let mut builder = protocol_builder();
        let probe_table = match builder.build(DeviceType::Unknown, v1_0_0::VERSION, self.config.release) {
            Ok(table) => Arc::new(table),
            Err(e) => return Err((e.into(), connection)),
        };

        let communicator = Arc::new(SerialCommunicator::new(
            connection,
            self.config.communicator.clone(),
            self.events.clone(),
        ));
        if let Err(e) = communicator.open().await {
            return Err((e.into(), reclaim(communicator).await));
        }

        debug!("asking the device for its protocol");
        let executor = CommandExecutor::new(communicator.clone(), probe_table);
        let identified = match executor.send_command(&Command::get_protocol()).await {
            Ok(answer) => protocol_info_from(&answer),
            Err(e) => Err(e),
        };
        drop(executor);

        let info = match identified {
            Ok(info) => info,
            Err(e) => return Err((e, reclaim(communicator).await)),
        };
        match builder.build_for(&info) {
            Ok(table) => {
                let communicator: Arc<dyn Communicator> = communicator;
                Ok((communicator, table))
            }
            Err(e) => Err((e.into(), reclaim(communicator).await)),
        }
    }

    /// Talk to the device with the legacy line protocol.
    async fn connect_legacy(&self, connection: Box<dyn Connection>) -> DeviceResult<Probe> {
        let mut builder = legacy_protocol_builder();
        let probe_table = Arc::new(builder.build(DeviceType::Unknown, legacy::VERSION, true)?);

        let communicator = Arc::new(LegacyCommunicator::new(
            connection,
            self.config.legacy.clone(),
            self.events.clone(),
        ));
        communicator.open().await?;

        let executor = CommandExecutor::new(communicator.clone(), probe_table);
        let device_type = match executor.send_command(&Command::get_info()).await {
            Ok(answer) => device_type_in(&answer.message).unwrap_or(DeviceType::Unknown),
            Err(e) => {
                warn!("legacy device did not answer ?info: {}", e);
                DeviceType::Unknown
            }
        };

        let table = builder.build(device_type, legacy::VERSION, true)?;
        let communicator: Arc<dyn Communicator> = communicator;
        Ok((communicator, table))
    }
}

async fn reclaim(communicator: Arc<SerialCommunicator>) -> Box<dyn Connection> {
    match Arc::try_unwrap(communicator) {
        Ok(communicator) => communicator.into_connection().await,
        Err(communicator) => {
            // Still shared; close it and give up the transport.
            communicator.close().await;
            Box::new(DetachedConnection)
        }
    }
}

/// Extract the protocol info from a `?protocol` answer.
fn protocol_info_from(answer: &Answer) -> DeviceResult<ProtocolInfo> {
    if !answer.valid {
        return Err(DeviceError::Identification(format!(
            "unexpected ?protocol answer {:?}",
            answer.message
        )));
    }
    let missing = |field: FieldName| DeviceError::Identification(format!("?protocol answer lacks {}", field));

    let device_type = answer
        .value(FieldName::DeviceType)
        .and_then(|v| v.as_device_type())
        .ok_or_else(|| missing(FieldName::DeviceType))?;
    let version = answer
        .value(FieldName::ProtocolVersion)
        .and_then(|v| v.as_version())
        .ok_or_else(|| missing(FieldName::ProtocolVersion))?;
    let is_release = answer
        .value(FieldName::IsRelease)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| missing(FieldName::IsRelease))?;

    let info = ProtocolInfo::new(device_type, version, is_release);
    Ok(match answer.value(FieldName::AdditionalOptions).and_then(|v| v.as_str()) {
        Some(options) if !options.trim().is_empty() => info.with_options(options.trim()),
        _ => info,
    })
}

/// Find a device type name in free text.
fn device_type_in(text: &str) -> Option<DeviceType> {
    let text = text.to_ascii_lowercase();
    DeviceType::ALL
        .iter()
        .copied()
        .filter(|device_type| *device_type != DeviceType::Unknown)
        .find(|device_type| text.contains(device_type.as_str()))
}
