//! The device facade.
//!
//! A [`Device`] couples a communicator with the lookup table resolved for the
//! connected firmware. Its `execute_*` methods never fail: transport and
//! contract errors are logged, the session is closed and a failed
//! [`Answer`] is returned instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sonic_protocol::{
    Answer, Command, CommandCode, CommandLookupTable, DeviceType, FieldName, ProtocolInfo, Version,
};
use tracing::{debug, error, info};

use crate::communicator::{Communicator, CommunicatorKind, SendOptions};
use crate::error::DeviceResult;
use crate::events::EventBus;
use crate::executor::CommandExecutor;

/// Response time assumed for free text requests.
pub const TEXT_RESPONSE_TIME: Duration = Duration::from_millis(400);

/// What the firmware reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub device_type: DeviceType,
    pub protocol_version: Version,
    pub is_release: bool,
    pub hardware_version: Version,
    pub firmware_version: Version,
    pub build_hash: Option<String>,
    pub build_date: Option<String>,
}

impl FirmwareInfo {
    /// Info known before `?info` was asked.
    pub fn from_protocol(info: &ProtocolInfo) -> Self {
        FirmwareInfo {
            device_type: info.device_type,
            protocol_version: info.version,
            is_release: info.is_release,
            hardware_version: Version::new(0, 0, 0),
            firmware_version: Version::new(0, 0, 0),
            build_hash: None,
            build_date: None,
        }
    }

    /// Fill in the fields of a `?info` answer.
    pub fn update_from(&mut self, answer: &Answer) {
        if let Some(v) = answer.value(FieldName::HardwareVersion).and_then(|v| v.as_version()) {
            self.hardware_version = v;
        }
        if let Some(v) = answer.value(FieldName::FirmwareVersion).and_then(|v| v.as_version()) {
            self.firmware_version = v;
        }
        if let Some(v) = answer.value(FieldName::BuildHash).and_then(|v| v.as_str()) {
            self.build_hash = Some(v.to_string());
        }
        if let Some(v) = answer.value(FieldName::BuildDate).and_then(|v| v.as_str()) {
            self.build_date = Some(v.to_string());
        }
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hw {} fw {} protocol {} ({})",
            self.device_type,
            self.hardware_version,
            self.firmware_version,
            self.protocol_version,
            if self.is_release { "release" } else { "debug" }
        )
    }
}

/// A command given either typed or as free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    Typed(Command),
    Text(String),
}

impl From<Command> for CommandRequest {
    fn from(command: Command) -> Self {
        CommandRequest::Typed(command)
    }
}

impl From<&str> for CommandRequest {
    fn from(text: &str) -> Self {
        CommandRequest::Text(text.to_string())
    }
}

impl From<String> for CommandRequest {
    fn from(text: String) -> Self {
        CommandRequest::Text(text)
    }
}

/// A connected device.
pub struct Device {
    executor: CommandExecutor,
    firmware: FirmwareInfo,
    events: EventBus,
}

impl Device {
    pub fn new(executor: CommandExecutor, firmware: FirmwareInfo, events: EventBus) -> Self {
        Device {
            executor,
            firmware,
            events,
        }
    }

    pub fn protocol_info(&self) -> &ProtocolInfo {
        self.executor.table().info()
    }

    pub fn device_type(&self) -> DeviceType {
        self.protocol_info().device_type
    }

    pub fn firmware(&self) -> &FirmwareInfo {
        &self.firmware
    }

    pub fn table(&self) -> &Arc<CommandLookupTable> {
        self.executor.table()
    }

    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        self.executor.communicator()
    }

    pub fn communicator_kind(&self) -> CommunicatorKind {
        self.communicator().kind()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.communicator().is_connected()
    }

    /// Check if the resolved protocol has a contract for `code`.
    pub fn has_command(&self, code: CommandCode) -> bool {
        self.table().contains(code)
    }

    /// Send a typed command, propagating errors.
    pub async fn send(&self, command: &Command) -> DeviceResult<Answer> {
        self.executor.send_command(command).await
    }

    /// Send free text, propagating errors.
    ///
    /// If the text names a known command its contract validates the answer.
    pub async fn send_text(&self, text: &str) -> DeviceResult<Answer> {
        let text = text.trim();
        let lookup = deduce_code(self.table(), text).and_then(|code| self.table().get(code));
        let options = SendOptions {
            timeout: Some(TEXT_RESPONSE_TIME),
            code: lookup.map(|lookup| lookup.code),
        };
        let validator = lookup.and_then(|lookup| lookup.validator.as_deref());
        self.executor.send_message(text, validator, &options).await
    }

    /// Execute a command; failures become a failed answer and close the session.
    pub async fn execute_command(&self, request: impl Into<CommandRequest>) -> Answer {
        let request = request.into();
        match &request {
            CommandRequest::Typed(command) if command.code == CommandCode::GET_UPDATE => {}
            CommandRequest::Typed(command) => info!(%command, "execute command"),
            CommandRequest::Text(text) => info!(%text, "execute command"),
        }

        let result = match &request {
            CommandRequest::Typed(command) => self.send(command).await,
            CommandRequest::Text(text) => self.send_text(text).await,
        };
        match result {
            Ok(answer) => answer,
            Err(e) => {
                error!("command failed: {}", e);
                self.disconnect().await;
                Answer::failure(e.to_string())
            }
        }
    }

    pub async fn set_signal_on(&self) -> Answer {
        self.execute_command(Command::set_on()).await
    }

    pub async fn set_signal_off(&self) -> Answer {
        self.execute_command(Command::set_off()).await
    }

    /// Ask the device for its overview (`?`).
    pub async fn get_overview(&self) -> Answer {
        self.execute_command("?").await
    }

    pub async fn get_update(&self) -> Answer {
        self.execute_command(Command::get_update()).await
    }

    /// Poll the status, propagating errors.
    pub async fn try_get_update(&self) -> DeviceResult<Answer> {
        self.send(&Command::get_update()).await
    }

    /// Close the session and release the transport. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        if self.is_connected() {
            info!("disconnect");
        } else {
            debug!("releasing connection of a dead session");
        }
        // The transport may outlive the session, e.g. a child process after EOF.
        self.communicator().close().await;
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("firmware", &self.firmware)
            .field("executor", &self.executor)
            .finish()
    }
}

/// Find the command a request text addresses.
///
/// The setter value and trailing index digits are ignored.
pub fn deduce_code(table: &CommandLookupTable, request: &str) -> Option<CommandCode> {
    let identifier = request.split('=').next().unwrap_or(request).trim();
    table
        .find_by_identifier(identifier)
        .or_else(|| table.find_by_identifier(identifier.trim_end_matches(|c: char| c.is_ascii_digit())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_protocol::protocols::{protocol_builder, v1_0_0};

    #[test]
    fn test_deduce_code() {
        let table = protocol_builder()
            .build(DeviceType::MvpWorker, v1_0_0::VERSION, true)
            .unwrap();
        assert_eq!(deduce_code(&table, "!f=1000"), Some(CommandCode::SET_FREQ));
        assert_eq!(deduce_code(&table, "!atf2=100000"), Some(CommandCode::SET_ATF));
        assert_eq!(deduce_code(&table, "?atf3"), Some(CommandCode::GET_ATF));
        assert_eq!(deduce_code(&table, "-"), Some(CommandCode::GET_UPDATE));
        assert_eq!(deduce_code(&table, "?nonsense"), None);
    }

    #[test]
    fn test_firmware_info_from_answer() {
        let table = protocol_builder()
            .build(DeviceType::MvpWorker, v1_0_0::VERSION, true)
            .unwrap();
        let validator = table
            .get(CommandCode::GET_INFO)
            .and_then(|lookup| lookup.validator.clone())
            .unwrap();
        let answer = validator.validate("mvp_worker#v1.2.0#v0.9.1#abc123#2024-05-01");
        assert!(answer.valid);

        let mut firmware = FirmwareInfo::from_protocol(table.info());
        firmware.update_from(&answer);
        assert_eq!(firmware.hardware_version, Version::new(1, 2, 0));
        assert_eq!(firmware.firmware_version, Version::new(0, 9, 1));
        assert_eq!(firmware.build_hash.as_deref(), Some("abc123"));
        assert_eq!(firmware.device_type, DeviceType::MvpWorker);
    }
}
