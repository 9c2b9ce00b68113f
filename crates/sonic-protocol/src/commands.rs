//! Typed commands and their rendering into request text.
//!
//! A [`Command`] is a code plus an optional index and setter value. It is
//! rendered against a [`CommandLookupTable`] as
//! `identifier + index + "=" + value`, where the identifier is the first one
//! the resolved contract lists.

use std::fmt;

use chrono::NaiveDateTime;

use crate::converter::format_timestamp;
use crate::{CommandCode, CommandLookupTable, ContractError, ContractResult};

/// A command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    pub code: CommandCode,
    pub index: Option<u32>,
    pub value: Option<String>,
}

impl Command {
    /// A command without arguments.
    pub fn new(code: CommandCode) -> Self {
        Command {
            code,
            index: None,
            value: None,
        }
    }

    /// A setter command carrying `value`.
    pub fn set(code: CommandCode, value: impl fmt::Display) -> Self {
        Command::new(code).with_value(value)
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_value(mut self, value: impl fmt::Display) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn get_protocol() -> Self {
        Command::new(CommandCode::GET_PROTOCOL)
    }

    pub fn get_info() -> Self {
        Command::new(CommandCode::GET_INFO)
    }

    pub fn get_update() -> Self {
        Command::new(CommandCode::GET_UPDATE)
    }

    pub fn get_frequency() -> Self {
        Command::new(CommandCode::GET_FREQ)
    }

    pub fn get_gain() -> Self {
        Command::new(CommandCode::GET_GAIN)
    }

    pub fn set_frequency(frequency: u32) -> Self {
        Command::set(CommandCode::SET_FREQ, frequency)
    }

    pub fn set_gain(gain: u32) -> Self {
        Command::set(CommandCode::SET_GAIN, gain)
    }

    pub fn set_swf(swf: u32) -> Self {
        Command::set(CommandCode::SET_SWF, swf)
    }

    pub fn set_on() -> Self {
        Command::new(CommandCode::SET_ON)
    }

    pub fn set_off() -> Self {
        Command::new(CommandCode::SET_OFF)
    }

    pub fn set_stop() -> Self {
        Command::new(CommandCode::SET_STOP)
    }

    pub fn get_atf(index: u32) -> Self {
        Command::new(CommandCode::GET_ATF).with_index(index)
    }

    pub fn set_atf(index: u32, frequency: u32) -> Self {
        Command::set(CommandCode::SET_ATF, frequency).with_index(index)
    }

    /// Set the device clock.
    pub fn set_datetime(timestamp: &NaiveDateTime) -> Self {
        Command::set(CommandCode::SET_DATETIME, format_timestamp(timestamp))
    }

    /// Render the request text against a lookup table.
    pub fn render(&self, table: &CommandLookupTable) -> ContractResult<String> {
        let lookup = table
            .get(self.code)
            .ok_or(ContractError::UnknownCommand(self.code))?;
        let bad_request = |reason: &str| ContractError::BadRequest {
            code: self.code,
            reason: reason.to_string(),
        };

        let def = lookup
            .command_def
            .as_ref()
            .ok_or_else(|| bad_request("notifications cannot be sent"))?;
        let identifier = def.identifier().ok_or_else(|| bad_request("no identifier"))?;

        let mut request = identifier.to_string();
        match (&def.index_param, self.index) {
            (Some(_), Some(index)) => request.push_str(&index.to_string()),
            (Some(_), None) => return Err(bad_request("missing index")),
            (None, Some(_)) => return Err(bad_request("command takes no index")),
            (None, None) => {}
        }
        match (&def.setter_param, &self.value) {
            (Some(_), Some(value)) => {
                request.push('=');
                request.push_str(value);
            }
            (Some(_), None) => return Err(bad_request("missing value")),
            (None, Some(_)) => return Err(bad_request("command takes no value")),
            (None, None) => {}
        }
        Ok(request)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(index) = self.index {
            write!(f, "[{}]", index)?;
        }
        if let Some(value) = &self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::protocol_builder;
    use crate::{DeviceType, Version};

    fn worker_table() -> CommandLookupTable {
        protocol_builder()
            .build(DeviceType::MvpWorker, Version::new(1, 0, 0), true)
            .unwrap()
    }

    #[test]
    fn test_render_setter() {
        let table = worker_table();
        assert_eq!(Command::set_frequency(1000).render(&table).unwrap(), "!f=1000");
        assert_eq!(Command::get_update().render(&table).unwrap(), "-");
        assert_eq!(Command::set_atf(2, 1_000_000).render(&table).unwrap(), "!atf2=1000000");
    }

    #[test]
    fn test_render_bad_requests() {
        let table = worker_table();
        let missing_index = Command::new(CommandCode::GET_ATF).render(&table).unwrap_err();
        assert!(matches!(missing_index, ContractError::BadRequest { .. }));

        let missing_value = Command::new(CommandCode::SET_FREQ).render(&table).unwrap_err();
        assert!(matches!(missing_value, ContractError::BadRequest { .. }));

        let stray_value = Command::set(CommandCode::GET_FREQ, 5).render(&table).unwrap_err();
        assert!(matches!(stray_value, ContractError::BadRequest { .. }));

        assert_eq!(
            Command::new(CommandCode(4242)).render(&table).unwrap_err(),
            ContractError::UnknownCommand(CommandCode(4242))
        );
    }
}
