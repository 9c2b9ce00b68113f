//! Named enumerations carried in answer fields and command parameters.
//!
//! Every enumeration here is registered as a custom data type of a protocol
//! and can be referenced by a [`FieldType`](crate::FieldType) through its
//! [`EnumKind`].

use std::fmt;

wire_enum! {
    /// Device families understood by the protocol.
    pub enum DeviceType {
        Unknown = "unknown",
        Catch = "catch",
        Descale = "descale",
        MvpWorker = "mvp_worker",
        Crystal = "crystal",
        Configurator = "configurator",
    }
}

wire_enum! {
    /// Procedure currently executed by the device firmware.
    pub enum Procedure {
        NoProc = "none",
        Auto = "auto",
        Tune = "tune",
        Scan = "scan",
        Wipe = "wipe",
        Ramp = "ramp",
        DutyCycle = "duty_cycle",
    }
}

wire_enum! {
    /// Source the device takes its control input from.
    pub enum InputSource {
        External = "external",
        Analog = "analog",
        Relay = "relay",
        Digital = "digital",
    }
}

wire_enum! {
    /// Output waveform.
    pub enum Waveform {
        Sine = "sine",
        Square = "square",
    }
}

wire_enum! {
    /// Severity of a device-side log line.
    pub enum DeviceLogLevel {
        Debug = "DEBUG",
        Info = "INFO",
        Warn = "WARN",
        Error = "ERROR",
    }
}

wire_enum! {
    /// Firmware logger addressed by `SET_LOG_LEVEL`.
    pub enum LoggerName {
        App = "appLogger",
        Transducer = "transducerLogger",
        Hwfc = "hwfcLogger",
        Procedure = "procedureLogger",
        Global = "global",
    }
}

wire_enum! {
    /// Firmware build flavor as reported by `?protocol`.
    pub enum BuildType {
        Release = "release",
        Debug = "debug",
    }
}

wire_enum! {
    /// Physical channel the device communicates over.
    pub enum CommunicationChannel {
        Usb = "usb",
        Rs485 = "rs485",
        Rs232 = "rs232",
    }
}

wire_enum! {
    /// Application protocol spoken on a channel.
    pub enum CommunicationProtocol {
        Sonic = "sonic",
        Modbus = "modbus",
    }
}

wire_enum! {
    /// Anomaly reported by the transducer monitoring.
    pub enum Anomaly {
        NoAnomaly = "none" => 0,
        Submerged = "submerged" => 1,
        Air = "air" => 2,
        Bubbles = "bubbles" => 3,
    }
}

wire_enum! {
    /// State of the transducer stage.
    pub enum TransducerState {
        Idle = "idle" => 0,
        Active = "active" => 1,
        Fault = "fault" => 2,
    }
}

wire_enum! {
    /// Overall state of the device.
    pub enum SystemState {
        Ok = "ok" => 0,
        Warning = "warning" => 1,
        Error = "error" => 2,
    }
}

// ============================================================================
// Enumeration registry
// ============================================================================

/// Reference to a named enumeration, used by field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumKind {
    DeviceType,
    Procedure,
    InputSource,
    Waveform,
    DeviceLogLevel,
    LoggerName,
    BuildType,
    CommunicationChannel,
    CommunicationProtocol,
    Anomaly,
    TransducerState,
    SystemState,
}

impl EnumKind {
    /// Get the registry name of this enumeration.
    pub fn type_name(&self) -> &'static str {
        match self {
            EnumKind::DeviceType => "E_DEVICE_TYPE",
            EnumKind::Procedure => "E_PROCEDURE",
            EnumKind::InputSource => "E_INPUT_SOURCE",
            EnumKind::Waveform => "E_WAVEFORM",
            EnumKind::DeviceLogLevel => "E_LOG_LEVEL",
            EnumKind::LoggerName => "E_LOGGER_NAME",
            EnumKind::BuildType => "E_BUILD_TYPE",
            EnumKind::CommunicationChannel => "E_COMMUNICATION_CHANNEL",
            EnumKind::CommunicationProtocol => "E_COMMUNICATION_PROTOCOL",
            EnumKind::Anomaly => "E_ANOMALY",
            EnumKind::TransducerState => "E_TRANSDUCER_STATE",
            EnumKind::SystemState => "E_SYSTEM_STATE",
        }
    }

    /// Parse a member of this enumeration from its wire text.
    pub fn parse(&self, input: &str) -> Option<EnumValue> {
        match self {
            EnumKind::DeviceType => DeviceType::parse(input).map(EnumValue::DeviceType),
            EnumKind::Procedure => Procedure::parse(input).map(EnumValue::Procedure),
            EnumKind::InputSource => InputSource::parse(input).map(EnumValue::InputSource),
            EnumKind::Waveform => Waveform::parse(input).map(EnumValue::Waveform),
            EnumKind::DeviceLogLevel => DeviceLogLevel::parse(input).map(EnumValue::DeviceLogLevel),
            EnumKind::LoggerName => LoggerName::parse(input).map(EnumValue::LoggerName),
            EnumKind::BuildType => BuildType::parse(input).map(EnumValue::BuildType),
            EnumKind::CommunicationChannel => {
                CommunicationChannel::parse(input).map(EnumValue::CommunicationChannel)
            }
            EnumKind::CommunicationProtocol => {
                CommunicationProtocol::parse(input).map(EnumValue::CommunicationProtocol)
            }
            EnumKind::Anomaly => Anomaly::parse(input).map(EnumValue::Anomaly),
            EnumKind::TransducerState => TransducerState::parse(input).map(EnumValue::TransducerState),
            EnumKind::SystemState => SystemState::parse(input).map(EnumValue::SystemState),
        }
    }
}

impl fmt::Display for EnumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A converted member of one of the registered enumerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumValue {
    DeviceType(DeviceType),
    Procedure(Procedure),
    InputSource(InputSource),
    Waveform(Waveform),
    DeviceLogLevel(DeviceLogLevel),
    LoggerName(LoggerName),
    BuildType(BuildType),
    CommunicationChannel(CommunicationChannel),
    CommunicationProtocol(CommunicationProtocol),
    Anomaly(Anomaly),
    TransducerState(TransducerState),
    SystemState(SystemState),
}

impl EnumValue {
    /// Get the enumeration this value belongs to.
    pub fn kind(&self) -> EnumKind {
        match self {
            EnumValue::DeviceType(_) => EnumKind::DeviceType,
            EnumValue::Procedure(_) => EnumKind::Procedure,
            EnumValue::InputSource(_) => EnumKind::InputSource,
            EnumValue::Waveform(_) => EnumKind::Waveform,
            EnumValue::DeviceLogLevel(_) => EnumKind::DeviceLogLevel,
            EnumValue::LoggerName(_) => EnumKind::LoggerName,
            EnumValue::BuildType(_) => EnumKind::BuildType,
            EnumValue::CommunicationChannel(_) => EnumKind::CommunicationChannel,
            EnumValue::CommunicationProtocol(_) => EnumKind::CommunicationProtocol,
            EnumValue::Anomaly(_) => EnumKind::Anomaly,
            EnumValue::TransducerState(_) => EnumKind::TransducerState,
            EnumValue::SystemState(_) => EnumKind::SystemState,
        }
    }

    /// Get the wire string of the member.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnumValue::DeviceType(v) => v.as_str(),
            EnumValue::Procedure(v) => v.as_str(),
            EnumValue::InputSource(v) => v.as_str(),
            EnumValue::Waveform(v) => v.as_str(),
            EnumValue::DeviceLogLevel(v) => v.as_str(),
            EnumValue::LoggerName(v) => v.as_str(),
            EnumValue::BuildType(v) => v.as_str(),
            EnumValue::CommunicationChannel(v) => v.as_str(),
            EnumValue::CommunicationProtocol(v) => v.as_str(),
            EnumValue::Anomaly(v) => v.as_str(),
            EnumValue::TransducerState(v) => v.as_str(),
            EnumValue::SystemState(v) => v.as_str(),
        }
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_wire_value_and_name() {
        assert_eq!(Procedure::parse("scan"), Some(Procedure::Scan));
        assert_eq!(Procedure::parse("NO_PROC"), Some(Procedure::NoProc));
        assert_eq!(Procedure::parse("none"), Some(Procedure::NoProc));
        assert_eq!(DeviceType::parse("MVP_WORKER"), Some(DeviceType::MvpWorker));
        assert_eq!(DeviceType::parse(" mvp_worker "), Some(DeviceType::MvpWorker));
        assert_eq!(Procedure::parse("spin"), None);
    }

    #[test]
    fn test_parse_integer_form() {
        assert_eq!(SystemState::parse("2"), Some(SystemState::Error));
        assert_eq!(TransducerState::parse("active"), Some(TransducerState::Active));
        // String-valued enumerations have no integer form
        assert_eq!(Procedure::parse("0"), None);
    }

    #[test]
    fn test_enum_kind_dispatch() {
        let value = EnumKind::Procedure.parse("wipe").unwrap();
        assert_eq!(value, EnumValue::Procedure(Procedure::Wipe));
        assert_eq!(value.kind(), EnumKind::Procedure);
        assert_eq!(value.to_string(), "wipe");
        assert!(EnumKind::Waveform.parse("triangle").is_none());
    }

    #[test]
    fn test_from_str_error() {
        let err = "bogus".parse::<DeviceType>().unwrap_err();
        assert_eq!(err.kind, "DeviceType");
        assert_eq!("crystal".parse::<DeviceType>().unwrap(), DeviceType::Crystal);
    }
}
