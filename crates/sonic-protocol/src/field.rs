//! Field names, field types and converted field values.

use std::fmt;

use chrono::NaiveDateTime;

use crate::{DeviceParamConstantType, DeviceType, EnumKind, EnumValue, Procedure, Version};

wire_enum! {
    /// Names of answer fields and command parameters.
    pub enum FieldName {
        Undefined = "undefined",
        UnknownAnswer = "unknown_answer",
        CommandCode = "command_code",
        Success = "success",
        Help = "help",
        TransducerId = "transducer_id",
        Frequency = "freq",
        Swf = "swf",
        Gain = "gain",
        Temperature = "temp",
        Signal = "signal",
        Waveform = "waveform",
        Urms = "urms",
        Irms = "irms",
        Phase = "phase",
        TsFlag = "ts_flag",
        Procedure = "procedure",
        ProcedureArg = "procedure_arg",
        ErrorCode = "error_code",
        ErrorMessage = "error_message",
        Message = "message",
        Atf = "atf",
        Atk = "atk",
        Att = "att",
        Adc = "adc",
        DeviceType = "device_type",
        ProtocolVersion = "protocol_version",
        IsRelease = "is_release",
        AdditionalOptions = "additional_options",
        BuildDate = "build_date",
        BuildHash = "build_hash",
        HardwareVersion = "hardware_version",
        FirmwareVersion = "firmware_version",
        InputSource = "input_source",
        CommunicationChannel = "communication_channel",
        CommunicationProtocol = "communication_protocol",
        Termination = "termination",
        Timestamp = "timestamp",
        Index = "index",
        AnomalyDetection = "anomaly_detection",
        TransducerState = "transducer_state",
        SystemState = "system_state",
        LogLevel = "log_level",
        LoggerName = "logger_name",
        ScanFCenter = "scan_f_center",
        ScanFRange = "scan_f_range",
        ScanFStep = "scan_f_step",
        ScanFShift = "scan_f_shift",
        ScanTStep = "scan_t_step",
        ScanGain = "scan_gain",
        TuneFStep = "tune_f_step",
        TuneFShift = "tune_f_shift",
        TuneTTime = "tune_t_time",
        TuneTStep = "tune_t_step",
        TuneNSteps = "tune_n_steps",
        TuneGain = "tune_gain",
        WipeFRange = "wipe_f_range",
        WipeFStep = "wipe_f_step",
        WipeTOn = "wipe_t_on",
        WipeTOff = "wipe_t_off",
        WipeTPause = "wipe_t_pause",
        WipeGain = "wipe_gain",
        RampFStart = "ramp_f_start",
        RampFStop = "ramp_f_stop",
        RampFStep = "ramp_f_step",
        RampTOn = "ramp_t_on",
        RampTOff = "ramp_t_off",
        LegacyRang = "rang",
        LegacyStep = "step",
        LegacySing = "sing",
        LegacyPaus = "paus",
    }
}

// ============================================================================
// Units
// ============================================================================

/// SI unit attached to a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SIUnit {
    Meter,
    Second,
    Hertz,
    Celsius,
    Kelvin,
    Volt,
    Ampere,
    Degree,
    Percent,
}

impl SIUnit {
    /// Get the unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            SIUnit::Meter => "m",
            SIUnit::Second => "s",
            SIUnit::Hertz => "Hz",
            SIUnit::Celsius => "°C",
            SIUnit::Kelvin => "K",
            SIUnit::Volt => "V",
            SIUnit::Ampere => "A",
            SIUnit::Degree => "°",
            SIUnit::Percent => "%",
        }
    }
}

/// Decimal prefix applied to an SI unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SIPrefix {
    Nano,
    Micro,
    Milli,
    Deci,
    Centi,
    #[default]
    None,
    Kilo,
    Mega,
    Giga,
}

impl SIPrefix {
    /// Get the prefix symbol (empty for no prefix).
    pub fn symbol(&self) -> &'static str {
        match self {
            SIPrefix::Nano => "n",
            SIPrefix::Micro => "u",
            SIPrefix::Milli => "m",
            SIPrefix::Deci => "d",
            SIPrefix::Centi => "c",
            SIPrefix::None => "",
            SIPrefix::Kilo => "k",
            SIPrefix::Mega => "M",
            SIPrefix::Giga => "G",
        }
    }

    /// Get the decimal exponent of the prefix.
    pub fn exponent(&self) -> i32 {
        match self {
            SIPrefix::Nano => -9,
            SIPrefix::Micro => -6,
            SIPrefix::Milli => -3,
            SIPrefix::Deci => -2,
            SIPrefix::Centi => -1,
            SIPrefix::None => 0,
            SIPrefix::Kilo => 3,
            SIPrefix::Mega => 6,
            SIPrefix::Giga => 9,
        }
    }
}

// ============================================================================
// Field types
// ============================================================================

/// Primitive wire type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    UInt8,
    UInt16,
    UInt32,
    Float,
    Bool,
    String,
    Version,
    Timestamp,
}

impl PrimitiveKind {
    /// Check if the kind is one of the integer kinds.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int | PrimitiveKind::UInt8 | PrimitiveKind::UInt16 | PrimitiveKind::UInt32
        )
    }
}

/// Conversion applied to the captured text of a field.
///
/// The enumeration converter carries the enumeration it converts into, so a
/// field can never reference an enumeration without converting through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConverterType {
    Primitive,
    Enum(EnumKind),
    Version,
    Timestamp,
    /// `on` maps to `true`, anything else to `false`.
    Signal,
    /// `release` maps to `true`, `debug` to `false`.
    BuildType,
}

/// A field limit: either a literal or a reference to a device constant
/// resolved when the lookup table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    Value(i64),
    Constant(DeviceParamConstantType),
}

impl Bound {
    /// Get the literal value, if already resolved.
    pub fn value(&self) -> Option<i64> {
        match self {
            Bound::Value(v) => Some(*v),
            Bound::Constant(_) => None,
        }
    }
}

/// Type description of one wire field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: PrimitiveKind,
    pub converter: Option<ConverterType>,
    pub si_unit: Option<SIUnit>,
    pub si_prefix: Option<SIPrefix>,
    pub min_value: Option<Bound>,
    pub max_value: Option<Bound>,
    pub allowed_values: Option<Vec<String>>,
}

impl FieldType {
    /// Create a plain field type of the given kind.
    pub fn new(kind: PrimitiveKind) -> Self {
        FieldType {
            kind,
            converter: None,
            si_unit: None,
            si_prefix: None,
            min_value: None,
            max_value: None,
            allowed_values: None,
        }
    }

    pub fn int() -> Self {
        FieldType::new(PrimitiveKind::Int)
    }

    pub fn uint32() -> Self {
        FieldType::new(PrimitiveKind::UInt32)
    }

    pub fn string() -> Self {
        FieldType::new(PrimitiveKind::String)
    }

    pub fn boolean() -> Self {
        FieldType::new(PrimitiveKind::Bool)
    }

    /// A field converted into one of the registered enumerations.
    pub fn enumeration(kind: EnumKind) -> Self {
        FieldType::new(PrimitiveKind::String).with_converter(ConverterType::Enum(kind))
    }

    /// A version field (`v1.2.3` or `1.2.3`).
    pub fn version() -> Self {
        FieldType::new(PrimitiveKind::Version).with_converter(ConverterType::Version)
    }

    /// A timestamp field.
    pub fn timestamp() -> Self {
        FieldType::new(PrimitiveKind::Timestamp).with_converter(ConverterType::Timestamp)
    }

    /// An `on`/`off` signal field.
    pub fn signal() -> Self {
        FieldType::new(PrimitiveKind::Bool).with_converter(ConverterType::Signal)
    }

    /// A `release`/`debug` build type field.
    pub fn build_type() -> Self {
        FieldType::new(PrimitiveKind::Bool).with_converter(ConverterType::BuildType)
    }

    /// Set the converter.
    pub fn with_converter(mut self, converter: ConverterType) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Attach a unit and prefix.
    pub fn with_unit(mut self, unit: SIUnit, prefix: SIPrefix) -> Self {
        self.si_unit = Some(unit);
        self.si_prefix = Some(prefix);
        self
    }

    /// Attach limits.
    pub fn with_limits(mut self, min: Bound, max: Bound) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Restrict the field to a fixed set of values.
    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Get the enumeration this field converts into, if any.
    pub fn enum_kind(&self) -> Option<EnumKind> {
        match self.converter {
            Some(ConverterType::Enum(kind)) => Some(kind),
            _ => None,
        }
    }

    /// Get the unit suffix (`prefix + unit`) used on the wire, if any.
    pub fn unit_suffix(&self) -> Option<String> {
        self.si_unit.map(|unit| {
            let prefix = self.si_prefix.unwrap_or_default();
            format!("{}{}", prefix.symbol(), unit.symbol())
        })
    }
}

// ============================================================================
// Field values
// ============================================================================

/// A converted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Version(Version),
    Timestamp(NaiveDateTime),
    Enum(EnumValue),
}

impl FieldValue {
    /// Get the value as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<Version> {
        match self {
            FieldValue::Version(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<EnumValue> {
        match self {
            FieldValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a procedure, if it is one.
    pub fn as_procedure(&self) -> Option<Procedure> {
        match self {
            FieldValue::Enum(EnumValue::Procedure(p)) => Some(*p),
            _ => None,
        }
    }

    /// Get the value as a device type, if it is one.
    pub fn as_device_type(&self) -> Option<DeviceType> {
        match self {
            FieldValue::Enum(EnumValue::DeviceType(d)) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Str(v) => f.write_str(v),
            FieldValue::Version(v) => write!(f, "{}", v),
            FieldValue::Timestamp(v) => write!(f, "{}", v.format(crate::converter::TIMESTAMP_FORMAT)),
            FieldValue::Enum(v) => write!(f, "{}", v),
        }
    }
}
