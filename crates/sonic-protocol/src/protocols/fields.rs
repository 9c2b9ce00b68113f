//! Field types, answer fields and parameters shared by the protocol versions.

use crate::{
    AnswerFieldDef, Bound, CommandParamDef, DeviceParamConstantType as C, EnumKind, FieldName,
    FieldType, PrimitiveKind, SIPrefix, SIUnit,
};

fn limited(kind: PrimitiveKind, min: C, max: C) -> FieldType {
    FieldType::new(kind).with_limits(Bound::Constant(min), Bound::Constant(max))
}

// ============================================================================
// Field types
// ============================================================================

pub fn frequency() -> FieldType {
    limited(PrimitiveKind::UInt32, C::MinFrequency, C::MaxFrequency).with_unit(SIUnit::Hertz, SIPrefix::None)
}

pub fn frequency_step() -> FieldType {
    limited(PrimitiveKind::UInt32, C::MinFStep, C::MaxFStep).with_unit(SIUnit::Hertz, SIPrefix::None)
}

pub fn frequency_shift() -> FieldType {
    limited(PrimitiveKind::UInt32, C::MinFShift, C::MaxFShift).with_unit(SIUnit::Hertz, SIPrefix::None)
}

pub fn gain() -> FieldType {
    limited(PrimitiveKind::UInt8, C::MinGain, C::MaxGain).with_unit(SIUnit::Percent, SIPrefix::None)
}

pub fn swf() -> FieldType {
    limited(PrimitiveKind::UInt8, C::MinSwf, C::MaxSwf)
}

pub fn transducer_index() -> FieldType {
    limited(PrimitiveKind::UInt8, C::MinTransducerIndex, C::MaxTransducerIndex)
}

pub fn time_on() -> FieldType {
    limited(PrimitiveKind::UInt32, C::MinTOn, C::MaxTOn).with_unit(SIUnit::Second, SIPrefix::Milli)
}

pub fn time_off() -> FieldType {
    limited(PrimitiveKind::UInt32, C::MinTOff, C::MaxTOff).with_unit(SIUnit::Second, SIPrefix::Milli)
}

pub fn n_steps() -> FieldType {
    limited(PrimitiveKind::UInt8, C::MinNSteps, C::MaxNSteps)
}

pub fn temperature_kelvin() -> FieldType {
    FieldType::uint32()
        .with_unit(SIUnit::Kelvin, SIPrefix::Milli)
        .with_limits(Bound::Value(0), Bound::Value(6_273_150))
}

fn micro(unit: SIUnit) -> FieldType {
    FieldType::uint32().with_unit(unit, SIPrefix::Micro)
}

// ============================================================================
// Answer fields
// ============================================================================

pub fn field(name: FieldName, field_type: FieldType) -> AnswerFieldDef {
    AnswerFieldDef::new(name, field_type)
}

pub fn field_frequency() -> AnswerFieldDef {
    field(FieldName::Frequency, frequency())
}

pub fn field_gain() -> AnswerFieldDef {
    field(FieldName::Gain, gain())
}

pub fn field_swf() -> AnswerFieldDef {
    field(FieldName::Swf, swf())
}

pub fn field_signal() -> AnswerFieldDef {
    field(FieldName::Signal, FieldType::signal())
}

pub fn field_procedure() -> AnswerFieldDef {
    field(FieldName::Procedure, FieldType::enumeration(EnumKind::Procedure))
}

pub fn field_error_code() -> AnswerFieldDef {
    field(FieldName::ErrorCode, FieldType::new(PrimitiveKind::UInt16))
}

pub fn field_temperature() -> AnswerFieldDef {
    field(FieldName::Temperature, temperature_kelvin())
}

pub fn field_urms() -> AnswerFieldDef {
    field(FieldName::Urms, micro(SIUnit::Volt))
}

pub fn field_irms() -> AnswerFieldDef {
    field(FieldName::Irms, micro(SIUnit::Ampere))
}

pub fn field_phase() -> AnswerFieldDef {
    field(FieldName::Phase, micro(SIUnit::Degree))
}

pub fn field_ts_flag() -> AnswerFieldDef {
    field(FieldName::TsFlag, FieldType::uint32())
}

pub fn field_device_type() -> AnswerFieldDef {
    field(FieldName::DeviceType, FieldType::enumeration(EnumKind::DeviceType))
}

pub fn field_version(name: FieldName) -> AnswerFieldDef {
    field(name, FieldType::version())
}

pub fn field_message() -> AnswerFieldDef {
    field(FieldName::Message, FieldType::string())
}

pub fn field_success() -> AnswerFieldDef {
    field(FieldName::Success, FieldType::string())
}

pub fn field_unknown_answer() -> AnswerFieldDef {
    field(FieldName::UnknownAnswer, FieldType::string())
}

pub fn field_timestamp() -> AnswerFieldDef {
    field(FieldName::Timestamp, FieldType::timestamp())
}

// ============================================================================
// Parameters
// ============================================================================

pub fn param(name: FieldName, field_type: FieldType) -> CommandParamDef {
    CommandParamDef::new(name, field_type)
}

pub fn param_index() -> CommandParamDef {
    param(FieldName::Index, transducer_index()).with_description("Index of the transducer configuration")
}

pub fn param_frequency() -> CommandParamDef {
    param(FieldName::Frequency, frequency()).with_description("Frequency of the transducer")
}

pub fn param_gain() -> CommandParamDef {
    param(FieldName::Gain, gain()).with_description("Gain of the transducer")
}
