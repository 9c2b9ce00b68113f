//! Conversion of captured answer text into typed field values.
//!
//! Conversions never fail loudly: a value that does not convert yields
//! `None`, which the validator reports as an invalid answer.

use chrono::{NaiveDate, NaiveDateTime};

use crate::{ConverterType, FieldType, FieldValue, PrimitiveKind, Version};

/// Canonical display format of timestamps.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S %d.%m.%Y";

const TIMESTAMP_SEPARATORS: &[char] = &[':', '.', '_', '-', ' '];

/// Parse a device timestamp `h:m:s d.m.yyyy`.
///
/// Any of `:._-` and space is accepted between the components. Hours,
/// minutes, seconds, day and month take one or two digits, the year four.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let parts: Vec<&str> = text.trim().split(TIMESTAMP_SEPARATORS).collect();
    if parts.len() != 6 {
        return None;
    }
    let short = |part: &str| -> Option<u32> {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    };
    let hour = short(parts[0])?;
    let minute = short(parts[1])?;
    let second = short(parts[2])?;
    let day = short(parts[3])?;
    let month = short(parts[4])?;
    if parts[5].len() != 4 || !parts[5].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = parts[5].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Format a timestamp the way devices expect it.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a boolean written as `true`, `false`, `1` or `0` (any case).
pub fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Some(false)
    } else {
        None
    }
}

/// Convert a primitive value of the given kind.
pub fn convert_primitive(kind: PrimitiveKind, text: &str) -> Option<FieldValue> {
    let trimmed = text.trim();
    match kind {
        PrimitiveKind::Int => trimmed.parse::<i64>().ok().map(FieldValue::Int),
        PrimitiveKind::UInt8 => parse_unsigned(trimmed, u8::MAX as u64),
        PrimitiveKind::UInt16 => parse_unsigned(trimmed, u16::MAX as u64),
        PrimitiveKind::UInt32 => parse_unsigned(trimmed, u32::MAX as u64),
        PrimitiveKind::Float => trimmed.parse::<f64>().ok().map(FieldValue::Float),
        PrimitiveKind::Bool => parse_bool(trimmed).map(FieldValue::Bool),
        PrimitiveKind::String => Some(FieldValue::Str(text.to_string())),
        PrimitiveKind::Version => trimmed.parse::<Version>().ok().map(FieldValue::Version),
        PrimitiveKind::Timestamp => parse_timestamp(trimmed).map(FieldValue::Timestamp),
    }
}

fn parse_unsigned(text: &str, max: u64) -> Option<FieldValue> {
    let text = text.strip_prefix('+').unwrap_or(text);
    let value = text.parse::<u64>().ok()?;
    (value <= max).then_some(FieldValue::UInt(value))
}

/// Convert captured text according to a field type.
pub fn convert(field_type: &FieldType, text: &str) -> Option<FieldValue> {
    match field_type.converter {
        None | Some(ConverterType::Primitive) => convert_primitive(field_type.kind, text),
        Some(ConverterType::Enum(kind)) => kind.parse(text).map(FieldValue::Enum),
        Some(ConverterType::Version) => text.trim().parse::<Version>().ok().map(FieldValue::Version),
        Some(ConverterType::Timestamp) => parse_timestamp(text).map(FieldValue::Timestamp),
        Some(ConverterType::Signal) => Some(FieldValue::Bool(text.trim().eq_ignore_ascii_case("on"))),
        Some(ConverterType::BuildType) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case("release") {
                Some(FieldValue::Bool(true))
            } else if text.eq_ignore_ascii_case("debug") {
                Some(FieldValue::Bool(false))
            } else {
                None
            }
        }
    }
}
