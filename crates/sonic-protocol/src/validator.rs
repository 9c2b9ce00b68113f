//! Answer validation.
//!
//! An [`AnswerValidator`] is synthesized from a resolved answer layout: one
//! regular expression that concatenates, in order, each field's
//! `prefix + value + optional unit + postfix` joined by the separator, plus
//! a converter per field. Validation is a pure function of the layout and
//! the input and never fails; the returned [`Answer`] carries validity.

use std::collections::BTreeMap;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::converter::convert;
use crate::{AnswerFieldDef, CommandCode, ConverterType, FieldName, FieldType, FieldValue, PrimitiveKind};

const INT_PATTERN: &str = r"[+\-]?\d+";
const FLOAT_PATTERN: &str = r"[+\-]?\d+(?:\.\d+)?";
const BOOL_PATTERN: &str = r"true|false|0|1";
const ANY_PATTERN: &str = r".*?";

// ============================================================================
// Answer
// ============================================================================

/// A device answer, possibly validated against a contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// The raw answer text.
    pub message: String,
    pub valid: bool,
    pub was_validated: bool,
    pub field_values: BTreeMap<FieldName, FieldValue>,
    /// Numeric code the device prefixed the answer with, if any.
    pub command_code: Option<CommandCode>,
}

impl Answer {
    /// Create an answer without field values.
    pub fn new(message: impl Into<String>, valid: bool, was_validated: bool) -> Self {
        Answer {
            message: message.into(),
            valid,
            was_validated,
            field_values: BTreeMap::new(),
            command_code: None,
        }
    }

    /// An answer that was passed through without validation.
    pub fn unvalidated(message: impl Into<String>) -> Self {
        Answer::new(message, true, false)
    }

    /// An answer describing a failure on the host side.
    pub fn failure(message: impl Into<String>) -> Self {
        Answer::new(message, false, true)
    }

    /// Attach the command code.
    pub fn with_code(mut self, code: Option<CommandCode>) -> Self {
        self.command_code = code;
        self
    }

    /// Get a field value.
    pub fn value(&self, name: FieldName) -> Option<&FieldValue> {
        self.field_values.get(&name)
    }

    /// Check if the device answered with an error code.
    pub fn is_error(&self) -> bool {
        self.command_code.map_or(false, |code| code.is_error())
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command_code {
            Some(code) => write!(f, "{}#{}", code.value(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

#[derive(Debug, Clone)]
struct FieldSlot {
    group: String,
    name: FieldName,
    field_type: FieldType,
}

/// Validates raw answer text against a resolved answer layout.
#[derive(Debug, Clone)]
pub struct AnswerValidator {
    regex: Regex,
    fields: Vec<FieldSlot>,
}

impl AnswerValidator {
    /// Build a validator for the given fields and separator.
    pub fn new(fields: &[AnswerFieldDef], separator: &str) -> Result<Self, regex::Error> {
        let mut slots = Vec::with_capacity(fields.len());
        let mut parts = Vec::with_capacity(fields.len());

        for (index, field) in fields.iter().enumerate() {
            let group = format!("f{}", index);
            parts.push(field_pattern(&group, field));
            slots.push(FieldSlot {
                group,
                name: field.name,
                field_type: field.field_type.clone(),
            });
        }

        let pattern = format!("^{}$", parts.join(&regex::escape(separator)));
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;

        Ok(AnswerValidator {
            regex,
            fields: slots,
        })
    }

    /// Get the synthesized pattern.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Validate an answer body.
    pub fn validate(&self, raw: &str) -> Answer {
        let body = raw.trim_matches(|c| c == '\r' || c == '\n');
        let Some(captures) = self.regex.captures(body) else {
            return Answer::new(raw, false, true);
        };

        let mut answer = Answer::new(raw, true, true);
        for slot in &self.fields {
            let text = captures.name(&slot.group).map_or("", |m| m.as_str());
            if let Some(allowed) = &slot.field_type.allowed_values {
                if !allowed.iter().any(|v| v.eq_ignore_ascii_case(text.trim())) {
                    answer.valid = false;
                    answer.field_values.clear();
                    return answer;
                }
            }
            match convert(&slot.field_type, text) {
                Some(value) => {
                    answer.field_values.insert(slot.name, value);
                }
                None => {
                    answer.valid = false;
                    answer.field_values.clear();
                    return answer;
                }
            }
        }
        answer
    }
}

fn value_pattern(field_type: &FieldType) -> &'static str {
    match field_type.converter {
        None | Some(ConverterType::Primitive) => match field_type.kind {
            kind if kind.is_integer() => INT_PATTERN,
            PrimitiveKind::Float => FLOAT_PATTERN,
            PrimitiveKind::Bool => BOOL_PATTERN,
            _ => ANY_PATTERN,
        },
        Some(_) => ANY_PATTERN,
    }
}

fn field_pattern(group: &str, field: &AnswerFieldDef) -> String {
    let unit = field
        .field_type
        .unit_suffix()
        .map(|suffix| format!(r"(?:\s*{})?", regex::escape(&suffix)))
        .unwrap_or_default();
    format!(
        "{}(?P<{}>{}){}{}",
        regex::escape(&field.prefix),
        group,
        value_pattern(&field.field_type),
        unit,
        regex::escape(&field.postfix)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnumKind, EnumValue, Procedure, SIPrefix, SIUnit, Version};

    fn frequency_field() -> AnswerFieldDef {
        AnswerFieldDef::new(
            FieldName::Frequency,
            FieldType::uint32().with_unit(SIUnit::Hertz, SIPrefix::None),
        )
    }

    #[test]
    fn test_single_field_with_unit() {
        let validator = AnswerValidator::new(&[frequency_field()], "#").unwrap();
        let answer = validator.validate("1000 Hz");
        assert!(answer.valid);
        assert!(answer.was_validated);
        assert_eq!(answer.value(FieldName::Frequency), Some(&FieldValue::UInt(1000)));

        // The unit is optional
        assert!(validator.validate("1000").valid);
        assert!(!validator.validate("1000 kHz").valid);
        assert!(!validator.validate("abc").valid);
    }

    #[test]
    fn test_multiple_fields_with_prefixes() {
        let fields = vec![
            AnswerFieldDef::new(FieldName::RampFStart, FieldType::uint32()).with_prefix("Start: "),
            AnswerFieldDef::new(FieldName::RampFStop, FieldType::uint32()).with_prefix("Stop: "),
            AnswerFieldDef::new(FieldName::Procedure, FieldType::enumeration(EnumKind::Procedure)),
        ];
        let validator = AnswerValidator::new(&fields, "#").unwrap();
        let answer = validator.validate("Start: 1000#stop: 2000#RAMP");
        assert!(answer.valid, "pattern {}", validator.pattern());
        assert_eq!(answer.value(FieldName::RampFStart), Some(&FieldValue::UInt(1000)));
        assert_eq!(answer.value(FieldName::RampFStop), Some(&FieldValue::UInt(2000)));
        assert_eq!(
            answer.value(FieldName::Procedure),
            Some(&FieldValue::Enum(EnumValue::Procedure(Procedure::Ramp)))
        );
    }

    #[test]
    fn test_conversion_failure_is_invalid() {
        let fields = vec![
            AnswerFieldDef::new(FieldName::DeviceType, FieldType::enumeration(EnumKind::DeviceType)),
            AnswerFieldDef::new(FieldName::ProtocolVersion, FieldType::version()),
        ];
        let validator = AnswerValidator::new(&fields, "#").unwrap();
        let ok = validator.validate("mvp_worker#v2.0.0");
        assert!(ok.valid);
        assert_eq!(ok.value(FieldName::ProtocolVersion), Some(&FieldValue::Version(Version::new(2, 0, 0))));

        let bad = validator.validate("toaster#v2.0.0");
        assert!(!bad.valid);
        assert!(bad.was_validated);
        assert!(bad.field_values.is_empty());
        assert_eq!(bad.message, "toaster#v2.0.0");
    }

    #[test]
    fn test_bool_and_signal_fields() {
        let fields = vec![
            AnswerFieldDef::new(FieldName::Signal, FieldType::signal()),
            AnswerFieldDef::new(FieldName::Termination, FieldType::boolean()),
        ];
        let validator = AnswerValidator::new(&fields, "#").unwrap();
        let answer = validator.validate("on#False");
        assert!(answer.valid);
        assert_eq!(answer.value(FieldName::Signal), Some(&FieldValue::Bool(true)));
        assert_eq!(answer.value(FieldName::Termination), Some(&FieldValue::Bool(false)));
        assert!(!validator.validate("on#maybe").valid);
    }

    #[test]
    fn test_allowed_values() {
        let fields = vec![AnswerFieldDef::new(
            FieldName::Message,
            FieldType::string().with_allowed_values(["ok", "busy"]),
        )];
        let validator = AnswerValidator::new(&fields, "#").unwrap();
        assert!(validator.validate("OK").valid);
        assert!(!validator.validate("broken").valid);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let validator = AnswerValidator::new(&[frequency_field()], "#").unwrap();
        assert_eq!(validator.validate("42 Hz"), validator.validate("42 Hz"));
        assert_eq!(validator.validate("x"), validator.validate("x"));
    }

    #[test]
    fn test_error_answer() {
        let answer = Answer::failure("boom").with_code(Some(CommandCode::COMMAND_NOT_KNOWN));
        assert!(answer.is_error());
        assert_eq!(answer.to_string(), "20001#boom");
        assert!(!Answer::unvalidated("x").is_error());
    }
}
