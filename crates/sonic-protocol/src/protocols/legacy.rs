//! Protocol of firmware predating the sonic message framing.
//!
//! Legacy devices answer in plain lines without ids, so most answers are
//! accepted as free-form text. Only the status update and `?pval` have a
//! fixed layout.

use super::fields::*;
use crate::{
    AnswerDef, CommandCode, CommandContract, CommandDef, ContractChange, DeviceParamConstantType,
    DeviceType, FieldName, FieldType, PrimitiveKind, ProtocolDelta, ProtocolInfo, Version,
};

pub const VERSION: Version = Version::new(1, 0, 0);

/// The single-level legacy protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Legacy;

impl ProtocolDelta for Legacy {
    fn version(&self) -> Version {
        VERSION
    }

    fn supports_device_type(&self, _device_type: DeviceType) -> bool {
        true
    }

    fn contracts_for(&self, _info: &ProtocolInfo) -> Vec<ContractChange> {
        let unknown = || AnswerDef::new(vec![field_unknown_answer()]);
        let plain = |code, id: &str| CommandContract::new(code, CommandDef::identified_by(&[id]), unknown());
        let untyped = |name| field(name, FieldType::uint32());

        let contracts = vec![
            plain(CommandCode::GET_INFO, "?info"),
            plain(CommandCode::SET_ON, "!ON"),
            plain(CommandCode::SET_OFF, "!OFF"),
            CommandContract::new(
                CommandCode::SET_FREQ,
                CommandDef::identified_by(&["!f"]).with_setter(param_frequency()),
                unknown(),
            )
            .tagged(&["frequency", "transducer"]),
            CommandContract::new(
                CommandCode::SET_GAIN,
                CommandDef::identified_by(&["!g", "!gain", "set_gain"]).with_setter(param_gain()),
                unknown(),
            )
            .tagged(&["gain", "transducer"]),
            CommandContract::new(
                CommandCode::GET_UPDATE,
                CommandDef::identified_by(&["-"]),
                AnswerDef::new(vec![
                    field(FieldName::ErrorCode, FieldType::new(PrimitiveKind::UInt8)),
                    untyped(FieldName::Frequency),
                    field(FieldName::Gain, FieldType::new(PrimitiveKind::UInt8)),
                    field(FieldName::Undefined, FieldType::string()),
                    field(FieldName::Signal, FieldType::boolean()),
                    field(FieldName::Temperature, FieldType::new(PrimitiveKind::Float)),
                    untyped(FieldName::Urms),
                    untyped(FieldName::Irms),
                    untyped(FieldName::Phase),
                ]),
            )
            .tagged(&["update", "status"]),
            CommandContract::new(
                CommandCode::GET_PVAL,
                CommandDef::identified_by(&["?pval"]),
                AnswerDef::new(vec![
                    untyped(FieldName::LegacyRang),
                    untyped(FieldName::LegacyStep),
                    untyped(FieldName::LegacySing),
                    untyped(FieldName::LegacyPaus),
                ]),
            ),
        ];
        contracts.into_iter().map(ContractChange::Upsert).collect()
    }

    fn constants_for(&self, _info: &ProtocolInfo) -> Vec<(DeviceParamConstantType, i64)> {
        vec![
            (DeviceParamConstantType::MinFrequency, 600_000),
            (DeviceParamConstantType::MaxFrequency, 6_000_000),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::legacy_protocol_builder;
    use crate::{Command, FieldValue};

    #[test]
    fn test_legacy_table() {
        let table = legacy_protocol_builder()
            .build(DeviceType::Unknown, VERSION, true)
            .unwrap();
        assert_eq!(table.len(), 7);
        assert_eq!(table.consts().get(DeviceParamConstantType::MinFrequency), Some(600_000));
        assert_eq!(Command::set_frequency(1000).render(&table).unwrap(), "!f=1000");
        assert!(!table.contains(CommandCode::GET_PROTOCOL));
    }

    #[test]
    fn test_legacy_update_layout() {
        let table = legacy_protocol_builder()
            .build(DeviceType::Unknown, VERSION, true)
            .unwrap();
        let validator = table.get(CommandCode::GET_UPDATE).unwrap().validator.clone().unwrap();
        let answer = validator.validate("0#1000000#50#scan#1#23.5#10#20#30");
        assert!(answer.valid, "{}", validator.pattern());
        assert_eq!(answer.value(FieldName::Signal), Some(&FieldValue::Bool(true)));
        assert_eq!(answer.value(FieldName::Temperature), Some(&FieldValue::Float(23.5)));
    }
}
