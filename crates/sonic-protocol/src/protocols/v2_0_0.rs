use super::fields::*;
use super::v1_0_0;
use crate::{
    AnswerDef, CommandCode, CommandContract, CommandDef, ContractChange, DeviceType, FieldName,
    FieldType, ProtocolDelta, ProtocolInfo, Version,
};

pub const VERSION: Version = Version::new(2, 0, 0);

/// Protocol v2.0.0: error clearing, restarts and the descale ADC readout.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2_0_0;

impl ProtocolDelta for V2_0_0 {
    fn version(&self) -> Version {
        VERSION
    }

    fn supports_device_type(&self, device_type: DeviceType) -> bool {
        v1_0_0::V1_0_0.supports_device_type(device_type)
    }

    fn contracts_for(&self, info: &ProtocolInfo) -> Vec<ContractChange> {
        let mut contracts = Vec::new();
        if matches!(info.device_type, DeviceType::MvpWorker | DeviceType::Descale) {
            contracts.push(
                CommandContract::new(
                    CommandCode::CLEAR_ERRORS,
                    CommandDef::identified_by(&["!clear_errors"]),
                    AnswerDef::new(vec![field_success()]),
                )
                .described("Clear all latched device errors"),
            );
            contracts.push(
                CommandContract::new(
                    CommandCode::RESTART_DEVICE,
                    CommandDef::identified_by(&["!restart"]),
                    AnswerDef::new(vec![field_success()]),
                )
                .described("Restart the device firmware"),
            );
        }
        if info.device_type == DeviceType::Descale {
            contracts.push(CommandContract::new(
                CommandCode::GET_ADC,
                CommandDef::identified_by(&["?adc"]),
                AnswerDef::new(vec![field(FieldName::Adc, FieldType::uint32())]),
            ));
        }
        contracts.into_iter().map(ContractChange::Upsert).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::protocol_builder;

    #[test]
    fn test_adc_only_for_descale() {
        let mut builder = protocol_builder();
        let descale = builder.build(DeviceType::Descale, VERSION, true).unwrap();
        let worker = builder.build(DeviceType::MvpWorker, VERSION, true).unwrap();
        assert!(descale.contains(CommandCode::GET_ADC));
        assert!(!worker.contains(CommandCode::GET_ADC));
        assert!(worker.contains(CommandCode::CLEAR_ERRORS));
        assert!(worker.contains(CommandCode::RESTART_DEVICE));
    }

    #[test]
    fn test_older_device_lacks_v2_commands() {
        let table = protocol_builder()
            .build(DeviceType::Descale, v1_0_0::VERSION, true)
            .unwrap();
        assert!(!table.contains(CommandCode::CLEAR_ERRORS));
        assert!(!table.contains(CommandCode::GET_ADC));
    }
}
