use super::fields::*;
use super::v1_0_0;
use crate::{
    AnswerDef, CommandCode, CommandContract, CommandDef, ContractChange, DeviceType, EnumKind,
    FieldName, FieldType, ProtocolDelta, ProtocolInfo, Version,
};

pub const VERSION: Version = Version::new(2, 1, 0);

/// Protocol v2.1.0: the worker status update reports transducer and
/// system state instead of a bare error code.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2_1_0;

impl ProtocolDelta for V2_1_0 {
    fn version(&self) -> Version {
        VERSION
    }

    fn supports_device_type(&self, device_type: DeviceType) -> bool {
        v1_0_0::V1_0_0.supports_device_type(device_type)
    }

    fn contracts_for(&self, info: &ProtocolInfo) -> Vec<ContractChange> {
        if info.device_type != DeviceType::MvpWorker {
            return Vec::new();
        }
        vec![
            ContractChange::Upsert(get_update_worker()),
            ContractChange::Remove(CommandCode::SET_CONTINUE),
        ]
    }

    fn custom_data_types(&self) -> Vec<EnumKind> {
        vec![EnumKind::Anomaly, EnumKind::TransducerState, EnumKind::SystemState]
    }
}

fn get_update_worker() -> CommandContract {
    CommandContract::new(
        CommandCode::GET_UPDATE,
        CommandDef::identified_by(&["-", "get_update"]),
        AnswerDef::new(vec![
            field(
                FieldName::TransducerState,
                FieldType::enumeration(EnumKind::TransducerState),
            ),
            field_frequency(),
            field_gain(),
            field_procedure(),
            field_temperature(),
            field_urms(),
            field_irms(),
            field_phase(),
            field_signal(),
            field_ts_flag(),
            field(FieldName::AnomalyDetection, FieldType::enumeration(EnumKind::Anomaly)),
            field(FieldName::SystemState, FieldType::enumeration(EnumKind::SystemState)),
        ]),
    )
    .described("Short, machine friendly status update")
    .tagged(&["update", "status"])
}
