//! Protocol v1.0.0: the first protocol speaking the sonic message framing.

use std::time::Duration;

use super::fields::*;
use crate::{
    AnswerDef, CommandCode, CommandContract, CommandDef, ContractChange, DeviceParamConstantType,
    DeviceType, EnumKind, Export, FieldName, FieldType, MetaExportDescriptor, PrimitiveKind,
    ProtocolDelta, ProtocolInfo, SonicTextAttrs, Version,
};

pub const VERSION: Version = Version::new(1, 0, 0);

/// Protocol v1.0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1_0_0;

impl ProtocolDelta for V1_0_0 {
    fn version(&self) -> Version {
        VERSION
    }

    fn supports_device_type(&self, device_type: DeviceType) -> bool {
        matches!(
            device_type,
            DeviceType::Unknown | DeviceType::MvpWorker | DeviceType::Descale | DeviceType::Crystal
        )
    }

    fn contracts_for(&self, info: &ProtocolInfo) -> Vec<ContractChange> {
        let mut contracts = Vec::new();
        match info.device_type {
            DeviceType::MvpWorker => {
                contracts.extend(transducer_commands());
                contracts.extend(procedure_commands());
            }
            DeviceType::Descale => contracts.extend(descale_commands()),
            DeviceType::Crystal => contracts.extend(crystal_commands()),
            DeviceType::Unknown => contracts.extend(unknown_commands()),
            _ => {}
        }
        if matches!(info.device_type, DeviceType::MvpWorker | DeviceType::Descale) {
            contracts.push(get_update());
            contracts.extend(generic_transducer_commands());
            contracts.extend(communication_commands());
            contracts.extend(generic_commands());
        }
        contracts.push(get_protocol());
        contracts.into_iter().map(ContractChange::Upsert).collect()
    }

    fn constants_for(&self, info: &ProtocolInfo) -> Vec<(DeviceParamConstantType, i64)> {
        match info.device_type {
            DeviceType::Descale => vec![(DeviceParamConstantType::MaxGain, 101)],
            DeviceType::Crystal => vec![
                (DeviceParamConstantType::MinFrequency, 600_000),
                (DeviceParamConstantType::MaxFrequency, 6_000_000),
            ],
            _ => Vec::new(),
        }
    }

    fn custom_data_types(&self) -> Vec<EnumKind> {
        vec![
            EnumKind::CommunicationChannel,
            EnumKind::CommunicationProtocol,
            EnumKind::InputSource,
            EnumKind::Procedure,
            EnumKind::Waveform,
            EnumKind::DeviceLogLevel,
            EnumKind::LoggerName,
        ]
    }
}

fn getter(code: CommandCode, identifiers: &[&str], fields: Vec<crate::AnswerFieldDef>) -> CommandContract {
    CommandContract::new(code, CommandDef::identified_by(identifiers), AnswerDef::new(fields))
}

fn setter(
    code: CommandCode,
    identifiers: &[&str],
    param: crate::CommandParamDef,
    fields: Vec<crate::AnswerFieldDef>,
) -> CommandContract {
    CommandContract::new(
        code,
        CommandDef::identified_by(identifiers).with_setter(param),
        AnswerDef::new(fields),
    )
}

/// `?protocol` must stay a single, unconditional contract: it is how the
/// host discovers which protocol a device speaks.
pub fn get_protocol() -> CommandContract {
    getter(
        CommandCode::GET_PROTOCOL,
        &["?protocol"],
        vec![
            field_device_type(),
            field_version(FieldName::ProtocolVersion),
            field(FieldName::IsRelease, FieldType::build_type()),
            field(FieldName::AdditionalOptions, FieldType::string()),
        ],
    )
    .described("Used to retrieve the protocol version the device understands")
}

pub fn get_info() -> CommandContract {
    CommandContract::new(
        CommandCode::GET_INFO,
        CommandDef::new(SonicTextAttrs::new(["?info"]).with_response_time(Duration::from_millis(500))),
        AnswerDef::new(vec![
            field_device_type(),
            field_version(FieldName::HardwareVersion),
            field_version(FieldName::FirmwareVersion),
            field(FieldName::BuildHash, FieldType::string()),
            field(FieldName::BuildDate, FieldType::string()),
        ]),
    )
}

fn worker_update() -> AnswerDef {
    AnswerDef::new(vec![
        field_error_code(),
        field_frequency(),
        field_gain(),
        field_procedure(),
        field_temperature(),
        field_urms(),
        field_irms(),
        field_phase(),
        field_signal(),
        field_ts_flag(),
    ])
}

fn get_update() -> CommandContract {
    let since = || MetaExportDescriptor::since(VERSION);
    let answer = Export::when(since().for_devices(&[DeviceType::MvpWorker]), worker_update()).or_when(
        since().for_devices(&[DeviceType::Descale]),
        AnswerDef::new(vec![
            field_error_code(),
            field_swf(),
            field_gain(),
            field_procedure(),
            field_temperature(),
            field_irms(),
            field_signal(),
        ]),
    );
    getter(CommandCode::GET_UPDATE, &["-", "get_update"], Vec::new())
        .with_answer(answer)
        .described("Short, machine friendly status update")
        .tagged(&["update", "status"])
}

fn transducer_commands() -> Vec<CommandContract> {
    let atf = || field(FieldName::Atf, frequency());
    let atk = || field(FieldName::Atk, FieldType::new(PrimitiveKind::Float));
    let att = || field(FieldName::Att, FieldType::new(PrimitiveKind::Float));
    let indexed = |code, ids: &[&str], answer| {
        CommandContract::new(
            code,
            CommandDef::identified_by(ids).with_index(param_index()),
            AnswerDef::new(vec![answer]),
        )
    };
    let indexed_setter = |code, ids: &[&str], value: crate::CommandParamDef, answer| {
        CommandContract::new(
            code,
            CommandDef::identified_by(ids)
                .with_index(param_index())
                .with_setter(value),
            AnswerDef::new(vec![answer]),
        )
    };

    vec![
        setter(
            CommandCode::SET_FREQ,
            &["!f", "!freq", "!frequency", "set_frequency"],
            param_frequency(),
            vec![field_frequency()],
        )
        .tagged(&["frequency", "transducer"]),
        getter(
            CommandCode::GET_FREQ,
            &["?f", "?freq", "?frequency", "get_frequency"],
            vec![field_frequency()],
        )
        .tagged(&["frequency", "transducer"]),
        getter(
            CommandCode::GET_UIPT,
            &["?uipt"],
            vec![field_urms(), field_irms(), field_phase()],
        ),
        getter(CommandCode::GET_IRMS, &["?curr", "?irms"], vec![field_irms()]),
        indexed(CommandCode::GET_ATF, &["?atf"], atf()),
        indexed_setter(
            CommandCode::SET_ATF,
            &["!atf"],
            param(FieldName::Atf, frequency()),
            atf(),
        ),
        indexed(CommandCode::GET_ATK, &["?atk"], atk()),
        indexed_setter(
            CommandCode::SET_ATK,
            &["!atk"],
            param(FieldName::Atk, FieldType::new(PrimitiveKind::Float)),
            atk(),
        ),
        indexed(CommandCode::GET_ATT, &["?att"], att()),
        indexed_setter(
            CommandCode::SET_ATT,
            &["!att"],
            param(FieldName::Att, FieldType::new(PrimitiveKind::Float)),
            att(),
        ),
        setter(
            CommandCode::SET_WAVEFORM,
            &["!waveform", "set_waveform"],
            param(FieldName::Waveform, FieldType::enumeration(EnumKind::Waveform)),
            vec![field(FieldName::Waveform, FieldType::enumeration(EnumKind::Waveform))],
        ),
    ]
}

fn descale_commands() -> Vec<CommandContract> {
    vec![
        setter(
            CommandCode::SET_SWF,
            &["!swf", "set_switching_frequency"],
            param(FieldName::Swf, swf()),
            vec![field_swf()],
        ),
        getter(
            CommandCode::GET_SWF,
            &["?swf", "get_switching_frequency"],
            vec![field_swf()],
        ),
        getter(CommandCode::GET_IRMS, &["?curr", "?irms"], vec![field_irms()]),
    ]
}

fn crystal_commands() -> Vec<CommandContract> {
    vec![
        get_info(),
        setter(CommandCode::SET_FREQ, &["!f", "!freq"], param_frequency(), vec![field_frequency()]),
        getter(CommandCode::GET_FREQ, &["?f", "?freq"], vec![field_frequency()]),
        setter(CommandCode::SET_GAIN, &["!g", "!gain"], param_gain(), vec![field_gain()]),
        getter(CommandCode::GET_GAIN, &["?g", "?gain"], vec![field_gain()]),
        setter(CommandCode::SET_SWF, &["!swf"], param(FieldName::Swf, swf()), vec![field_swf()]),
        getter(CommandCode::GET_SWF, &["?swf"], vec![field_swf()]),
        getter(CommandCode::SET_ON, &["!ON"], vec![field_signal()]),
        getter(CommandCode::SET_OFF, &["!OFF"], vec![field_signal()]),
    ]
}

/// Commands for devices that have not identified themselves yet. Every
/// answer is accepted as free-form text.
fn unknown_commands() -> Vec<CommandContract> {
    let unknown = || vec![field_unknown_answer()];
    vec![
        setter(
            CommandCode::SET_FREQ,
            &["!f", "!freq", "!frequency", "set_frequency"],
            param_frequency(),
            unknown(),
        ),
        getter(CommandCode::GET_FREQ, &["?f", "?freq", "?frequency", "get_frequency"], unknown()),
        setter(CommandCode::SET_GAIN, &["!g", "!gain", "set_gain"], param_gain(), unknown()),
        getter(CommandCode::GET_GAIN, &["?g", "?gain", "get_gain"], unknown()),
        getter(CommandCode::SET_ON, &["!ON", "set_on"], unknown()),
        getter(CommandCode::SET_OFF, &["!OFF", "set_off"], unknown()),
        getter(CommandCode::GET_INFO, &["?info"], unknown()),
    ]
}

fn generic_transducer_commands() -> Vec<CommandContract> {
    vec![
        getter(
            CommandCode::GET_TRANSDUCER_ID,
            &["?transducer", "?tdr", "?transducer_id", "?tdr_id"],
            vec![field(FieldName::TransducerId, FieldType::string())],
        ),
        setter(
            CommandCode::SET_TRANSDUCER_ID,
            &["!transducer", "!tdr", "!transducer_id", "!tdr_id"],
            param(FieldName::TransducerId, FieldType::string()),
            vec![field(FieldName::TransducerId, FieldType::string())],
        ),
        setter(CommandCode::SET_GAIN, &["!g", "!gain", "set_gain"], param_gain(), vec![field_gain()])
            .tagged(&["gain", "transducer"]),
        getter(CommandCode::GET_GAIN, &["?g", "?gain", "get_gain"], vec![field_gain()])
            .tagged(&["gain", "transducer"]),
        getter(CommandCode::SET_ON, &["!ON", "set_on"], vec![field_signal()]).described("Turn the signal on"),
        getter(CommandCode::SET_OFF, &["!OFF", "set_off"], vec![field_signal()]).described("Turn the signal off"),
        getter(
            CommandCode::GET_TEMP,
            &["?temp", "?temperature", "get_temperature"],
            vec![field_temperature()],
        ),
    ]
}

fn communication_commands() -> Vec<CommandContract> {
    let enum_setter = |code, ids: &[&str], name, kind| {
        setter(
            code,
            ids,
            param(name, FieldType::enumeration(kind)),
            vec![field(name, FieldType::enumeration(kind))],
        )
        .tagged(&["communication"])
    };
    vec![
        setter(
            CommandCode::SET_TERMINATION,
            &["!term", "set_termination"],
            param(FieldName::Termination, FieldType::boolean()),
            vec![field(FieldName::Termination, FieldType::boolean())],
        )
        .described("Switch the 120 Ohm termination resistor of the rs485 line")
        .tagged(&["communication", "rs485"]),
        enum_setter(
            CommandCode::SET_COM_PROT,
            &["!prot", "set_comm_protocol"],
            FieldName::CommunicationProtocol,
            EnumKind::CommunicationProtocol,
        ),
        enum_setter(
            CommandCode::SET_PHYS_COM_CHANNEL,
            &["!phys", "set_physical_channel"],
            FieldName::CommunicationChannel,
            EnumKind::CommunicationChannel,
        ),
        enum_setter(
            CommandCode::SET_INPUT_SOURCE,
            &["!input", "!input_source", "set_input_source"],
            FieldName::InputSource,
            EnumKind::InputSource,
        ),
        setter(
            CommandCode::SET_LOG_LEVEL,
            &["!log", "set_log_level"],
            param(FieldName::LogLevel, FieldType::enumeration(EnumKind::DeviceLogLevel)),
            vec![
                field(FieldName::LoggerName, FieldType::enumeration(EnumKind::LoggerName)),
                field(FieldName::LogLevel, FieldType::enumeration(EnumKind::DeviceLogLevel)),
            ],
        ),
    ]
}

fn generic_commands() -> Vec<CommandContract> {
    vec![
        get_info(),
        getter(CommandCode::GET_HELP, &["?help"], vec![field_message()]).tagged(&["help"]),
        getter(CommandCode::SONIC_FORCE, &["!SONIC_FORCE", "!sonic_force"], vec![field_message()])
            .described("Overrule the service mode of the device")
            .debug_only(),
        CommandContract::notification(CommandCode::NOTIFY_MESSAGE, AnswerDef::new(vec![field_message()])),
        setter(
            CommandCode::SET_DATETIME,
            &["!datetime", "set_datetime"],
            param(FieldName::Timestamp, FieldType::timestamp()),
            vec![field_timestamp()],
        ),
        getter(CommandCode::GET_DATETIME, &["?datetime", "get_datetime"], vec![field_timestamp()]),
        getter(
            CommandCode::GET_DATETIME_PICO,
            &["?datetime_pico", "get_datetime_pico"],
            vec![field_timestamp()],
        )
        .debug_only(),
    ]
}

/// A setter for one procedure argument, identified as `!<field name>`.
fn procedure_arg(code: CommandCode, name: FieldName, field_type: FieldType) -> CommandContract {
    let identifier = format!("!{}", name.as_str());
    setter(
        code,
        &[identifier.as_str()],
        param(name, field_type.clone()),
        vec![field(name, field_type)],
    )
    .tagged(&["procedure"])
}

fn procedure_start(code: CommandCode, identifier: &str) -> CommandContract {
    getter(code, &[identifier], vec![field_procedure()]).tagged(&["procedure"])
}

fn procedure_commands() -> Vec<CommandContract> {
    use CommandCode as Code;
    use FieldName as F;

    let prefixed = |name, field_type, prefix: &str| field(name, field_type).with_prefix(prefix);

    vec![
        procedure_arg(Code::SET_RAMP_F_START, F::RampFStart, frequency()),
        procedure_arg(Code::SET_RAMP_F_STOP, F::RampFStop, frequency()),
        procedure_arg(Code::SET_RAMP_F_STEP, F::RampFStep, frequency_step()),
        procedure_arg(Code::SET_RAMP_T_ON, F::RampTOn, time_on()),
        procedure_arg(Code::SET_RAMP_T_OFF, F::RampTOff, time_off()),
        procedure_arg(Code::SET_SCAN_F_RANGE, F::ScanFRange, frequency_step()),
        procedure_arg(Code::SET_SCAN_F_STEP, F::ScanFStep, frequency_step()),
        procedure_arg(Code::SET_SCAN_T_STEP, F::ScanTStep, time_on()),
        procedure_arg(Code::SET_SCAN_GAIN, F::ScanGain, gain()),
        procedure_arg(Code::SET_SCAN_F_SHIFT, F::ScanFShift, frequency_shift()),
        procedure_arg(Code::SET_TUNE_F_STEP, F::TuneFStep, frequency_step()),
        procedure_arg(Code::SET_TUNE_T_TIME, F::TuneTTime, time_on()),
        procedure_arg(Code::SET_TUNE_T_STEP, F::TuneTStep, time_on()),
        procedure_arg(Code::SET_TUNE_F_SHIFT, F::TuneFShift, frequency_shift()),
        procedure_arg(Code::SET_TUNE_N_STEPS, F::TuneNSteps, n_steps()),
        procedure_arg(Code::SET_TUNE_GAIN, F::TuneGain, gain()),
        procedure_arg(Code::SET_WIPE_F_RANGE, F::WipeFRange, frequency_step()),
        procedure_arg(Code::SET_WIPE_F_STEP, F::WipeFStep, frequency_step()),
        procedure_arg(Code::SET_WIPE_T_ON, F::WipeTOn, time_on()),
        procedure_arg(Code::SET_WIPE_T_OFF, F::WipeTOff, time_off()),
        procedure_arg(Code::SET_WIPE_T_PAUSE, F::WipeTPause, time_off()),
        procedure_arg(Code::SET_WIPE_GAIN, F::WipeGain, gain()),
        procedure_start(Code::SET_RAMP, "!ramp"),
        procedure_start(Code::SET_SCAN, "!scan"),
        procedure_start(Code::SET_TUNE, "!tune"),
        procedure_start(Code::SET_WIPE, "!wipe"),
        procedure_start(Code::SET_AUTO, "!auto"),
        procedure_start(Code::SET_STOP, "!stop"),
        procedure_start(Code::SET_CONTINUE, "!continue"),
        getter(
            Code::GET_RAMP,
            &["?ramp"],
            vec![
                prefixed(F::RampFStart, frequency(), "Start: "),
                prefixed(F::RampFStop, frequency(), "Stop: "),
                prefixed(F::RampFStep, frequency_step(), "Step: "),
                prefixed(F::RampTOn, time_on(), "Ton: "),
                prefixed(F::RampTOff, time_off(), "Toff: "),
            ],
        ),
        getter(
            Code::GET_SCAN,
            &["?scan"],
            vec![
                prefixed(F::ScanFRange, frequency_step(), "Range: "),
                prefixed(F::ScanFStep, frequency_step(), "Step: "),
                prefixed(F::ScanTStep, time_on(), "Tstep: "),
                prefixed(F::ScanGain, gain(), "Gain: "),
                prefixed(F::ScanFShift, frequency_shift(), "Shift: "),
            ],
        ),
        getter(
            Code::GET_TUNE,
            &["?tune"],
            vec![
                prefixed(F::TuneFStep, frequency_step(), "Step: "),
                prefixed(F::TuneTTime, time_on(), "Time: "),
                prefixed(F::TuneTStep, time_on(), "Tstep: "),
                prefixed(F::TuneFShift, frequency_shift(), "Shift: "),
                prefixed(F::TuneNSteps, n_steps(), "Steps: "),
                prefixed(F::TuneGain, gain(), "Gain: "),
            ],
        ),
        getter(
            Code::GET_WIPE,
            &["?wipe"],
            vec![
                prefixed(F::WipeFRange, frequency_step(), "Range: "),
                prefixed(F::WipeFStep, frequency_step(), "Step: "),
                prefixed(F::WipeTOn, time_on(), "Ton: "),
                prefixed(F::WipeTOff, time_off(), "Toff: "),
                prefixed(F::WipeTPause, time_off(), "Tpause: "),
                prefixed(F::WipeGain, gain(), "Gain: "),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::protocol_builder;

    #[test]
    fn test_worker_has_procedures() {
        let table = protocol_builder()
            .build(DeviceType::MvpWorker, VERSION, true)
            .unwrap();
        for code in [CommandCode::SET_RAMP, CommandCode::SET_SCAN, CommandCode::SET_AUTO, CommandCode::GET_UPDATE] {
            assert!(table.contains(code), "missing {}", code);
        }
        assert!(!table.contains(CommandCode::SONIC_FORCE));
        assert!(!table.contains(CommandCode::GET_SWF));
    }

    #[test]
    fn test_update_layout_per_device() {
        let mut builder = protocol_builder();
        let worker = builder.build(DeviceType::MvpWorker, VERSION, true).unwrap();
        let descale = builder.build(DeviceType::Descale, VERSION, true).unwrap();

        let update = "0#1000000#100#none#300000#1#2#3#on#0";
        let answer = worker
            .get(CommandCode::GET_UPDATE)
            .and_then(|l| l.validator.clone())
            .unwrap()
            .validate(update);
        assert!(answer.valid);
        assert_eq!(answer.value(FieldName::Signal), Some(&crate::FieldValue::Bool(true)));

        let descale_update = "0#7#100#none#300000#2#off";
        let answer = descale
            .get(CommandCode::GET_UPDATE)
            .and_then(|l| l.validator.clone())
            .unwrap()
            .validate(descale_update);
        assert!(answer.valid);
        assert_eq!(answer.value(FieldName::Swf), Some(&crate::FieldValue::UInt(7)));
        assert_eq!(
            descale.consts().get(DeviceParamConstantType::MaxGain),
            Some(101)
        );
    }

    #[test]
    fn test_ramp_getter_prefixes() {
        let table = protocol_builder()
            .build(DeviceType::MvpWorker, VERSION, true)
            .unwrap();
        let validator = table.get(CommandCode::GET_RAMP).unwrap().validator.clone().unwrap();
        let answer = validator.validate("Start: 1000000#Stop: 1100000#Step: 1000 Hz#Ton: 100 ms#Toff: 0 ms");
        assert!(answer.valid, "{}", validator.pattern());
        assert_eq!(answer.value(FieldName::RampTOn), Some(&crate::FieldValue::UInt(100)));
    }

    #[test]
    fn test_debug_build_has_sonic_force() {
        let table = protocol_builder()
            .build(DeviceType::Descale, VERSION, false)
            .unwrap();
        assert!(table.contains(CommandCode::SONIC_FORCE));
        assert!(table.contains(CommandCode::GET_DATETIME_PICO));
    }
}
