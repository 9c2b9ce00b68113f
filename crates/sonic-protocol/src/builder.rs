//! Resolution of a protocol into the runtime lookup table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    AnswerDef, AnswerFieldDef, AnswerValidator, Bound, CommandCode, CommandContract, CommandDef,
    CommandParamDef, ContractError, ContractResult, DeviceParamConstants, DeviceType, Export,
    FieldName, FieldType, Protocol, ProtocolInfo, ProtocolList, UserManualAttrs, Version,
};

// ============================================================================
// Resolved definitions
// ============================================================================

/// A command definition with every export and limit resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommandDef {
    pub identifiers: Vec<String>,
    pub estimated_response_time: Option<Duration>,
    pub index_param: Option<CommandParamDef>,
    pub setter_param: Option<CommandParamDef>,
}

impl ResolvedCommandDef {
    /// Get the identifier used when sending.
    pub fn identifier(&self) -> Option<&str> {
        self.identifiers.first().map(String::as_str)
    }
}

/// An answer layout with every export and limit resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAnswerDef {
    pub fields: Vec<AnswerFieldDef>,
    pub separator: String,
}

/// Everything the runtime needs to know about one command code.
#[derive(Debug, Clone)]
pub struct CommandLookup {
    pub code: CommandCode,
    /// `None` for notifications.
    pub command_def: Option<ResolvedCommandDef>,
    /// `None` for fire-and-forget commands.
    pub answer_def: Option<ResolvedAnswerDef>,
    pub validator: Option<Arc<AnswerValidator>>,
    pub user_manual_attrs: UserManualAttrs,
    pub tags: Vec<String>,
    pub is_release: bool,
}

impl CommandLookup {
    /// Get the expected response time of the command, if declared.
    pub fn estimated_response_time(&self) -> Option<Duration> {
        self.command_def
            .as_ref()
            .and_then(|def| def.estimated_response_time)
    }
}

/// The resolved, immutable map from command codes to lookups.
#[derive(Debug, Clone)]
pub struct CommandLookupTable {
    info: ProtocolInfo,
    consts: DeviceParamConstants,
    entries: BTreeMap<CommandCode, CommandLookup>,
}

impl CommandLookupTable {
    /// Get the protocol info the table was built for.
    pub fn info(&self) -> &ProtocolInfo {
        &self.info
    }

    /// Get the resolved constants.
    pub fn consts(&self) -> &DeviceParamConstants {
        &self.consts
    }

    /// Get the lookup for a code.
    pub fn get(&self, code: CommandCode) -> Option<&CommandLookup> {
        self.entries.get(&code)
    }

    /// Check if the table has an entry for the code.
    pub fn contains(&self, code: CommandCode) -> bool {
        self.entries.contains_key(&code)
    }

    /// Iterate over all lookups in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&CommandCode, &CommandLookup)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the command whose identifiers include `identifier` (any case).
    pub fn find_by_identifier(&self, identifier: &str) -> Option<CommandCode> {
        self.entries.iter().find_map(|(code, lookup)| {
            lookup
                .command_def
                .as_ref()
                .filter(|def| def.identifiers.iter().any(|id| id.eq_ignore_ascii_case(identifier)))
                .map(|_| *code)
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds lookup tables from a protocol list.
///
/// Answer validators are cached by their resolved layout, so contracts
/// sharing an answer layout share one validator across builds.
#[derive(Debug)]
pub struct ProtocolBuilder {
    protocols: ProtocolList,
    validators: HashMap<ResolvedAnswerDef, Arc<AnswerValidator>>,
}

impl ProtocolBuilder {
    /// Create a builder over a protocol list.
    pub fn new(protocols: ProtocolList) -> Self {
        ProtocolBuilder {
            protocols,
            validators: HashMap::new(),
        }
    }

    /// Get the protocol list.
    pub fn protocols(&self) -> &ProtocolList {
        &self.protocols
    }

    /// Build the lookup table for a device type, version and build flavor.
    pub fn build(
        &mut self,
        device_type: DeviceType,
        version: Version,
        release: bool,
    ) -> ContractResult<CommandLookupTable> {
        self.build_for(&ProtocolInfo::new(device_type, version, release))
    }

    /// Build the lookup table for a protocol info.
    pub fn build_for(&mut self, info: &ProtocolInfo) -> ContractResult<CommandLookupTable> {
        if let Some(latest) = self.protocols.latest_version() {
            if info.version > latest {
                log::warn!(
                    "device speaks protocol {} but the newest known is {}",
                    info.version,
                    latest
                );
            }
        }
        let protocol = self.protocols.build_protocol_for(info)?;
        self.build_from_protocol(&protocol)
    }

    /// Resolve an already folded protocol.
    pub fn build_from_protocol(&mut self, protocol: &Protocol) -> ContractResult<CommandLookupTable> {
        let info = &protocol.info;
        let mut entries = BTreeMap::new();

        for (code, contract) in &protocol.command_contracts {
            if info.is_release && !contract.is_release {
                continue;
            }
            let lookup = self.resolve_contract(contract, &protocol.consts, info)?;
            entries.insert(*code, lookup);
        }

        log::debug!("built lookup table for {} with {} commands", info, entries.len());

        Ok(CommandLookupTable {
            info: info.clone(),
            consts: protocol.consts.clone(),
            entries,
        })
    }

    fn resolve_contract(
        &mut self,
        contract: &CommandContract,
        consts: &DeviceParamConstants,
        info: &ProtocolInfo,
    ) -> ContractResult<CommandLookup> {
        let code = contract.code;

        let command_def = match &contract.command_def {
            Some(export) => {
                let def = resolve(export, code, "command_def", info)?;
                Some(resolve_command_def(def, code, consts, info)?)
            }
            None => None,
        };

        let (answer_def, validator) = match &contract.answer_def {
            Some(export) => {
                let def = resolve(export, code, "answer_def", info)?;
                let resolved = resolve_answer_def(def, code, consts, info)?;
                let validator = self.validator_for(&resolved, code)?;
                (Some(resolved), Some(validator))
            }
            None => (None, None),
        };

        let user_manual_attrs = resolve(&contract.user_manual_attrs, code, "user_manual_attrs", info)?.clone();

        Ok(CommandLookup {
            code,
            command_def,
            answer_def,
            validator,
            user_manual_attrs,
            tags: contract.tags.clone(),
            is_release: contract.is_release,
        })
    }

    fn validator_for(
        &mut self,
        answer_def: &ResolvedAnswerDef,
        code: CommandCode,
    ) -> ContractResult<Arc<AnswerValidator>> {
        if let Some(validator) = self.validators.get(answer_def) {
            return Ok(Arc::clone(validator));
        }
        let validator = AnswerValidator::new(&answer_def.fields, &answer_def.separator).map_err(|e| {
            ContractError::InvalidPattern {
                code,
                reason: e.to_string(),
            }
        })?;
        let validator = Arc::new(validator);
        self.validators.insert(answer_def.clone(), Arc::clone(&validator));
        Ok(validator)
    }
}

fn resolve<'a, T>(
    export: &'a Export<T>,
    code: CommandCode,
    attribute: &'static str,
    info: &ProtocolInfo,
) -> ContractResult<&'a T> {
    export.resolve(info).ok_or(ContractError::UnresolvedExport {
        code,
        attribute,
        device_type: info.device_type,
        version: info.version,
    })
}

fn resolve_command_def(
    def: &CommandDef,
    code: CommandCode,
    consts: &DeviceParamConstants,
    info: &ProtocolInfo,
) -> ContractResult<ResolvedCommandDef> {
    let attrs = resolve(&def.sonic_text_attrs, code, "sonic_text_attrs", info)?;
    let resolve_param = |param: &Option<CommandParamDef>| -> ContractResult<Option<CommandParamDef>> {
        param
            .as_ref()
            .map(|p| -> ContractResult<CommandParamDef> {
                Ok(CommandParamDef {
                    field_type: resolve_limits(&p.field_type, p.name, consts)?,
                    ..p.clone()
                })
            })
            .transpose()
    };

    Ok(ResolvedCommandDef {
        identifiers: attrs.identifiers.clone(),
        estimated_response_time: attrs.estimated_response_time,
        index_param: resolve_param(&def.index_param)?,
        setter_param: resolve_param(&def.setter_param)?,
    })
}

fn resolve_answer_def(
    def: &AnswerDef,
    code: CommandCode,
    consts: &DeviceParamConstants,
    info: &ProtocolInfo,
) -> ContractResult<ResolvedAnswerDef> {
    let fields = def
        .fields
        .iter()
        .map(|export| -> ContractResult<AnswerFieldDef> {
            let field = resolve(export, code, "answer_field", info)?;
            Ok(AnswerFieldDef {
                field_type: resolve_limits(&field.field_type, field.name, consts)?,
                ..field.clone()
            })
        })
        .collect::<ContractResult<Vec<_>>>()?;

    Ok(ResolvedAnswerDef {
        fields,
        separator: def.separator.clone(),
    })
}

/// Substitute constant references in the limits of a field type.
fn resolve_limits(
    field_type: &FieldType,
    field: FieldName,
    consts: &DeviceParamConstants,
) -> ContractResult<FieldType> {
    let resolve_bound = |bound: Option<Bound>| -> ContractResult<Option<Bound>> {
        match bound {
            Some(Bound::Constant(key)) => consts
                .get(key)
                .map(|value| Some(Bound::Value(value)))
                .ok_or(ContractError::UnknownConstant(key)),
            other => Ok(other),
        }
    };

    let mut resolved = field_type.clone();
    resolved.min_value = resolve_bound(field_type.min_value)?;
    resolved.max_value = resolve_bound(field_type.max_value)?;

    if let (Some(min), Some(max)) = (
        resolved.min_value.and_then(|b| b.value()),
        resolved.max_value.and_then(|b| b.value()),
    ) {
        if min > max {
            return Err(ContractError::InvalidLimits { field, min, max });
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ContractChange, DeviceParamConstantType, MetaExportDescriptor, ProtocolDelta,
        SIPrefix, SIUnit, SonicTextAttrs,
    };

    struct Single(Vec<CommandContract>, Vec<(DeviceParamConstantType, i64)>);

    impl ProtocolDelta for Single {
        fn version(&self) -> Version {
            Version::new(1, 0, 0)
        }

        fn supports_device_type(&self, _device_type: DeviceType) -> bool {
            true
        }

        fn contracts_for(&self, _info: &ProtocolInfo) -> Vec<ContractChange> {
            self.0.iter().cloned().map(ContractChange::Upsert).collect()
        }

        fn constants_for(&self, _info: &ProtocolInfo) -> Vec<(DeviceParamConstantType, i64)> {
            self.1.clone()
        }
    }

    fn frequency_type() -> FieldType {
        FieldType::uint32()
            .with_unit(SIUnit::Hertz, SIPrefix::None)
            .with_limits(
                Bound::Constant(DeviceParamConstantType::MinFrequency),
                Bound::Constant(DeviceParamConstantType::MaxFrequency),
            )
    }

    fn set_freq() -> CommandContract {
        CommandContract::new(
            CommandCode::SET_FREQ,
            CommandDef::new(SonicTextAttrs::new(["!f", "!freq"]).with_response_time(Duration::from_millis(300)))
                .with_setter(CommandParamDef::new(FieldName::Frequency, frequency_type())),
            AnswerDef::new(vec![AnswerFieldDef::new(FieldName::Frequency, frequency_type())]),
        )
    }

    fn get_freq() -> CommandContract {
        CommandContract::new(
            CommandCode::GET_FREQ,
            CommandDef::identified_by(&["?f"]),
            AnswerDef::new(vec![AnswerFieldDef::new(FieldName::Frequency, frequency_type())]),
        )
    }

    fn builder(contracts: Vec<CommandContract>) -> ProtocolBuilder {
        ProtocolBuilder::new(ProtocolList::new().then(Single(contracts, vec![])))
    }

    #[test]
    fn test_limits_are_resolved() {
        let table = builder(vec![set_freq()])
            .build(DeviceType::Descale, Version::new(1, 0, 0), true)
            .unwrap();
        let lookup = table.get(CommandCode::SET_FREQ).unwrap();
        let def = lookup.command_def.as_ref().unwrap();
        let setter = def.setter_param.as_ref().unwrap();
        assert_eq!(setter.field_type.min_value, Some(Bound::Value(100_000)));
        assert_eq!(setter.field_type.max_value, Some(Bound::Value(10_000_000)));
        assert_eq!(def.identifier(), Some("!f"));
        assert_eq!(lookup.estimated_response_time(), Some(Duration::from_millis(300)));
        assert_eq!(table.find_by_identifier("!FREQ"), Some(CommandCode::SET_FREQ));
    }

    #[test]
    fn test_validators_are_shared() {
        let table = builder(vec![set_freq(), get_freq()])
            .build(DeviceType::Descale, Version::new(1, 0, 0), true)
            .unwrap();
        let a = table.get(CommandCode::SET_FREQ).unwrap().validator.clone().unwrap();
        let b = table.get(CommandCode::GET_FREQ).unwrap().validator.clone().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.validate("1000 Hz").valid);
    }

    #[test]
    fn test_unresolved_export() {
        let contract = CommandContract {
            command_def: Some(Export::when(
                MetaExportDescriptor::since(Version::new(1, 0, 0)).for_devices(&[DeviceType::MvpWorker]),
                CommandDef::identified_by(&["?x"]),
            )),
            ..get_freq()
        };
        let err = builder(vec![contract])
            .build(DeviceType::Descale, Version::new(1, 0, 0), true)
            .unwrap_err();
        assert_eq!(
            err,
            ContractError::UnresolvedExport {
                code: CommandCode::GET_FREQ,
                attribute: "command_def",
                device_type: DeviceType::Descale,
                version: Version::new(1, 0, 0),
            }
        );
    }

    #[test]
    fn test_invalid_limits() {
        let protocols = ProtocolList::new().then(Single(
            vec![get_freq()],
            vec![(DeviceParamConstantType::MinFrequency, 20_000_000)],
        ));
        let err = ProtocolBuilder::new(protocols)
            .build(DeviceType::Descale, Version::new(1, 0, 0), true)
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidLimits { field: FieldName::Frequency, .. }));
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut builder = builder(vec![get_freq(), set_freq()]);
        let first = builder.build(DeviceType::Descale, Version::new(1, 0, 0), true).unwrap();
        let second = builder.build(DeviceType::Descale, Version::new(1, 0, 0), true).unwrap();
        let codes = |t: &CommandLookupTable| t.iter().map(|(c, _)| *c).collect::<Vec<_>>();
        assert_eq!(codes(&first), codes(&second));
        assert_eq!(codes(&first), vec![CommandCode::GET_FREQ, CommandCode::SET_FREQ]);
    }
}
