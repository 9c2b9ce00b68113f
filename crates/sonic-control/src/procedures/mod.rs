//! Procedures: named sequences of commands driving the transducer.
//!
//! A procedure is either local, driven step by step from the host, or remote,
//! configured by the host and then executed by the firmware. Remote
//! procedures are finished once the device reports no procedure anymore;
//! the [`ProcedureController`](crate::controller::ProcedureController)
//! watches for that.

mod auto;
mod holder;
mod instantiator;
mod ramp;
mod remote_state;
mod scan;
mod spectrum;
mod tune;
mod wipe;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::{Answer, Command, CommandCode, FieldName};
use tracing::warn;

use crate::device::Device;
use crate::error::{ProcedureError, ProcedureResult};

pub use auto::{AutoArgs, AutoProc};
pub use holder::{Holder, HolderArgs, TimeUnit};
pub use instantiator::instantiate_procedures;
pub use ramp::{RampArgs, RampLocal, RampRemote};
pub use remote_state::RemoteProcedureState;
pub use scan::{ScanArgs, ScanProc};
pub use spectrum::{SpectrumMeasure, SpectrumMeasureArgs};
pub use tune::{TuneArgs, TuneProc};
pub use wipe::{WipeArgs, WipeProc};

/// Kinds of procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureType {
    SpectrumMeasure,
    Ramp,
    Scan,
    Tune,
    Auto,
    Wipe,
}

impl ProcedureType {
    pub const ALL: [ProcedureType; 6] = [
        ProcedureType::SpectrumMeasure,
        ProcedureType::Ramp,
        ProcedureType::Scan,
        ProcedureType::Tune,
        ProcedureType::Auto,
        ProcedureType::Wipe,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProcedureType::SpectrumMeasure => "Spectrum Measure",
            ProcedureType::Ramp => "Ramp",
            ProcedureType::Scan => "Scan",
            ProcedureType::Tune => "Tune",
            ProcedureType::Auto => "Auto",
            ProcedureType::Wipe => "Wipe",
        }
    }
}

impl fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Arguments of any procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "procedure", rename_all = "snake_case")]
pub enum ProcedureArgs {
    Ramp(RampArgs),
    Scan(ScanArgs),
    Tune(TuneArgs),
    Wipe(WipeArgs),
    Auto(AutoArgs),
    SpectrumMeasure(SpectrumMeasureArgs),
}

impl ProcedureArgs {
    /// Get the procedure these arguments are for.
    pub fn procedure_type(&self) -> ProcedureType {
        match self {
            ProcedureArgs::Ramp(_) => ProcedureType::Ramp,
            ProcedureArgs::Scan(_) => ProcedureType::Scan,
            ProcedureArgs::Tune(_) => ProcedureType::Tune,
            ProcedureArgs::Wipe(_) => ProcedureType::Wipe,
            ProcedureArgs::Auto(_) => ProcedureType::Auto,
            ProcedureArgs::SpectrumMeasure(_) => ProcedureType::SpectrumMeasure,
        }
    }

    /// Default arguments of a procedure.
    pub fn default_for(procedure_type: ProcedureType) -> Self {
        match procedure_type {
            ProcedureType::Ramp => ProcedureArgs::Ramp(RampArgs::default()),
            ProcedureType::Scan => ProcedureArgs::Scan(ScanArgs::default()),
            ProcedureType::Tune => ProcedureArgs::Tune(TuneArgs::default()),
            ProcedureType::Wipe => ProcedureArgs::Wipe(WipeArgs::default()),
            ProcedureType::Auto => ProcedureArgs::Auto(AutoArgs::default()),
            ProcedureType::SpectrumMeasure => ProcedureArgs::SpectrumMeasure(SpectrumMeasureArgs::default()),
        }
    }
}

/// A unit of work on a device.
#[async_trait]
pub trait Procedure: Send + Sync {
    fn procedure_type(&self) -> ProcedureType;

    /// Whether the firmware executes the procedure.
    fn is_remote(&self) -> bool;

    /// Run the procedure. Remote procedures return once started.
    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()>;

    /// Read the current device configuration into arguments.
    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs>;
}

fn invalid_args(expected: ProcedureType, args: &ProcedureArgs) -> ProcedureError {
    ProcedureError::InvalidArgs(format!(
        "{} needs its own arguments, got {} arguments",
        expected,
        args.procedure_type()
    ))
}

/// Send a command as part of a procedure.
///
/// Device-reported errors fail the procedure; answers that do not match
/// the contract are only logged.
pub(crate) async fn run(device: &Device, command: Command) -> ProcedureResult<Answer> {
    let code = command.code;
    let answer = device.send(&command).await?;
    if answer.is_error() {
        return Err(ProcedureError::CommandFailed {
            code,
            message: answer.to_string(),
        });
    }
    if !answer.valid {
        warn!(%code, message = %answer.message, "unexpected answer during procedure");
    }
    Ok(answer)
}

/// Send a gain through the dedicated setter if the device has one.
pub(crate) async fn set_gain(device: &Device, dedicated: CommandCode, gain: u32) -> ProcedureResult<Answer> {
    if device.has_command(dedicated) {
        run(device, Command::set(dedicated, gain)).await
    } else {
        run(device, Command::set_gain(gain)).await
    }
}

/// Query a getter if the device has it; errors are treated as absent.
pub(crate) async fn query(device: &Device, code: CommandCode) -> Option<Answer> {
    if !device.has_command(code) {
        return None;
    }
    match device.send(&Command::new(code)).await {
        Ok(answer) if answer.valid && !answer.is_error() => Some(answer),
        Ok(_) => None,
        Err(e) => {
            warn!(%code, "failed to read procedure configuration: {}", e);
            None
        }
    }
}

pub(crate) fn uint(answer: &Answer, name: FieldName) -> Option<u32> {
    answer
        .value(name)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

/// Read the current frequency, if the device reports one.
pub(crate) async fn current_frequency(device: &Device) -> Option<u32> {
    let answer = query(device, CommandCode::GET_FREQ).await?;
    uint(&answer, FieldName::Frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_serde_tagged() {
        let args = ProcedureArgs::default_for(ProcedureType::Scan);
        let yaml = serde_yaml::to_string(&args).unwrap();
        assert!(yaml.contains("procedure: scan"));
        let back: ProcedureArgs = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, args);
        assert_eq!(back.procedure_type(), ProcedureType::Scan);
    }

    #[test]
    fn test_defaults_match_type() {
        for procedure_type in ProcedureType::ALL {
            assert_eq!(ProcedureArgs::default_for(procedure_type).procedure_type(), procedure_type);
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(ProcedureType::SpectrumMeasure.to_string(), "Spectrum Measure");
        assert_eq!(ProcedureType::Wipe.to_string(), "Wipe");
    }
}
