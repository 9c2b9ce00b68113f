use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::{Command, CommandCode, FieldName};

use super::{invalid_args, query, run, set_gain, uint, HolderArgs, Procedure, ProcedureArgs, ProcedureType};
use crate::device::Device;
use crate::error::ProcedureResult;

/// Arguments of the firmware tuning, which tracks the resonance over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneArgs {
    pub freq_step: u32,
    pub t_time: HolderArgs,
    pub n_steps: u32,
    pub freq_shift: u32,
    pub t_step: HolderArgs,
    pub gain: u32,
}

impl Default for TuneArgs {
    fn default() -> Self {
        TuneArgs {
            freq_step: 1_000,
            t_time: HolderArgs::ms(5_000.0),
            n_steps: 3,
            freq_shift: 0,
            t_step: HolderArgs::ms(100.0),
            gain: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TuneProc;

impl TuneProc {
    /// Send the tune parameters without starting the tuning.
    pub async fn configure(device: &Device, args: &TuneArgs) -> ProcedureResult<()> {
        run(device, Command::set(CommandCode::SET_TUNE_F_SHIFT, args.freq_shift)).await?;
        run(device, Command::set(CommandCode::SET_TUNE_N_STEPS, args.n_steps)).await?;
        run(device, Command::set(CommandCode::SET_TUNE_F_STEP, args.freq_step)).await?;
        run(device, Command::set(CommandCode::SET_TUNE_T_TIME, args.t_time.as_millis())).await?;
        run(device, Command::set(CommandCode::SET_TUNE_T_STEP, args.t_step.as_millis())).await?;
        set_gain(device, CommandCode::SET_TUNE_GAIN, args.gain).await?;
        Ok(())
    }

    pub(crate) async fn fetch(device: &Device) -> TuneArgs {
        let mut args = TuneArgs::default();
        let Some(answer) = query(device, CommandCode::GET_TUNE).await else {
            return args;
        };
        if let Some(step) = uint(&answer, FieldName::TuneFStep) {
            args.freq_step = step;
        }
        if let Some(t_time) = uint(&answer, FieldName::TuneTTime) {
            args.t_time = HolderArgs::ms(f64::from(t_time));
        }
        if let Some(n_steps) = uint(&answer, FieldName::TuneNSteps) {
            args.n_steps = n_steps;
        }
        if let Some(shift) = uint(&answer, FieldName::TuneFShift) {
            args.freq_shift = shift;
        }
        if let Some(t_step) = uint(&answer, FieldName::TuneTStep) {
            args.t_step = HolderArgs::ms(f64::from(t_step));
        }
        if let Some(gain) = uint(&answer, FieldName::TuneGain) {
            args.gain = gain;
        }
        args
    }
}

#[async_trait]
impl Procedure for TuneProc {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::Tune
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        let ProcedureArgs::Tune(args) = args else {
            return Err(invalid_args(ProcedureType::Tune, args));
        };
        TuneProc::configure(device, args).await?;
        run(device, Command::new(CommandCode::SET_TUNE)).await?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        Ok(ProcedureArgs::Tune(TuneProc::fetch(device).await))
    }
}
