use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::{Command, CommandCode, FieldName};

use super::{invalid_args, query, run, set_gain, uint, HolderArgs, Procedure, ProcedureArgs, ProcedureType};
use crate::device::Device;
use crate::error::ProcedureResult;

/// Arguments of a firmware wipe: repeated sweeps with pauses in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WipeArgs {
    pub freq_range: u32,
    pub freq_step: u32,
    pub t_on: HolderArgs,
    pub t_off: HolderArgs,
    pub t_pause: HolderArgs,
    pub gain: u32,
}

impl Default for WipeArgs {
    fn default() -> Self {
        WipeArgs {
            freq_range: 8_000,
            freq_step: 10,
            t_on: HolderArgs::ms(500.0),
            t_off: HolderArgs::ms(20.0),
            t_pause: HolderArgs::ms(2_000.0),
            gain: 150,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WipeProc;

#[async_trait]
impl Procedure for WipeProc {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::Wipe
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        let ProcedureArgs::Wipe(args) = args else {
            return Err(invalid_args(ProcedureType::Wipe, args));
        };
        run(device, Command::set(CommandCode::SET_WIPE_F_RANGE, args.freq_range)).await?;
        run(device, Command::set(CommandCode::SET_WIPE_F_STEP, args.freq_step)).await?;
        run(device, Command::set(CommandCode::SET_WIPE_T_ON, args.t_on.as_millis())).await?;
        run(device, Command::set(CommandCode::SET_WIPE_T_OFF, args.t_off.as_millis())).await?;
        run(device, Command::set(CommandCode::SET_WIPE_T_PAUSE, args.t_pause.as_millis())).await?;
        set_gain(device, CommandCode::SET_WIPE_GAIN, args.gain).await?;
        run(device, Command::new(CommandCode::SET_WIPE)).await?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        let mut args = WipeArgs::default();
        let Some(answer) = query(device, CommandCode::GET_WIPE).await else {
            return Ok(ProcedureArgs::Wipe(args));
        };
        if let Some(range) = uint(&answer, FieldName::WipeFRange) {
            args.freq_range = range;
        }
        if let Some(step) = uint(&answer, FieldName::WipeFStep) {
            args.freq_step = step;
        }
        if let Some(t_on) = uint(&answer, FieldName::WipeTOn) {
            args.t_on = HolderArgs::ms(f64::from(t_on));
        }
        if let Some(t_off) = uint(&answer, FieldName::WipeTOff) {
            args.t_off = HolderArgs::ms(f64::from(t_off));
        }
        if let Some(t_pause) = uint(&answer, FieldName::WipeTPause) {
            args.t_pause = HolderArgs::ms(f64::from(t_pause));
        }
        if let Some(gain) = uint(&answer, FieldName::WipeGain) {
            args.gain = gain;
        }
        Ok(ProcedureArgs::Wipe(args))
    }
}
