use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::{Command, CommandCode, FieldName};

use super::{current_frequency, invalid_args, query, run, set_gain, uint, HolderArgs, Procedure, ProcedureArgs, ProcedureType};
use crate::device::Device;
use crate::error::ProcedureResult;

/// Arguments of a firmware scan for the resonance around a center frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanArgs {
    pub freq_center: u32,
    pub gain: u32,
    pub freq_range: u32,
    pub freq_step: u32,
    pub freq_shift: u32,
    pub t_step: HolderArgs,
}

impl Default for ScanArgs {
    fn default() -> Self {
        ScanArgs {
            freq_center: 1_000_000,
            gain: 20,
            freq_range: 8_000,
            freq_step: 1_000,
            freq_shift: 0,
            t_step: HolderArgs::ms(100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanProc;

impl ScanProc {
    /// Send the scan parameters without starting the scan.
    pub async fn configure(device: &Device, args: &ScanArgs) -> ProcedureResult<()> {
        run(device, Command::set_frequency(args.freq_center)).await?;
        run(device, Command::set(CommandCode::SET_SCAN_F_SHIFT, args.freq_shift)).await?;
        set_gain(device, CommandCode::SET_SCAN_GAIN, args.gain).await?;
        run(device, Command::set(CommandCode::SET_SCAN_F_RANGE, args.freq_range)).await?;
        run(device, Command::set(CommandCode::SET_SCAN_F_STEP, args.freq_step)).await?;
        run(device, Command::set(CommandCode::SET_SCAN_T_STEP, args.t_step.as_millis())).await?;
        Ok(())
    }

    pub(crate) async fn fetch(device: &Device) -> ScanArgs {
        let mut args = ScanArgs::default();
        if let Some(freq) = current_frequency(device).await {
            args.freq_center = freq;
        }
        let Some(answer) = query(device, CommandCode::GET_SCAN).await else {
            return args;
        };
        if let Some(range) = uint(&answer, FieldName::ScanFRange) {
            args.freq_range = range;
        }
        if let Some(step) = uint(&answer, FieldName::ScanFStep) {
            args.freq_step = step;
        }
        if let Some(shift) = uint(&answer, FieldName::ScanFShift) {
            args.freq_shift = shift;
        }
        if let Some(gain) = uint(&answer, FieldName::ScanGain) {
            args.gain = gain;
        }
        if let Some(t_step) = uint(&answer, FieldName::ScanTStep) {
            args.t_step = HolderArgs::ms(f64::from(t_step));
        }
        args
    }
}

#[async_trait]
impl Procedure for ScanProc {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::Scan
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        let ProcedureArgs::Scan(args) = args else {
            return Err(invalid_args(ProcedureType::Scan, args));
        };
        ScanProc::configure(device, args).await?;
        run(device, Command::new(CommandCode::SET_SCAN)).await?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        Ok(ProcedureArgs::Scan(ScanProc::fetch(device).await))
    }
}
