//! Frequency ramp, driven by the host or by the firmware.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::{Command, CommandCode, FieldName};

use super::{current_frequency, invalid_args, query, run, uint, Holder, HolderArgs, Procedure, ProcedureArgs, ProcedureType};
use crate::device::Device;
use crate::error::{ProcedureError, ProcedureResult};

/// Arguments of a ramp around a center frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampArgs {
    pub freq_center: u32,
    pub half_range: u32,
    pub freq_step: u32,
    pub t_on: HolderArgs,
    pub t_off: HolderArgs,
}

impl Default for RampArgs {
    fn default() -> Self {
        RampArgs {
            freq_center: 1_000_000,
            half_range: 500_000,
            freq_step: 100_000,
            t_on: HolderArgs::ms(500.0),
            t_off: HolderArgs::ms(0.0),
        }
    }
}

impl RampArgs {
    pub fn f_start(&self) -> ProcedureResult<u32> {
        self.freq_center.checked_sub(self.half_range).ok_or_else(|| {
            ProcedureError::InvalidArgs(format!(
                "half range {} exceeds center {}",
                self.half_range, self.freq_center
            ))
        })
    }

    pub fn f_stop(&self) -> ProcedureResult<u32> {
        self.freq_center
            .checked_add(self.half_range)
            .ok_or_else(|| ProcedureError::InvalidArgs("ramp ends above the frequency range".to_string()))
    }

    pub fn validate(&self) -> ProcedureResult<()> {
        if self.freq_step == 0 {
            return Err(ProcedureError::InvalidArgs("ramp step must not be 0".to_string()));
        }
        self.f_start()?;
        self.f_stop()?;
        Ok(())
    }

    /// The frequencies of a ramp, start and stop included.
    pub fn values(&self) -> ProcedureResult<Vec<u32>> {
        self.validate()?;
        let start = u64::from(self.f_start()?);
        let stop = u64::from(self.f_stop()?) + u64::from(self.freq_step);
        Ok((start..stop)
            .step_by(self.freq_step as usize)
            .filter_map(|v| u32::try_from(v).ok())
            .collect())
    }
}

fn ramp_args(args: &ProcedureArgs) -> ProcedureResult<&RampArgs> {
    match args {
        ProcedureArgs::Ramp(args) => Ok(args),
        ProcedureArgs::SpectrumMeasure(args) => Ok(&args.ramp),
        other => Err(invalid_args(ProcedureType::Ramp, other)),
    }
}

/// Center the default ramp on the current frequency.
async fn fetch_local(device: &Device) -> RampArgs {
    let mut args = RampArgs::default();
    if let Some(freq) = current_frequency(device).await {
        args.freq_center = freq;
        args.half_range = args.half_range.min(freq);
    }
    args
}

/// Ramp driven step by step from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct RampLocal;

impl RampLocal {
    /// Step through `values`, holding each for `hold_on`.
    ///
    /// With a non-zero `hold_off` the signal is switched off between steps.
    pub async fn ramp(device: &Device, values: &[u32], hold_on: HolderArgs, hold_off: HolderArgs) -> ProcedureResult<()> {
        let pulsed = !hold_off.is_zero();
        run(device, Command::set_on()).await?;
        for value in values {
            run(device, Command::set_frequency(*value)).await?;
            if pulsed {
                run(device, Command::set_on()).await?;
            }
            Holder::execute(hold_on).await;
            if pulsed {
                run(device, Command::set_off()).await?;
                Holder::execute(hold_off).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Procedure for RampLocal {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::Ramp
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        let args = ramp_args(args)?;
        let values = args.values()?;
        RampLocal::ramp(device, &values, args.t_on, args.t_off).await?;
        run(device, Command::set_off()).await?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        Ok(ProcedureArgs::Ramp(fetch_local(device).await))
    }
}

/// Ramp executed by the firmware.
#[derive(Debug, Clone, Copy, Default)]
pub struct RampRemote;

impl RampRemote {
    /// Send the ramp parameters without starting it.
    pub async fn configure(device: &Device, args: &RampArgs) -> ProcedureResult<()> {
        args.validate()?;
        run(device, Command::set(CommandCode::SET_RAMP_F_START, args.f_start()?)).await?;
        run(device, Command::set(CommandCode::SET_RAMP_F_STOP, args.f_stop()?)).await?;
        run(device, Command::set(CommandCode::SET_RAMP_F_STEP, args.freq_step)).await?;
        run(device, Command::set(CommandCode::SET_RAMP_T_ON, args.t_on.as_millis())).await?;
        run(device, Command::set(CommandCode::SET_RAMP_T_OFF, args.t_off.as_millis())).await?;
        Ok(())
    }
}

#[async_trait]
impl Procedure for RampRemote {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::Ramp
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        RampRemote::configure(device, ramp_args(args)?).await?;
        run(device, Command::new(CommandCode::SET_RAMP)).await?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        let Some(answer) = query(device, CommandCode::GET_RAMP).await else {
            return Ok(ProcedureArgs::Ramp(fetch_local(device).await));
        };
        let mut args = RampArgs::default();
        if let (Some(start), Some(stop)) = (uint(&answer, FieldName::RampFStart), uint(&answer, FieldName::RampFStop)) {
            let (low, high) = (start.min(stop), start.max(stop));
            args.half_range = (high - low) / 2;
            args.freq_center = low + args.half_range;
        }
        if let Some(step) = uint(&answer, FieldName::RampFStep) {
            args.freq_step = step;
        }
        if let Some(t_on) = uint(&answer, FieldName::RampTOn) {
            args.t_on = HolderArgs::ms(f64::from(t_on));
        }
        if let Some(t_off) = uint(&answer, FieldName::RampTOff) {
            args.t_off = HolderArgs::ms(f64::from(t_off));
        }
        Ok(ProcedureArgs::Ramp(args))
    }
}
