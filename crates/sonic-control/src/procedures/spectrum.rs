use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::Command;
use tracing::{debug, warn};

use super::{invalid_args, run, Holder, HolderArgs, Procedure, ProcedureArgs, ProcedureType, RampArgs, RampLocal};
use crate::device::Device;
use crate::error::ProcedureResult;
use crate::updater::Updater;

/// Arguments of a spectrum measurement.
///
/// Each ramp step is measured `time_offset_measure` after the frequency
/// was set, so the transducer has settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumMeasureArgs {
    pub ramp: RampArgs,
    pub time_offset_measure: HolderArgs,
}

impl Default for SpectrumMeasureArgs {
    fn default() -> Self {
        SpectrumMeasureArgs {
            ramp: RampArgs::default(),
            time_offset_measure: HolderArgs::ms(100.0),
        }
    }
}

/// Ramp that polls a status update at every step.
///
/// The updates are published on the event bus like regular polling.
pub struct SpectrumMeasure {
    updater: Arc<Updater>,
}

impl SpectrumMeasure {
    pub fn new(updater: Arc<Updater>) -> Self {
        SpectrumMeasure { updater }
    }

    async fn measure(&self, device: &Device, args: &SpectrumMeasureArgs) -> ProcedureResult<()> {
        let ramp = &args.ramp;
        let values = ramp.values()?;
        let pulsed = !ramp.t_off.is_zero();
        let remaining_on = ramp.t_on.saturating_sub(&args.time_offset_measure);

        for (i, value) in values.iter().enumerate() {
            run(device, Command::set_frequency(*value)).await?;
            if pulsed || i == 0 {
                run(device, Command::set_on()).await?;
            }
            Holder::execute(args.time_offset_measure).await;

            let (update, ()) = tokio::join!(self.updater.update(), Holder::execute(remaining_on));
            match update {
                Ok(Some(answer)) => debug!(frequency = value, %answer, "measured"),
                Ok(None) => {}
                Err(e) => warn!(frequency = value, "measurement failed: {}", e),
            }

            if pulsed {
                run(device, Command::set_off()).await?;
                Holder::execute(ramp.t_off).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Procedure for SpectrumMeasure {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::SpectrumMeasure
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        let ProcedureArgs::SpectrumMeasure(args) = args else {
            return Err(invalid_args(ProcedureType::SpectrumMeasure, args));
        };
        let result = self.measure(device, args).await;
        let off = run(device, Command::set_off()).await;
        result?;
        off?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        let ramp = match RampLocal.fetch_args(device).await? {
            ProcedureArgs::Ramp(ramp) => ramp,
            _ => RampArgs::default(),
        };
        Ok(ProcedureArgs::SpectrumMeasure(SpectrumMeasureArgs {
            ramp,
            ..SpectrumMeasureArgs::default()
        }))
    }
}
