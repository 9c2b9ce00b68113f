use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonic_protocol::{Command, CommandCode};

use super::{invalid_args, run, Procedure, ProcedureArgs, ProcedureType, ScanArgs, ScanProc, TuneArgs, TuneProc};
use crate::device::Device;
use crate::error::ProcedureResult;

/// Arguments of the automatic mode: a scan followed by tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoArgs {
    pub scan: ScanArgs,
    pub tune: TuneArgs,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoProc;

#[async_trait]
impl Procedure for AutoProc {
    fn procedure_type(&self) -> ProcedureType {
        ProcedureType::Auto
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(&self, device: &Device, args: &ProcedureArgs) -> ProcedureResult<()> {
        let ProcedureArgs::Auto(args) = args else {
            return Err(invalid_args(ProcedureType::Auto, args));
        };
        ScanProc::configure(device, &args.scan).await?;
        TuneProc::configure(device, &args.tune).await?;
        run(device, Command::new(CommandCode::SET_AUTO)).await?;
        Ok(())
    }

    async fn fetch_args(&self, device: &Device) -> ProcedureResult<ProcedureArgs> {
        Ok(ProcedureArgs::Auto(AutoArgs {
            scan: ScanProc::fetch(device).await,
            tune: TuneProc::fetch(device).await,
        }))
    }
}
