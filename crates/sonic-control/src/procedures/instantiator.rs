use std::collections::BTreeMap;
use std::sync::Arc;

use sonic_protocol::CommandCode;
use tracing::debug;

use super::{AutoProc, Procedure, ProcedureType, RampLocal, RampRemote, ScanProc, SpectrumMeasure, TuneProc, WipeProc};
use crate::device::Device;
use crate::updater::Updater;

/// Build the procedures a device supports, judged by its command set.
///
/// Devices with a switching frequency setting (GET_SWF) get no ramp at all;
/// otherwise the ramp runs on the firmware when it has SET_RAMP and on the
/// host when it does not.
pub fn instantiate_procedures(device: &Device, updater: Arc<Updater>) -> BTreeMap<ProcedureType, Arc<dyn Procedure>> {
    let mut procedures: BTreeMap<ProcedureType, Arc<dyn Procedure>> = BTreeMap::new();
    procedures.insert(ProcedureType::SpectrumMeasure, Arc::new(SpectrumMeasure::new(updater)));

    if !device.has_command(CommandCode::GET_SWF) {
        if device.has_command(CommandCode::SET_RAMP) {
            procedures.insert(ProcedureType::Ramp, Arc::new(RampRemote));
        } else {
            procedures.insert(ProcedureType::Ramp, Arc::new(RampLocal));
        }
    }

    let remote: [(CommandCode, ProcedureType, Arc<dyn Procedure>); 4] = [
        (CommandCode::SET_SCAN, ProcedureType::Scan, Arc::new(ScanProc)),
        (CommandCode::SET_AUTO, ProcedureType::Auto, Arc::new(AutoProc)),
        (CommandCode::SET_TUNE, ProcedureType::Tune, Arc::new(TuneProc)),
        (CommandCode::SET_WIPE, ProcedureType::Wipe, Arc::new(WipeProc)),
    ];
    for (code, procedure_type, procedure) in remote {
        if device.has_command(code) {
            procedures.insert(procedure_type, procedure);
        }
    }

    debug!(available = ?procedures.keys().collect::<Vec<_>>(), "instantiated procedures");
    procedures
}
