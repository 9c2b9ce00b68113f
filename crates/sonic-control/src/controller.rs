//! Runs at most one procedure at a time on a device.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sonic_protocol::{Command, CommandCode, FieldName};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::{ProcedureError, ProcedureResult};
use crate::events::{Event, EventBus};
use crate::procedures::{
    instantiate_procedures, HolderArgs, Procedure, ProcedureArgs, ProcedureType, RampArgs, RemoteProcedureState,
};
use crate::updater::Updater;

/// Marks a procedure as finished when its task ends, however it ends.
struct StoppedGuard {
    active: Arc<watch::Sender<Option<ProcedureType>>>,
    events: EventBus,
}

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.active.send_replace(None);
        self.events.emit(Event::ProcedureStopped);
    }
}

/// Bring the device back into an idle state.
async fn stop_device(device: &Device) {
    if device.has_command(CommandCode::SET_STOP) {
        device.execute_command(Command::set_stop()).await;
    } else {
        device.execute_command(Command::set_off()).await;
    }
    device.set_signal_off().await;
}

async fn run_procedure(
    device: &Device,
    procedure: &dyn Procedure,
    args: &ProcedureArgs,
    remote_state: &RemoteProcedureState,
) -> ProcedureResult<()> {
    procedure.execute(device, args).await?;
    if procedure.is_remote() {
        debug!(procedure = %procedure.procedure_type(), "waiting for the device to finish");
        remote_state
            .wait_halted(device.communicator().connection_state())
            .await?;
    }
    Ok(())
}

/// Forward the procedure reported in status updates.
async fn listen(mut events: broadcast::Receiver<Event>, remote_state: Arc<RemoteProcedureState>) {
    loop {
        match events.recv().await {
            Ok(Event::Update(answer)) => {
                if let Some(value) = answer.value(FieldName::Procedure) {
                    remote_state.update(value.as_procedure());
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "procedure controller missed events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Starts, stops and observes procedures of one device.
///
/// Must be created inside a tokio runtime.
pub struct ProcedureController {
    device: Arc<Device>,
    procedures: BTreeMap<ProcedureType, Arc<dyn Procedure>>,
    active: Arc<watch::Sender<Option<ProcedureType>>>,
    task: Mutex<Option<JoinHandle<ProcedureResult<()>>>>,
    remote_state: Arc<RemoteProcedureState>,
    listener: JoinHandle<()>,
}

impl ProcedureController {
    pub fn new(device: Arc<Device>, updater: Arc<Updater>) -> Self {
        let procedures = instantiate_procedures(&device, updater);
        let remote_state = Arc::new(RemoteProcedureState::new());
        let listener = tokio::spawn(listen(device.events().subscribe(), Arc::clone(&remote_state)));
        let (active, _) = watch::channel(None);
        ProcedureController {
            device,
            procedures,
            active: Arc::new(active),
            task: Mutex::new(None),
            remote_state,
            listener,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn remote_state(&self) -> &RemoteProcedureState {
        &self.remote_state
    }

    /// Procedures this device supports.
    pub fn available(&self) -> Vec<ProcedureType> {
        self.procedures.keys().copied().collect()
    }

    pub fn is_proc_running(&self) -> bool {
        self.active.borrow().is_some()
    }

    pub fn running_proc_type(&self) -> Option<ProcedureType> {
        *self.active.borrow()
    }

    /// Watch the running procedure.
    pub fn running_state(&self) -> watch::Receiver<Option<ProcedureType>> {
        self.active.subscribe()
    }

    fn procedure(&self, procedure_type: ProcedureType) -> ProcedureResult<&Arc<dyn Procedure>> {
        self.procedures
            .get(&procedure_type)
            .ok_or(ProcedureError::Unavailable(procedure_type))
    }

    /// Start a procedure in the background.
    ///
    /// Fails with [`ProcedureError::Busy`] while another procedure runs.
    pub fn execute_proc(&self, procedure_type: ProcedureType, args: ProcedureArgs) -> ProcedureResult<()> {
        let procedure = Arc::clone(self.procedure(procedure_type)?);
        if args.procedure_type() != procedure_type {
            return Err(ProcedureError::InvalidArgs(format!(
                "{} arguments given for {}",
                args.procedure_type(),
                procedure_type
            )));
        }

        let mut task = self.task.lock();
        let mut started = false;
        self.active.send_if_modified(|active| {
            if active.is_none() {
                *active = Some(procedure_type);
                started = true;
            }
            started
        });
        if !started {
            let running = self.running_proc_type().unwrap_or(procedure_type);
            return Err(ProcedureError::Busy(running));
        }

        info!(procedure = %procedure_type, remote = procedure.is_remote(), "start procedure");
        self.remote_state.reset();
        self.device.events().emit(Event::ProcedureRunning(procedure_type));

        let guard = StoppedGuard {
            active: Arc::clone(&self.active),
            events: self.device.events().clone(),
        };
        let device = Arc::clone(&self.device);
        let remote_state = Arc::clone(&self.remote_state);
        *task = Some(tokio::spawn(async move {
            let _guard = guard;
            let result = run_procedure(&device, procedure.as_ref(), &args, &remote_state).await;
            match &result {
                Ok(()) => info!(procedure = %procedure_type, "procedure finished"),
                Err(e) => {
                    error!(procedure = %procedure_type, "procedure failed: {}", e);
                    stop_device(&device).await;
                }
            }
            result
        }));
        Ok(())
    }

    /// Wait for the last started procedure to end and get its result.
    pub async fn join_proc(&self) -> ProcedureResult<()> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => {
                if e.is_panic() {
                    error!("procedure task panicked");
                }
                Err(ProcedureError::Cancelled)
            }
        }
    }

    /// Stop the device and cancel the running procedure.
    ///
    /// A cancelled procedure counts as stopped successfully.
    pub async fn stop_proc(&self) -> ProcedureResult<()> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        if !task.is_finished() {
            info!(procedure = ?self.running_proc_type(), "stop procedure");
            stop_device(&self.device).await;
            task.abort();
        }
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => {
                error!("procedure task panicked: {}", e);
                Err(ProcedureError::Cancelled)
            }
        }
    }

    /// Read the device configuration of a procedure.
    pub async fn fetch_args(&self, procedure_type: ProcedureType) -> ProcedureResult<ProcedureArgs> {
        self.procedure(procedure_type)?.fetch_args(&self.device).await
    }

    /// Ramp from `start` to `stop` on the calling task.
    pub async fn ramp_freq(
        &self,
        start: u32,
        stop: u32,
        step: u32,
        t_on: HolderArgs,
        t_off: HolderArgs,
    ) -> ProcedureResult<()> {
        if stop <= start {
            return Err(ProcedureError::InvalidArgs(format!(
                "ramp stop {} must be above start {}",
                stop, start
            )));
        }
        let half_range = (stop - start) / 2;
        self.ramp_freq_range(start + half_range, half_range, step, t_on, t_off)
            .await
    }

    /// Ramp around `center` on the calling task.
    ///
    /// A firmware ramp returns once the device has started it.
    pub async fn ramp_freq_range(
        &self,
        center: u32,
        half_range: u32,
        step: u32,
        t_on: HolderArgs,
        t_off: HolderArgs,
    ) -> ProcedureResult<()> {
        if let Some(running) = self.running_proc_type() {
            return Err(ProcedureError::Busy(running));
        }
        let ramp = self.procedure(ProcedureType::Ramp)?;
        let args = ProcedureArgs::Ramp(RampArgs {
            freq_center: center,
            half_range,
            freq_step: step,
            t_on,
            t_off,
        });
        ramp.execute(&self.device, &args).await
    }
}

impl Drop for ProcedureController {
    fn drop(&mut self) {
        self.listener.abort();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
