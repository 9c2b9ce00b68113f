use parking_lot::Mutex;
use sonic_protocol::Procedure as DeviceProcedure;
use tokio::sync::watch;

use crate::error::{CommunicatorError, DeviceError, ProcedureError, ProcedureResult};

/// Tracks the procedure the firmware reports in its status updates.
///
/// A remote procedure counts as halted once the reported procedure changes
/// to none after having been something else.
#[derive(Debug)]
pub struct RemoteProcedureState {
    current: Mutex<Option<DeviceProcedure>>,
    halted: watch::Sender<bool>,
}

impl Default for RemoteProcedureState {
    fn default() -> Self {
        RemoteProcedureState::new()
    }
}

impl RemoteProcedureState {
    pub fn new() -> Self {
        let (halted, _) = watch::channel(false);
        RemoteProcedureState {
            current: Mutex::new(None),
            halted,
        }
    }

    /// Record a reported procedure. [`DeviceProcedure::NoProc`] counts as none.
    pub fn update(&self, procedure: Option<DeviceProcedure>) {
        let procedure = procedure.filter(|p| *p != DeviceProcedure::NoProc);
        let mut current = self.current.lock();
        if *current == procedure {
            return;
        }
        *current = procedure;
        self.halted.send_replace(procedure.is_none());
    }

    /// Forget a previous halt before a new procedure starts.
    pub fn reset(&self) {
        self.halted.send_replace(false);
    }

    pub fn current(&self) -> Option<DeviceProcedure> {
        *self.current.lock()
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.borrow()
    }

    /// Wait until the procedure halts, or fail once the connection is lost.
    pub async fn wait_halted(&self, mut connected: watch::Receiver<bool>) -> ProcedureResult<()> {
        let mut halted = self.halted.subscribe();
        let disconnected = || ProcedureError::Device(DeviceError::Communicator(CommunicatorError::Disconnected));
        loop {
            if *halted.borrow_and_update() {
                return Ok(());
            }
            if !*connected.borrow_and_update() {
                return Err(disconnected());
            }
            tokio::select! {
                changed = halted.changed() => {
                    if changed.is_err() {
                        return Err(ProcedureError::Cancelled);
                    }
                }
                changed = connected.changed() => {
                    if changed.is_err() {
                        return Err(disconnected());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_halts_when_procedure_ends() {
        let state = RemoteProcedureState::new();
        state.update(Some(DeviceProcedure::NoProc));
        assert!(!state.is_halted());

        state.update(Some(DeviceProcedure::Scan));
        assert!(!state.is_halted());
        assert_eq!(state.current(), Some(DeviceProcedure::Scan));

        state.update(Some(DeviceProcedure::NoProc));
        assert!(state.is_halted());
        assert_eq!(state.current(), None);

        state.reset();
        assert!(!state.is_halted());
        // Repeating the same state does not halt again.
        state.update(None);
        assert!(!state.is_halted());
    }

    #[tokio::test]
    async fn test_wait_halted() {
        let state = Arc::new(RemoteProcedureState::new());
        let (_connected_tx, connected) = watch::channel(true);

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_halted(connected).await })
        };
        state.update(Some(DeviceProcedure::Tune));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        state.update(None);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_halted_fails_on_disconnect() {
        let state = RemoteProcedureState::new();
        let (connected_tx, connected) = watch::channel(true);
        state.update(Some(DeviceProcedure::Wipe));

        let (result, ()) = tokio::join!(state.wait_halted(connected), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            connected_tx.send_replace(false);
        });
        assert!(matches!(
            result,
            Err(ProcedureError::Device(DeviceError::Communicator(CommunicatorError::Disconnected)))
        ));
    }
}
