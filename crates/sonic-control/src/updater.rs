//! Periodic status polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sonic_protocol::{Answer, DeviceType};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::DeviceResult;
use crate::events::Event;

struct Inner {
    device: Arc<Device>,
    interval_ms: AtomicU64,
    running: watch::Sender<bool>,
}

impl Inner {
    async fn update(&self) -> DeviceResult<Option<Answer>> {
        if self.device.device_type() == DeviceType::Configurator {
            self.running.send_replace(false);
            return Ok(None);
        }
        let answer = self.device.try_get_update().await?;
        if answer.valid {
            self.device.events().emit(Event::Update(answer.clone()));
        } else {
            debug!(message = %answer.message, "ignoring invalid status update");
        }
        Ok(Some(answer))
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    async fn run(&self) -> DeviceResult<()> {
        let mut running = self.running.subscribe();
        let mut connected = self.device.communicator().connection_state();

        loop {
            let keep_going = *running.borrow_and_update() && *connected.borrow_and_update();
            if !keep_going {
                break;
            }
            if let Err(e) = self.update().await {
                error!("status update failed: {}", e);
                self.running.send_replace(false);
                self.device.disconnect().await;
                return Err(e);
            }

            let interval = self.interval();
            if interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = running.changed() => {}
                _ = connected.changed() => {}
            }
        }
        debug!("updater loop finished");
        Ok(())
    }
}

/// Polls the device status and publishes it as [`Event::Update`].
pub struct Updater {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<DeviceResult<()>>>>,
}

impl Updater {
    pub fn new(device: Arc<Device>, interval: Duration) -> Self {
        let (running, _) = watch::channel(false);
        Updater {
            inner: Arc::new(Inner {
                device,
                interval_ms: AtomicU64::new(interval.as_millis() as u64),
                running,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.inner.device
    }

    /// Start polling in the background. Does nothing if already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return;
        }
        info!(interval = ?self.interval(), "start updater");
        self.inner.running.send_replace(true);
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run().await }));
    }

    /// Stop polling and wait for the loop to end.
    ///
    /// Returns the error that ended the loop, if any.
    pub async fn stop(&self) -> DeviceResult<()> {
        self.inner.running.send_replace(false);
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("updater task ended abnormally: {}", e);
                Ok(())
            }
        }
    }

    /// Poll once.
    ///
    /// Returns `None` for devices without a status.
    pub async fn update(&self) -> DeviceResult<Option<Answer>> {
        self.inner.update().await
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    pub fn set_interval(&self, interval: Duration) {
        self.inner
            .interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval()
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        self.inner.running.send_replace(false);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
