//! Communicators: own the byte stream to a device and pair requests with
//! their answers.
//!
//! Two implementations share the [`Communicator`] surface:
//!
//! - [`SerialCommunicator`] speaks the framed sonic protocol and
//!   demultiplexes answers by request id.
//! - [`LegacyCommunicator`] speaks plain lines to old firmware and pairs
//!   every request with the next reply block.

mod legacy;
mod queue;
mod serial;
mod slots;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sonic_protocol::{CommandCode, CommandLookup, CommandLookupTable, DeviceLogLevel};
use tokio::sync::watch;

use crate::error::CommunicatorResult;

pub use legacy::LegacyCommunicator;
pub use queue::MessageQueue;
pub use serial::SerialCommunicator;
pub use slots::SlotTable;

/// Which wire protocol a communicator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommunicatorKind {
    Sonic,
    Legacy,
}

/// Per-request options of [`Communicator::send_and_wait`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Expected response time; the communicator default applies if unset.
    pub timeout: Option<Duration>,
    /// The command the request belongs to, if known.
    pub code: Option<CommandCode>,
}

impl SendOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        SendOptions {
            timeout: Some(timeout),
            code: None,
        }
    }

    /// Options derived from a contract lookup.
    pub fn for_lookup(lookup: &CommandLookup) -> Self {
        SendOptions {
            timeout: lookup.estimated_response_time(),
            code: Some(lookup.code),
        }
    }
}

/// Receives log lines the device sends (`LOG=<LEVEL>:<body>`).
pub trait DeviceLogSink: Send + Sync {
    fn log(&self, level: DeviceLogLevel, message: &str);
}

/// Re-emits device log lines as `tracing` events on the `sonic::device`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl DeviceLogSink for TracingLogSink {
    fn log(&self, level: DeviceLogLevel, message: &str) {
        match level {
            DeviceLogLevel::Debug => tracing::debug!(target: "sonic::device", "{}", message),
            DeviceLogLevel::Info => tracing::info!(target: "sonic::device", "{}", message),
            DeviceLogLevel::Warn => tracing::warn!(target: "sonic::device", "{}", message),
            DeviceLogLevel::Error => tracing::error!(target: "sonic::device", "{}", message),
        }
    }
}

/// Owner of the stream to one device.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Get the wire protocol spoken.
    fn kind(&self) -> CommunicatorKind;

    /// Open the connection and start reading.
    async fn open(&self) -> CommunicatorResult<()>;

    /// Stop reading, close the connection and fail outstanding requests.
    async fn close(&self);

    /// Check if the connection is open.
    fn is_connected(&self) -> bool;

    /// Watch the connection state.
    fn connection_state(&self) -> watch::Receiver<bool>;

    /// Send a request and wait for its answer body.
    async fn send_and_wait(&self, request: &str, options: &SendOptions) -> CommunicatorResult<String>;

    /// Take the next raw message, waiting up to `timeout`.
    async fn read_message(&self, timeout: Duration) -> Option<String>;

    /// Take the next device notification, waiting up to `timeout`.
    async fn read_notification(&self, timeout: Duration) -> Option<String>;

    /// Reconnect with another baudrate.
    async fn change_baudrate(&self, baudrate: u32) -> CommunicatorResult<()>;

    /// Route device log lines to `sink`.
    fn set_device_log_sink(&self, sink: Arc<dyn DeviceLogSink>);

    /// Make the lookup table of the session known.
    fn set_lookup_table(&self, _table: Arc<CommandLookupTable>) {}
}

/// Log a request at a level matching its frequency.
pub(crate) fn log_request(kind: CommunicatorKind, id: Option<u32>, request: &str) {
    if request == "-" {
        tracing::trace!(?kind, ?id, request, "send");
    } else {
        tracing::debug!(?kind, ?id, request, "send");
    }
}
