//! Communicator for firmware predating the sonic framing.
//!
//! Legacy devices answer in plain `\n` terminated lines without request ids.
//! Each request therefore owns the stream until its reply block has been
//! read: requests are serialized and paired with the next lines received.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sonic_protocol::{CommandCode, CommandLookupTable, FrameCodec, LEGACY_TERMINATOR};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{log_request, Communicator, CommunicatorKind, DeviceLogSink, MessageQueue, SendOptions};
use crate::config::LegacyConfig;
use crate::error::{CommunicatorError, CommunicatorResult};
use crate::events::{Event, EventBus};
use crate::transport::{BoxedReader, BoxedWriter, Connection};

const READ_BUFFER_SIZE: usize = 256;

/// Number of lines `?info` answers with.
const INFO_LINES: usize = 4;

struct Shared {
    messages: MessageQueue,
    /// Receiver of the lines of the exchange in progress.
    waiter: Mutex<Option<mpsc::UnboundedSender<String>>>,
    connected: watch::Sender<bool>,
    events: EventBus,
}

impl Shared {
    fn dispatch(&self, line: String) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return;
        }
        let mut waiter = self.waiter.lock();
        if let Some(tx) = waiter.as_ref() {
            if tx.send(line.to_string()).is_ok() {
                return;
            }
            *waiter = None;
        }
        drop(waiter);
        debug!(line, "unsolicited legacy line");
        self.messages.push(line.to_string());
    }

    fn disconnect(&self) {
        self.waiter.lock().take();
        if self.connected.send_replace(false) {
            self.events.emit(Event::Disconnected);
        }
    }
}

/// Clears the waiter of an exchange however it ends.
struct WaiterGuard<'a>(&'a Shared);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.waiter.lock().take();
    }
}

/// Communicator pairing each request with the next reply block.
pub struct LegacyCommunicator {
    shared: Arc<Shared>,
    connection: tokio::sync::Mutex<Box<dyn Connection>>,
    /// Held for a whole exchange.
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    table: RwLock<Option<Arc<CommandLookupTable>>>,
    timeouts: RwLock<HashMap<CommandCode, Duration>>,
    config: LegacyConfig,
}

impl LegacyCommunicator {
    pub fn new(connection: Box<dyn Connection>, config: LegacyConfig, events: EventBus) -> Self {
        let (connected, _) = watch::channel(false);
        LegacyCommunicator {
            shared: Arc::new(Shared {
                messages: MessageQueue::new("legacy messages", config.message_queue_size),
                waiter: Mutex::new(None),
                connected,
                events,
            }),
            connection: tokio::sync::Mutex::new(connection),
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            table: RwLock::new(None),
            timeouts: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Deduce the command of a request from its identifier.
    ///
    /// The setter value and trailing index digits are stripped before the
    /// identifier is looked up.
    pub fn deduce_code(&self, request: &str) -> Option<CommandCode> {
        let table = self.table.read();
        let table = table.as_ref()?;
        let identifier = request.split('=').next().unwrap_or(request).trim();
        table
            .find_by_identifier(identifier)
            .or_else(|| table.find_by_identifier(identifier.trim_end_matches(|c: char| c.is_ascii_digit())))
    }

    /// Get the reply timeout used for a command.
    pub fn timeout_for(&self, code: Option<CommandCode>) -> Duration {
        code.and_then(|code| self.timeouts.read().get(&code).copied())
            .unwrap_or_else(|| self.config.default_timeout())
    }

    fn expected_lines(code: Option<CommandCode>) -> usize {
        match code {
            Some(CommandCode::GET_INFO) => INFO_LINES,
            _ => 1,
        }
    }

    /// Open the connection and start the reader.
    async fn start_session(&self, connection: &mut dyn Connection) -> CommunicatorResult<()> {
        let (reader, writer) = connection.open().await?;
        info!("legacy communicator connected to {}", connection.name());

        *self.writer.lock().await = Some(writer);
        let handle = tokio::spawn(reader_loop(Arc::clone(&self.shared), reader));
        *self.reader.lock() = Some(handle);
        self.shared.connected.send_replace(true);
        Ok(())
    }

    /// Stop the reader and wait until it released the read half.
    async fn stop_reader(&self) {
        let handle = self.reader.lock().take();
        let Some(handle) = handle else {
            return;
        };
        handle.abort();
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!("reader task ended abnormally: {}", e);
            }
        }
    }

    /// Give the device its startup time and discard what it printed meanwhile.
    async fn settle(&self) {
        if !self.config.startup_delay().is_zero() {
            tokio::time::sleep(self.config.startup_delay()).await;
        }
        self.drain().await;
    }

    async fn drain(&self) {
        let mut drained = 0usize;
        while let Some(line) = self.shared.messages.pop(self.config.drain_timeout()).await {
            debug!(%line, "drained legacy banner");
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "drained legacy banner lines");
        }
    }
}

#[async_trait]
impl Communicator for LegacyCommunicator {
    fn kind(&self) -> CommunicatorKind {
        CommunicatorKind::Legacy
    }

    async fn open(&self) -> CommunicatorResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        {
            let mut connection = self.connection.lock().await;
            self.start_session(&mut **connection).await?;
        }
        self.settle().await;
        Ok(())
    }

    async fn close(&self) {
        self.stop_reader().await;
        self.writer.lock().await.take();
        let mut connection = self.connection.lock().await;
        if let Err(e) = connection.close().await {
            warn!("failed to close {}: {}", connection.name(), e);
        }
        self.shared.disconnect();
    }

    fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    fn connection_state(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    async fn send_and_wait(&self, request: &str, options: &SendOptions) -> CommunicatorResult<String> {
        if !self.is_connected() {
            return Err(CommunicatorError::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(CommunicatorError::NotConnected)?;

        let code = options.code.or_else(|| self.deduce_code(request));
        let timeout = self.timeout_for(code);
        log_request(CommunicatorKind::Legacy, None, request);

        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.shared.waiter.lock() = Some(tx);
        let _guard = WaiterGuard(&self.shared);

        let line = format!("{}\n", request);
        async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await
        .map_err(|e| CommunicatorError::WriteFailed(e.to_string()))?;

        let mut lines = Vec::new();
        for _ in 0..Self::expected_lines(code) {
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(line)) => lines.push(line),
                Ok(None) | Err(_) => break,
            }
        }

        if lines.is_empty() {
            if !self.is_connected() {
                return Err(CommunicatorError::Disconnected);
            }
            warn!(request, ?timeout, "legacy request timed out");
            return Err(CommunicatorError::Timeout(timeout));
        }

        let body = lines.join("\n");
        Ok(match code {
            Some(code) => format!("{}#{}", code.value(), body),
            None => body,
        })
    }

    async fn read_message(&self, timeout: Duration) -> Option<String> {
        self.shared.messages.pop(timeout).await
    }

    async fn read_notification(&self, _timeout: Duration) -> Option<String> {
        None
    }

    async fn change_baudrate(&self, baudrate: u32) -> CommunicatorResult<()> {
        {
            let mut connection = self.connection.lock().await;
            if !connection.set_baudrate(baudrate) {
                return Err(CommunicatorError::Io(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{} does not support baudrate {}", connection.name(), baudrate),
                )));
            }
            info!(baudrate, "restarting legacy session");

            // Waits for the exchange in progress; subscribers see no disconnect.
            self.writer.lock().await.take();
            self.stop_reader().await;
            if let Err(e) = connection.close().await {
                warn!("failed to close {}: {}", connection.name(), e);
            }
            if let Err(e) = self.start_session(&mut **connection).await {
                self.shared.disconnect();
                return Err(e);
            }
        }
        self.settle().await;
        Ok(())
    }

    fn set_device_log_sink(&self, _sink: Arc<dyn DeviceLogSink>) {
        debug!("legacy devices send no log lines");
    }

    fn set_lookup_table(&self, table: Arc<CommandLookupTable>) {
        let timeouts = table
            .iter()
            .map(|(code, lookup)| {
                let timeout = lookup
                    .estimated_response_time()
                    .unwrap_or_else(|| self.config.default_timeout());
                (*code, timeout)
            })
            .collect();
        *self.timeouts.write() = timeouts;
        *self.table.write() = Some(table);
    }
}

impl Drop for LegacyCommunicator {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}

async fn reader_loop(shared: Arc<Shared>, mut reader: BoxedReader) {
    let mut codec = FrameCodec::with_terminator(LEGACY_TERMINATOR);
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                if let Some(partial) = codec.take_partial() {
                    warn!(%partial, "stream ended inside a line");
                } else {
                    info!("legacy device closed the stream");
                }
                break;
            }
            Ok(n) => {
                codec.push(&buf[..n]);
                while let Some(line) = codec.decode() {
                    shared.dispatch(line);
                }
            }
            Err(e) => {
                warn!("read error: {}", e);
                break;
            }
        }
    }

    shared.disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StreamConnection;
    use sonic_protocol::protocols::{legacy, legacy_protocol_builder};
    use sonic_protocol::DeviceType;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    fn connected_pair() -> (StreamConnection, DuplexStream) {
        let (host, device) = tokio::io::duplex(1024);
        let mut host = Some(host);
        let connection = StreamConnection::new("legacy", move || {
            let host = host
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "used"))?;
            let (reader, writer) = tokio::io::split(host);
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        });
        (connection, device)
    }

    fn quick_config() -> LegacyConfig {
        LegacyConfig {
            drain_timeout_ms: 20,
            ..LegacyConfig::default()
        }
    }

    fn legacy_table() -> Arc<CommandLookupTable> {
        Arc::new(
            legacy_protocol_builder()
                .build(DeviceType::Unknown, legacy::VERSION, true)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_reply_follows_request() {
        let (connection, device) = connected_pair();
        let communicator = LegacyCommunicator::new(Box::new(connection), quick_config(), EventBus::default());
        communicator.open().await.unwrap();

        let device_task = tokio::spawn(async move {
            let mut device = BufReader::new(device);
            let mut request = String::new();
            device.read_line(&mut request).await.unwrap();
            assert_eq!(request, "!f=1000\n");
            device.get_mut().write_all(b"freq=1000\n").await.unwrap();
            device
        });

        let answer = communicator.send_and_wait("!f=1000", &SendOptions::default()).await.unwrap();
        assert_eq!(answer, "freq=1000");
        let _device = device_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_code_prefix_and_info_lines() {
        let (connection, device) = connected_pair();
        let communicator = LegacyCommunicator::new(Box::new(connection), quick_config(), EventBus::default());
        communicator.set_lookup_table(legacy_table());
        communicator.open().await.unwrap();

        assert_eq!(communicator.deduce_code("!f=1000"), Some(CommandCode::SET_FREQ));
        assert_eq!(communicator.deduce_code("?info"), Some(CommandCode::GET_INFO));
        assert_eq!(communicator.deduce_code("?nothing"), None);

        let device_task = tokio::spawn(async move {
            let mut device = BufReader::new(device);
            let mut request = String::new();
            device.read_line(&mut request).await.unwrap();
            assert_eq!(request, "?info\n");
            device
                .get_mut()
                .write_all(b"Type: mvp_worker\r\nHW: 1\r\nFW: 0.9\r\nBuild: legacy\r\n")
                .await
                .unwrap();
            device
        });

        let answer = communicator.send_and_wait("?info", &SendOptions::default()).await.unwrap();
        assert_eq!(answer, "1#Type: mvp_worker\nHW: 1\nFW: 0.9\nBuild: legacy");
        let _device = device_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_banner_is_drained_and_idle_lines_queue() {
        let (connection, mut device) = connected_pair();
        device.write_all(b"Welcome to sonicamp\n").await.unwrap();
        let communicator = LegacyCommunicator::new(Box::new(connection), quick_config(), EventBus::default());
        communicator.open().await.unwrap();
        assert_eq!(communicator.read_message(Duration::from_millis(10)).await, None);

        device.write_all(b"overheat\n").await.unwrap();
        assert_eq!(
            communicator.read_message(Duration::from_secs(2)).await.as_deref(),
            Some("overheat")
        );
        assert_eq!(communicator.read_notification(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let (connection, _device) = connected_pair();
        let config = LegacyConfig {
            default_timeout_ms: 30,
            ..quick_config()
        };
        let communicator = LegacyCommunicator::new(Box::new(connection), config, EventBus::default());
        communicator.open().await.unwrap();

        let result = communicator.send_and_wait("!ON", &SendOptions::default()).await;
        assert!(matches!(result, Err(CommunicatorError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_eof_disconnects() {
        let (connection, device) = connected_pair();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let communicator = LegacyCommunicator::new(Box::new(connection), quick_config(), events);
        communicator.open().await.unwrap();

        drop(device);
        assert_eq!(rx.recv().await.unwrap(), Event::Disconnected);
        assert!(!communicator.is_connected());
        assert!(matches!(
            communicator.send_and_wait("!ON", &SendOptions::default()).await,
            Err(CommunicatorError::NotConnected)
        ));
    }

    /// Serves one prepared stream per open and accepts any baudrate.
    struct SwitchingConnection(Vec<DuplexStream>);

    #[async_trait]
    impl Connection for SwitchingConnection {
        fn name(&self) -> String {
            "switching".to_string()
        }

        async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
            let host = self
                .0
                .pop()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no stream left"))?;
            let (reader, writer) = tokio::io::split(host);
            Ok((Box::new(reader), Box::new(writer)))
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn set_baudrate(&mut self, _baudrate: u32) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_change_baudrate_keeps_session() {
        let (first_host, _first_device) = tokio::io::duplex(1024);
        let (second_host, mut second_device) = tokio::io::duplex(1024);
        second_device.write_all(b"Welcome to sonicamp\n").await.unwrap();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let communicator = LegacyCommunicator::new(
            Box::new(SwitchingConnection(vec![second_host, first_host])),
            quick_config(),
            events,
        );
        communicator.open().await.unwrap();

        communicator.change_baudrate(9600).await.unwrap();
        assert!(communicator.is_connected());
        assert!(rx.try_recv().is_err());
        assert_eq!(communicator.read_message(Duration::from_millis(10)).await, None);

        let device_task = tokio::spawn(async move {
            let mut device = BufReader::new(second_device);
            let mut request = String::new();
            device.read_line(&mut request).await.unwrap();
            assert_eq!(request, "?f\n");
            device.get_mut().write_all(b"20000\n").await.unwrap();
            device
        });
        let answer = communicator.send_and_wait("?f", &SendOptions::default()).await.unwrap();
        assert_eq!(answer, "20000");
        let _device = device_task.await.unwrap();
    }
}
