//! Communicator for the framed sonic protocol.
//!
//! The communicator runs two tasks per connection:
//!
//! - a writer owning the write half, fed by a channel so concurrent requests
//!   are written in submission order;
//! - a reader owning the read half, splitting the stream into frames and
//!   routing them: answers to their pending slot, notifications to the
//!   notify queue, log lines to the device log sink.
//!
//! Every frame is also queued as a raw message for [`Communicator::read_message`].

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sonic_protocol::{Frame, FrameCodec, RequestId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{log_request, Communicator, CommunicatorKind, DeviceLogSink, MessageQueue, SendOptions, SlotTable, TracingLogSink};
use crate::config::CommunicatorConfig;
use crate::error::{CommunicatorError, CommunicatorResult};
use crate::events::{Event, EventBus};
use crate::transport::{BoxedReader, BoxedWriter, Connection, DetachedConnection};

const READ_BUFFER_SIZE: usize = 1024;
const WRITE_QUEUE_SIZE: usize = 64;

struct WriteRequest {
    bytes: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
}

/// State shared between the communicator and its tasks.
struct Shared {
    slots: Mutex<SlotTable>,
    messages: MessageQueue,
    notifications: MessageQueue,
    sink: RwLock<Arc<dyn DeviceLogSink>>,
    connected: watch::Sender<bool>,
    events: EventBus,
    syntax_errors: AtomicU64,
}

impl Shared {
    fn dispatch(&self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        self.messages.push(text.clone());

        match Frame::parse(&text) {
            Ok(Frame::Answer { id, body }) => {
                if !self.slots.lock().fulfil(id, body) {
                    info!(id, "dropping answer without pending request");
                }
            }
            Ok(Frame::Notify(body)) => self.notifications.push(body),
            Ok(Frame::Log { level, body }) => self.sink.read().log(level, &body),
            Ok(Frame::Command { id, .. }) => debug!(id, "ignoring command frame from device"),
            Err(e) => {
                self.syntax_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "protocol syntax error");
            }
        }
    }

    /// Mark the session dead. Only the first call has an effect.
    fn disconnect(&self, cause: fn() -> CommunicatorError) {
        if self.connected.send_replace(false) {
            self.fail_pending(cause);
            self.events.emit(Event::Disconnected);
        }
    }

    fn fail_pending(&self, cause: fn() -> CommunicatorError) {
        let failed = self.slots.lock().fail_all(cause);
        if failed > 0 {
            warn!(failed, "failed pending requests");
        }
    }
}

/// Removes the slot of a request however the wait ends.
struct SlotGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.shared.slots.lock().remove(self.id);
    }
}

struct Session {
    writer_tx: mpsc::Sender<WriteRequest>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Communicator for firmware speaking the framed sonic protocol.
pub struct SerialCommunicator {
    shared: Arc<Shared>,
    connection: tokio::sync::Mutex<Box<dyn Connection>>,
    session: Mutex<Option<Session>>,
    config: CommunicatorConfig,
}

impl SerialCommunicator {
    pub fn new(connection: Box<dyn Connection>, config: CommunicatorConfig, events: EventBus) -> Self {
        let (connected, _) = watch::channel(false);
        SerialCommunicator {
            shared: Arc::new(Shared {
                slots: Mutex::new(SlotTable::new(config.request_id_limit)),
                messages: MessageQueue::new("messages", config.message_queue_size),
                notifications: MessageQueue::new("notifications", config.notify_queue_size),
                sink: RwLock::new(Arc::new(TracingLogSink)),
                connected,
                events,
                syntax_errors: AtomicU64::new(0),
            }),
            connection: tokio::sync::Mutex::new(connection),
            session: Mutex::new(None),
            config,
        }
    }

    /// Get the number of frames that could not be parsed.
    pub fn syntax_errors(&self) -> u64 {
        self.shared.syntax_errors.load(Ordering::Relaxed)
    }

    /// Get the number of requests waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.shared.slots.lock().len()
    }

    /// Close the session and hand the connection back, e.g. to retry with
    /// another communicator.
    pub async fn into_connection(mut self) -> Box<dyn Connection> {
        self.close().await;
        std::mem::replace(self.connection.get_mut(), Box::new(DetachedConnection))
    }

    fn timeout_for(&self, options: &SendOptions) -> Duration {
        options
            .timeout
            .unwrap_or_else(|| self.config.default_timeout())
            .max(self.config.min_timeout())
    }

    fn writer_tx(&self) -> CommunicatorResult<mpsc::Sender<WriteRequest>> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.writer_tx.clone())
            .ok_or(CommunicatorError::NotConnected)
    }

    /// Open the connection and start the reader and writer.
    async fn start_session(&self, connection: &mut dyn Connection) -> CommunicatorResult<()> {
        let (reader, writer) = connection.open().await?;
        info!("sonic communicator connected to {}", connection.name());

        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_SIZE);
        let writer = tokio::spawn(writer_loop(writer, writer_rx));
        let reader = tokio::spawn(reader_loop(Arc::clone(&self.shared), reader));

        self.shared.connected.send_replace(true);
        *self.session.lock() = Some(Session {
            writer_tx,
            reader,
            writer,
        });
        Ok(())
    }

    /// Stop the reader and writer and wait until both released their halves.
    async fn stop_session(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            return;
        };
        session.reader.abort();
        session.writer.abort();
        for (name, task) in [("reader", session.reader), ("writer", session.writer)] {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("{} task ended abnormally: {}", name, e);
                }
            }
        }
    }

    fn abort_session(&self) {
        if let Some(session) = self.session.lock().take() {
            session.reader.abort();
            session.writer.abort();
        }
    }
}

#[async_trait]
impl Communicator for SerialCommunicator {
    fn kind(&self) -> CommunicatorKind {
        CommunicatorKind::Sonic
    }

    async fn open(&self) -> CommunicatorResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let mut connection = self.connection.lock().await;
        self.start_session(&mut **connection).await
    }

    async fn close(&self) {
        self.stop_session().await;
        let mut connection = self.connection.lock().await;
        if let Err(e) = connection.close().await {
            warn!("failed to close {}: {}", connection.name(), e);
        }
        self.shared.disconnect(|| CommunicatorError::Disconnected);
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
        let writer_tx = self.writer_tx()?;

        let (slot_tx, slot_rx) = oneshot::channel();
        let id = self.shared.slots.lock().mint(slot_tx)?;
        let _guard = SlotGuard {
            shared: &self.shared,
            id,
        };
        log_request(CommunicatorKind::Sonic, Some(id), request);

        let frame = Frame::Command {
            id,
            body: request.to_string(),
        };
        let (done_tx, done_rx) = oneshot::channel();
        writer_tx
            .send(WriteRequest {
                bytes: frame.encode(),
                done: done_tx,
            })
            .await
            .map_err(|_| CommunicatorError::Disconnected)?;
        done_rx
            .await
            .map_err(|_| CommunicatorError::Disconnected)?
            .map_err(|e| CommunicatorError::WriteFailed(e.to_string()))?;

        let timeout = self.timeout_for(options);
        match tokio::time::timeout(timeout, slot_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CommunicatorError::Disconnected),
            Err(_) => {
                warn!(id, request, ?timeout, "request timed out");
                Err(CommunicatorError::Timeout(timeout))
            }
        }
    }

    async fn read_message(&self, timeout: Duration) -> Option<String> {
        self.shared.messages.pop(timeout).await
    }

    async fn read_notification(&self, timeout: Duration) -> Option<String> {
        self.shared.notifications.pop(timeout).await
    }

    async fn change_baudrate(&self, baudrate: u32) -> CommunicatorResult<()> {
        let mut connection = self.connection.lock().await;
        if !connection.set_baudrate(baudrate) {
            return Err(CommunicatorError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} does not support baudrate {}", connection.name(), baudrate),
            )));
        }
        info!(baudrate, "restarting session");

        // The session stays up for subscribers; only requests in flight fail.
        self.stop_session().await;
        if let Err(e) = connection.close().await {
            warn!("failed to close {}: {}", connection.name(), e);
        }
        self.shared.fail_pending(|| CommunicatorError::Disconnected);
        if let Err(e) = self.start_session(&mut **connection).await {
            self.shared.disconnect(|| CommunicatorError::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    fn set_device_log_sink(&self, sink: Arc<dyn DeviceLogSink>) {
        *self.shared.sink.write() = sink;
    }
}

impl Drop for SerialCommunicator {
    fn drop(&mut self) {
        self.abort_session();
    }
}

async fn writer_loop(mut writer: BoxedWriter, mut requests: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = requests.recv().await {
        let result = async {
            writer.write_all(&request.bytes).await?;
            writer.flush().await
        }
        .await;
        let failed = result.is_err();
        let _ = request.done.send(result);
        if failed {
            break;
        }
    }
}

async fn reader_loop(shared: Arc<Shared>, mut reader: BoxedReader) {
    let mut codec = FrameCodec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let truncated = loop {
        match reader.read(&mut buf).await {
            Ok(0) => match codec.take_partial() {
                Some(partial) if !partial.trim().is_empty() => {
                    warn!(%partial, "stream ended inside a frame");
                    break true;
                }
                _ => {
                    info!("device closed the stream");
                    break false;
                }
            },
            Ok(n) => {
                codec.push(&buf[..n]);
                while let Some(text) = codec.decode() {
                    shared.dispatch(text);
                }
            }
            Err(e) => {
                warn!("read error: {}", e);
                break false;
            }
        }
    };

    if truncated {
        shared.disconnect(|| CommunicatorError::UnexpectedEof);
    } else {
        shared.disconnect(|| CommunicatorError::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StreamConnection;
    use sonic_protocol::DeviceLogLevel;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    fn connected_pair() -> (StreamConnection, DuplexStream) {
        let (host, device) = tokio::io::duplex(1024);
        let mut host = Some(host);
        let connection = StreamConnection::new("test", move || {
            let host = host
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "used"))?;
            let (reader, writer) = tokio::io::split(host);
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        });
        (connection, device)
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<(DeviceLogLevel, String)>>);

    impl DeviceLogSink for CollectingSink {
        fn log(&self, level: DeviceLogLevel, message: &str) {
            self.0.lock().push((level, message.to_string()));
        }
    }

    #[tokio::test]
    async fn test_send_and_wait() {
        let (connection, device) = connected_pair();
        let communicator = SerialCommunicator::new(Box::new(connection), CommunicatorConfig::default(), EventBus::default());
        communicator.open().await.unwrap();

        let device_task = tokio::spawn(async move {
            let mut device = BufReader::new(device);
            let mut request = Vec::new();
            device.read_until(b'\r', &mut request).await.unwrap();
            assert_eq!(request, b"COM#1=!f=1000\r");
            device.get_mut().write_all(b"ANS#1=1050#1000 Hz\r").await.unwrap();
            device
        });

        let answer = communicator.send_and_wait("!f=1000", &SendOptions::default()).await.unwrap();
        assert_eq!(answer, "1050#1000 Hz");
        assert_eq!(communicator.pending_requests(), 0);
        let _device = device_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_and_log_routing() {
        let (connection, mut device) = connected_pair();
        let communicator = SerialCommunicator::new(Box::new(connection), CommunicatorConfig::default(), EventBus::default());
        let sink = Arc::new(CollectingSink::default());
        communicator.set_device_log_sink(sink.clone());
        communicator.open().await.unwrap();

        device
            .write_all(b"NOTIFY=procedure done\rLOG=WARN:hot\rgarbage\r")
            .await
            .unwrap();

        let notification = communicator.read_notification(Duration::from_secs(2)).await;
        assert_eq!(notification.as_deref(), Some("procedure done"));
        assert_eq!(
            communicator.read_message(Duration::from_secs(2)).await.as_deref(),
            Some("NOTIFY=procedure done")
        );

        // Frames are handled in order, so the syntax error follows the log line.
        tokio::time::timeout(Duration::from_secs(2), async {
            while communicator.syntax_errors() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(sink.0.lock().clone(), vec![(DeviceLogLevel::Warn, "hot".to_string())]);
    }

    #[tokio::test]
    async fn test_timeout_removes_slot() {
        let (connection, _device) = connected_pair();
        let config = CommunicatorConfig {
            min_timeout_ms: 10,
            ..CommunicatorConfig::default()
        };
        let communicator = SerialCommunicator::new(Box::new(connection), config, EventBus::default());
        communicator.open().await.unwrap();

        let result = communicator
            .send_and_wait("?f", &SendOptions::with_timeout(Duration::from_millis(20)))
            .await;
        assert!(matches!(result, Err(CommunicatorError::Timeout(_))));
        assert_eq!(communicator.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending() {
        let (connection, device) = connected_pair();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let communicator = Arc::new(SerialCommunicator::new(
            Box::new(connection),
            CommunicatorConfig::default(),
            events,
        ));
        communicator.open().await.unwrap();

        let waiter = {
            let communicator = Arc::clone(&communicator);
            tokio::spawn(async move { communicator.send_and_wait("?f", &SendOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(device);

        assert!(matches!(waiter.await.unwrap(), Err(CommunicatorError::Disconnected)));
        assert!(!communicator.is_connected());
        assert_eq!(rx.recv().await.unwrap(), Event::Disconnected);

        communicator.close().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_eof_inside_frame_fails_pending() {
        let (connection, mut device) = connected_pair();
        let communicator = Arc::new(SerialCommunicator::new(
            Box::new(connection),
            CommunicatorConfig::default(),
            EventBus::default(),
        ));
        communicator.open().await.unwrap();

        let waiter = {
            let communicator = Arc::clone(&communicator);
            tokio::spawn(async move { communicator.send_and_wait("?f", &SendOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        device.write_all(b"ANS#1=20#1").await.unwrap();
        drop(device);

        assert!(matches!(waiter.await.unwrap(), Err(CommunicatorError::UnexpectedEof)));
        assert!(!communicator.is_connected());
    }

    /// Hands out one prepared stream per open and accepts any baudrate.
    struct ReopenableConnection {
        hosts: Vec<DuplexStream>,
        baudrate: Arc<AtomicU64>,
        closes: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Connection for ReopenableConnection {
        fn name(&self) -> String {
            "reopenable".to_string()
        }

        async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
            let host = self
                .hosts
                .pop()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no stream left"))?;
            let (reader, writer) = tokio::io::split(host);
            Ok((Box::new(reader), Box::new(writer)))
        }

        async fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_baudrate(&mut self, baudrate: u32) -> bool {
            self.baudrate.store(baudrate as u64, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn test_change_baudrate_keeps_session() {
        let (first_host, _first_device) = tokio::io::duplex(1024);
        let (second_host, second_device) = tokio::io::duplex(1024);
        let baudrate = Arc::new(AtomicU64::new(9600));
        let closes = Arc::new(AtomicU64::new(0));
        let connection = ReopenableConnection {
            hosts: vec![second_host, first_host],
            baudrate: Arc::clone(&baudrate),
            closes: Arc::clone(&closes),
        };
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let communicator = SerialCommunicator::new(Box::new(connection), CommunicatorConfig::default(), events);
        communicator.open().await.unwrap();

        communicator.change_baudrate(115_200).await.unwrap();
        assert!(communicator.is_connected());
        assert_eq!(baudrate.load(Ordering::SeqCst), 115_200);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());

        let device_task = tokio::spawn(async move {
            let mut device = BufReader::new(second_device);
            let mut request = Vec::new();
            device.read_until(b'\r', &mut request).await.unwrap();
            assert_eq!(request, b"COM#1=?f\r");
            device.get_mut().write_all(b"ANS#1=20000#20000\r").await.unwrap();
            device
        });
        let answer = communicator.send_and_wait("?f", &SendOptions::default()).await.unwrap();
        assert_eq!(answer, "20000#20000");
        let _device = device_task.await.unwrap();

        communicator.close().await;
        assert_eq!(rx.recv().await.unwrap(), Event::Disconnected);
    }

    #[tokio::test]
    async fn test_unsupported_baudrate_keeps_session() {
        let (connection, _device) = connected_pair();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let communicator = SerialCommunicator::new(Box::new(connection), CommunicatorConfig::default(), events);
        communicator.open().await.unwrap();

        assert!(matches!(
            communicator.change_baudrate(115_200).await,
            Err(CommunicatorError::Io(_))
        ));
        assert!(communicator.is_connected());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_after_hangup_closes_connection() {
        let (host, device) = tokio::io::duplex(1024);
        let closes = Arc::new(AtomicU64::new(0));
        let connection = ReopenableConnection {
            hosts: vec![host],
            baudrate: Arc::new(AtomicU64::new(9600)),
            closes: Arc::clone(&closes),
        };
        let communicator = SerialCommunicator::new(Box::new(connection), CommunicatorConfig::default(), EventBus::default());
        communicator.open().await.unwrap();
        let mut state = communicator.connection_state();
        drop(device);
        state.wait_for(|connected| !connected).await.unwrap();

        communicator.close().await;
        communicator.close().await;
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_send_before_open() {
        let (connection, _device) = connected_pair();
        let communicator = SerialCommunicator::new(Box::new(connection), CommunicatorConfig::default(), EventBus::default());
        assert!(matches!(
            communicator.send_and_wait("?f", &SendOptions::default()).await,
            Err(CommunicatorError::NotConnected)
        ));
    }
}
