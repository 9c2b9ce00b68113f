//! Byte-stream transports to a device.
//!
//! A [`Connection`] produces a reader/writer pair on [`Connection::open`] and
//! tears it down on [`Connection::close`]. The communicators own the pair
//! for the lifetime of a session.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;

/// Environment variable naming the simulation executable.
pub const SIMULATION_EXE_ENV: &str = "SONIC_SIMULATION_EXE";

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A transport that can be opened into a byte stream.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Human readable name for logs.
    fn name(&self) -> String;

    /// Open the transport.
    async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)>;

    /// Close the transport.
    async fn close(&mut self) -> io::Result<()>;

    /// Use another baudrate from the next [`Connection::open`] on.
    ///
    /// Returns `false` if the transport has no notion of a baudrate.
    fn set_baudrate(&mut self, _baudrate: u32) -> bool {
        false
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Baudrates SonicAmp firmware talks at.
pub const SUPPORTED_BAUDRATES: [u32; 2] = [9600, 115_200];

/// A serial port.
#[derive(Debug, Clone)]
pub struct SerialConnection {
    port: String,
    baudrate: u32,
}

impl SerialConnection {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        SerialConnection {
            port: port.into(),
            baudrate,
        }
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }
}

#[async_trait]
impl Connection for SerialConnection {
    fn name(&self) -> String {
        format!("{}@{}", self.port, self.baudrate)
    }

    async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
        let stream = tokio_serial::new(&self.port, self.baudrate)
            .open_native_async()
            .map_err(io::Error::from)?;
        info!("opened serial port {}", self.name());
        let (reader, writer) = tokio::io::split(stream);
        Ok((Box::new(reader), Box::new(writer)))
    }

    async fn close(&mut self) -> io::Result<()> {
        // The port closes when the communicator drops its halves.
        debug!("closing serial port {}", self.name());
        Ok(())
    }

    fn set_baudrate(&mut self, baudrate: u32) -> bool {
        if !SUPPORTED_BAUDRATES.contains(&baudrate) {
            warn!(baudrate, "unsupported baudrate for {}", self.name());
            return false;
        }
        self.baudrate = baudrate;
        true
    }
}

// ============================================================================
// Child process
// ============================================================================

/// A child process whose stdin/stdout carry the protocol.
#[derive(Debug)]
pub struct ProcessConnection {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl ProcessConnection {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        ProcessConnection {
            program: program.into(),
            args,
            child: None,
        }
    }

    /// Create a connection to the executable named by `SONIC_SIMULATION_EXE`.
    pub fn from_env() -> Option<Self> {
        std::env::var(SIMULATION_EXE_ENV)
            .ok()
            .filter(|program| !program.trim().is_empty())
            .map(|program| ProcessConnection::new(program, Vec::new()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Connection for ProcessConnection {
    fn name(&self) -> String {
        self.program.clone()
    }

    async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child has no stdout"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child has no stdin"))?;
        info!("spawned {} (pid {:?})", self.program, child.id());
        self.child = Some(child);
        Ok((Box::new(stdout), Box::new(stdin)))
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("failed to terminate {}: {}", self.program, e);
                return Err(e);
            }
        }
        Ok(())
    }
}

// ============================================================================
// In-memory streams
// ============================================================================

type StreamFactory = Box<dyn FnMut() -> io::Result<(BoxedReader, BoxedWriter)> + Send + Sync>;

/// A connection over streams produced by a factory, one pair per open.
///
/// Used to attach in-process device simulations.
pub struct StreamConnection {
    name: String,
    factory: StreamFactory,
}

impl StreamConnection {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: FnMut() -> io::Result<(BoxedReader, BoxedWriter)> + Send + Sync + 'static,
    {
        StreamConnection {
            name: name.into(),
            factory: Box::new(factory),
        }
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Connection for StreamConnection {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
        (self.factory)()
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stand-in left behind when a communicator hands its connection back.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DetachedConnection;

#[async_trait]
impl Connection for DetachedConnection {
    fn name(&self) -> String {
        "detached".to_string()
    }

    async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "connection was handed over"))
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Create the connection described by a transport config.
pub fn connection_from_config(config: &TransportConfig) -> Box<dyn Connection> {
    match config {
        TransportConfig::Serial { port, baudrate } => Box::new(SerialConnection::new(port.clone(), *baudrate)),
        TransportConfig::Process { program, args } => Box::new(ProcessConnection::new(program.clone(), args.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_stream_connection_opens_fresh_pairs() {
        let mut opened = 0;
        let mut connection = StreamConnection::new("loopback", move || {
            opened += 1;
            let (a, b) = tokio::io::duplex(64);
            let _ = b;
            let (reader, writer) = tokio::io::split(a);
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        });
        assert!(connection.open().await.is_ok());
        assert!(connection.open().await.is_ok());
        assert_eq!(connection.name(), "loopback");
        assert!(!connection.set_baudrate(9600));
    }

    #[tokio::test]
    async fn test_stream_connection_carries_bytes() {
        let (host, device) = tokio::io::duplex(64);
        let mut pair = Some(host);
        let mut connection = StreamConnection::new("duplex", move || {
            let host = pair
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "already opened"))?;
            let (reader, writer) = tokio::io::split(host);
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        });

        let (mut reader, mut writer) = connection.open().await.unwrap();
        let (mut dev_reader, mut dev_writer) = tokio::io::split(device);

        writer.write_all(b"COM#1=-\r").await.unwrap();
        let mut buf = [0u8; 8];
        dev_reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"COM#1=-\r");

        dev_writer.write_all(b"ok").await.unwrap();
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");

        assert!(connection.open().await.is_err());
    }

    #[test]
    fn test_serial_baudrate_change() {
        let mut serial = SerialConnection::new("/dev/null", 9600);
        assert!(serial.set_baudrate(115_200));
        assert_eq!(serial.baudrate(), 115_200);
        assert_eq!(serial.name(), "/dev/null@115200");

        assert!(!serial.set_baudrate(57_600));
        assert!(!serial.set_baudrate(0));
        assert_eq!(serial.baudrate(), 115_200);
        assert!(serial.set_baudrate(9600));
        assert_eq!(serial.baudrate(), 9600);
    }

    #[test]
    fn test_connection_from_config() {
        let connection = connection_from_config(&TransportConfig::Process {
            program: "sim".to_string(),
            args: Vec::new(),
        });
        assert_eq!(connection.name(), "sim");
    }
}
