//! In-memory simulated SonicAmp for integration tests.
//!
//! The simulation speaks either the framed sonic protocol or the legacy line
//! protocol over a `tokio::io::duplex` pipe and records every request it
//! receives.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_control::config::{CommunicatorConfig, LegacyConfig, ProtocolSelection, SessionConfig};
use sonic_control::transport::{BoxedReader, BoxedWriter};
use sonic_control::{Connection, Device, DeviceBuilder, StreamConnection};
use sonic_protocol::protocols::{protocol_builder, v1_0_0};
use sonic_protocol::{CommandLookupTable, DeviceType, Frame, FrameCodec, LEGACY_TERMINATOR};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Notify;

/// Wire protocol of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMode {
    Sonic,
    Legacy,
}

/// Mutable device state.
#[derive(Debug)]
pub struct SimState {
    pub requests: Vec<String>,
    pub frequency: u32,
    pub gain: u32,
    pub signal: bool,
    pub procedure: String,
    /// Status updates left before a started procedure ends.
    pub procedure_updates: u32,
    /// Status updates a started procedure lasts.
    pub procedure_length: u32,
    /// Ignore every request.
    pub silent: bool,
}

impl Default for SimState {
    fn default() -> Self {
        SimState {
            requests: Vec::new(),
            frequency: 1_000_000,
            gain: 100,
            signal: false,
            procedure: "none".to_string(),
            procedure_updates: 0,
            procedure_length: 2,
            silent: false,
        }
    }
}

/// A simulated device. Clones share state.
#[derive(Clone)]
pub struct SimDevice {
    pub mode: SimMode,
    pub device_type: DeviceType,
    pub protocol: String,
    pub release: bool,
    pub state: Arc<Mutex<SimState>>,
    table: Arc<CommandLookupTable>,
    hangup: Arc<Notify>,
}

impl SimDevice {
    pub fn sonic(device_type: DeviceType) -> Self {
        let table = protocol_builder()
            .build(device_type, v1_0_0::VERSION, true)
            .expect("simulated device type is supported");
        SimDevice {
            mode: SimMode::Sonic,
            device_type,
            protocol: "v1.0.0".to_string(),
            release: true,
            state: Arc::new(Mutex::new(SimState::default())),
            table: Arc::new(table),
            hangup: Arc::new(Notify::new()),
        }
    }

    pub fn worker() -> Self {
        SimDevice::sonic(DeviceType::MvpWorker)
    }

    pub fn legacy() -> Self {
        let mut sim = SimDevice::sonic(DeviceType::MvpWorker);
        sim.mode = SimMode::Legacy;
        sim
    }

    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Close the device side of the current stream.
    pub fn hang_up(&self) {
        self.hangup.notify_one();
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    /// Forget the recorded requests.
    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// A connection that starts a fresh simulation task per open.
    pub fn connection(&self) -> StreamConnection {
        let sim = self.clone();
        StreamConnection::new("simulation", move || {
            let (host, device) = tokio::io::duplex(4096);
            tokio::spawn(sim.clone().serve(device));
            let (reader, writer) = tokio::io::split(host);
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        })
    }

    async fn serve(self, mut stream: DuplexStream) {
        let mut codec = match self.mode {
            SimMode::Sonic => FrameCodec::new(),
            SimMode::Legacy => FrameCodec::with_terminator(LEGACY_TERMINATOR),
        };
        if self.mode == SimMode::Legacy && stream.write_all(b"SonicAmp legacy firmware\n").await.is_err() {
            return;
        }

        let mut buf = [0u8; 512];
        loop {
            let n = tokio::select! {
                _ = self.hangup.notified() => return,
                read = stream.read(&mut buf) => match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                },
            };
            codec.push(&buf[..n]);
            while let Some(text) = codec.decode() {
                let reply = match self.mode {
                    SimMode::Sonic => self.handle_frame(&text),
                    SimMode::Legacy => self.handle_line(&text),
                };
                if let Some(reply) = reply {
                    if stream.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) -> Option<String> {
        let Ok(Frame::Command { id, body }) = Frame::parse(text) else {
            return None;
        };
        let answer = self.respond(&body)?;
        Some(String::from_utf8_lossy(&Frame::Answer { id, body: answer }.encode()).into_owned())
    }

    fn handle_line(&self, text: &str) -> Option<String> {
        // Sonic frames are noise to legacy firmware.
        let text = text.trim_matches(|c| c == '\r' || c == '\n');
        if text.is_empty() || text.contains("COM#") {
            return None;
        }
        let mut state = self.state.lock();
        state.requests.push(text.to_string());
        if state.silent {
            return None;
        }
        let reply = match text {
            "?info" => "Type: mvp_worker\nHW: 1\nFW: 0.9\nBuild: legacy".to_string(),
            "-" => format!(
                "0#{}#{}#{}#{}#23.5#10#20#30",
                state.frequency,
                state.gain,
                state.procedure,
                u8::from(state.signal)
            ),
            "!ON" => {
                state.signal = true;
                "signal on".to_string()
            }
            "!OFF" => {
                state.signal = false;
                "signal off".to_string()
            }
            other => match other.split_once('=') {
                Some(("!f", value)) => {
                    state.frequency = value.parse().unwrap_or(state.frequency);
                    format!("freq={}", state.frequency)
                }
                Some(("!g", value)) => {
                    state.gain = value.parse().unwrap_or(state.gain);
                    format!("gain={}", state.gain)
                }
                _ => "unknown command".to_string(),
            },
        };
        Some(format!("{}\n", reply))
    }

    /// Answer body, including the `<code>#` prefix, for a sonic request.
    fn respond(&self, request: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.requests.push(request.to_string());
        if state.silent {
            return None;
        }

        let (identifier, value) = match request.split_once('=') {
            Some((identifier, value)) => (identifier, Some(value)),
            None => (request, None),
        };
        let flavor = if self.release { "release" } else { "debug" };
        let signal = |on: bool| if on { "on" } else { "off" };

        let reply = match identifier {
            "?protocol" => format!("0#{}#{}#{}#", self.device_type, self.protocol, flavor),
            "?info" => format!("1#{}#1.0.0#1.2.0#abc123#2024-01-01", self.device_type),
            "-" => {
                if state.procedure != "none" {
                    if state.procedure_updates == 0 {
                        state.procedure = "none".to_string();
                    } else {
                        state.procedure_updates -= 1;
                    }
                }
                format!(
                    "3#0#{}#{}#{}#300000#1#2#3#{}#0",
                    state.frequency,
                    state.gain,
                    state.procedure,
                    signal(state.signal)
                )
            }
            "?f" => format!("20#{}", state.frequency),
            "!f" => {
                state.frequency = value.and_then(|v| v.parse().ok()).unwrap_or(state.frequency);
                format!("1020#{}", state.frequency)
            }
            "?g" => format!("30#{}", state.gain),
            "!g" => {
                state.gain = value.and_then(|v| v.parse().ok()).unwrap_or(state.gain);
                format!("1030#{}", state.gain)
            }
            "!ON" => {
                state.signal = true;
                "1041#on".to_string()
            }
            "!OFF" => {
                state.signal = false;
                "1040#off".to_string()
            }
            "!stop" => {
                state.procedure = "none".to_string();
                state.signal = false;
                "3000#none".to_string()
            }
            "!ramp" | "!scan" | "!tune" | "!wipe" | "!auto" => {
                state.procedure = identifier.trim_start_matches('!').to_string();
                state.procedure_updates = state.procedure_length;
                state.signal = true;
                let code = self.table.find_by_identifier(identifier).map_or(0, |code| code.value());
                format!("{}#{}", code, state.procedure)
            }
            _ => match (self.table.find_by_identifier(identifier), value) {
                (Some(code), Some(value)) => format!("{}#{}", code.value(), value),
                _ => "20001#unknown command".to_string(),
            },
        };
        Some(reply)
    }
}

/// Wraps a connection and counts how often it is closed.
pub struct CountingConnection {
    inner: Box<dyn Connection>,
    pub closes: Arc<AtomicUsize>,
}

impl CountingConnection {
    pub fn new(inner: impl Connection + 'static) -> Self {
        CountingConnection {
            inner: Box::new(inner),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn close_count(closes: &AtomicUsize) -> usize {
        closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for CountingConnection {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn open(&mut self) -> io::Result<(BoxedReader, BoxedWriter)> {
        self.inner.open().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }

    fn set_baudrate(&mut self, baudrate: u32) -> bool {
        self.inner.set_baudrate(baudrate)
    }
}

/// Session config with short timeouts for tests.
pub fn test_config(protocol: ProtocolSelection) -> SessionConfig {
    SessionConfig {
        protocol,
        communicator: CommunicatorConfig {
            default_timeout_ms: 300,
            min_timeout_ms: 50,
            ..CommunicatorConfig::default()
        },
        legacy: LegacyConfig {
            default_timeout_ms: 200,
            drain_timeout_ms: 50,
            ..LegacyConfig::default()
        },
        ..SessionConfig::default()
    }
}

/// Connect to a simulation and forget the discovery requests.
pub async fn connect(sim: &SimDevice, protocol: ProtocolSelection) -> Arc<Device> {
    let device = DeviceBuilder::new(test_config(protocol))
        .build(Box::new(sim.connection()))
        .await
        .expect("simulated device connects");
    sim.clear_requests();
    Arc::new(device)
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
