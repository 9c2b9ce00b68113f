//! Communicator behaviour against a hand-driven peer.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use sonic_control::communicator::{Communicator, LegacyCommunicator, SendOptions, SerialCommunicator};
use sonic_control::config::{CommunicatorConfig, LegacyConfig};
use sonic_control::transport::{BoxedReader, BoxedWriter};
use sonic_control::{CommunicatorError, EventBus, StreamConnection};
use sonic_protocol::{Frame, FrameCodec, LEGACY_TERMINATOR};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// A connection handing out one end of a duplex pipe, once.
fn pipe_connection() -> (StreamConnection, DuplexStream) {
    let (host, device) = tokio::io::duplex(4096);
    let mut host = Some(host);
    let connection = StreamConnection::new("pipe", move || {
        let host = host
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "pipe already opened"))?;
        let (reader, writer) = tokio::io::split(host);
        Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
    });
    (connection, device)
}

/// Device side of the pipe.
struct Peer {
    stream: DuplexStream,
    codec: FrameCodec,
}

impl Peer {
    fn new(stream: DuplexStream, codec: FrameCodec) -> Self {
        Peer { stream, codec }
    }

    async fn next(&mut self) -> String {
        let mut buf = [0u8; 256];
        loop {
            if let Some(text) = self.codec.decode() {
                return text;
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "host closed the pipe");
            self.codec.push(&buf[..n]);
        }
    }

    async fn next_command(&mut self) -> (u32, String) {
        match Frame::parse(&self.next().await).unwrap() {
            Frame::Command { id, body } => (id, body),
            other => panic!("expected a command frame, got {:?}", other),
        }
    }

    async fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
    }
}

async fn open_sonic() -> (Arc<SerialCommunicator>, Peer) {
    let (connection, device) = pipe_connection();
    let communicator = Arc::new(SerialCommunicator::new(
        Box::new(connection),
        CommunicatorConfig::default(),
        EventBus::default(),
    ));
    communicator.open().await.unwrap();
    (communicator, Peer::new(device, FrameCodec::new()))
}

fn options() -> SendOptions {
    SendOptions::with_timeout(Duration::from_secs(2))
}

// ============================================================================
// Sonic framing
// ============================================================================

#[tokio::test]
async fn test_out_of_order_answers_reach_their_callers() {
    let (communicator, mut peer) = open_sonic().await;

    let gain = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move { communicator.send_and_wait("?g", &options()).await })
    };
    assert_eq!(peer.next_command().await, (1, "?g".to_string()));

    let frequency = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move { communicator.send_and_wait("?f", &options()).await })
    };
    assert_eq!(peer.next_command().await, (2, "?f".to_string()));

    peer.send("ANS#7=20#nobody asked\r").await;
    peer.send("ANS#2=20#1000000\r").await;
    peer.send("ANS#1=30#100\r").await;

    assert_eq!(frequency.await.unwrap().unwrap(), "20#1000000");
    assert_eq!(gain.await.unwrap().unwrap(), "30#100");
    assert_eq!(communicator.pending_requests(), 0);
}

#[tokio::test]
async fn test_cancelled_request_releases_its_slot() {
    let (communicator, mut peer) = open_sonic().await;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        communicator.send_and_wait("?f", &options()),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(communicator.pending_requests(), 0);

    // The late answer is dropped and the session keeps working.
    let (late_id, _) = peer.next_command().await;
    peer.send(&format!("ANS#{}=20#1000000\r", late_id)).await;

    let next = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move { communicator.send_and_wait("?g", &options()).await })
    };
    let (id, body) = peer.next_command().await;
    assert_ne!(id, late_id);
    assert_eq!(body, "?g");
    peer.send(&format!("ANS#{}=30#50\r", id)).await;
    assert_eq!(next.await.unwrap().unwrap(), "30#50");
}

#[tokio::test]
async fn test_notifications_are_queued() {
    let (communicator, mut peer) = open_sonic().await;
    peer.send("NOTIFY=18000#overheated\r").await;
    assert_eq!(
        communicator.read_notification(Duration::from_secs(1)).await.as_deref(),
        Some("18000#overheated")
    );
    assert!(communicator.read_message(Duration::from_secs(1)).await.is_some());
}

#[tokio::test]
async fn test_peer_hangup_disconnects() {
    let (communicator, peer) = open_sonic().await;
    let mut state = communicator.connection_state();

    let pending = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move { communicator.send_and_wait("?f", &options()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(peer);

    assert!(matches!(pending.await.unwrap(), Err(CommunicatorError::Disconnected)));
    state.wait_for(|connected| !*connected).await.unwrap();
    assert!(!communicator.is_connected());
}

// ============================================================================
// Legacy framing
// ============================================================================

#[tokio::test]
async fn test_legacy_reply_follows_request() {
    let (connection, device) = pipe_connection();
    let config = LegacyConfig {
        drain_timeout_ms: 20,
        ..LegacyConfig::default()
    };
    let communicator = Arc::new(LegacyCommunicator::new(Box::new(connection), config, EventBus::default()));
    communicator.open().await.unwrap();
    let mut peer = Peer::new(device, FrameCodec::with_terminator(LEGACY_TERMINATOR));

    let reply = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move { communicator.send_and_wait("!f=1000", &SendOptions::default()).await })
    };
    assert_eq!(peer.next().await, "!f=1000");
    peer.send("freq=1000\n").await;
    assert_eq!(reply.await.unwrap().unwrap(), "freq=1000");

    let second = {
        let communicator = Arc::clone(&communicator);
        tokio::spawn(async move { communicator.send_and_wait("!g=50", &SendOptions::default()).await })
    };
    assert_eq!(peer.next().await, "!g=50");
    peer.send("gain=50\n").await;
    assert_eq!(second.await.unwrap().unwrap(), "gain=50");
}
