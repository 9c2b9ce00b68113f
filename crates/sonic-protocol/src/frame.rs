//! Wire framing of the sonic message protocol.
//!
//! Every frame is UTF-8 text terminated by a single carriage return:
//!
//! ```text
//! COM#<id>=<body>\r      host -> device command
//! ANS#<id>=<body>\r      device -> host answer to request <id>
//! NOTIFY=<body>\r        spontaneous device event
//! LOG=<LEVEL>:<body>\r   device log line, LEVEL in DEBUG|INFO|WARN|ERROR
//! ```
//!
//! Legacy firmware frames plain lines terminated by `\n`; the same
//! [`FrameCodec`] splits those when built with [`LEGACY_TERMINATOR`].

use std::fmt;

use bytes::{Buf, BytesMut};

use crate::{DeviceLogLevel, FrameError};

/// Terminator of sonic protocol frames.
pub const FRAME_TERMINATOR: u8 = b'\r';

/// Terminator of legacy lines.
pub const LEGACY_TERMINATOR: u8 = b'\n';

/// Maximum size of one frame; longer unterminated input is discarded.
pub const MAX_FRAME_SIZE: usize = 4096;

pub const COMMAND_PREFIX: &str = "COM";
pub const ANSWER_PREFIX: &str = "ANS";
pub const NOTIFY_PREFIX: &str = "NOTIFY";
pub const LOG_PREFIX: &str = "LOG";

/// Id of a request, unique among the outstanding requests of a session.
pub type RequestId = u32;

// ============================================================================
// Frames
// ============================================================================

/// A classified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command { id: RequestId, body: String },
    Answer { id: RequestId, body: String },
    Notify(String),
    Log { level: DeviceLogLevel, body: String },
}

impl Frame {
    /// Parse the text of one frame.
    ///
    /// Whitespace before the prefix and the trailing line break are ignored;
    /// the body is kept verbatim.
    pub fn parse(text: &str) -> Result<Frame, FrameError> {
        let text = text
            .trim_start_matches(|c: char| c.is_ascii_whitespace())
            .trim_end_matches(['\r', '\n']);

        if let Some(rest) = text.strip_prefix(ANSWER_PREFIX) {
            let (id, body) = parse_addressed(text, rest)?;
            return Ok(Frame::Answer { id, body });
        }
        if let Some(rest) = text.strip_prefix(COMMAND_PREFIX) {
            let (id, body) = parse_addressed(text, rest)?;
            return Ok(Frame::Command { id, body });
        }
        if let Some(rest) = text.strip_prefix(NOTIFY_PREFIX) {
            let body = rest
                .strip_prefix('=')
                .ok_or_else(|| FrameError::SyntaxError(text.to_string()))?;
            return Ok(Frame::Notify(body.to_string()));
        }
        if let Some(rest) = text.strip_prefix(LOG_PREFIX) {
            let payload = rest
                .strip_prefix('=')
                .ok_or_else(|| FrameError::SyntaxError(text.to_string()))?;
            let (level, body) = payload
                .split_once(':')
                .ok_or_else(|| FrameError::SyntaxError(text.to_string()))?;
            let level = DeviceLogLevel::parse(level).ok_or_else(|| FrameError::SyntaxError(text.to_string()))?;
            return Ok(Frame::Log {
                level,
                body: body.to_string(),
            });
        }

        Err(FrameError::UnknownPrefix(text.to_string()))
    }

    /// Encode the frame including its terminator.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.push(FRAME_TERMINATOR);
        bytes
    }

    /// Get the request id, if the frame carries one.
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Frame::Command { id, .. } | Frame::Answer { id, .. } => Some(*id),
            _ => None,
        }
    }
}

fn parse_addressed(text: &str, rest: &str) -> Result<(RequestId, String), FrameError> {
    let syntax = || FrameError::SyntaxError(text.to_string());
    let rest = rest.strip_prefix('#').ok_or_else(syntax)?;
    let (id, body) = rest.split_once('=').ok_or_else(syntax)?;
    let id = id.parse::<RequestId>().map_err(|_| syntax())?;
    Ok((id, body.to_string()))
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Command { id, body } => write!(f, "{}#{}={}", COMMAND_PREFIX, id, body),
            Frame::Answer { id, body } => write!(f, "{}#{}={}", ANSWER_PREFIX, id, body),
            Frame::Notify(body) => write!(f, "{}={}", NOTIFY_PREFIX, body),
            Frame::Log { level, body } => write!(f, "{}={}:{}", LOG_PREFIX, level, body),
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Splits a byte stream into terminator-delimited frames.
#[derive(Debug)]
pub struct FrameCodec {
    buffer: BytesMut,
    terminator: u8,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new()
    }
}

impl FrameCodec {
    /// Create a codec for sonic protocol frames.
    pub fn new() -> Self {
        FrameCodec::with_terminator(FRAME_TERMINATOR)
    }

    /// Create a codec splitting on an arbitrary terminator byte.
    pub fn with_terminator(terminator: u8) -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
            terminator,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one complete frame out of the buffer.
    ///
    /// Returns the frame text without its terminator, or `None` if more data
    /// is needed. Invalid UTF-8 is replaced, not rejected.
    pub fn decode(&mut self) -> Option<String> {
        match self.buffer.iter().position(|b| *b == self.terminator) {
            Some(end) => {
                let frame = self.buffer.split_to(end);
                self.buffer.advance(1);
                Some(String::from_utf8_lossy(&frame).into_owned())
            }
            None => {
                if self.buffer.len() > MAX_FRAME_SIZE {
                    log::warn!("discarding {} bytes without frame terminator", self.buffer.len());
                    self.buffer.clear();
                }
                None
            }
        }
    }

    /// Take whatever is buffered, terminated or not.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
