//! SonicAmp Protocol
//!
//! Declarative, versioned command/answer contracts for SonicAmp ultrasound
//! devices and the text framing they travel in.
//!
//! ## Overview
//!
//! - Contracts ([`CommandContract`]) bind a [`CommandCode`] to the request
//!   text and to the answer layout. Attributes that change between protocol
//!   versions or device types are [`Export`]s resolved per [`ProtocolInfo`].
//! - Protocol versions are deltas ([`ProtocolDelta`]) chained in a
//!   [`ProtocolList`]; the concrete chain lives in [`protocols`].
//! - [`ProtocolBuilder`] folds the chain for one device into a
//!   [`CommandLookupTable`] with a compiled [`AnswerValidator`] per answer.
//! - [`Frame`] and [`FrameCodec`] handle the `COM#`/`ANS#`/`NOTIFY=`/`LOG=`
//!   wire format.

#[macro_use]
mod macros;

mod builder;
mod codes;
mod commands;
mod consts;
mod contract;
mod enums;
mod error;
mod export;
mod field;
mod frame;
mod protocol;
mod validator;
mod version;

pub mod converter;
pub mod protocols;

pub use builder::*;
pub use codes::*;
pub use commands::*;
pub use consts::*;
pub use contract::*;
pub use enums::*;
pub use error::*;
pub use export::*;
pub use field::*;
pub use frame::*;
pub use protocol::*;
pub use validator::*;
pub use version::*;
