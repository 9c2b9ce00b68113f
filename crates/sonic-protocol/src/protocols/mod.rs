//! The concrete protocol versions.

pub mod base;
pub mod fields;
pub mod legacy;
pub mod v1_0_0;
pub mod v2_0_0;
pub mod v2_1_0;

use crate::{ProtocolBuilder, ProtocolList};

pub use base::Base;
pub use legacy::Legacy;
pub use v1_0_0::V1_0_0;
pub use v2_0_0::V2_0_0;
pub use v2_1_0::V2_1_0;

/// All sonic protocol versions, oldest first.
pub fn protocol_list() -> ProtocolList {
    ProtocolList::new().then(Base).then(V1_0_0).then(V2_0_0).then(V2_1_0)
}

/// Builder over [`protocol_list`].
pub fn protocol_builder() -> ProtocolBuilder {
    ProtocolBuilder::new(protocol_list())
}

/// The legacy protocol as a single-level list.
pub fn legacy_protocol_list() -> ProtocolList {
    ProtocolList::new().then(Legacy)
}

/// Builder over [`legacy_protocol_list`].
pub fn legacy_protocol_builder() -> ProtocolBuilder {
    ProtocolBuilder::new(legacy_protocol_list())
}
