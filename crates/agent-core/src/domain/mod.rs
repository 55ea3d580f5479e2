//! Domain entities shared by every port agent component.
//!
//! Nothing in here performs I/O.  The connection layer only ever *carries*
//! these values: packet and endpoint types are configuration owned by the
//! agent and forwarded untouched into each endpoint.

pub mod packet;
pub mod role;
