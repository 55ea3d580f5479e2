//! # agent-core
//!
//! Shared types for the port agent: connection roles, the packet metadata that
//! travels with instrument bytes, and the reconnect policy used to keep the
//! upstream instrument connection alive.
//!
//! This crate has no dependencies on sockets or async runtimes.  Everything in
//! it is plain data plus the arithmetic of the backoff schedule, which keeps it
//! trivially testable.
//!
//! # Architecture overview
//!
//! A port agent owns one connection to an instrument and fans that stream out
//! to many TCP clients.  Every connection it touches has a fixed
//! [`ConnectionRole`]:
//!
//! ```text
//!   instrument (serial device behind a terminal server)
//!        │  InstrumentData / InstrumentCommand
//!   [port agent]
//!        │  ClientData / ClientCommand / ClientSniffer
//!   drivers, operators, loggers
//! ```
//!
//! - **`domain`** – roles, protocol variants, packet/endpoint types.
//! - **`reconnect`** – the [`ReconnectPolicy`] and its running [`Backoff`] state.
//! - **`error`** – construction-time configuration errors.

pub mod domain;
pub mod error;
pub mod reconnect;

pub use domain::packet::{ConnectionId, EndpointConfig, EndpointType, Packet, PacketType};
pub use domain::role::{ConnectionRole, EndpointKind, ProtocolVariant};
pub use error::RelayError;
pub use reconnect::backoff::{Backoff, ReconnectPolicy, GOLDEN_RATIO};
