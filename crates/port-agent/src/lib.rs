//! port-agent library crate.
//!
//! A port agent keeps a single connection to an instrument alive and exposes
//! that instrument to any number of TCP clients, each bound to one role.
//!
//! # Architecture
//!
//! ```text
//! instrument / terminal server
//!         ↕  (reconnecting, golden-ratio backoff)
//! [port-agent]
//!   ├── domain/           AgentConfig (TOML), Topology
//!   ├── application/      PortAgent seam, endpoint protocols, Router
//!   └── infrastructure/
//!         ├── connector/  Reconnecting upstream connector
//!         ├── listener/   Listener binder and command registrar
//!         ├── driver/     Per-connection read/write loop
//!         └── server/     Wires everything together
//!         ↕
//! drivers (data), operators (command), loggers (sniffer)
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O.
//! - `application` depends on `domain` and `agent-core`; it never opens a
//!   socket.
//! - `infrastructure` owns every socket, timer and spawned task.

/// Domain layer: configuration and topology.
pub mod domain;

/// Application layer: endpoint protocols and routing.
pub mod application;

/// Infrastructure layer: connectors, listeners and the connection driver.
pub mod infrastructure;
