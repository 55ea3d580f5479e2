//! Infrastructure layer for port-agent.
//!
//! Everything that touches a socket, a timer or a task.
//!
//! # Responsibilities
//!
//! - Dialling the instrument and reconnecting with backoff
//! - Binding client listeners and accepting connections
//! - Driving each connection's read/write loop
//! - Propagating the shutdown signal, including cancelling a pending reconnect
//!
//! # What does NOT belong here?
//!
//! - What happens to a connection's bytes (application layer)
//! - Configuration parsing (domain layer + `main.rs`)

pub mod connector;
pub mod dialer;
pub mod driver;
pub mod listener;
pub mod server;
pub mod shutdown;

pub use connector::{ActiveConnection, InstrumentConnector};
pub use dialer::{Dialer, TcpDialer};
pub use driver::drive_connection;
pub use listener::{serve_listener, Acceptor, CommandRegistrar, ListenerBinder};
pub use server::{start_agent, RunningAgent};
pub use shutdown::{Shutdown, ShutdownSignal};
