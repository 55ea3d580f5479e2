//! Reconnect policy for the upstream instrument connection.

pub mod backoff;
