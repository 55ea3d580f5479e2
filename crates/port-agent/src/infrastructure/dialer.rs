//! Outbound transport seam.
//!
//! The connector only needs "give me a byte stream to this address, or tell
//! me why not".  [`TcpDialer`] is the production answer; tests plug in
//! dialers that fail on a script or hand back in-memory streams.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens outbound byte streams.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Attempts one connection to `address` (`host:port`).
    async fn dial(&self, address: &str) -> io::Result<Self::Stream>;
}

/// Plain TCP dialer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(address).await?;
        // Instrument traffic is small and latency-sensitive.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
