//! Per-connection read/write loop.
//!
//! Every connection, upstream or downstream, is driven by [`drive_connection`]:
//!
//! 1. `connection_made` on the endpoint.
//! 2. Two halves run side by side until either ends or shutdown fires:
//!    - the read half hands inbound bytes to `data_received` until EOF or
//!      an error,
//!    - the write half drains the outbound queue to the socket.
//! 3. `connection_lost` on the endpoint, exactly once.
//!
//! A peer that stops reading blocks only the write half.  Reads carry on,
//! and shutdown still cancels the pending write.
//!
//! Anything an endpoint queues in `connection_made` is already waiting when
//! the write half starts, so it is the first thing sent.

use agent_core::ConnectionId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::{Connection, EndpointProtocol};
use crate::infrastructure::shutdown::ShutdownSignal;

/// Size of each socket read.
const READ_BUFFER_SIZE: usize = 4096;

/// Drives one connection until it closes.
pub async fn drive_connection<S>(stream: S, connection: Connection, mut shutdown: ShutdownSignal)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let Connection {
        mut endpoint,
        mut outbound,
    } = connection;
    let id = endpoint.handle().id();
    let (mut reader, mut writer) = tokio::io::split(stream);

    endpoint.connection_made();

    tokio::select! {
        biased;

        _ = shutdown.wait() => debug!(connection = %id, "closing connection for shutdown"),
        _ = read_half(&mut reader, &mut endpoint) => {}
        _ = write_half(&mut writer, &mut outbound, id) => {}
    }

    if let Err(e) = writer.shutdown().await {
        debug!(connection = %id, "socket shutdown failed: {e}");
    }
    // Drop the queue first so the handle reports closed before the agent hears about it.
    drop(outbound);
    endpoint.connection_lost();
}

async fn read_half<S: AsyncRead>(reader: &mut ReadHalf<S>, endpoint: &mut Box<dyn EndpointProtocol>) {
    let id = endpoint.handle().id();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(connection = %id, "peer closed connection (EOF)");
                return;
            }
            Ok(n) => endpoint.data_received(&buf[..n]),
            Err(e) => {
                warn!(connection = %id, "read failed: {e}");
                return;
            }
        }
    }
}

async fn write_half<S: AsyncWrite>(
    writer: &mut WriteHalf<S>,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    id: ConnectionId,
) {
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            warn!(connection = %id, "write failed: {e}");
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
