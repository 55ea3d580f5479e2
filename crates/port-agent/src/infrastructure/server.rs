//! Agent assembly: builds every connector and binder, binds the listeners,
//! and spawns one task per connector and listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use agent_core::ConnectionRole;
use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::{PortAgent, Router};
use crate::domain::{AgentConfig, Topology};
use crate::infrastructure::connector::InstrumentConnector;
use crate::infrastructure::listener::{serve_listener, CommandRegistrar, ListenerBinder};
use crate::infrastructure::shutdown::Shutdown;

/// A started agent.
#[derive(Debug)]
pub struct RunningAgent {
    /// Where each client role is actually listening.  Useful when the
    /// configuration asked for port 0.
    pub local_addrs: HashMap<ConnectionRole, SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningAgent {
    /// Waits for every connector and listener task to finish.  A listener
    /// task finishes only after all of its clients have closed.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("agent task failed: {e}");
            }
        }
    }
}

/// Starts an agent for `config`, routing through `router`.
///
/// Every connector and binder is constructed before anything is bound, so a
/// misconfigured role fails here with no socket opened.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a role is misconfigured
/// or a listener cannot be bound.
pub async fn start_agent(
    config: &AgentConfig,
    router: Arc<Router>,
    shutdown: &Shutdown,
) -> anyhow::Result<RunningAgent> {
    let topology = Topology::from_config(config).context("invalid configuration")?;
    let agent: Arc<dyn PortAgent> = router;

    let mut connectors = Vec::with_capacity(topology.upstream.len());
    for spec in &topology.upstream {
        let connector = InstrumentConnector::new(spec, Arc::clone(&agent))
            .with_context(|| format!("cannot build connector for {}", spec.address))?;
        connectors.push(connector);
    }

    enum Binder {
        Plain(Arc<ListenerBinder>),
        Command(Arc<CommandRegistrar>),
    }

    let mut binders = Vec::with_capacity(topology.listeners.len());
    for spec in &topology.listeners {
        let binder = match spec.role {
            ConnectionRole::ClientCommand => {
                Binder::Command(Arc::new(CommandRegistrar::new(spec.endpoint, Arc::clone(&agent))))
            }
            role => Binder::Plain(Arc::new(
                ListenerBinder::new(role, spec.endpoint, Arc::clone(&agent))
                    .with_context(|| format!("cannot build {role} listener"))?,
            )),
        };
        binders.push((spec, binder));
    }

    let mut bound = Vec::with_capacity(binders.len());
    let mut local_addrs = HashMap::new();
    for (spec, binder) in binders {
        let listener = TcpListener::bind(spec.bind)
            .await
            .with_context(|| format!("failed to bind {} listener on {}", spec.role, spec.bind))?;
        let local = listener.local_addr().context("listener has no local address")?;
        local_addrs.insert(spec.role, local);
        bound.push((listener, binder));
    }

    let mut tasks = Vec::new();
    for (listener, binder) in bound {
        let signal = shutdown.signal();
        tasks.push(match binder {
            Binder::Plain(b) => tokio::spawn(serve_listener(b, listener, signal)),
            Binder::Command(b) => tokio::spawn(serve_listener(b, listener, signal)),
        });
    }
    for mut connector in connectors {
        let signal = shutdown.signal();
        tasks.push(tokio::spawn(async move { connector.run(signal).await }));
    }

    info!(
        kind = %config.agent.kind,
        listeners = ?local_addrs,
        "port agent started"
    );

    Ok(RunningAgent { local_addrs, tasks })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
