//! End-to-end tests over real loopback sockets.
//!
//! Each test stands up fake instrument endpoints (plain `TcpListener`s), starts
//! an agent pointed at them with every client listener on an ephemeral port,
//! then talks to the agent the way drivers, operators and loggers would.
//!
//! ```text
//! fake instrument ◄──── connector ──── [agent] ◄──── listeners ◄──── test clients
//! ```
//!
//! Readiness is established by polling the router's snapshot rather than by
//! sleeping, so the tests do not depend on scheduling luck.

use std::sync::Arc;
use std::time::Duration;

use agent_core::{ConnectionRole, EndpointType};
use port_agent::application::{Router, RouterSnapshot, BINARY_TIMESTAMP_COMMAND};
use port_agent::domain::{AgentConfig, AgentKind};
use port_agent::infrastructure::{start_agent, RunningAgent, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn loopback_config(kind: AgentKind, data_port: u16, command_port: u16) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.agent.kind = kind;
    config.instrument.host = "127.0.0.1".to_string();
    config.instrument.data_port = data_port;
    config.instrument.command_port = command_port;
    config.listen.bind_address = "127.0.0.1".to_string();
    config.listen.data_port = 0;
    config.listen.command_port = 0;
    config.listen.sniffer_port = 0;
    config.reconnect.base_delay_ms = 50;
    config.reconnect.max_delay_ms = 400;
    config
}

async fn fake_instrument() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = timeout(STEP_TIMEOUT, listener.accept())
        .await
        .expect("agent never connected")
        .unwrap();
    stream
}

async fn connect_client(agent: &RunningAgent, role: ConnectionRole) -> TcpStream {
    let addr = agent.local_addrs[&role];
    TcpStream::connect(addr).await.unwrap()
}

async fn wait_for(router: &Router, what: &str, ready: impl Fn(&RouterSnapshot) -> bool) {
    let deadline = Instant::now() + STEP_TIMEOUT;
    loop {
        let snapshot = router.snapshot();
        if ready(&snapshot) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}: {snapshot:?}");
        sleep(Duration::from_millis(10)).await;
    }
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(STEP_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("no data arrived")
        .unwrap();
    buf
}

// ── tcp agent ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tcp_agent_fans_instrument_data_out_and_client_data_in() {
    // Arrange
    let (instrument_listener, port) = fake_instrument().await;
    let router = Arc::new(Router::new());
    let shutdown = Shutdown::new();
    let agent = start_agent(&loopback_config(AgentKind::Tcp, port, 0), router.clone(), &shutdown)
        .await
        .unwrap();
    let mut instrument = accept(&instrument_listener).await;
    let mut driver = connect_client(&agent, ConnectionRole::ClientData).await;
    let mut sniffer = connect_client(&agent, ConnectionRole::ClientSniffer).await;
    wait_for(&router, "instrument, driver and sniffer", |s| {
        s.count(EndpointType::Instrument) == 1
            && s.count(EndpointType::Client) == 1
            && s.count(EndpointType::Logger) == 1
    })
    .await;

    // Act + Assert: instrument → driver and sniffer
    instrument.write_all(b"#01,23.57,1013.2\r\n").await.unwrap();
    assert_eq!(read_exactly(&mut driver, 18).await, b"#01,23.57,1013.2\r\n");
    assert_eq!(read_exactly(&mut sniffer, 18).await, b"#01,23.57,1013.2\r\n");

    // Act + Assert: driver → instrument and sniffer
    driver.write_all(b"ts\r\n").await.unwrap();
    assert_eq!(read_exactly(&mut instrument, 4).await, b"ts\r\n");
    assert_eq!(read_exactly(&mut sniffer, 4).await, b"ts\r\n");

    shutdown.trigger();
    agent.join().await;
}

#[tokio::test]
async fn test_sniffer_input_never_reaches_instrument() {
    // Arrange
    let (instrument_listener, port) = fake_instrument().await;
    let router = Arc::new(Router::new());
    let shutdown = Shutdown::new();
    let agent = start_agent(&loopback_config(AgentKind::Tcp, port, 0), router.clone(), &shutdown)
        .await
        .unwrap();
    let mut instrument = accept(&instrument_listener).await;
    let mut sniffer = connect_client(&agent, ConnectionRole::ClientSniffer).await;
    let mut driver = connect_client(&agent, ConnectionRole::ClientData).await;
    wait_for(&router, "sniffer and driver", |s| {
        s.count(EndpointType::Logger) == 1 && s.count(EndpointType::Client) == 1
    })
    .await;

    // Act: the sniffer talks first, then the driver
    sniffer.write_all(b"ignored").await.unwrap();
    driver.write_all(b"ok").await.unwrap();

    // Assert: only the driver's bytes arrive
    assert_eq!(read_exactly(&mut instrument, 2).await, b"ok");

    shutdown.trigger();
    agent.join().await;
}

#[tokio::test]
async fn test_agent_reconnects_after_instrument_drops() {
    // Arrange
    let (instrument_listener, port) = fake_instrument().await;
    let router = Arc::new(Router::new());
    let shutdown = Shutdown::new();
    let agent = start_agent(&loopback_config(AgentKind::Tcp, port, 0), router.clone(), &shutdown)
        .await
        .unwrap();
    let first = accept(&instrument_listener).await;
    wait_for(&router, "first instrument connection", |s| {
        s.count(EndpointType::Instrument) == 1
    })
    .await;

    // Act: the instrument is power-cycled
    drop(first);

    // Assert: the agent dials again and data flows on the new connection
    let mut second = accept(&instrument_listener).await;
    wait_for(&router, "second instrument connection", |s| {
        s.count(EndpointType::Instrument) == 1
    })
    .await;
    let mut driver = connect_client(&agent, ConnectionRole::ClientData).await;
    wait_for(&router, "driver", |s| s.count(EndpointType::Client) == 1).await;
    second.write_all(b"back").await.unwrap();
    assert_eq!(read_exactly(&mut driver, 4).await, b"back");

    shutdown.trigger();
    agent.join().await;
}

#[tokio::test]
async fn test_clients_can_connect_while_instrument_is_down() {
    // Arrange: an instrument port with nothing listening
    let (listener, port) = fake_instrument().await;
    drop(listener);
    let router = Arc::new(Router::new());
    let shutdown = Shutdown::new();
    let agent = start_agent(&loopback_config(AgentKind::Tcp, port, 0), router.clone(), &shutdown)
        .await
        .unwrap();

    // Act
    let _driver = connect_client(&agent, ConnectionRole::ClientData).await;

    // Assert
    wait_for(&router, "driver", |s| s.count(EndpointType::Client) == 1).await;
    assert_eq!(router.snapshot().count(EndpointType::Instrument), 0);

    shutdown.trigger();
    timeout(STEP_TIMEOUT, agent.join())
        .await
        .expect("shutdown must cancel the pending reconnect");
}

// ── digi agent ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_digi_agent_enables_timestamps_and_relays_commands() {
    // Arrange
    let (data_listener, data_port) = fake_instrument().await;
    let (command_listener, command_port) = fake_instrument().await;
    let router = Arc::new(Router::new());
    let shutdown = Shutdown::new();
    let agent = start_agent(
        &loopback_config(AgentKind::Digi, data_port, command_port),
        router.clone(),
        &shutdown,
    )
    .await
    .unwrap();
    let _data = accept(&data_listener).await;
    let mut digi = accept(&command_listener).await;

    // Assert: the first thing on the command port is the timestamp request
    assert_eq!(
        read_exactly(&mut digi, BINARY_TIMESTAMP_COMMAND.len()).await,
        BINARY_TIMESTAMP_COMMAND
    );

    // Arrange: an operator connects to the command port
    let mut operator = connect_client(&agent, ConnectionRole::ClientCommand).await;
    wait_for(&router, "registered operator and digi", |s| {
        s.commands == 1 && s.count(EndpointType::Digi) == 1
    })
    .await;

    // Act + Assert: operator command → digi, digi response → operator
    operator.write_all(b"break 500\n").await.unwrap();
    assert_eq!(read_exactly(&mut digi, 10).await, b"break 500\n");

    digi.write_all(b"OK\r\n").await.unwrap();
    assert_eq!(read_exactly(&mut operator, 4).await, b"OK\r\n");

    shutdown.trigger();
    agent.join().await;
}

#[tokio::test]
async fn test_command_connection_leaves_registry_on_close() {
    let (_listener, port) = fake_instrument().await;
    let router = Arc::new(Router::new());
    let shutdown = Shutdown::new();
    let agent = start_agent(&loopback_config(AgentKind::Tcp, port, 0), router.clone(), &shutdown)
        .await
        .unwrap();

    let operator = connect_client(&agent, ConnectionRole::ClientCommand).await;
    wait_for(&router, "registered operator", |s| s.commands == 1).await;
    drop(operator);

    wait_for(&router, "empty registry", |s| s.commands == 0).await;

    shutdown.trigger();
    agent.join().await;
}
