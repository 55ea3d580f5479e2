//! TOML configuration for the port agent.
//!
//! Every field has a serde default, so an empty file, a partial file or no
//! file at all yields a working configuration.  Command-line flags are layered
//! on top in `main.rs`.
//!
//! ```toml
//! [agent]
//! kind = "digi"
//! log_level = "debug"
//!
//! [instrument]
//! host = "10.31.4.12"
//! data_port = 2101
//! command_port = 2102
//!
//! [listen]
//! bind_address = "0.0.0.0"
//! data_port = 4000
//! command_port = 4001
//! sniffer_port = 4002
//!
//! [reconnect]
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! factor = 1.618
//! ```

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use agent_core::reconnect::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use agent_core::{ReconnectPolicy, RelayError, GOLDEN_RATIO};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but makes no sense.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The reconnect section or a role assignment was rejected.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Which upstream arrangement the agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// One plain TCP connection to the instrument.
    #[default]
    Tcp,
    /// A Digi terminal server: a data port plus a command port.
    Digi,
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(AgentKind::Tcp),
            "digi" => Ok(AgentKind::Digi),
            other => Err(format!("unknown agent kind '{other}' (expected 'tcp' or 'digi')")),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Tcp => f.write_str("tcp"),
            AgentKind::Digi => f.write_str("digi"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub instrument: InstrumentSection,
    #[serde(default)]
    pub listen: ListenSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// General agent settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    #[serde(default)]
    pub kind: AgentKind,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the instrument lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSection {
    /// Hostname or IP address of the instrument or terminal server.
    #[serde(default = "default_instrument_host")]
    pub host: String,
    /// Raw data port.
    #[serde(default = "default_instrument_data_port")]
    pub data_port: u16,
    /// Terminal server command port.  Only used by `digi` agents.
    #[serde(default = "default_instrument_command_port")]
    pub command_port: u16,
}

/// Client-facing listeners.  A port of `0` asks the OS for an ephemeral port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_listen_data_port")]
    pub data_port: u16,
    #[serde(default = "default_listen_command_port")]
    pub command_port: u16,
    #[serde(default = "default_listen_sniffer_port")]
    pub sniffer_port: u16,
}

/// Upstream reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            kind: AgentKind::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for InstrumentSection {
    fn default() -> Self {
        Self {
            host: default_instrument_host(),
            data_port: default_instrument_data_port(),
            command_port: default_instrument_command_port(),
        }
    }
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            data_port: default_listen_data_port(),
            command_port: default_listen_command_port(),
            sniffer_port: default_listen_sniffer_port(),
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_instrument_host() -> String {
    "127.0.0.1".to_string()
}
fn default_instrument_data_port() -> u16 {
    2101
}
fn default_instrument_command_port() -> u16 {
    2102
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_data_port() -> u16 {
    4000
}
fn default_listen_command_port() -> u16 {
    4001
}
fn default_listen_sniffer_port() -> u16 {
    4002
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY.as_millis() as u64
}
fn default_factor() -> f64 {
    GOLDEN_RATIO
}

// ── Loading and validation ────────────────────────────────────────────────────

impl AgentConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or wrongly typed
    /// values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its contents are not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if a value cannot be represented.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Builds the validated reconnect policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Relay`] if the delays or factor are rejected.
    pub fn reconnect_policy(&self) -> Result<ReconnectPolicy, ConfigError> {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            factor: self.reconnect.factor,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// The listener bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `listen.bind_address` is not an IP
    /// address.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "listen.bind_address '{}' is not an IP address",
                self.listen.bind_address
            ))
        })
    }

    /// `host:port` string for one of the instrument ports.
    ///
    /// IPv6 literals are bracketed so the result can be resolved directly.
    pub fn instrument_address(&self, port: u16) -> String {
        let host = &self.instrument.host;
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        }
    }

    /// Checks everything that can be checked without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty host, a zero instrument
    /// port or duplicate listener ports, and [`ConfigError::Relay`] for a bad
    /// reconnect policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.host.trim().is_empty() {
            return Err(ConfigError::Invalid("instrument.host is empty".to_string()));
        }
        if self.instrument.data_port == 0 {
            return Err(ConfigError::Invalid("instrument.data_port must be non-zero".to_string()));
        }
        if self.agent.kind == AgentKind::Digi && self.instrument.command_port == 0 {
            return Err(ConfigError::Invalid(
                "instrument.command_port must be non-zero for digi agents".to_string(),
            ));
        }
        self.bind_ip()?;

        let ports = [
            ("data_port", self.listen.data_port),
            ("command_port", self.listen.command_port),
            ("sniffer_port", self.listen.sniffer_port),
        ];
        for (i, (name_a, a)) in ports.iter().enumerate() {
            for (name_b, b) in &ports[i + 1..] {
                if *a != 0 && a == b {
                    return Err(ConfigError::Invalid(format!(
                        "listen.{name_a} and listen.{name_b} are both {a}"
                    )));
                }
            }
        }

        self.reconnect_policy()?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
