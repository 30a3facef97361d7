use crate::error::{BlockchainError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

static DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2001;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;

const NODE_HOST_KEY: &str = "NODE_HOST";
const NODE_PORT_KEY: &str = "NODE_PORT";

/// Node settings
///
/// Sources, later wins: defaults, an optional TOML file, the `NODE_HOST` /
/// `NODE_PORT` environment variables, then command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface both listeners bind to
    pub host: String,
    /// Peer protocol port; the control protocol listens on `port + 1`
    pub port: u16,
    /// Dial timeout for ADD_PEER connections
    pub connect_timeout_ms: u64,
    /// How long a write to a peer or control client may block before the
    /// connection is dropped
    pub write_timeout_ms: u64,
    /// Ask every new peer for its latest block right after connecting
    pub sync_on_connect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            sync_on_connect: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults or the given file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `NODE_HOST` / `NODE_PORT` style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(NODE_HOST_KEY) {
            self.host = host;
        }
        if let Some(port) = lookup(NODE_PORT_KEY) {
            self.port = port.parse().map_err(|e| {
                BlockchainError::Config(format!("Invalid {NODE_PORT_KEY} {port}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn control_port(&self) -> Result<u16> {
        self.port.checked_add(1).ok_or_else(|| {
            BlockchainError::Config(format!(
                "Port {} leaves no room for the control port",
                self.port
            ))
        })
    }

    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn control_addr(&self) -> Result<String> {
        Ok(format!("{}:{}", self.host, self.control_port()?))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Socket write timeout, at least 1 ms
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}
