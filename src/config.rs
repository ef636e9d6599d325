//! # Configuration Management
//!
//! Node identity, listener and logging settings for a P2P node.
//!
//! ## Configuration Sources
//! - TOML files via [`NetworkConfig::from_file`] or [`NetworkConfig::load`]
//! - Environment overrides via [`NetworkConfig::apply_env`]
//! - Direct instantiation with defaults
//!
//! Every field is optional; omitted fields keep their defaults.
//!
//! ```toml
//! [node]
//! private_key = "E9873D79C6D87DC0FB6A5778633389F4453213303DA61F20BD67FC233AA33262"
//! chain_height = 233
//! chain_version = 1
//!
//! [[node.seeds]]
//! public_key = "02C6047F9441ED7D6D3045406E95C07CD85C778E4B8CEF3CA7ABAC09B95C709EE5"
//! address = ["10.0.0.2:9000"]
//!
//! [server]
//! address = "0.0.0.0:9000"
//! auth_timeout = 10000
//! ```

use crate::error::{ProtocolError, Result};
use crate::utils::crypto;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default bound of the dispatch work queue
pub const DISPATCH_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Identity and chain state announced to peers
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load `path`, falling back to the built-in defaults when the file does
    /// not exist or is empty.
    ///
    /// Returns the raw I/O error for any other access failure so callers can
    /// tell "cannot open" from "cannot parse".
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, LoadError> {
        let contents = match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(LoadError::Access(e)),
            Err(e) => return Err(LoadError::Read(e)),
        };

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_toml(&contents).map_err(LoadError::Parse)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Override fields from `P2P_*` environment variables. Unparsable values
    /// are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("P2P_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Ok(key) = std::env::var("P2P_PRIVATE_KEY") {
            self.node.private_key = key;
        }

        if let Ok(timeout) = std::env::var("P2P_AUTH_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.server.auth_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(interval) = std::env::var("P2P_TICK_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                self.server.tick_interval = Duration::from_millis(val);
            }
        }

        if let Ok(multicore) = std::env::var("P2P_MULTICORE") {
            if let Ok(val) = multicore.parse::<bool>() {
                self.server.multicore = val;
            }
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.node.validate());
        errors.extend(self.server.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Why [`NetworkConfig::load`] failed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cannot access config file: {0}")]
    Access(std::io::Error),

    #[error("Cannot read config file: {0}")]
    Read(std::io::Error),

    #[error("{0}")]
    Parse(ProtocolError),
}

/// Local node identity and chain state
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Hex-encoded 32-byte secp256k1 private key
    pub private_key: String,

    pub chain_height: u64,

    pub chain_version: u64,

    pub validator: bool,

    pub indexer: bool,

    /// Peers dialed at boot
    pub seeds: Vec<SeedConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            chain_height: 0,
            chain_version: 0,
            validator: false,
            indexer: false,
            seeds: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.private_key.is_empty() {
            errors.push("Node private key is missing".to_string());
        } else if let Err(e) = crypto::parse_secret_key(&self.private_key) {
            errors.push(format!("Node private key is corrupt: {e}"));
        }

        for seed in &self.seeds {
            errors.extend(seed.validate());
        }

        errors
    }
}

/// A known peer: its public key and the addresses it listens on
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SeedConfig {
    /// Hex-encoded 33-byte compressed public key
    pub public_key: String,

    #[serde(default)]
    pub address: Vec<String>,
}

impl SeedConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = crypto::parse_public_key(&self.public_key) {
            errors.push(format!("Invalid seed public key '{}': {e}", self.public_key));
        }

        if self.address.is_empty() {
            errors.push(format!("Seed '{}' has no address", self.public_key));
        }
        for addr in &self.address {
            if addr.parse::<SocketAddr>().is_err() {
                errors.push(format!(
                    "Invalid seed address format: '{addr}' (expected format: '10.0.0.2:9000')"
                ));
            }
        }

        errors
    }
}

/// Listener and connection-handling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:9000"); the advertised port is taken from it
    pub address: String,

    /// Run the event loops on a multi-threaded runtime
    pub multicore: bool,

    /// Runtime worker threads when `multicore` is set; 0 means one per core
    pub worker_threads: usize,

    /// Number of dispatch workers
    pub dispatch_workers: usize,

    /// Capacity of the bounded dispatch queue
    pub dispatch_queue: usize,

    /// How long a peer may stay unauthenticated
    #[serde(with = "duration_serde")]
    pub auth_timeout: Duration,

    /// Interval between peer maintenance sweeps
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0:9000"),
            multicore: true,
            worker_threads: 0,
            dispatch_workers: 4,
            dispatch_queue: DISPATCH_QUEUE_CAPACITY,
            auth_timeout: timeout::AUTH_TIMEOUT,
            tick_interval: timeout::TICK_INTERVAL,
            max_connections: 1000,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:9000')",
                self.address
            ));
        }

        if self.dispatch_workers == 0 {
            errors.push("Dispatch workers must be greater than 0".to_string());
        }

        if self.dispatch_queue == 0 {
            errors.push("Dispatch queue capacity must be greater than 0".to_string());
        } else if self.dispatch_queue > 1_000_000 {
            errors.push(format!(
                "Dispatch queue too large: {} (max recommended: 1,000,000)",
                self.dispatch_queue
            ));
        }

        if self.auth_timeout.as_millis() < 100 {
            errors.push("Authentication timeout too short (minimum: 100ms)".to_string());
        } else if self.auth_timeout.as_secs() > 300 {
            errors.push("Authentication timeout too long (maximum: 300s)".to_string());
        }

        if self.tick_interval.as_millis() < 10 {
            errors.push("Tick interval too short (minimum: 10ms)".to_string());
        } else if self.tick_interval > self.auth_timeout {
            errors.push("Tick interval cannot exceed the authentication timeout".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Name attached to every log line
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("p2p-node"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match (&self.log_file_path, self.log_to_file) {
            (None, true) => errors.push("Log file enabled without log_file_path".to_string()),
            (Some(path), true) => {
                let dir = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty());
                if dir.is_some_and(|d| !d.exists()) {
                    errors.push(format!("Log directory missing for {path}"));
                }
            }
            _ => {}
        }

        if !self.log_to_console && !self.log_to_file {
            errors.push("Logging disabled: enable console or file output".to_string());
        }

        errors
    }
}

/// Timeouts are written as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, out: S) -> Result<S::Ok, S::Error> {
        out.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(input: D) -> Result<Duration, D::Error> {
        u64::deserialize(input).map(Duration::from_millis)
    }
}

/// Levels are written lowercase, as `RUST_LOG` spells them
mod log_level_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, out: S) -> Result<S::Ok, S::Error> {
        out.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(input: D) -> Result<Level, D::Error> {
        let raw = String::deserialize(input)?;
        raw.parse::<Level>()
            .map_err(|_| de::Error::custom(format!("Unknown log level '{raw}'")))
    }
}
