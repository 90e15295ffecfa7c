//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

use crate::transport::ConnectionConfig;

/// STUN server used when `ICE_SERVERS` is not set.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Largest accepted decoded connection offer, in bytes.
pub const DEFAULT_MAX_OFFER_BYTES: usize = 10_240;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:9000`).
    pub listen_addr: SocketAddr,

    /// STUN/TURN URLs shared by every pool.
    pub ice_servers: Vec<String>,

    /// Largest accepted decoded offer, in bytes.
    pub max_offer_bytes: usize,

    /// Messages a session may have queued before deliveries to it fail.
    pub outbound_queue_capacity: usize,

    /// How long an answer waits for ICE candidate gathering.
    pub ice_gather_timeout: Duration,

    /// Pools created at startup.
    pub seed_pools: Vec<String>,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
            max_offer_bytes: DEFAULT_MAX_OFFER_BYTES,
            outbound_queue_capacity: 256,
            ice_gather_timeout: Duration::from_secs(5),
            seed_pools: Vec::new(),
            log_format: LogFormat::Text,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or a numeric value
    /// does not parse. Calls `dotenvy::dotenv().ok()` to optionally load a
    /// `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as a
    /// [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(addr) => addr.parse()?,
            Err(_) => defaults.listen_addr,
        };

        let ice_servers = std::env::var("ICE_SERVERS")
            .map(|v| parse_list(&v))
            .unwrap_or(defaults.ice_servers);

        let max_offer_bytes = parse_env("MAX_OFFER_BYTES", defaults.max_offer_bytes);
        let outbound_queue_capacity =
            parse_env("OUTBOUND_QUEUE_CAPACITY", defaults.outbound_queue_capacity);
        let ice_gather_timeout =
            Duration::from_millis(parse_env("ICE_GATHER_TIMEOUT_MS", 5_000_u64));

        let seed_pools = std::env::var("SEED_POOLS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            ice_servers,
            max_offer_bytes,
            outbound_queue_capacity,
            ice_gather_timeout,
            seed_pools,
            log_format,
        })
    }

    /// Connection settings handed to every pool.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Splits a comma-separated list, dropping blank entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
