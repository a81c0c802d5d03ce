//! Configuration Module
//!
//! Handles loading and managing daemon configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::DEFAULT_PREFIX;
use crate::collection::is_reserved_table;

/// Daemon configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Namespace prepended to every storage key
    pub cache_prefix: String,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// JSON file backing the cache; in-memory storage when unset
    pub cache_file: Option<PathBuf>,
    /// Tables reconciled on every sync cycle
    pub sync_tables: Vec<String>,
    /// Interval between scheduled sync cycles while online
    pub sync_interval_ms: u64,
    /// Look-back subtracted from each watermark before an incremental pull
    pub watermark_overlap_ms: u64,
    /// PostgREST base URL; an in-memory remote is used when unset
    pub remote_url: Option<String>,
    /// API key sent with every remote request
    pub remote_api_key: Option<String>,
    /// Connectivity probe frequency in seconds (0 disables the probe)
    pub probe_interval_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_PREFIX` - Storage key namespace (default: "aurora_")
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_FILE` - Path of the persistent cache file (default: unset)
    /// - `SYNC_TABLES` - Comma separated table list (default: "incidents,expenses,assets");
    ///   names that collide with internal cache keys are dropped
    /// - `SYNC_INTERVAL_MS` - Scheduled sync period, 0 falls back to the default (default: 5000)
    /// - `WATERMARK_OVERLAP_MS` - Incremental pull look-back (default: 1000)
    /// - `REMOTE_URL` - PostgREST base URL (default: unset)
    /// - `REMOTE_API_KEY` - Remote API key (default: unset)
    /// - `PROBE_INTERVAL_SECS` - Connectivity probe frequency (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: parsed_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cache_prefix: non_empty_var("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            default_ttl_ms: parsed_var("DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            cache_file: non_empty_var("CACHE_FILE").map(PathBuf::from),
            sync_tables: non_empty_var("SYNC_TABLES")
                .map(|v| parse_tables(&v))
                .filter(|tables| !tables.is_empty())
                .unwrap_or(defaults.sync_tables),
            sync_interval_ms: parsed_var::<u64>("SYNC_INTERVAL_MS")
                .filter(|&ms| {
                    if ms == 0 {
                        warn!("SYNC_INTERVAL_MS must be positive, using the default");
                    }
                    ms > 0
                })
                .unwrap_or(defaults.sync_interval_ms),
            watermark_overlap_ms: parsed_var("WATERMARK_OVERLAP_MS")
                .unwrap_or(defaults.watermark_overlap_ms),
            remote_url: non_empty_var("REMOTE_URL"),
            remote_api_key: non_empty_var("REMOTE_API_KEY"),
            probe_interval_secs: parsed_var("PROBE_INTERVAL_SECS")
                .unwrap_or(defaults.probe_interval_secs),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Scheduled sync period, never shorter than one millisecond
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    pub fn watermark_overlap(&self) -> Duration {
        Duration::from_millis(self.watermark_overlap_ms)
    }

    /// Probe interval, or None when the probe is disabled
    pub fn probe_interval(&self) -> Option<Duration> {
        (self.probe_interval_secs > 0).then(|| Duration::from_secs(self.probe_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_prefix: DEFAULT_PREFIX.to_string(),
            default_ttl_ms: 300_000,
            cache_file: None,
            sync_tables: vec![
                "incidents".to_string(),
                "expenses".to_string(),
                "assets".to_string(),
            ],
            sync_interval_ms: 5_000,
            watermark_overlap_ms: 1_000,
            remote_url: None,
            remote_api_key: None,
            probe_interval_secs: 10,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_tables(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| {
            let reserved = is_reserved_table(t);
            if reserved {
                warn!("Ignoring sync table '{}': name is reserved", t);
            }
            !reserved
        })
        .map(String::from)
        .collect()
}
