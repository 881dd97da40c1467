//! Configuration handling for the statement mapper.
//!
//! Pool sizing travels as query parameters on the data-source URL, session
//! behavior is described by [`Settings`], and the demo binary reads its
//! arguments through the clap-derived [`Config`].

use crate::datasource::PoolSettings;
use crate::driver::Credentials;
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

// Pool configuration defaults
pub const DEFAULT_MAX_ACTIVE: usize = 10;
pub const DEFAULT_MAX_IDLE: usize = 5;
pub const DEFAULT_MAX_CHECKOUT_TIME_MS: u64 = 20_000;
pub const DEFAULT_TIME_TO_WAIT_MS: u64 = 20_000;
pub const DEFAULT_PING_NOT_USED_FOR_MS: u64 = 0;
pub const DEFAULT_BAD_CONNECTION_TOLERANCE: usize = 3;

// Cache defaults
pub const DEFAULT_FIFO_SIZE: usize = 1024;

pub const DEFAULT_ENVIRONMENT_ID: &str = "default";

/// Connection pool configuration options parsed from the data-source URL.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections checked out at once (default: 10)
    pub max_active: Option<usize>,
    /// Maximum connections kept idle (default: 5)
    pub max_idle: Option<usize>,
    /// Checkout time after which a connection may be reclaimed, in ms (default: 20000)
    pub checkout_timeout_ms: Option<u64>,
    /// Time an acquiring thread waits before retrying, in ms (default: 20000)
    pub wait_timeout_ms: Option<u64>,
    /// Liveness query; the driver ping is used when absent
    pub ping_query: Option<String>,
    /// Whether to ping connections before handing them out (default: false)
    pub ping_enabled: Option<bool>,
    /// Only ping connections idle for longer than this, in ms (default: 0)
    pub ping_not_used_for_ms: Option<u64>,
}

impl PoolOptions {
    pub fn max_active_or_default(&self) -> usize {
        self.max_active.unwrap_or(DEFAULT_MAX_ACTIVE)
    }

    pub fn max_idle_or_default(&self) -> usize {
        self.max_idle.unwrap_or(DEFAULT_MAX_IDLE)
    }

    pub fn checkout_timeout_or_default(&self) -> u64 {
        self.checkout_timeout_ms.unwrap_or(DEFAULT_MAX_CHECKOUT_TIME_MS)
    }

    pub fn wait_timeout_or_default(&self) -> u64 {
        self.wait_timeout_ms.unwrap_or(DEFAULT_TIME_TO_WAIT_MS)
    }

    pub fn ping_enabled_or_default(&self) -> bool {
        self.ping_enabled.unwrap_or(false)
    }

    pub fn ping_not_used_for_or_default(&self) -> u64 {
        self.ping_not_used_for_ms
            .unwrap_or(DEFAULT_PING_NOT_USED_FOR_MS)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_active == Some(0) {
            return Err("max_active must be greater than 0".to_string());
        }
        if let (Some(idle), Some(active)) = (self.max_idle, self.max_active) {
            if idle > active {
                return Err(format!(
                    "max_idle ({}) cannot exceed max_active ({})",
                    idle, active
                ));
            }
        }
        if self.wait_timeout_ms == Some(0) {
            return Err("wait_timeout must be greater than 0".to_string());
        }
        if self.ping_enabled == Some(true)
            && self.ping_query.as_deref().is_some_and(|q| q.trim().is_empty())
        {
            return Err("ping_query must not be empty when ping_enabled is set".to_string());
        }
        Ok(())
    }

    pub fn to_settings(&self) -> PoolSettings {
        PoolSettings {
            max_active: self.max_active_or_default(),
            max_idle: self.max_idle_or_default(),
            max_checkout_time: Duration::from_millis(self.checkout_timeout_or_default()),
            time_to_wait: Duration::from_millis(self.wait_timeout_or_default()),
            ping_enabled: self.ping_enabled_or_default(),
            ping_query: self.ping_query.clone(),
            ping_connections_not_used_for: Duration::from_millis(
                self.ping_not_used_for_or_default(),
            ),
            bad_connection_tolerance: DEFAULT_BAD_CONNECTION_TOLERANCE,
        }
    }
}

/// Data-source configuration parsed from a URL.
#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    /// Driver URL with pool and credential options removed (sensitive - not logged).
    pub url: String,
    pub credentials: Credentials,
    pub pool_options: PoolOptions,
}

impl DataSourceConfig {
    /// Option keys consumed here rather than passed to the driver.
    const OPTION_KEYS: &'static [&'static str] = &[
        "max_active",
        "max_idle",
        "checkout_timeout",
        "wait_timeout",
        "ping_query",
        "ping_enabled",
        "ping_not_used_for",
        "username",
        "password",
    ];

    /// Parse a data-source URL.
    ///
    /// ```text
    /// sqlite:app.db?max_active=4&wait_timeout=500
    /// sqlite://data/app.db?ping_enabled=true&ping_query=select%201
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut url = Url::parse(s).map_err(|e| format!("Invalid URL: {e}"))?;
        let mut opts = Self::extract_options(&mut url, Self::OPTION_KEYS);

        let pool_options = Self::parse_pool_options(&mut opts);
        pool_options.validate()?;

        let credentials = Credentials::new(opts.remove("username"), opts.remove("password"));

        Ok(Self {
            url: url.to_string(),
            credentials,
            pool_options,
        })
    }

    fn parse_pool_options(opts: &mut HashMap<String, String>) -> PoolOptions {
        PoolOptions {
            max_active: opts.remove("max_active").and_then(|v| v.parse().ok()),
            max_idle: opts.remove("max_idle").and_then(|v| v.parse().ok()),
            checkout_timeout_ms: opts.remove("checkout_timeout").and_then(|v| v.parse().ok()),
            wait_timeout_ms: opts.remove("wait_timeout").and_then(|v| v.parse().ok()),
            ping_query: opts.remove("ping_query").filter(|q| !q.is_empty()),
            ping_enabled: opts.remove("ping_enabled").and_then(|v| {
                if v.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if v.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None // Invalid value ignored
                }
            }),
            ping_not_used_for_ms: opts
                .remove("ping_not_used_for")
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Extract our options from URL query params, keeping others for the driver.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }
}

/// Lifetime of local-cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, serde::Serialize)]
pub enum LocalCacheScope {
    /// Entries live until the next write, commit, rollback or close
    #[default]
    Session,
    /// Entries are dropped after every top-level statement
    Statement,
}

impl std::fmt::Display for LocalCacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "SESSION"),
            Self::Statement => write!(f, "STATEMENT"),
        }
    }
}

/// Engine-wide behavior switches held by the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Whether namespaces' shared caches are consulted at all.
    pub cache_enabled: bool,
    pub local_cache_scope: LocalCacheScope,
    /// Default key generator for inserts without an explicit one.
    pub use_generated_keys: bool,
    pub default_statement_timeout: Option<Duration>,
    pub default_fetch_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            use_generated_keys: false,
            default_statement_timeout: None,
            default_fetch_size: None,
        }
    }
}

/// Command-line configuration for the `sqlmapper` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqlmapper",
    about = "Run one parameterized SQL statement through the mapper and print the result as JSON",
    version,
    author
)]
pub struct Config {
    /// Data-source URL, e.g. "sqlite:app.db?max_active=4"
    #[arg(short = 'd', long = "database", value_name = "URL", env = "SQLMAPPER_DATABASE")]
    pub database: String,

    /// Statement text with #{name} placeholders
    #[arg(short = 's', long = "sql", value_name = "SQL")]
    pub sql: String,

    /// Parameter in name=value form; may be repeated
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Run as a write and print the affected row count
    #[arg(long)]
    pub update: bool,

    /// Environment id mixed into cache keys
    #[arg(long, default_value = DEFAULT_ENVIRONMENT_ID, env = "SQLMAPPER_ENVIRONMENT")]
    pub environment: String,

    /// Local cache scope
    #[arg(long, value_enum, default_value = "session", env = "SQLMAPPER_CACHE_SCOPE")]
    pub cache_scope: LocalCacheScope,

    /// Disable the shared second-level cache
    #[arg(long, env = "SQLMAPPER_NO_CACHE")]
    pub no_cache: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLMAPPER_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLMAPPER_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse all `name=value` parameters, in order.
    pub fn parse_params(&self) -> Result<Vec<(String, String)>, String> {
        self.params
            .iter()
            .map(|p| match p.split_once('=') {
                Some((name, value)) if !name.trim().is_empty() => {
                    Ok((name.trim().to_string(), value.to_string()))
                }
                _ => Err(format!("Invalid parameter '{p}': expected NAME=VALUE")),
            })
            .collect()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            cache_enabled: !self.no_cache,
            local_cache_scope: self.cache_scope,
            ..Settings::default()
        }
    }
}
