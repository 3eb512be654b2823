//! Configuration loaded from the environment.
//!
//! Every setting has a default, so an empty environment runs all strategies
//! the relational backend supports with 10 workers × 10 000 iterations.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CONTENTION_BACKEND` | `relational` |
//! | `CONTENTION_HOST` | `127.0.0.1` |
//! | `CONTENTION_PORT` | per backend |
//! | `CONTENTION_USER`, `CONTENTION_PASSWORD` | unset |
//! | `CONTENTION_DATABASE` | per backend |
//! | `CONTENTION_COUNTER_KEY` | per backend |
//! | `CONTENTION_CLUSTER_MEMBERS` | `host:port` |
//! | `CONTENTION_REPLICAS` | `3` |
//! | `CONTENTION_WRITE_CONCERN` | `1` (a list such as `1,majority` sweeps each) |
//! | `CONTENTION_LOCK_TIMEOUT_MS` | unset (wait forever) |
//! | `CONTENTION_WORKERS` | `10` |
//! | `CONTENTION_ITERATIONS` | `10000` |
//! | `CONTENTION_INITIAL_VALUE` | `0` |
//! | `CONTENTION_INTERLEAVE_DELAY_MS` | `0` |
//! | `CONTENTION_MAX_CAS_CONFLICTS` | unset (unbounded) |
//! | `CONTENTION_CAS_BACKOFF` | `false` |
//! | `CONTENTION_STRATEGIES` | every strategy the backend supports |
//! | `CONTENTION_LOG_FILE` | `contention.log` |

use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{BackendKind, WriteConcern};
use crate::strategy::{RetryPolicy, StrategyKind};

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed or is out of range.
    #[error("invalid configuration for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// How to reach the store and which counter to contend on.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database, keyspace, map or collection name.
    pub database: String,
    /// Row id, map key, node name or document name.
    pub counter_key: String,
    /// `host:port` members of a map cluster.
    pub cluster_members: Vec<String>,
    /// Replica-set size of a document store.
    pub replicas: usize,
    /// Write concerns of a document store, one run set each. Never empty.
    pub write_concerns: Vec<WriteConcern>,
    /// Lock-wait ceiling; `None` waits forever.
    pub lock_timeout: Option<Duration>,
}

impl BackendConfig {
    /// Defaults for `kind`, pointing at a local store.
    pub fn for_kind(kind: BackendKind) -> Self {
        let host = "127.0.0.1".to_string();
        let port = kind.default_port();
        Self {
            kind,
            cluster_members: vec![format!("{host}:{port}")],
            host,
            port,
            user: None,
            password: None,
            database: kind.default_database().to_string(),
            counter_key: kind.default_counter_key().to_string(),
            replicas: 3,
            write_concerns: vec![WriteConcern::default()],
            lock_timeout: None,
        }
    }

    /// The write concern a connection made from this config uses.
    pub fn write_concern(&self) -> WriteConcern {
        self.write_concerns.first().copied().unwrap_or_default()
    }

    /// One config per write concern to sweep, each holding just that concern.
    ///
    /// Stores without an acknowledgement level yield `self` alone.
    pub fn sweep(&self) -> Vec<BackendConfig> {
        if self.kind != BackendKind::Document || self.write_concerns.len() < 2 {
            return vec![self.clone()];
        }
        self.write_concerns
            .iter()
            .map(|write_concern| Self {
                write_concerns: vec![*write_concern],
                ..self.clone()
            })
            .collect()
    }

    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let kind = parse_or(lookup, "CONTENTION_BACKEND", BackendKind::default())?;
        let mut config = Self::for_kind(kind);

        if let Some(host) = lookup("CONTENTION_HOST") {
            config.host = host;
        }
        config.port = parse_or(lookup, "CONTENTION_PORT", config.port)?;
        config.user = lookup("CONTENTION_USER");
        config.password = lookup("CONTENTION_PASSWORD");
        if let Some(database) = lookup("CONTENTION_DATABASE") {
            config.database = database;
        }
        if let Some(key) = lookup("CONTENTION_COUNTER_KEY") {
            config.counter_key = key;
        }
        config.cluster_members = match lookup("CONTENTION_CLUSTER_MEMBERS") {
            Some(members) => split_list(&members),
            None => vec![format!("{}:{}", config.host, config.port)],
        };
        config.replicas = parse_or(lookup, "CONTENTION_REPLICAS", config.replicas)?;
        if let Some(list) = lookup("CONTENTION_WRITE_CONCERN") {
            let write_concerns = split_list(&list)
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<WriteConcern>, _>>()?;
            if !write_concerns.is_empty() {
                config.write_concerns = write_concerns;
            }
        }
        config.lock_timeout =
            parse_opt::<u64>(lookup, "CONTENTION_LOCK_TIMEOUT_MS")?.map(Duration::from_millis);
        Ok(config)
    }
}

impl Debug for BackendConfig {
    /// Same as a derived `Debug`, with the password redacted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("counter_key", &self.counter_key)
            .field("cluster_members", &self.cluster_members)
            .field("replicas", &self.replicas)
            .field("write_concerns", &self.write_concerns)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

/// Workload shape shared by every run of a harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Concurrent workers per run (W).
    pub workers: usize,
    /// Increments each worker commits (M).
    pub iterations: u64,
    pub initial_value: i64,
    /// Pause between a read and the write that depends on it.
    pub interleave_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            iterations: 10_000,
            initial_value: 0,
            interleave_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

impl HarnessConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_initial_value(mut self, initial_value: i64) -> Self {
        self.initial_value = initial_value;
        self
    }

    pub fn with_interleave_delay(mut self, delay: Duration) -> Self {
        self.interleave_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rejects workloads the harness cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers".to_string(),
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        let total = u64::try_from(self.workers)
            .ok()
            .and_then(|workers| workers.checked_mul(self.iterations))
            .and_then(|total| i64::try_from(total).ok());
        if total
            .and_then(|total| self.initial_value.checked_add(total))
            .is_none()
        {
            return Err(ConfigError::InvalidValue {
                key: "initial_value".to_string(),
                value: self.initial_value.to_string(),
                reason: format!(
                    "initial + {} workers * {} iterations overflows a 64-bit counter",
                    self.workers, self.iterations
                ),
            });
        }
        Ok(())
    }

    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_conflicts: parse_opt(lookup, "CONTENTION_MAX_CAS_CONFLICTS")?,
            backoff: parse_or(lookup, "CONTENTION_CAS_BACKOFF", false)?,
        };
        let config = Self {
            workers: parse_or(lookup, "CONTENTION_WORKERS", defaults.workers)?,
            iterations: parse_or(lookup, "CONTENTION_ITERATIONS", defaults.iterations)?,
            initial_value: parse_or(lookup, "CONTENTION_INITIAL_VALUE", defaults.initial_value)?,
            interleave_delay: parse_opt::<u64>(lookup, "CONTENTION_INTERLEAVE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.interleave_delay),
            retry,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendConfig,
    pub harness: HarnessConfig,
    /// Strategies to run in order; empty means every one the backend supports.
    pub strategies: Vec<StrategyKind>,
    /// Run-scoped log file, truncated at start.
    pub log_file: PathBuf,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let strategies = match lookup("CONTENTION_STRATEGIES") {
            Some(list) => split_list(&list)
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<StrategyKind>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            backend: BackendConfig::load(&lookup)?,
            harness: HarnessConfig::load(&lookup)?,
            strategies,
            log_file: lookup("CONTENTION_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("contention.log")),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_opt<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
