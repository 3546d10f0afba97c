//! Worker configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the worker process.
///
/// Every field has a production default; `from_env` overrides from
/// `DOCSCRIBE_*` variables, ignoring values that fail to parse.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// How often to look for pending runs.
    pub poll_interval: Duration,
    /// Hard wall-clock limit on one run.
    pub job_time_limit: Duration,
    /// Attempts per run, including the first.
    pub max_attempts: usize,
    /// Base delay between retry attempts.
    pub retry_base_delay: Duration,
    /// Terminal runs older than this are deleted by cleanup.
    pub retention_days: i64,
    /// How often the maintenance pass runs.
    pub maintenance_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("docscribe.db"),
            poll_interval: Duration::from_secs(2),
            job_time_limit: Duration::from_secs(3600),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(60),
            retention_days: 30,
            maintenance_interval: Duration::from_secs(3600),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = read("DOCSCRIBE_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(secs) = read_parsed::<u64>("DOCSCRIBE_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = read_parsed::<u64>("DOCSCRIBE_JOB_TIME_LIMIT_SECS") {
            config.job_time_limit = Duration::from_secs(secs);
        }
        if let Some(attempts) = read_parsed::<usize>("DOCSCRIBE_MAX_ATTEMPTS") {
            config.max_attempts = attempts.max(1);
        }
        if let Some(secs) = read_parsed::<u64>("DOCSCRIBE_RETRY_BASE_DELAY_SECS") {
            config.retry_base_delay = Duration::from_secs(secs);
        }
        if let Some(days) = read_parsed::<i64>("DOCSCRIBE_RETENTION_DAYS") {
            config.retention_days = days.max(0);
        }
        if let Some(secs) = read_parsed::<u64>("DOCSCRIBE_MAINTENANCE_INTERVAL_SECS") {
            config.maintenance_interval = Duration::from_secs(secs);
        }
        config
    }
}

fn read(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn read_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = read(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "ignoring unparseable configuration value");
            None
        }
    }
}
