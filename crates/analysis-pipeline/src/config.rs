//! Pipeline configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PipelineError;
use crate::oracle::remote::DEFAULT_API_URL;
use crate::win_probability::ProbabilitySource;

/// Which evaluation backend to drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OracleBackend {
    /// Stockfish web service
    #[default]
    Remote,
    /// Local Stockfish process
    Local,
}

impl FromStr for OracleBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "api" => Ok(OracleBackend::Remote),
            "local" | "stockfish" => Ok(OracleBackend::Local),
            other => Err(format!("unknown oracle backend '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub backend: OracleBackend,

    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Stockfish web service endpoint
    pub api_url: String,

    /// Search depth per position
    pub depth: u32,

    /// Directory holding analysed games
    pub cache_dir: PathBuf,

    /// Per-request HTTP timeout; also bounds each wait for engine output
    pub timeout: Duration,

    /// Extra attempts after a transient oracle failure
    pub retries: u32,

    /// Delay before the first retry; doubles on each further attempt
    pub retry_backoff: Duration,

    /// Parallel requests to a stateless oracle (1 = sequential walk)
    pub concurrency: usize,

    pub probability_source: ProbabilitySource,

    /// Hours added to the UTC game timestamp when building game keys
    pub key_utc_offset_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::Remote,
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            depth: 12,
            cache_dir: PathBuf::from("analysed_games"),
            timeout: Duration::from_secs(30),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
            concurrency: 1,
            probability_source: ProbabilitySource::Evaluation,
            key_utc_offset_hours: 8,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    /// Unset variables fall back to defaults; malformed enum values are errors.
    pub fn load() -> Result<Self, PipelineError> {
        let defaults = Self::default();

        let backend = match env::var("ORACLE_BACKEND") {
            Ok(v) => v.parse().map_err(PipelineError::Config)?,
            Err(_) => defaults.backend,
        };

        let probability_source = match env::var("PROBABILITY_SOURCE") {
            Ok(v) => v.parse().map_err(PipelineError::Config)?,
            Err(_) => defaults.probability_source,
        };

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);

        let api_url = env::var("STOCKFISH_API_URL").unwrap_or(defaults.api_url);

        let depth = env::var("SEARCH_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.depth);

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let timeout = env::var("ORACLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let retries = env::var("ORACLE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.retries);

        let retry_backoff = env::var("ORACLE_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);

        let concurrency = env::var("ORACLE_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.concurrency)
            .max(1);

        let key_utc_offset_hours = env::var("KEY_UTC_OFFSET_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.key_utc_offset_hours);

        Ok(Self {
            backend,
            stockfish_path,
            api_url,
            depth,
            cache_dir,
            timeout,
            retries,
            retry_backoff,
            concurrency,
            probability_source,
            key_utc_offset_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.depth, 12);
        assert_eq!(config.cache_dir, PathBuf::from("analysed_games"));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.key_utc_offset_hours, 8);
        assert_eq!(config.backend, OracleBackend::Remote);
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("Local".parse(), Ok(OracleBackend::Local));
        assert_eq!("remote".parse(), Ok(OracleBackend::Remote));
        assert!("cloud".parse::<OracleBackend>().is_err());
    }
}
