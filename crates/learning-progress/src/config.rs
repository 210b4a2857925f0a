use std::{
	fs,
	io,
	path::{Path, PathBuf},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Tunables for the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Quiet period after a local append before the push starts
	pub push_debounce_ms: u64,

	/// Backoff schedule, indexed by the retry count of the failed events
	pub retry_delays_ms: Vec<u64>,

	/// Attempts after which an event stops being retried automatically
	pub max_retries: u32,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			push_debounce_ms: 1200,
			retry_delays_ms: vec![1000, 5000, 15000, 60000],
			max_retries: 4,
		}
	}
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse config file {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("retry_delays_ms must contain at least one delay")]
	EmptyRetrySchedule,
}

impl EngineConfig {
	/// Load from a JSON file, falling back to defaults when the file does not exist
	pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		let raw = match fs::read_to_string(path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(path = %path.display(), "Engine config not found, using defaults");
				return Ok(Self::default());
			}
			Err(source) => {
				return Err(ConfigError::Read {
					path: path.to_path_buf(),
					source,
				})
			}
		};

		let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.validate()?;

		info!(path = %path.display(), "Loaded engine config");

		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.retry_delays_ms.is_empty() {
			return Err(ConfigError::EmptyRetrySchedule);
		}
		Ok(())
	}

	pub const fn push_debounce(&self) -> Duration {
		Duration::from_millis(self.push_debounce_ms)
	}

	/// Delay before retrying events that have failed `attempt` times.
	///
	/// The first retry waits for the first entry of the schedule, and every attempt past the end
	/// of the schedule reuses its last entry.
	pub fn retry_delay(&self, attempt: u32) -> Duration {
		let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
		let delay = self
			.retry_delays_ms
			.get(index)
			.or_else(|| self.retry_delays_ms.last())
			.copied()
			.unwrap_or_default();

		Duration::from_millis(delay)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retry_delay_schedule() {
		let config = EngineConfig::default();

		assert_eq!(config.retry_delay(1), Duration::from_secs(1));
		assert_eq!(config.retry_delay(2), Duration::from_secs(5));
		assert_eq!(config.retry_delay(3), Duration::from_secs(15));
		assert_eq!(config.retry_delay(4), Duration::from_secs(60));
		assert_eq!(config.retry_delay(9), Duration::from_secs(60));
	}

	#[test]
	fn test_load_partial_config_keeps_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("learning_progress.json");
		fs::write(&path, r#"{ "push_debounce_ms": 250 }"#).unwrap();

		let config = EngineConfig::load_from(&path).unwrap();
		assert_eq!(config.push_debounce(), Duration::from_millis(250));
		assert_eq!(config.max_retries, 4);
		assert_eq!(config.retry_delays_ms.len(), 4);
	}

	#[test]
	fn test_missing_config_uses_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = EngineConfig::load_from(dir.path().join("absent.json")).unwrap();
		assert_eq!(config, EngineConfig::default());
	}

	#[test]
	fn test_empty_retry_schedule_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("learning_progress.json");
		fs::write(&path, r#"{ "retry_delays_ms": [] }"#).unwrap();

		assert!(matches!(
			EngineConfig::load_from(&path),
			Err(ConfigError::EmptyRetrySchedule)
		));
	}
}
