//! Local persistence
//!
//! Progress is kept in a plain key-value store (browser-style local storage, or one file per key
//! on desktop hosts). Every identity gets its own keys, so a guest log and the logs of different
//! users never overwrite each other.

use std::{
	io,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use crate::identity::Identity;

mod event_log;
mod file;
mod memory;

pub use event_log::{AppendOutcome, EventLog};
pub use file::FileStore;
pub use memory::MemoryStore;

pub const EVENTS_KEY: &str = "learning_progress_events";
pub const SNAPSHOT_KEY: &str = "learning_progress_snapshot";
pub const SYNC_KEY: &str = "learning_progress_sync";
pub const CLIENT_ID_KEY: &str = "learning_progress_client_id";

/// Message recorded on events that could only be kept in memory
pub const QUOTA_EXCEEDED_MESSAGE: &str = "local storage quota exceeded";

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
	#[error("storage quota exceeded while writing {key}")]
	QuotaExceeded { key: String },
	#[error("storage writes are disabled after a quota failure")]
	Blocked,
	#[error("storage I/O error: {0}")]
	Io(#[from] io::Error),
	#[error("failed to serialize {key}: {source}")]
	Serialization {
		key: String,
		#[source]
		source: serde_json::Error,
	},
}

impl StorageError {
	pub const fn is_quota(&self) -> bool {
		matches!(self, Self::QuotaExceeded { .. } | Self::Blocked)
	}
}

/// Minimal synchronous key-value storage
pub trait KeyValueStore: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

	fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Engine-wide flag set by the first quota failure
///
/// Once blocked, every further write is short-circuited and the engine keeps working from
/// memory for the rest of the session.
#[derive(Debug, Clone, Default)]
pub struct StorageHealth(Arc<AtomicBool>);

impl StorageHealth {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_blocked(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	/// Returns `true` if this call is the one that blocked storage
	pub fn block(&self) -> bool {
		!self.0.swap(true, Ordering::SeqCst)
	}

	/// Run a write unless storage is blocked, blocking it on a quota failure
	pub fn guard<T>(
		&self,
		write: impl FnOnce() -> Result<T, StorageError>,
	) -> Result<T, StorageError> {
		if self.is_blocked() {
			return Err(StorageError::Blocked);
		}

		write().map_err(|e| {
			if matches!(e, StorageError::QuotaExceeded { .. }) && self.block() {
				tracing::warn!(error = %e, "Local storage is full, progress is now kept in memory only");
			}
			e
		})
	}
}

fn scoped_key(base: &str, identity: &Identity) -> String {
	match identity {
		Identity::Guest => base.to_string(),
		Identity::User(user_id) => format!("{base}:{user_id}"),
	}
}

pub fn events_key(identity: &Identity) -> String {
	scoped_key(EVENTS_KEY, identity)
}

pub fn snapshot_key(identity: &Identity) -> String {
	scoped_key(SNAPSHOT_KEY, identity)
}

/// Only signed-in users have sync metadata
pub fn sync_key(identity: &Identity) -> Option<String> {
	identity
		.user_id()
		.map(|user_id| format!("{SYNC_KEY}:{user_id}"))
}
