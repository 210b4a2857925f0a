use std::{
	collections::HashMap,
	sync::{PoisonError, RwLock},
};

use super::{KeyValueStore, StorageError};

/// In-memory store with an optional byte quota
///
/// The quota counts key and value bytes across all entries, which is how browser local storage
/// accounts for its limit.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: RwLock<HashMap<String, String>>,
	quota: RwLock<Option<usize>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_quota(quota: usize) -> Self {
		let store = Self::new();
		store.set_quota(Some(quota));
		store
	}

	pub fn set_quota(&self, quota: Option<usize>) {
		*self.quota.write().unwrap_or_else(PoisonError::into_inner) = quota;
	}

	/// Bytes currently used by keys and values
	pub fn used_bytes(&self) -> usize {
		self.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.map(|(key, value)| key.len() + value.len())
			.sum()
	}

	pub fn keys(&self) -> Vec<String> {
		let mut keys = self
			.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.keys()
			.cloned()
			.collect::<Vec<_>>();
		keys.sort();
		keys
	}
}

impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self
			.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(key)
			.cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let quota = *self.quota.read().unwrap_or_else(PoisonError::into_inner);
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

		if let Some(quota) = quota {
			let used = entries
				.iter()
				.filter(|(existing, _)| existing.as_str() != key)
				.map(|(existing, value)| existing.len() + value.len())
				.sum::<usize>();
			if used + key.len() + value.len() > quota {
				return Err(StorageError::QuotaExceeded {
					key: key.to_string(),
				});
			}
		}

		entries.insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.entries
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(key);
		Ok(())
	}
}
