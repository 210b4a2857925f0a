use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
	event::{EventId, EventKind, ProgressEvent},
	identity::Identity,
	snapshot::ProgressSnapshot,
	store::{sync_key, KeyValueStore, StorageError, StorageHealth},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
	/// Not yet acknowledged by the remote
	Local,
	/// Part of an in-flight push
	Syncing,
	Synced,
	Error,
}

/// Per-event synchronization record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
	pub status: SyncStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_attempt_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_synced_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub retry_count: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
}

impl SyncEntry {
	pub const fn local() -> Self {
		Self {
			status: SyncStatus::Local,
			last_attempt_at: None,
			last_synced_at: None,
			retry_count: 0,
			error_message: None,
		}
	}

	pub const fn synced(at: DateTime<Utc>) -> Self {
		Self {
			status: SyncStatus::Synced,
			last_attempt_at: None,
			last_synced_at: Some(at),
			retry_count: 0,
			error_message: None,
		}
	}

	pub fn is_synced(&self) -> bool {
		self.status == SyncStatus::Synced
	}

	fn is_pending(&self, include_exhausted: bool, max_retries: u32) -> bool {
		match self.status {
			SyncStatus::Local => true,
			SyncStatus::Error => include_exhausted || self.retry_count < max_retries,
			SyncStatus::Syncing | SyncStatus::Synced => false,
		}
	}
}

/// Sync metadata of one signed-in user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncLedger {
	pub entries: BTreeMap<EventId, SyncEntry>,
	/// Opaque pull cursor handed out by the remote
	pub cursor: Option<String>,
	pub last_successful_sync_at: Option<DateTime<Utc>>,
	/// Guest events were merged in and their storage has not been cleared yet
	pub guest_cleanup_pending: bool,
	/// Last snapshot the remote handed out without the events behind it
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remote_snapshot: Option<ProgressSnapshot>,
}

impl SyncLedger {
	/// Load the ledger of `identity`; guests always start from an empty, unpersisted one.
	///
	/// Entries left `syncing` by an interrupted session go back to `local`.
	pub fn load(store: &dyn KeyValueStore, identity: &Identity) -> Self {
		let Some(key) = sync_key(identity) else {
			return Self::default();
		};

		let mut ledger = match store.get(&key) {
			Ok(Some(raw)) => serde_json::from_str::<Self>(&raw).unwrap_or_else(|e| {
				warn!(%key, error = %e, "Ignoring unreadable sync metadata");
				Self::default()
			}),
			Ok(None) => Self::default(),
			Err(e) => {
				warn!(%key, error = %e, "Failed to read sync metadata");
				Self::default()
			}
		};

		for entry in ledger.entries.values_mut() {
			if entry.status == SyncStatus::Syncing {
				entry.status = SyncStatus::Local;
			}
		}

		ledger
	}

	pub fn persist(
		&self,
		store: &dyn KeyValueStore,
		identity: &Identity,
		health: &StorageHealth,
	) -> Result<(), StorageError> {
		let Some(key) = sync_key(identity) else {
			return Ok(());
		};

		health.guard(|| {
			let raw = serde_json::to_string(self).map_err(|source| StorageError::Serialization {
				key: key.clone(),
				source,
			})?;
			store.set(&key, &raw)
		})
	}

	pub fn entry(&self, event_id: &EventId) -> Option<&SyncEntry> {
		self.entries.get(event_id)
	}

	pub fn is_synced(&self, event_id: &EventId) -> bool {
		self.entry(event_id).map_or(false, SyncEntry::is_synced)
	}

	/// Start tracking a local event, leaving existing entries untouched
	pub fn track_local(&mut self, event_id: &EventId) {
		self.entries
			.entry(event_id.clone())
			.or_insert_with(SyncEntry::local);
	}

	/// Record that the remote already holds `event_id`
	pub fn mark_synced(&mut self, event_id: &EventId, at: DateTime<Utc>) {
		self.entries.insert(event_id.clone(), SyncEntry::synced(at));
	}

	/// Keep the snapshot of a pull that carried no events.
	///
	/// A pulled `progress.reset` drops the kept snapshot. Returns whether it changed.
	pub fn absorb_remote_snapshot(
		&mut self,
		events: &[ProgressEvent],
		snapshot: Option<ProgressSnapshot>,
	) -> bool {
		let next = if events
			.iter()
			.any(|event| matches!(event.kind, EventKind::ProgressReset))
		{
			None
		} else if let (true, Some(snapshot)) = (events.is_empty(), snapshot) {
			Some(snapshot)
		} else {
			return false;
		};

		if self.remote_snapshot == next {
			return false;
		}
		self.remote_snapshot = next;
		true
	}

	/// Flag an event that could not be written to local storage
	pub fn mark_storage_error(&mut self, event_id: &EventId, message: &str) {
		let entry = self
			.entries
			.entry(event_id.clone())
			.or_insert_with(SyncEntry::local);
		entry.status = SyncStatus::Error;
		entry.error_message = Some(message.to_string());
	}

	/// Events that a push should carry.
	///
	/// Automatic pushes skip events that already used up their retries; a manual sync includes
	/// them.
	pub fn pending(&self, include_exhausted: bool, max_retries: u32) -> HashSet<EventId> {
		self.entries
			.iter()
			.filter(|(_, entry)| entry.is_pending(include_exhausted, max_retries))
			.map(|(id, _)| id.clone())
			.collect()
	}

	pub fn pending_count(&self, max_retries: u32) -> usize {
		self.entries
			.values()
			.filter(|entry| entry.is_pending(false, max_retries))
			.count()
	}

	pub fn begin_push<'a>(&mut self, ids: impl IntoIterator<Item = &'a EventId>, at: DateTime<Utc>) {
		for id in ids {
			let entry = self.entries.entry(id.clone()).or_insert_with(SyncEntry::local);
			entry.status = SyncStatus::Syncing;
			entry.last_attempt_at = Some(at);
		}
	}

	pub fn complete_push<'a>(
		&mut self,
		ids: impl IntoIterator<Item = &'a EventId>,
		at: DateTime<Utc>,
	) {
		for id in ids {
			self.mark_synced(id, at);
		}
		self.last_successful_sync_at = Some(at);
	}

	/// Record a failed push.
	///
	/// Returns the smallest retry count among the failed events that may still be retried
	/// automatically, or `None` once all of them are exhausted.
	pub fn fail_push<'a>(
		&mut self,
		ids: impl IntoIterator<Item = &'a EventId>,
		message: &str,
		max_retries: u32,
	) -> Option<u32> {
		let mut next_attempt = None::<u32>;
		for id in ids {
			let entry = self.entries.entry(id.clone()).or_insert_with(SyncEntry::local);
			entry.status = SyncStatus::Error;
			entry.retry_count = entry.retry_count.saturating_add(1);
			entry.error_message = Some(message.to_string());

			if entry.retry_count < max_retries {
				next_attempt =
					Some(next_attempt.map_or(entry.retry_count, |n| n.min(entry.retry_count)));
			}
		}
		next_attempt
	}
}
