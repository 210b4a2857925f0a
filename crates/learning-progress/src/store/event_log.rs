use std::{collections::HashSet, sync::Arc};

use serde_json::Value;
use tracing::{debug, warn};

use super::{events_key, snapshot_key, KeyValueStore, StorageError, StorageHealth};
use crate::{
	event::{parse_events, EventId, ProgressEvent},
	identity::Identity,
	snapshot::ProgressSnapshot,
};

#[derive(Debug)]
pub enum AppendOutcome {
	Persisted,
	/// Kept in memory, the store refused the write
	MemoryOnly(StorageError),
	Duplicate,
}

/// Append-only event log of one identity, mirrored to its storage key
pub struct EventLog {
	identity: Identity,
	events: Vec<ProgressEvent>,
	ids: HashSet<EventId>,
	store: Arc<dyn KeyValueStore>,
	health: StorageHealth,
}

impl EventLog {
	pub fn empty(identity: Identity, store: Arc<dyn KeyValueStore>, health: StorageHealth) -> Self {
		Self {
			identity,
			events: Vec::new(),
			ids: HashSet::new(),
			store,
			health,
		}
	}

	/// Load the stored log, dropping anything that fails validation
	pub fn load(identity: Identity, store: Arc<dyn KeyValueStore>, health: StorageHealth) -> Self {
		let key = events_key(&identity);
		let stored = match store.get(&key) {
			Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
				Ok(value) => parse_events(&value),
				Err(e) => {
					warn!(%key, error = %e, "Stored progress log is not valid JSON, starting empty");
					Vec::new()
				}
			},
			Ok(None) => Vec::new(),
			Err(e) => {
				warn!(%key, error = %e, "Failed to read stored progress log");
				Vec::new()
			}
		};

		let mut log = Self::empty(identity, store, health);
		let loaded = log.merge(stored);
		debug!(%key, events = loaded, "Loaded progress log");

		log
	}

	pub const fn identity(&self) -> &Identity {
		&self.identity
	}

	pub fn events(&self) -> &[ProgressEvent] {
		&self.events
	}

	pub fn len(&self) -> usize {
		self.events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}

	pub fn contains(&self, event_id: &EventId) -> bool {
		self.ids.contains(event_id)
	}

	/// Append a local event and write the log through to storage.
	///
	/// The event stays in the log even when the write fails.
	pub fn append(&mut self, event: ProgressEvent) -> AppendOutcome {
		if !self.ids.insert(event.event_id.clone()) {
			return AppendOutcome::Duplicate;
		}
		self.events.push(event);

		match self.persist() {
			Ok(()) => AppendOutcome::Persisted,
			Err(e) => AppendOutcome::MemoryOnly(e),
		}
	}

	/// Union `events` into the log (by id) and restore chronological order.
	///
	/// Returns how many events were new. Nothing is written to storage.
	pub fn merge(&mut self, events: impl IntoIterator<Item = ProgressEvent>) -> usize {
		let before = self.events.len();
		for event in events {
			if self.ids.insert(event.event_id.clone()) {
				self.events.push(event);
			}
		}

		let added = self.events.len() - before;
		if added > 0 {
			crate::reducer::sort_events(&mut self.events);
		}
		added
	}

	pub fn persist(&self) -> Result<(), StorageError> {
		let key = events_key(&self.identity);
		self.health.guard(|| {
			let raw = serde_json::to_string(&self.events).map_err(|source| {
				StorageError::Serialization {
					key: key.clone(),
					source,
				}
			})?;
			self.store.set(&key, &raw)
		})
	}

	pub fn persist_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError> {
		let key = snapshot_key(&self.identity);
		self.health.guard(|| {
			let raw = serde_json::to_string(snapshot).map_err(|source| {
				StorageError::Serialization {
					key: key.clone(),
					source,
				}
			})?;
			self.store.set(&key, &raw)
		})
	}

	/// Drop the log and its cached snapshot from storage and memory
	pub fn clear(&mut self) -> Result<(), StorageError> {
		self.events.clear();
		self.ids.clear();
		self.store.remove(&events_key(&self.identity))?;
		self.store.remove(&snapshot_key(&self.identity))
	}
}
