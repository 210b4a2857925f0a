use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, trace, warn};

use super::{
	ledger::{SyncEntry, SyncLedger},
	merge::merge_snapshots,
	remote::{PushRequest, RemoteError, RemoteProgress},
	state::{EnginePhase, Mutation, PendingMutation},
};
use crate::{
	capability::{AlwaysOnline, Clock, Connectivity, IdGenerator, SystemClock, UuidGenerator},
	config::EngineConfig,
	event::{
		ActivePathSetPayload, EventId, EventKind, OnboardingCompletedPayload, ProgressEvent,
	},
	identity::{AuthState, Identity, UserId},
	reducer::{apply_event, reduce_events},
	resolver::{
		InteractionAction, ResolverContext, ResolverError, ResolverRegistry,
		SaveContentProgressInput,
	},
	snapshot::ProgressSnapshot,
	store::{
		AppendOutcome, EventLog, KeyValueStore, StorageError, StorageHealth, CLIENT_ID_KEY,
		QUOTA_EXCEEDED_MESSAGE,
	},
	Error,
};

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Everything the engine needs from its host
pub struct EngineContext {
	pub store: Arc<dyn KeyValueStore>,
	pub remote: Arc<dyn RemoteProgress>,
	pub clock: Arc<dyn Clock>,
	pub ids: Arc<dyn IdGenerator>,
	pub connectivity: Arc<dyn Connectivity>,
}

impl EngineContext {
	/// Production defaults: system clock, random UUIDs, always online
	pub fn new(store: Arc<dyn KeyValueStore>, remote: Arc<dyn RemoteProgress>) -> Self {
		Self {
			store,
			remote,
			clock: Arc::new(SystemClock),
			ids: Arc::new(UuidGenerator),
			connectivity: Arc::new(AlwaysOnline),
		}
	}

	#[must_use]
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	#[must_use]
	pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
		self.ids = ids;
		self
	}

	#[must_use]
	pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
		self.connectivity = connectivity;
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOnboardingInput {
	pub path_id: String,
	pub related_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSkipReason {
	Offline,
	Guest,
	Bootstrapping,
	InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
	Skipped(SyncSkipReason),
	/// Local events were acknowledged, then remote events were pulled
	Pushed { events: usize, pulled: usize },
	/// Nothing was pending, remote events were pulled
	Pulled { events: usize },
	Failed {
		error: String,
		retry_in: Option<Duration>,
	},
	/// The identity changed while the sync was in flight, its result was discarded
	Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
	Bootstrapped {
		user_id: UserId,
		events: usize,
		remote_reachable: bool,
	},
	SyncFinished(SyncOutcome),
	/// Local storage refused a write, progress is kept in memory from now on
	StorageDegraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncTrigger {
	Manual,
	Scheduled,
}

struct EngineState {
	identity: Identity,
	/// Bumped on every identity change, results of older sessions are discarded
	session: u64,
	phase: EnginePhase,
	log: EventLog,
	ledger: SyncLedger,
	snapshot: Arc<ProgressSnapshot>,
}

struct Inner {
	ctx: EngineContext,
	config: EngineConfig,
	registry: ResolverRegistry,
	client_id: String,
	health: StorageHealth,
	state: Mutex<EngineState>,
	snapshot_tx: watch::Sender<Arc<ProgressSnapshot>>,
	notices_tx: broadcast::Sender<SyncNotice>,
	/// Only the most recently scheduled sync timer may fire
	timer_generation: AtomicU64,
}

/// Owns the progress log of the active identity and keeps it synchronized
///
/// Cloning is cheap and every clone drives the same engine. The engine starts as a guest; hosts
/// report authentication changes through [`ProgressEngine::set_identity`].
#[derive(Clone)]
pub struct ProgressEngine {
	inner: Arc<Inner>,
}

impl ProgressEngine {
	pub fn new(ctx: EngineContext, config: EngineConfig) -> Self {
		Self::with_registry(ctx, config, ResolverRegistry::with_defaults())
	}

	pub fn with_registry(
		ctx: EngineContext,
		config: EngineConfig,
		registry: ResolverRegistry,
	) -> Self {
		let health = StorageHealth::new();
		let client_id = load_client_id(ctx.store.as_ref(), ctx.ids.as_ref(), &health);

		let log = EventLog::load(Identity::Guest, Arc::clone(&ctx.store), health.clone());
		let mut ledger = SyncLedger::default();
		for event in log.events() {
			ledger.track_local(&event.event_id);
		}
		let snapshot = Arc::new(reduce_events(log.events()));

		let (snapshot_tx, _) = watch::channel(Arc::clone(&snapshot));
		let (notices_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

		debug!(%client_id, events = log.len(), "Learning progress engine started");

		Self {
			inner: Arc::new(Inner {
				ctx,
				config,
				registry,
				client_id,
				health,
				state: Mutex::new(EngineState {
					identity: Identity::Guest,
					session: 0,
					phase: EnginePhase::Idle,
					log,
					ledger,
					snapshot,
				}),
				snapshot_tx,
				notices_tx,
				timer_generation: AtomicU64::new(0),
			}),
		}
	}

	/// Latest published snapshot
	pub fn snapshot(&self) -> Arc<ProgressSnapshot> {
		Arc::clone(&self.inner.snapshot_tx.borrow())
	}

	/// Receiver that observes every published snapshot
	pub fn subscribe(&self) -> watch::Receiver<Arc<ProgressSnapshot>> {
		self.inner.snapshot_tx.subscribe()
	}

	pub fn sync_notices(&self) -> broadcast::Receiver<SyncNotice> {
		self.inner.notices_tx.subscribe()
	}

	pub fn client_id(&self) -> &str {
		&self.inner.client_id
	}

	pub fn config(&self) -> &EngineConfig {
		&self.inner.config
	}

	pub fn registry(&self) -> &ResolverRegistry {
		&self.inner.registry
	}

	/// Whether a quota failure switched persistence to memory only
	pub fn is_storage_degraded(&self) -> bool {
		self.inner.health.is_blocked()
	}

	pub async fn identity(&self) -> Identity {
		self.inner.state.lock().await.identity.clone()
	}

	pub async fn is_bootstrapping(&self) -> bool {
		self.inner.state.lock().await.phase.is_bootstrapping()
	}

	/// The active log, in chronological order
	pub async fn events(&self) -> Vec<ProgressEvent> {
		let mut events = self.inner.state.lock().await.log.events().to_vec();
		crate::reducer::sort_events(&mut events);
		events
	}

	pub async fn sync_entry(&self, event_id: &EventId) -> Option<SyncEntry> {
		self.inner.state.lock().await.ledger.entry(event_id).cloned()
	}

	/// Events still waiting for an automatic push
	pub async fn pending_count(&self) -> usize {
		self.inner
			.state
			.lock()
			.await
			.ledger
			.pending_count(self.inner.config.max_retries)
	}

	pub async fn last_successful_sync_at(&self) -> Option<DateTime<Utc>> {
		self.inner.state.lock().await.ledger.last_successful_sync_at
	}

	pub async fn set_auth_state(&self, auth: &AuthState) {
		self.set_identity(auth.identity()).await;
	}

	/// Switch the active identity.
	///
	/// Signing in runs the bootstrap: the guest log, the user's local log and the remote log are
	/// merged, and mutations dispatched meanwhile are replayed on top once it completes.
	pub async fn set_identity(&self, identity: Identity) {
		match identity {
			Identity::Guest => self.enter_guest().await,
			Identity::User(user_id) => self.bootstrap(user_id).await,
		}
	}

	pub async fn save_content_progress(&self, input: SaveContentProgressInput) -> Result<(), Error> {
		let payload = input.into_payload();
		payload.validate()?;
		self.submit(Mutation::SaveContentProgress(payload)).await
	}

	/// Resolve an interaction through the registry and record the result.
	///
	/// While a bootstrap is running the action is queued and resolved against the merged
	/// snapshot afterwards.
	pub async fn dispatch_interaction_action(&self, action: InteractionAction) -> Result<(), Error> {
		let action_type = action.action_type();
		if !self.inner.registry.has_resolver(action_type) {
			return Err(ResolverError::Unregistered(action_type).into());
		}
		self.submit(Mutation::Interaction(action)).await
	}

	pub async fn save_onboarding(&self, input: SaveOnboardingInput) -> Result<(), Error> {
		if input.path_id.is_empty() {
			return Err(crate::event::EventError::EmptyField("pathId").into());
		}
		self.submit(Mutation::SaveOnboarding(input)).await
	}

	pub async fn set_active_path(&self, path_id: Option<String>) -> Result<(), Error> {
		self.submit(Mutation::SetActivePath(path_id)).await
	}

	pub async fn reset_onboarding(&self) -> Result<(), Error> {
		self.submit(Mutation::ResetOnboarding).await
	}

	/// Append a `progress.reset`; earlier events stay in the log but stop counting
	pub async fn clear_progress(&self) -> Result<(), Error> {
		self.submit(Mutation::ClearProgress).await
	}

	/// Push pending events (including those that ran out of automatic retries), then pull.
	pub async fn sync(&self) -> SyncOutcome {
		self.run_sync(SyncTrigger::Manual).await
	}

	/// Called by the host when the network comes back
	pub fn connectivity_restored(&self) {
		self.schedule_sync(Duration::ZERO);
	}

	async fn submit(&self, mutation: Mutation) -> Result<(), Error> {
		let pending = PendingMutation {
			queued_at: self.inner.ctx.clock.now(),
			mutation,
		};

		let mut state = self.inner.state.lock().await;
		let Some(pending) = state.phase.buffer(pending) else {
			debug!("Bootstrap in progress, mutation queued");
			return Ok(());
		};

		self.apply_mutation(&mut state, pending)?;
		let signed_in = !state.identity.is_guest();
		drop(state);

		if signed_in {
			self.schedule_sync(self.inner.config.push_debounce());
		}
		Ok(())
	}

	fn apply_mutation(&self, state: &mut EngineState, pending: PendingMutation) -> Result<(), Error> {
		let PendingMutation {
			queued_at,
			mutation,
		} = pending;

		let kind = match mutation {
			Mutation::SaveContentProgress(payload) => EventKind::ContentProgressed(payload),
			Mutation::Interaction(action) => {
				let ctx = ResolverContext::new(&state.snapshot, queued_at);
				let payload = self.inner.registry.resolve(&action, &ctx)?.into_payload();
				payload.validate()?;
				EventKind::ContentProgressed(payload)
			}
			Mutation::SaveOnboarding(input) => {
				EventKind::OnboardingCompleted(OnboardingCompletedPayload {
					path_id: input.path_id,
					related_paths: input.related_paths,
				})
			}
			Mutation::SetActivePath(path_id) => {
				EventKind::ActivePathSet(ActivePathSetPayload { path_id })
			}
			Mutation::ResetOnboarding => EventKind::OnboardingReset,
			Mutation::ClearProgress => {
				state.ledger.remote_snapshot = None;
				EventKind::ProgressReset
			}
		};

		let event = ProgressEvent::new(
			self.inner.ctx.ids.next_id(),
			queued_at,
			self.inner.client_id.clone(),
			kind,
		);
		self.record_local(state, event);

		Ok(())
	}

	fn record_local(&self, state: &mut EngineState, event: ProgressEvent) {
		let event_id = event.event_id.clone();
		let in_order = state
			.snapshot
			.last_updated
			.map_or(true, |last| event.occurred_at > last);

		let outcome = state.log.append(event.clone());
		match &outcome {
			AppendOutcome::Duplicate => {
				debug!(%event_id, "Ignoring duplicate progress event");
				return;
			}
			AppendOutcome::Persisted => state.ledger.track_local(&event_id),
			AppendOutcome::MemoryOnly(e) => {
				let message = if e.is_quota() {
					QUOTA_EXCEEDED_MESSAGE.to_string()
				} else {
					e.to_string()
				};
				state.ledger.mark_storage_error(&event_id, &message);
				warn!(%event_id, error = %e, "Progress event kept in memory only");

				if matches!(e, StorageError::QuotaExceeded { .. }) {
					self.notify(SyncNotice::StorageDegraded);
				}
			}
		}

		if in_order {
			apply_event(Arc::make_mut(&mut state.snapshot), &event);
		} else {
			state.snapshot = Arc::new(derive_snapshot(&state.log, &state.ledger));
		}

		self.persist_snapshot(state);
		self.persist_ledger(state);
		self.publish(state);
	}

	async fn enter_guest(&self) {
		let mut state = self.inner.state.lock().await;
		if state.identity.is_guest() {
			return;
		}

		state.session += 1;
		self.cancel_timer();
		let queued = state.phase.transition(EnginePhase::Idle);

		let log = EventLog::load(
			Identity::Guest,
			Arc::clone(&self.inner.ctx.store),
			self.inner.health.clone(),
		);
		let mut ledger = SyncLedger::default();
		for event in log.events() {
			ledger.track_local(&event.event_id);
		}
		state.snapshot = Arc::new(reduce_events(log.events()));
		state.log = log;
		state.ledger = ledger;
		state.identity = Identity::Guest;

		info!(events = state.log.len(), "Switched to guest progress");

		self.replay(&mut state, queued);
		self.publish(&state);
	}

	async fn bootstrap(&self, user_id: UserId) {
		let identity = Identity::User(user_id.clone());

		let (session, cursor) = {
			let mut state = self.inner.state.lock().await;
			if state.identity == identity {
				debug!(%user_id, "Identity unchanged, skipping bootstrap");
				return;
			}

			state.session += 1;
			let queued = state.phase.transition(EnginePhase::Idle);
			state.phase = EnginePhase::Bootstrapping { queued };
			state.identity = identity.clone();

			let cursor = SyncLedger::load(self.inner.ctx.store.as_ref(), &identity).cursor;
			(state.session, cursor)
		};
		self.cancel_timer();

		info!(%user_id, "Bootstrapping learning progress");

		let remote = if self.inner.ctx.connectivity.is_online() {
			match self.inner.ctx.remote.fetch(cursor.as_deref()).await {
				Ok(batch) => Some(batch),
				Err(e) => {
					warn!(%user_id, error = %e, "Remote progress unavailable, continuing with local data");
					None
				}
			}
		} else {
			debug!(%user_id, "Offline, bootstrapping from local data only");
			None
		};

		let mut guard = self.inner.state.lock().await;
		let state = &mut *guard;
		if state.session != session {
			debug!(%user_id, "Bootstrap superseded by a newer identity change");
			return;
		}

		let now = self.inner.ctx.clock.now();
		let store = &self.inner.ctx.store;
		let guest = EventLog::load(Identity::Guest, Arc::clone(store), self.inner.health.clone());
		let mut log = EventLog::load(identity.clone(), Arc::clone(store), self.inner.health.clone());
		let mut ledger = SyncLedger::load(store.as_ref(), &identity);

		let from_guest = log.merge(guest.events().iter().cloned());
		for event in log.events() {
			ledger.track_local(&event.event_id);
		}
		if !guest.is_empty() {
			ledger.guest_cleanup_pending = true;
		}

		let remote_reachable = remote.is_some();
		let mut from_remote = 0;
		if let Some(batch) = remote {
			for event in &batch.events {
				ledger.mark_synced(&event.event_id, now);
			}
			ledger.absorb_remote_snapshot(&batch.events, batch.snapshot);
			from_remote = log.merge(batch.events);
			if batch.cursor.is_some() {
				ledger.cursor = batch.cursor;
			}
		}

		if let Err(e) = log.persist() {
			warn!(%user_id, error = %e, "Failed to persist merged progress log");
		}
		state.snapshot = Arc::new(derive_snapshot(&log, &ledger));
		state.log = log;
		state.ledger = ledger;
		self.persist_snapshot(state);

		let queued = state.phase.transition(EnginePhase::Idle);
		let replayed = queued.len();
		self.replay(state, queued);

		self.persist_ledger(state);
		self.publish(state);

		let events = state.log.len();
		let pending = state.ledger.pending_count(self.inner.config.max_retries);
		drop(guard);

		info!(
			%user_id,
			events,
			from_guest,
			from_remote,
			replayed,
			pending,
			remote_reachable,
			"Learning progress bootstrapped"
		);
		self.notify(SyncNotice::Bootstrapped {
			user_id,
			events,
			remote_reachable,
		});

		if pending > 0 {
			self.schedule_sync(self.inner.config.push_debounce());
		}
	}

	fn replay(&self, state: &mut EngineState, queued: Vec<PendingMutation>) {
		for pending in queued {
			if let Err(e) = self.apply_mutation(state, pending) {
				warn!(error = %e, "Dropping queued mutation");
			}
		}
	}

	async fn run_sync(&self, trigger: SyncTrigger) -> SyncOutcome {
		let outcome = self.sync_once(trigger).await;

		if let SyncOutcome::Skipped(reason) = outcome {
			trace!(?reason, ?trigger, "Progress sync skipped");
			return outcome;
		}

		match &outcome {
			SyncOutcome::Failed {
				retry_in: Some(delay),
				..
			} => self.schedule_sync(*delay),
			SyncOutcome::Skipped(_) | SyncOutcome::Superseded => {}
			SyncOutcome::Pushed { .. }
			| SyncOutcome::Pulled { .. }
			| SyncOutcome::Failed { .. } => {
				// Timers of events recorded while this sync was in flight were skipped
				if self.pending_count().await > 0 {
					self.schedule_sync(self.inner.config.push_debounce());
				}
			}
		}

		self.notify(SyncNotice::SyncFinished(outcome.clone()));
		outcome
	}

	async fn sync_once(&self, trigger: SyncTrigger) -> SyncOutcome {
		if !self.inner.ctx.connectivity.is_online() {
			debug!("Offline, deferring progress sync");
			return SyncOutcome::Skipped(SyncSkipReason::Offline);
		}

		let (session, events) = {
			let mut guard = self.inner.state.lock().await;
			let state = &mut *guard;
			if state.phase.is_bootstrapping() {
				return SyncOutcome::Skipped(SyncSkipReason::Bootstrapping);
			}
			if state.phase.is_syncing() {
				return SyncOutcome::Skipped(SyncSkipReason::InFlight);
			}
			if state.identity.is_guest() {
				return SyncOutcome::Skipped(SyncSkipReason::Guest);
			}

			let pending = state.ledger.pending(
				trigger == SyncTrigger::Manual,
				self.inner.config.max_retries,
			);
			let events = state
				.log
				.events()
				.iter()
				.filter(|event| pending.contains(&event.event_id))
				.cloned()
				.collect::<Vec<_>>();

			state.phase.transition(EnginePhase::Syncing);
			if !events.is_empty() {
				let now = self.inner.ctx.clock.now();
				state
					.ledger
					.begin_push(events.iter().map(|event| &event.event_id), now);
				self.persist_ledger(state);
			}

			(state.session, events)
		};

		let outcome = if events.is_empty() {
			match self.pull(session).await {
				Ok(pulled) => SyncOutcome::Pulled { events: pulled },
				Err(e) => {
					warn!(error = %e, "Failed to pull remote progress");
					SyncOutcome::Failed {
						error: e.to_string(),
						retry_in: None,
					}
				}
			}
		} else {
			self.push(session, events).await
		};

		let mut state = self.inner.state.lock().await;
		if state.session == session && state.phase.is_syncing() {
			state.phase.transition(EnginePhase::Idle);
		}

		outcome
	}

	async fn push(&self, session: u64, events: Vec<ProgressEvent>) -> SyncOutcome {
		let ids = events
			.iter()
			.map(|event| event.event_id.clone())
			.collect::<Vec<_>>();
		let request = PushRequest {
			client_updated_at: self.inner.ctx.clock.now(),
			events,
		};

		debug!(events = ids.len(), "Pushing local progress");

		match self.inner.ctx.remote.push(&request).await {
			Ok(()) => {
				{
					let mut state = self.inner.state.lock().await;
					if state.session != session {
						return SyncOutcome::Superseded;
					}
					let now = self.inner.ctx.clock.now();
					state.ledger.complete_push(&ids, now);
					self.persist_ledger(&state);
				}

				info!(events = ids.len(), "Local progress pushed");

				let pulled = match self.pull(session).await {
					Ok(pulled) => pulled,
					Err(e) => {
						warn!(error = %e, "Failed to pull remote progress after push");
						0
					}
				};

				let mut state = self.inner.state.lock().await;
				if state.session == session {
					self.cleanup_guest(&mut state);
				}

				SyncOutcome::Pushed {
					events: ids.len(),
					pulled,
				}
			}
			Err(e) => {
				let mut state = self.inner.state.lock().await;
				if state.session != session {
					return SyncOutcome::Superseded;
				}

				let error = e.to_string();
				let next_attempt =
					state
						.ledger
						.fail_push(&ids, &error, self.inner.config.max_retries);
				self.persist_ledger(&state);

				let retry_in = next_attempt.map(|attempt| self.inner.config.retry_delay(attempt));
				warn!(error = %e, events = ids.len(), ?retry_in, "Failed to push local progress");

				SyncOutcome::Failed { error, retry_in }
			}
		}
	}

	/// Fetch remote events after the stored cursor and fold them in
	async fn pull(&self, session: u64) -> Result<usize, RemoteError> {
		let cursor = {
			let state = self.inner.state.lock().await;
			if state.session != session {
				return Ok(0);
			}
			state.ledger.cursor.clone()
		};

		let batch = self.inner.ctx.remote.fetch(cursor.as_deref()).await?;

		let mut guard = self.inner.state.lock().await;
		let state = &mut *guard;
		if state.session != session {
			return Ok(0);
		}

		let now = self.inner.ctx.clock.now();
		for event in &batch.events {
			state.ledger.mark_synced(&event.event_id, now);
		}
		let snapshot_changed = state
			.ledger
			.absorb_remote_snapshot(&batch.events, batch.snapshot);
		let added = state.log.merge(batch.events);
		if batch.cursor.is_some() {
			state.ledger.cursor = batch.cursor;
		}

		if added > 0 || snapshot_changed {
			if added > 0 {
				if let Err(e) = state.log.persist() {
					debug!(error = %e, "Pulled events kept in memory only");
				}
			}
			state.snapshot = Arc::new(derive_snapshot(&state.log, &state.ledger));
			self.persist_snapshot(state);
			self.publish(state);
		}
		self.persist_ledger(state);

		debug!(added, "Pulled remote progress");

		Ok(added)
	}

	/// Remove the guest log once every guest event is known to the remote
	fn cleanup_guest(&self, state: &mut EngineState) {
		if !state.ledger.guest_cleanup_pending {
			return;
		}

		let mut guest = EventLog::load(
			Identity::Guest,
			Arc::clone(&self.inner.ctx.store),
			self.inner.health.clone(),
		);
		if !guest
			.events()
			.iter()
			.all(|event| state.ledger.is_synced(&event.event_id))
		{
			return;
		}

		let events = guest.len();
		match guest.clear() {
			Ok(()) => {
				state.ledger.guest_cleanup_pending = false;
				self.persist_ledger(state);
				info!(events, "Cleared guest progress after sync");
			}
			Err(e) => warn!(error = %e, "Failed to clear guest progress"),
		}
	}

	fn schedule_sync(&self, delay: Duration) {
		let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;

		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			warn!("No async runtime available, progress sync not scheduled");
			return;
		};

		let engine = self.clone();
		runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			if engine.inner.timer_generation.load(Ordering::SeqCst) != generation {
				trace!("Sync timer superseded");
				return;
			}
			engine.run_sync(SyncTrigger::Scheduled).await;
		});
	}

	fn cancel_timer(&self) {
		self.inner.timer_generation.fetch_add(1, Ordering::SeqCst);
	}

	fn persist_snapshot(&self, state: &EngineState) {
		if let Err(e) = state.log.persist_snapshot(&state.snapshot) {
			log_persist_error("snapshot", &e);
		}
	}

	fn persist_ledger(&self, state: &EngineState) {
		if let Err(e) = state.ledger.persist(
			self.inner.ctx.store.as_ref(),
			&state.identity,
			&self.inner.health,
		) {
			log_persist_error("sync metadata", &e);
		}
	}

	fn publish(&self, state: &EngineState) {
		self.inner
			.snapshot_tx
			.send_replace(Arc::clone(&state.snapshot));
	}

	fn notify(&self, notice: SyncNotice) {
		if self.inner.notices_tx.send(notice).is_err() {
			trace!("No sync notice subscribers");
		}
	}
}

fn log_persist_error(what: &str, e: &StorageError) {
	if matches!(e, StorageError::Blocked) {
		trace!(what, "Storage blocked, skipping write");
	} else {
		warn!(what, error = %e, "Failed to persist learning progress");
	}
}

/// Reduce `log`, layering in whatever snapshot the remote handed out without events
fn derive_snapshot(log: &EventLog, ledger: &SyncLedger) -> ProgressSnapshot {
	let reduced = reduce_events(log.events());
	match &ledger.remote_snapshot {
		Some(remote) => merge_snapshots(&reduced, remote),
		None => reduced,
	}
}

/// Stable per-device id stamped on every local event
fn load_client_id(store: &dyn KeyValueStore, ids: &dyn IdGenerator, health: &StorageHealth) -> String {
	match store.get(CLIENT_ID_KEY) {
		Ok(Some(id)) if !id.trim().is_empty() => return id,
		Ok(_) => {}
		Err(e) => warn!(error = %e, "Failed to read client id"),
	}

	let id = ids.next_id();
	if let Err(e) = health.guard(|| store.set(CLIENT_ID_KEY, &id)) {
		warn!(error = %e, "Failed to persist client id");
	}
	id
}

#[cfg(test)]
mod tests {
	use chrono::Duration as ChronoDuration;

	use super::*;
	use crate::{
		capability::{FakeClock, SequentialIds},
		event::ContentStatus,
		store::MemoryStore,
		sync::remote::OfflineRemote,
	};

	fn engine_with(store: Arc<MemoryStore>, clock: FakeClock) -> ProgressEngine {
		let ctx = EngineContext::new(store, Arc::new(OfflineRemote))
			.with_clock(Arc::new(clock))
			.with_ids(Arc::new(SequentialIds::default()));
		ProgressEngine::new(ctx, EngineConfig::default())
	}

	fn start() -> DateTime<Utc> {
		"2025-01-15T10:00:00Z".parse().unwrap()
	}

	#[tokio::test]
	async fn test_client_id_is_stable_across_restarts() {
		let store = Arc::new(MemoryStore::new());
		let first = engine_with(Arc::clone(&store), FakeClock::new(start()));
		let second = engine_with(store, FakeClock::new(start()));

		assert_eq!(first.client_id(), second.client_id());
	}

	#[tokio::test]
	async fn test_guest_mutations_update_snapshot_and_storage() {
		let store = Arc::new(MemoryStore::new());
		let clock = FakeClock::new(start());
		let engine = engine_with(Arc::clone(&store), clock.clone());
		let mut updates = engine.subscribe();

		engine
			.save_content_progress(
				SaveContentProgressInput::new("lesson-1", ContentStatus::Completed).with_score(88.0),
			)
			.await
			.unwrap();
		assert!(updates.has_changed().unwrap());

		clock.advance(ChronoDuration::minutes(1));
		engine
			.save_onboarding(SaveOnboardingInput {
				path_id: "citizen".to_string(),
				related_paths: Vec::new(),
			})
			.await
			.unwrap();

		let snapshot = engine.snapshot();
		assert_eq!(snapshot.completed_count(), 1);
		assert_eq!(snapshot.onboarding.path_id.as_deref(), Some("citizen"));
		assert_eq!(snapshot.last_updated, Some(start() + ChronoDuration::minutes(1)));

		let reloaded = engine_with(store, clock);
		assert_eq!(*reloaded.snapshot(), *snapshot);
	}

	#[tokio::test]
	async fn test_invalid_input_rejected_without_event() {
		let engine = engine_with(Arc::new(MemoryStore::new()), FakeClock::new(start()));

		let result = engine
			.save_content_progress(SaveContentProgressInput::new("", ContentStatus::InProgress))
			.await;
		assert!(matches!(result, Err(Error::Event(_))));

		let result = engine
			.save_onboarding(SaveOnboardingInput {
				path_id: String::new(),
				related_paths: Vec::new(),
			})
			.await;
		assert!(result.is_err());
		assert!(engine.events().await.is_empty());
	}

	#[tokio::test]
	async fn test_unregistered_action_fails_fast() {
		let ctx = EngineContext::new(Arc::new(MemoryStore::new()), Arc::new(OfflineRemote));
		let engine =
			ProgressEngine::with_registry(ctx, EngineConfig::default(), ResolverRegistry::new());

		let result = engine
			.dispatch_interaction_action(InteractionAction::LessonComplete {
				content_id: "lesson-1".to_string(),
				content_version: None,
			})
			.await;

		assert!(matches!(
			result,
			Err(Error::Resolver(ResolverError::Unregistered(_)))
		));
	}

	#[tokio::test]
	async fn test_guest_sync_is_skipped() {
		let engine = engine_with(Arc::new(MemoryStore::new()), FakeClock::new(start()));

		assert_eq!(
			engine.sync().await,
			SyncOutcome::Skipped(SyncSkipReason::Guest)
		);
	}

	#[tokio::test]
	async fn test_clear_progress_keeps_history() {
		let clock = FakeClock::new(start());
		let engine = engine_with(Arc::new(MemoryStore::new()), clock.clone());

		engine
			.save_content_progress(SaveContentProgressInput::new("lesson-1", ContentStatus::Completed))
			.await
			.unwrap();
		clock.advance(ChronoDuration::seconds(1));
		engine.clear_progress().await.unwrap();

		assert!(engine.snapshot().content.is_empty());
		assert_eq!(engine.events().await.len(), 2);
	}

	#[tokio::test]
	async fn test_out_of_order_event_triggers_full_reduce() {
		let clock = FakeClock::new(start());
		let engine = engine_with(Arc::new(MemoryStore::new()), clock.clone());

		engine
			.save_content_progress(SaveContentProgressInput::new("lesson-1", ContentStatus::InProgress))
			.await
			.unwrap();
		clock.set(start() - ChronoDuration::hours(1));
		engine.clear_progress().await.unwrap();

		let snapshot = engine.snapshot();
		assert_eq!(*snapshot, reduce_events(&engine.events().await));
		assert!(snapshot.content("lesson-1").is_some());
	}
}
