#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use learning_progress::{
	ConnectivityFlag, ContentProgressedPayload, ContentStatus, EngineConfig, EngineContext,
	EventKind, FakeClock, Identity, MemoryStore, ProgressEngine, ProgressEvent, ProgressSnapshot,
	PushRequest, RemoteBatch, RemoteError, RemoteProgress, SequentialIds, UserId,
};
use tokio::sync::Notify;

#[derive(Default)]
struct RemoteState {
	events: Vec<ProgressEvent>,
	snapshot: Option<ProgressSnapshot>,
	failing_pushes: u32,
	failing_fetches: bool,
	push_attempts: usize,
	fetch_calls: usize,
}

/// In-memory remote whose cursor is the number of events already handed out
#[derive(Default)]
pub struct MockRemote {
	state: Mutex<RemoteState>,
	fetch_gate: Mutex<Option<Arc<Notify>>>,
	pub fetch_started: Notify,
}

impl MockRemote {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Events written by another device
	pub fn seed(&self, events: impl IntoIterator<Item = ProgressEvent>) {
		self.state.lock().unwrap().events.extend(events);
	}

	/// State the server only knows as a snapshot, served alongside every fetch
	pub fn seed_snapshot(&self, snapshot: ProgressSnapshot) {
		self.state.lock().unwrap().snapshot = Some(snapshot);
	}

	/// Fail the next `count` pushes (`u32::MAX` fails forever)
	pub fn fail_pushes(&self, count: u32) {
		self.state.lock().unwrap().failing_pushes = count;
	}

	pub fn fail_fetches(&self, failing: bool) {
		self.state.lock().unwrap().failing_fetches = failing;
	}

	/// Hold the next fetch until the returned handle is notified
	pub fn gate_next_fetch(&self) -> Arc<Notify> {
		let gate = Arc::new(Notify::new());
		*self.fetch_gate.lock().unwrap() = Some(Arc::clone(&gate));
		gate
	}

	pub fn push_attempts(&self) -> usize {
		self.state.lock().unwrap().push_attempts
	}

	pub fn fetch_calls(&self) -> usize {
		self.state.lock().unwrap().fetch_calls
	}

	pub fn server_events(&self) -> Vec<ProgressEvent> {
		self.state.lock().unwrap().events.clone()
	}
}

#[async_trait]
impl RemoteProgress for MockRemote {
	async fn fetch(&self, since: Option<&str>) -> Result<RemoteBatch, RemoteError> {
		self.fetch_started.notify_one();

		let gate = self.fetch_gate.lock().unwrap().take();
		if let Some(gate) = gate {
			gate.notified().await;
		}

		let mut state = self.state.lock().unwrap();
		state.fetch_calls += 1;
		if state.failing_fetches {
			return Err(RemoteError::Unavailable("fetch refused".to_string()));
		}

		let start = since
			.and_then(|cursor| cursor.parse::<usize>().ok())
			.unwrap_or(0)
			.min(state.events.len());

		Ok(RemoteBatch {
			events: state.events[start..].to_vec(),
			cursor: Some(state.events.len().to_string()),
			snapshot: state.snapshot.clone(),
		})
	}

	async fn push(&self, request: &PushRequest) -> Result<(), RemoteError> {
		let mut state = self.state.lock().unwrap();
		state.push_attempts += 1;

		if state.failing_pushes > 0 {
			if state.failing_pushes != u32::MAX {
				state.failing_pushes -= 1;
			}
			return Err(RemoteError::Status {
				status: 503,
				body: "unavailable".to_string(),
			});
		}

		for event in &request.events {
			if !state.events.iter().any(|e| e.event_id == event.event_id) {
				state.events.push(event.clone());
			}
		}
		Ok(())
	}
}

pub struct Harness {
	pub engine: ProgressEngine,
	pub store: Arc<MemoryStore>,
	pub remote: Arc<MockRemote>,
	pub clock: FakeClock,
	pub connectivity: ConnectivityFlag,
}

impl Harness {
	/// Engine whose timers never fire during a test, syncs are driven by hand
	pub fn new() -> Self {
		Self::with_config(manual_config())
	}

	pub fn with_config(config: EngineConfig) -> Self {
		let store = Arc::new(MemoryStore::new());
		let remote = MockRemote::new();
		let clock = FakeClock::new(start());
		let connectivity = ConnectivityFlag::new(true);

		let engine = build_engine(&store, &remote, &clock, &connectivity, config);

		Self {
			engine,
			store,
			remote,
			clock,
			connectivity,
		}
	}

	/// A fresh engine over the same storage, as after an app restart
	pub fn restart(&self) -> ProgressEngine {
		build_engine_with_ids(
			&self.store,
			&self.remote,
			&self.clock,
			&self.connectivity,
			manual_config(),
			SequentialIds::new("restarted"),
		)
	}

	pub fn tick(&self) {
		self.clock.advance(Duration::seconds(30));
	}

	pub fn stored_events(&self, key: &str) -> Vec<ProgressEvent> {
		use learning_progress::KeyValueStore;

		self.store
			.get(key)
			.unwrap()
			.map(|raw| serde_json::from_str(&raw).unwrap())
			.unwrap_or_default()
	}
}

fn build_engine(
	store: &Arc<MemoryStore>,
	remote: &Arc<MockRemote>,
	clock: &FakeClock,
	connectivity: &ConnectivityFlag,
	config: EngineConfig,
) -> ProgressEngine {
	build_engine_with_ids(store, remote, clock, connectivity, config, SequentialIds::default())
}

fn build_engine_with_ids(
	store: &Arc<MemoryStore>,
	remote: &Arc<MockRemote>,
	clock: &FakeClock,
	connectivity: &ConnectivityFlag,
	config: EngineConfig,
	ids: SequentialIds,
) -> ProgressEngine {
	let ctx = EngineContext::new(store.clone(), remote.clone())
		.with_clock(Arc::new(clock.clone()))
		.with_ids(Arc::new(ids))
		.with_connectivity(Arc::new(connectivity.clone()));

	ProgressEngine::new(ctx, config)
}

pub fn manual_config() -> EngineConfig {
	EngineConfig {
		push_debounce_ms: 3_600_000,
		retry_delays_ms: vec![3_600_000],
		..EngineConfig::default()
	}
}

pub fn start() -> DateTime<Utc> {
	"2025-01-15T10:00:00Z".parse().unwrap()
}

pub fn user(id: &str) -> Identity {
	Identity::User(UserId::new(id))
}

/// An event recorded on another device
pub fn phone_event(id: &str, minutes: i64, content_id: &str, status: ContentStatus) -> ProgressEvent {
	ProgressEvent::new(
		id,
		start() + Duration::minutes(minutes),
		"phone",
		EventKind::ContentProgressed(ContentProgressedPayload {
			content_id: content_id.to_string(),
			status,
			score: None,
			content_version: None,
			interaction: None,
		}),
	)
}
