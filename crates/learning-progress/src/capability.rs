//! Host capabilities injected into the engine
//!
//! The engine never reaches for wall-clock time, random identifiers or network state on its own.
//! Production hosts use [`SystemClock`], [`UuidGenerator`] and [`AlwaysOnline`] (or a
//! [`ConnectivityFlag`] wired to the platform's reachability signal), while tests use the fake
//! counterparts for reproducible event ids and timestamps.

use std::sync::{
	atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
	Arc,
};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Source of the timestamps stamped on new events
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock with millisecond resolution
///
/// Clones share the same underlying time, so a test can keep a handle while the engine owns
/// another one.
#[derive(Debug, Clone)]
pub struct FakeClock {
	millis: Arc<AtomicI64>,
}

impl FakeClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
		}
	}

	pub fn advance(&self, delta: Duration) {
		self.millis
			.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
	}

	pub fn set(&self, time: DateTime<Utc>) {
		self.millis.store(time.timestamp_millis(), Ordering::SeqCst);
	}
}

impl Clock for FakeClock {
	fn now(&self) -> DateTime<Utc> {
		DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
	}
}

/// Source of event ids and of the per-device client id
pub trait IdGenerator: Send + Sync {
	fn next_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
	fn next_id(&self) -> String {
		Uuid::new_v4().to_string()
	}
}

/// Predictable ids (`evt-000001`, `evt-000002`, ...) that also sort in generation order
#[derive(Debug)]
pub struct SequentialIds {
	prefix: String,
	counter: AtomicU64,
}

impl SequentialIds {
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			counter: AtomicU64::new(0),
		}
	}
}

impl Default for SequentialIds {
	fn default() -> Self {
		Self::new("evt")
	}
}

impl IdGenerator for SequentialIds {
	fn next_id(&self) -> String {
		let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
		format!("{}-{next:06}", self.prefix)
	}
}

/// Reports whether the remote authority is reachable at all
pub trait Connectivity: Send + Sync {
	fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
	fn is_online(&self) -> bool {
		true
	}
}

/// Shared online/offline toggle, flipped by the host when reachability changes
#[derive(Debug, Clone)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
	pub fn new(online: bool) -> Self {
		Self(Arc::new(AtomicBool::new(online)))
	}

	pub fn set_online(&self, online: bool) {
		self.0.store(online, Ordering::SeqCst);
	}
}

impl Default for ConnectivityFlag {
	fn default() -> Self {
		Self::new(true)
	}
}

impl Connectivity for ConnectivityFlag {
	fn is_online(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}
