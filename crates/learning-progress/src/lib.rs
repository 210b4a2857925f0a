//!
//! # Learning Progress
//!
//! Event-sourced progress tracking for the learning module of the budget dashboard.
//!
//! Every user interaction (a quiz answer, a simulator step, a finished lesson) becomes an
//! immutable [`ProgressEvent`] appended to a per-identity log. The current state is never edited
//! by hand: it is always the result of folding that log with [`reduce_events`], which is
//! deterministic for any permutation of the same events and monotonic for content status.
//!
//! The [`ProgressEngine`] owns the log for the active identity and keeps it in step with a remote
//! authority:
//! - Guest progress is merged into the user's log when they sign in;
//! - Local appends are pushed after a short debounce, with bounded exponential retries;
//! - Remote events written by other devices are pulled incrementally through a cursor;
//! - A full local store degrades to memory-only persistence instead of losing events.
//!
//! ## Basic example
//!
//! ```
//! use learning_progress::{
//! 	ContentStatus, EngineConfig, EngineContext, InteractionAction, MemoryStore, OfflineRemote,
//! 	ProgressEngine,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), learning_progress::Error> {
//! 	let context = EngineContext::new(Arc::new(MemoryStore::new()), Arc::new(OfflineRemote));
//! 	let engine = ProgressEngine::new(context, EngineConfig::default());
//!
//! 	engine
//! 		.dispatch_interaction_action(InteractionAction::QuizAnswer {
//! 			content_id: "budget-basics".to_string(),
//! 			interaction_id: "quiz-1".to_string(),
//! 			selected_option_id: "b".to_string(),
//! 			score: 100.0,
//! 			content_version: None,
//! 		})
//! 		.await?;
//!
//! 	let snapshot = engine.snapshot();
//! 	assert_eq!(
//! 		snapshot.content("budget-basics").map(|c| c.status),
//! 		Some(ContentStatus::Passed)
//! 	);
//!
//! 	Ok(())
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod capability;
pub mod config;
pub mod event;
pub mod identity;
pub mod interaction;
pub mod reducer;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod streak;
pub mod sync;

pub use capability::{
	AlwaysOnline, Clock, Connectivity, ConnectivityFlag, FakeClock, IdGenerator, SequentialIds,
	SystemClock, UuidGenerator,
};
pub use config::{ConfigError, EngineConfig};
pub use event::{
	parse_events, ActivePathSetPayload, ContentProgressedPayload, ContentStatus, EventError,
	EventId, EventKind, EventType, InteractionUpdate, OnboardingCompletedPayload, ProgressEvent,
};
pub use identity::{AuthState, Identity, UserId};
pub use interaction::{
	AllocatorStep, BudgetAllocatorState, BudgetCycleState, BudgetPhase, InteractionState,
	PredictionReveal, PredictionState, QuizState, SalaryCalculatorState, SalaryStep,
	UatFinderState, UatFinderStep,
};
pub use reducer::{apply_event, reduce_events, sort_events};
pub use resolver::{
	ActionType, InteractionAction, InteractionResolver, ResetTarget, ResolverContext,
	ResolverError, ResolverRegistry, SaveContentProgressInput, QUIZ_PASS_THRESHOLD,
};
pub use snapshot::{ContentProgress, OnboardingState, ProgressSnapshot};
pub use store::{
	AppendOutcome, EventLog, FileStore, KeyValueStore, MemoryStore, StorageError, StorageHealth,
	QUOTA_EXCEEDED_MESSAGE,
};
pub use streak::StreakState;
pub use sync::{
	merge_content_progress, merge_event_logs, merge_snapshots, EngineContext, HttpRemote, OfflineRemote, ProgressEngine, PushRequest,
	RemoteBatch, RemoteError, RemoteProgress, SaveOnboardingInput, StaticToken, SyncEntry,
	SyncLedger, SyncNotice, SyncOutcome, SyncSkipReason, SyncStatus, TokenSource,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Resolver(#[from] ResolverError),
	#[error("invalid progress data: {0}")]
	Event(#[from] EventError),
}
