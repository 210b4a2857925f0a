//! Synchronization with the remote authority
//!
//! The [`ProgressEngine`] drives the whole lifecycle: bootstrap on sign-in, debounced pushes of
//! local events, bounded retries with backoff, and incremental pulls through an opaque cursor.
//! Per-event state lives in a [`SyncLedger`] persisted next to the user's log.

mod engine;
mod http;
mod ledger;
mod merge;
mod remote;
mod state;

pub use engine::{
	EngineContext, ProgressEngine, SaveOnboardingInput, SyncNotice, SyncOutcome, SyncSkipReason,
};
pub use http::{HttpRemote, StaticToken, TokenSource};
pub use ledger::{SyncEntry, SyncLedger, SyncStatus};
pub use merge::{merge_content_progress, merge_event_logs, merge_snapshots};
pub use remote::{OfflineRemote, PushRequest, RemoteBatch, RemoteError, RemoteProgress};
