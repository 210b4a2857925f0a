use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{event::ProgressEvent, snapshot::ProgressSnapshot};

/// Events the remote returned for a pull, plus the cursor for the next one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteBatch {
	pub events: Vec<ProgressEvent>,
	pub cursor: Option<String>,
	/// Server-side snapshot, for remotes that can hand out state without its events
	pub snapshot: Option<ProgressSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
	pub client_updated_at: DateTime<Utc>,
	pub events: Vec<ProgressEvent>,
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
	#[error("request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("remote answered with status {status}: {body}")]
	Status { status: u16, body: String },
	#[error("failed to decode remote response: {0}")]
	Decode(#[from] serde_json::Error),
	#[error("remote unavailable: {0}")]
	Unavailable(String),
}

/// The authoritative copy of a user's event log
///
/// Implementations are scoped to the signed-in user (usually through the credential they send),
/// so neither call names a user.
#[async_trait]
pub trait RemoteProgress: Send + Sync {
	/// Events recorded after `since`, or the full log when `since` is `None`
	async fn fetch(&self, since: Option<&str>) -> Result<RemoteBatch, RemoteError>;

	/// Idempotent append: events the remote already holds are ignored by id
	async fn push(&self, request: &PushRequest) -> Result<(), RemoteError>;
}

/// Remote for hosts that run without a backend
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemote;

#[async_trait]
impl RemoteProgress for OfflineRemote {
	async fn fetch(&self, _since: Option<&str>) -> Result<RemoteBatch, RemoteError> {
		Err(RemoteError::Unavailable("no remote configured".to_string()))
	}

	async fn push(&self, _request: &PushRequest) -> Result<(), RemoteError> {
		Err(RemoteError::Unavailable("no remote configured".to_string()))
	}
}
