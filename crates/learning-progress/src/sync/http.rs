use std::{fmt, sync::Arc};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::remote::{PushRequest, RemoteBatch, RemoteError, RemoteProgress};
use crate::{event::parse_events, snapshot::ProgressSnapshot};

/// Supplies the bearer credential of the signed-in user
pub trait TokenSource: Send + Sync {
	fn bearer_token(&self) -> Option<String>;
}

#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
	pub fn new(token: impl Into<String>) -> Self {
		Self(token.into())
	}
}

impl fmt::Debug for StaticToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("StaticToken(***)")
	}
}

impl TokenSource for StaticToken {
	fn bearer_token(&self) -> Option<String> {
		Some(self.0.clone())
	}
}

#[derive(Deserialize)]
struct FetchResponse {
	#[serde(default)]
	events: Value,
	#[serde(default)]
	cursor: Option<String>,
	#[serde(default)]
	snapshot: Value,
}

/// A malformed snapshot is dropped rather than failing the whole pull
fn parse_snapshot(value: Value) -> Option<ProgressSnapshot> {
	if value.is_null() {
		return None;
	}

	serde_json::from_value(value)
		.map_err(|e| warn!(error = %e, "Ignoring unreadable remote snapshot"))
		.ok()
}

/// JSON-over-HTTP remote
///
/// - `GET {base}/progress?since={cursor}` answers `{ "snapshot": {...}, "events": [...], "cursor": "..." }`
/// - `PUT {base}/progress` takes a [`PushRequest`]
pub struct HttpRemote {
	client: Client,
	endpoint: String,
	token: Arc<dyn TokenSource>,
}

impl HttpRemote {
	pub fn new(base_url: impl AsRef<str>, token: Arc<dyn TokenSource>) -> Self {
		Self::with_client(Client::new(), base_url, token)
	}

	pub fn with_client(client: Client, base_url: impl AsRef<str>, token: Arc<dyn TokenSource>) -> Self {
		Self {
			client,
			endpoint: format!("{}/progress", base_url.as_ref().trim_end_matches('/')),
			token,
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
		match self.token.bearer_token() {
			Some(token) => request.bearer_auth(token),
			None => request,
		}
	}
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();
	Err(RemoteError::Status {
		status: status.as_u16(),
		body,
	})
}

#[async_trait]
impl RemoteProgress for HttpRemote {
	async fn fetch(&self, since: Option<&str>) -> Result<RemoteBatch, RemoteError> {
		let mut request = self.client.get(&self.endpoint);
		if let Some(since) = since {
			request = request.query(&[("since", since)]);
		}

		let response = check_status(self.authorized(request).send().await?).await?;
		let body: FetchResponse = serde_json::from_str(&response.text().await?)?;
		let events = parse_events(&body.events);
		let snapshot = parse_snapshot(body.snapshot);

		debug!(
			events = events.len(),
			cursor = ?body.cursor,
			has_snapshot = snapshot.is_some(),
			"Fetched remote progress"
		);

		Ok(RemoteBatch {
			events,
			cursor: body.cursor,
			snapshot,
		})
	}

	async fn push(&self, request: &PushRequest) -> Result<(), RemoteError> {
		let builder = self.client.put(&self.endpoint).json(request);
		check_status(self.authorized(builder).send().await?).await?;

		debug!(events = request.events.len(), "Pushed local progress");

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_endpoint_normalizes_trailing_slash() {
		let remote = HttpRemote::new("https://api.example.org/v1/", Arc::new(StaticToken::new("t")));
		assert_eq!(remote.endpoint(), "https://api.example.org/v1/progress");
	}

	#[test]
	fn test_fetch_response_tolerates_missing_fields() {
		let body: FetchResponse = serde_json::from_str("{}").unwrap();

		assert!(parse_events(&body.events).is_empty());
		assert_eq!(body.cursor, None);
		assert_eq!(parse_snapshot(body.snapshot), None);
	}

	#[test]
	fn test_fetch_response_reads_snapshot() {
		let body: FetchResponse = serde_json::from_str(
			r#"{
				"snapshot": {
					"version": 1,
					"activePathId": "citizen",
					"content": {
						"budget-basics": {
							"contentId": "budget-basics",
							"status": "passed",
							"score": 80,
							"lastAttemptAt": "2025-01-02T00:00:00Z",
							"completedAt": "2025-01-02T00:00:00Z",
							"contentVersion": "v2"
						}
					},
					"lastUpdated": "2025-01-02T00:00:00Z"
				},
				"events": []
			}"#,
		)
		.unwrap();

		let snapshot = parse_snapshot(body.snapshot).unwrap();
		assert_eq!(snapshot.active_path_id.as_deref(), Some("citizen"));
		assert_eq!(
			snapshot.content("budget-basics").and_then(|c| c.score),
			Some(80.0)
		);
		assert_eq!(snapshot.streak, Default::default());
	}

	#[test]
	fn test_malformed_snapshot_is_ignored() {
		let body: FetchResponse =
			serde_json::from_str(r#"{"snapshot": {"content": 12}, "events": []}"#).unwrap();

		assert_eq!(parse_snapshot(body.snapshot), None);
	}
}
