//! Progress events and their wire format
//!
//! Events are the only source of truth. They are validated once, at the boundary, when they are
//! deserialized from storage or from the remote; everything past this module works with typed
//! [`EventKind`] payloads.

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use tracing::warn;

use crate::interaction::InteractionState;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for EventId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for EventId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// Completion status of a content item, ordered by rank
///
/// The derived ordering is the monotonic ranking the reducer relies on:
/// `NotStarted < InProgress < Completed < Passed`.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Default,
	Serialize,
	Deserialize,
	Display,
	EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentStatus {
	#[default]
	NotStarted,
	InProgress,
	Completed,
	Passed,
}

impl ContentStatus {
	pub const fn is_complete(self) -> bool {
		matches!(self, Self::Completed | Self::Passed)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum EventType {
	#[strum(serialize = "content.progressed")]
	ContentProgressed,
	#[strum(serialize = "onboarding.completed")]
	OnboardingCompleted,
	#[strum(serialize = "onboarding.reset")]
	OnboardingReset,
	#[strum(serialize = "activePath.set")]
	ActivePathSet,
	#[strum(serialize = "progress.reset")]
	ProgressReset,
}

#[derive(thiserror::Error, Debug)]
pub enum EventError {
	#[error("missing or empty field: {0}")]
	EmptyField(&'static str),
	#[error("invalid timestamp '{value}': {source}")]
	InvalidTimestamp {
		value: String,
		#[source]
		source: chrono::ParseError,
	},
	#[error("unknown event type: {0}")]
	UnknownType(String),
	#[error("event type {0} requires a payload")]
	MissingPayload(EventType),
	#[error("invalid payload for {event_type}: {source}")]
	InvalidPayload {
		event_type: EventType,
		#[source]
		source: serde_json::Error,
	},
	#[error("{field} out of range: {value}")]
	OutOfRange { field: &'static str, value: f64 },
}

/// Set (or, with `state: None`, remove) one interaction under a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionUpdate {
	pub interaction_id: String,
	pub state: Option<InteractionState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProgressedPayload {
	pub content_id: String,
	pub status: ContentStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub score: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub interaction: Option<InteractionUpdate>,
}

impl ContentProgressedPayload {
	pub fn validate(&self) -> Result<(), EventError> {
		if self.content_id.is_empty() {
			return Err(EventError::EmptyField("contentId"));
		}
		if let Some(score) = self.score {
			if !(0.0..=100.0).contains(&score) {
				return Err(EventError::OutOfRange {
					field: "score",
					value: score,
				});
			}
		}
		if let Some(update) = &self.interaction {
			if update.interaction_id.is_empty() {
				return Err(EventError::EmptyField("interactionId"));
			}
			if let Some(state) = &update.state {
				state.validate()?;
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingCompletedPayload {
	pub path_id: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub related_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePathSetPayload {
	pub path_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
	ContentProgressed(ContentProgressedPayload),
	OnboardingCompleted(OnboardingCompletedPayload),
	OnboardingReset,
	ActivePathSet(ActivePathSetPayload),
	/// Wipes all progress derived from earlier events
	ProgressReset,
}

impl EventKind {
	pub const fn event_type(&self) -> EventType {
		match self {
			Self::ContentProgressed(_) => EventType::ContentProgressed,
			Self::OnboardingCompleted(_) => EventType::OnboardingCompleted,
			Self::OnboardingReset => EventType::OnboardingReset,
			Self::ActivePathSet(_) => EventType::ActivePathSet,
			Self::ProgressReset => EventType::ProgressReset,
		}
	}

	fn from_parts(event_type: EventType, payload: Option<Value>) -> Result<Self, EventError> {
		fn typed<T: serde::de::DeserializeOwned>(
			event_type: EventType,
			payload: Option<Value>,
		) -> Result<T, EventError> {
			let value = payload
				.filter(|v| !v.is_null())
				.ok_or(EventError::MissingPayload(event_type))?;
			serde_json::from_value(value)
				.map_err(|source| EventError::InvalidPayload { event_type, source })
		}

		match event_type {
			EventType::ContentProgressed => {
				let payload: ContentProgressedPayload = typed(event_type, payload)?;
				payload.validate()?;
				Ok(Self::ContentProgressed(payload))
			}
			EventType::OnboardingCompleted => {
				let payload: OnboardingCompletedPayload = typed(event_type, payload)?;
				if payload.path_id.is_empty() {
					return Err(EventError::EmptyField("pathId"));
				}
				Ok(Self::OnboardingCompleted(payload))
			}
			EventType::ActivePathSet => Ok(Self::ActivePathSet(typed(event_type, payload)?)),
			EventType::OnboardingReset => Ok(Self::OnboardingReset),
			EventType::ProgressReset => Ok(Self::ProgressReset),
		}
	}

	fn payload_value(&self) -> Option<Value> {
		let value = match self {
			Self::ContentProgressed(payload) => serde_json::to_value(payload),
			Self::OnboardingCompleted(payload) => serde_json::to_value(payload),
			Self::ActivePathSet(payload) => serde_json::to_value(payload),
			Self::OnboardingReset | Self::ProgressReset => return None,
		};
		Some(value.unwrap_or_default())
	}
}

/// An immutable record of one user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub struct ProgressEvent {
	pub event_id: EventId,
	pub occurred_at: DateTime<Utc>,
	pub client_id: String,
	pub kind: EventKind,
}

impl ProgressEvent {
	pub fn new(
		event_id: impl Into<EventId>,
		occurred_at: DateTime<Utc>,
		client_id: impl Into<String>,
		kind: EventKind,
	) -> Self {
		Self {
			event_id: event_id.into(),
			occurred_at,
			client_id: client_id.into(),
			kind,
		}
	}

	pub const fn event_type(&self) -> EventType {
		self.kind.event_type()
	}

	/// Total chronological order: `occurred_at`, then `event_id` as tie-breaker
	pub fn chronological_cmp(&self, other: &Self) -> Ordering {
		self.occurred_at
			.cmp(&other.occurred_at)
			.then_with(|| self.event_id.cmp(&other.event_id))
	}
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
	event_id: String,
	occurred_at: String,
	client_id: String,
	#[serde(rename = "type")]
	event_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	payload: Option<Value>,
}

impl TryFrom<RawEvent> for ProgressEvent {
	type Error = EventError;

	fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
		if raw.event_id.is_empty() {
			return Err(EventError::EmptyField("eventId"));
		}
		if raw.client_id.is_empty() {
			return Err(EventError::EmptyField("clientId"));
		}

		let occurred_at = DateTime::parse_from_rfc3339(&raw.occurred_at)
			.map_err(|source| EventError::InvalidTimestamp {
				value: raw.occurred_at.clone(),
				source,
			})?
			.with_timezone(&Utc);

		let event_type = raw
			.event_type
			.parse::<EventType>()
			.map_err(|_| EventError::UnknownType(raw.event_type.clone()))?;

		Ok(Self {
			event_id: EventId(raw.event_id),
			occurred_at,
			client_id: raw.client_id,
			kind: EventKind::from_parts(event_type, raw.payload)?,
		})
	}
}

impl From<ProgressEvent> for RawEvent {
	fn from(event: ProgressEvent) -> Self {
		Self {
			payload: event.kind.payload_value(),
			event_type: event.kind.event_type().to_string(),
			event_id: event.event_id.0,
			occurred_at: event
				.occurred_at
				.to_rfc3339_opts(SecondsFormat::Millis, true),
			client_id: event.client_id,
		}
	}
}

/// Parse a stored or received event array, dropping entries that fail validation.
///
/// Anything other than an array yields no events at all.
pub fn parse_events(value: &Value) -> Vec<ProgressEvent> {
	let Some(entries) = value.as_array() else {
		if !value.is_null() {
			warn!("Expected an array of progress events, ignoring stored value");
		}
		return Vec::new();
	};

	entries
		.iter()
		.enumerate()
		.filter_map(
			|(index, entry)| match ProgressEvent::deserialize(entry) {
				Ok(event) => Some(event),
				Err(e) => {
					warn!(index, error = %e, "Dropping invalid progress event");
					None
				}
			},
		)
		.collect()
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tracing_test::traced_test;

	use super::*;
	use crate::interaction::QuizState;

	fn content_event() -> Value {
		json!({
			"eventId": "evt-1",
			"occurredAt": "2025-01-15T10:00:00.000Z",
			"clientId": "client-a",
			"type": "content.progressed",
			"payload": {
				"contentId": "budget-basics",
				"status": "in_progress",
				"interaction": {
					"interactionId": "quiz-1",
					"state": { "kind": "quiz", "selectedOptionId": "b" }
				}
			}
		})
	}

	#[test]
	fn test_parse_content_progressed() {
		let event = ProgressEvent::deserialize(&content_event()).unwrap();

		assert_eq!(event.event_id, EventId::from("evt-1"));
		assert_eq!(event.event_type(), EventType::ContentProgressed);
		let EventKind::ContentProgressed(payload) = &event.kind else {
			panic!("expected content.progressed, got {:?}", event.kind);
		};
		assert_eq!(payload.status, ContentStatus::InProgress);
		assert_eq!(
			payload.interaction.as_ref().and_then(|i| i.state.clone()),
			Some(InteractionState::Quiz(QuizState {
				selected_option_id: Some("b".to_string())
			}))
		);
	}

	#[test]
	fn test_wire_format_is_stable() {
		let raw = content_event();
		let event = ProgressEvent::deserialize(&raw).unwrap();

		assert_eq!(serde_json::to_value(&event).unwrap(), raw);
	}

	#[test]
	fn test_null_interaction_state_means_removal() {
		let mut raw = content_event();
		raw["payload"]["interaction"]["state"] = Value::Null;

		let event = ProgressEvent::deserialize(&raw).unwrap();
		let EventKind::ContentProgressed(payload) = event.kind else {
			panic!("expected content.progressed");
		};
		assert_eq!(payload.interaction.map(|i| i.state), Some(None));
	}

	#[test]
	fn test_validation_failures() {
		let mut unknown_type = content_event();
		unknown_type["type"] = json!("content.deleted");
		let mut bad_score = content_event();
		bad_score["payload"]["score"] = json!(140);
		let mut bad_time = content_event();
		bad_time["occurredAt"] = json!("yesterday");
		let mut no_payload = content_event();
		no_payload["payload"] = Value::Null;
		let mut unknown_interaction = content_event();
		unknown_interaction["payload"]["interaction"]["state"] = json!({ "kind": "crossword" });

		for raw in [unknown_type, bad_score, bad_time, no_payload, unknown_interaction] {
			assert!(ProgressEvent::deserialize(&raw).is_err(), "accepted {raw}");
		}
	}

	#[test]
	fn test_reset_events_carry_no_payload() {
		let raw = json!({
			"eventId": "evt-9",
			"occurredAt": "2025-01-15T10:00:00.000Z",
			"clientId": "client-a",
			"type": "progress.reset"
		});

		let event = ProgressEvent::deserialize(&raw).unwrap();
		assert_eq!(event.kind, EventKind::ProgressReset);
		assert_eq!(serde_json::to_value(&event).unwrap(), raw);
	}

	#[test]
	#[traced_test]
	fn test_parse_events_drops_invalid_entries() {
		let mut broken = content_event();
		broken["eventId"] = json!("");
		let value = json!([content_event(), broken, 42, { "type": "activePath.set" }]);

		let events = parse_events(&value);

		assert_eq!(events.len(), 1);
		assert!(logs_contain("Dropping invalid progress event"));
	}

	#[test]
	fn test_parse_events_requires_array() {
		assert!(parse_events(&json!({ "events": [] })).is_empty());
		assert!(parse_events(&Value::Null).is_empty());
	}

	#[test]
	fn test_status_rank_order() {
		assert!(ContentStatus::NotStarted < ContentStatus::InProgress);
		assert!(ContentStatus::InProgress < ContentStatus::Completed);
		assert!(ContentStatus::Completed < ContentStatus::Passed);
		assert!(ContentStatus::Passed.is_complete());
		assert!(!ContentStatus::InProgress.is_complete());
	}
}
