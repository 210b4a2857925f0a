//! Deterministic fold from an event log to a [`ProgressSnapshot`]

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
	event::{ContentProgressedPayload, EventKind, ProgressEvent},
	snapshot::{ContentProgress, OnboardingState, ProgressSnapshot, DEFAULT_CONTENT_VERSION},
};

/// Sort events into their total chronological order.
pub fn sort_events(events: &mut [ProgressEvent]) {
	events.sort_by(ProgressEvent::chronological_cmp);
}

/// Fold a log into a snapshot.
///
/// Duplicate event ids are folded once and input order does not matter, so any permutation of
/// the same events reduces to the same snapshot.
pub fn reduce_events(events: &[ProgressEvent]) -> ProgressSnapshot {
	let mut seen = HashSet::with_capacity(events.len());
	let mut ordered = events
		.iter()
		.filter(|event| seen.insert(&event.event_id))
		.collect::<Vec<_>>();
	ordered.sort_by(|a, b| a.chronological_cmp(b));

	ordered
		.into_iter()
		.fold(ProgressSnapshot::empty(), |mut snapshot, event| {
			apply_event(&mut snapshot, event);
			snapshot
		})
}

/// Apply a single event on top of `snapshot`.
///
/// This is the incremental path used for fresh local appends; the result matches a full
/// [`reduce_events`] as long as `event` sorts after everything already folded in.
pub fn apply_event(snapshot: &mut ProgressSnapshot, event: &ProgressEvent) {
	match &event.kind {
		EventKind::ContentProgressed(payload) => {
			let previous = snapshot.content.remove(&payload.content_id);
			let was_complete = previous
				.as_ref()
				.map_or(false, |content| content.status.is_complete());

			let next = merge_content(previous, payload, event.occurred_at);
			if !was_complete && next.status.is_complete() {
				snapshot.streak = snapshot
					.streak
					.record_activity(event.occurred_at.date_naive());
			}
			snapshot.content.insert(payload.content_id.clone(), next);
		}
		EventKind::OnboardingCompleted(payload) => {
			snapshot.onboarding = OnboardingState {
				path_id: Some(payload.path_id.clone()),
				related_paths: payload.related_paths.clone(),
				completed_at: Some(event.occurred_at),
			};
			snapshot.active_path_id = Some(payload.path_id.clone());
		}
		EventKind::OnboardingReset => snapshot.onboarding = OnboardingState::default(),
		EventKind::ActivePathSet(payload) => {
			snapshot.active_path_id = payload.path_id.clone();
		}
		EventKind::ProgressReset => *snapshot = ProgressSnapshot::empty(),
	}

	snapshot.last_updated = Some(event.occurred_at);
}

fn merge_content(
	previous: Option<ContentProgress>,
	payload: &ContentProgressedPayload,
	at: DateTime<Utc>,
) -> ContentProgress {
	let mut content = previous.unwrap_or_else(|| ContentProgress {
		content_id: payload.content_id.clone(),
		status: payload.status,
		score: None,
		last_attempt_at: at,
		completed_at: None,
		content_version: DEFAULT_CONTENT_VERSION.to_string(),
		interactions: Default::default(),
	});

	let status = content.status.max(payload.status);
	if content.completed_at.is_none() && status.is_complete() {
		content.completed_at = Some(at);
	}
	content.status = status;

	content.score = match (content.score, payload.score) {
		(Some(best), Some(score)) => Some(best.max(score)),
		(best, score) => best.or(score),
	};

	content.last_attempt_at = at;
	if let Some(version) = &payload.content_version {
		content.content_version.clone_from(version);
	}

	if let Some(update) = &payload.interaction {
		match &update.state {
			Some(state) => {
				content
					.interactions
					.insert(update.interaction_id.clone(), state.clone());
			}
			None => {
				content.interactions.remove(&update.interaction_id);
			}
		}
	}

	content
}
