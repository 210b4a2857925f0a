use std::collections::HashSet;

use crate::{
	event::ProgressEvent,
	reducer::sort_events,
	snapshot::{ContentProgress, ProgressSnapshot},
	streak::StreakState,
};

/// Union two logs by event id, in chronological order.
///
/// When both sides hold the same id the local copy is kept.
pub fn merge_event_logs(local: &[ProgressEvent], remote: &[ProgressEvent]) -> Vec<ProgressEvent> {
	let mut seen = HashSet::with_capacity(local.len() + remote.len());
	let mut merged = local
		.iter()
		.chain(remote)
		.filter(|event| seen.insert(event.event_id.clone()))
		.cloned()
		.collect::<Vec<_>>();

	sort_events(&mut merged);
	merged
}

/// Combine two views of the same content item.
///
/// Status, score and dates only move forward. The side with the later attempt (local on a tie)
/// supplies the content version and wins conflicting interactions.
pub fn merge_content_progress(local: &ContentProgress, remote: &ContentProgress) -> ContentProgress {
	let (older, newer) = if remote.last_attempt_at > local.last_attempt_at {
		(local, remote)
	} else {
		(remote, local)
	};

	let score = match (local.score, remote.score) {
		(Some(a), Some(b)) => Some(a.max(b)),
		(a, b) => a.or(b),
	}
	.filter(|score| *score > 0.0);

	let mut interactions = older.interactions.clone();
	interactions.extend(
		newer
			.interactions
			.iter()
			.map(|(id, state)| (id.clone(), state.clone())),
	);

	ContentProgress {
		content_id: local.content_id.clone(),
		status: local.status.max(remote.status),
		score,
		last_attempt_at: local.last_attempt_at.max(remote.last_attempt_at),
		completed_at: local.completed_at.max(remote.completed_at),
		content_version: newer.content_version.clone(),
		interactions,
	}
}

/// Combine a locally reduced snapshot with one handed out by the remote.
///
/// Content is unioned item by item through [`merge_content_progress`]. The remote decides the
/// schema version and wins onboarding ties; the more recently updated side picks the active path.
pub fn merge_snapshots(local: &ProgressSnapshot, remote: &ProgressSnapshot) -> ProgressSnapshot {
	let mut content = local.content.clone();
	for (content_id, theirs) in &remote.content {
		let merged = match content.get(content_id) {
			Some(ours) => merge_content_progress(ours, theirs),
			None => theirs.clone(),
		};
		content.insert(content_id.clone(), merged);
	}

	let onboarding = if local.onboarding.completed_at > remote.onboarding.completed_at {
		local.onboarding.clone()
	} else {
		remote.onboarding.clone()
	};

	let (recent, stale) = if remote.last_updated > local.last_updated {
		(remote, local)
	} else {
		(local, remote)
	};

	ProgressSnapshot {
		version: remote.version,
		onboarding,
		active_path_id: recent
			.active_path_id
			.clone()
			.or_else(|| stale.active_path_id.clone()),
		content,
		streak: merge_streaks(local.streak, remote.streak),
		last_updated: local.last_updated.max(remote.last_updated),
	}
}

fn merge_streaks(local: StreakState, remote: StreakState) -> StreakState {
	let latest = if remote.last_activity_date > local.last_activity_date {
		remote
	} else {
		local
	};

	StreakState {
		longest_streak: local.longest_streak.max(remote.longest_streak),
		..latest
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use chrono::{DateTime, Duration, NaiveDate, Utc};

	use super::*;
	use crate::{
		event::{ContentProgressedPayload, ContentStatus, EventKind},
		interaction::{InteractionState, QuizState},
		reducer::reduce_events,
		snapshot::OnboardingState,
	};

	fn event(id: &str, client: &str, minutes: i64, status: ContentStatus) -> ProgressEvent {
		let start = "2025-01-15T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
		ProgressEvent::new(
			id,
			start + Duration::minutes(minutes),
			client,
			EventKind::ContentProgressed(ContentProgressedPayload {
				content_id: "lesson-1".to_string(),
				status,
				score: None,
				content_version: None,
				interaction: None,
			}),
		)
	}

	fn at(day: u32) -> DateTime<Utc> {
		format!("2025-01-{day:02}T00:00:00Z").parse().unwrap()
	}

	fn progress(status: ContentStatus, attempt_day: u32, version: &str) -> ContentProgress {
		ContentProgress {
			content_id: "m1".to_string(),
			status,
			score: None,
			last_attempt_at: at(attempt_day),
			completed_at: None,
			content_version: version.to_string(),
			interactions: BTreeMap::new(),
		}
	}

	fn quiz(selected: &str) -> InteractionState {
		InteractionState::Quiz(QuizState {
			selected_option_id: Some(selected.to_string()),
		})
	}

	fn interactions(entries: &[(&str, &str)]) -> BTreeMap<String, InteractionState> {
		entries
			.iter()
			.map(|(id, selected)| (id.to_string(), quiz(selected)))
			.collect()
	}

	#[test]
	fn test_union_is_chronological() {
		let local = [event("l1", "laptop", 0, ContentStatus::InProgress)];
		let remote = [
			event("r1", "phone", 5, ContentStatus::Completed),
			event("l1", "laptop", 0, ContentStatus::InProgress),
		];

		let merged = merge_event_logs(&local, &remote);

		let ids = merged.iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>();
		assert_eq!(ids, ["l1", "r1"]);
	}

	#[test]
	fn test_merging_again_changes_nothing() {
		let local = [
			event("l1", "laptop", 0, ContentStatus::InProgress),
			event("l2", "laptop", 9, ContentStatus::Passed),
		];
		let remote = [
			event("r1", "phone", 3, ContentStatus::Completed),
			event("l1", "laptop", 0, ContentStatus::InProgress),
		];

		let once = merge_event_logs(&local, &remote);
		let twice = merge_event_logs(&once, &remote);

		assert_eq!(once, twice);
		assert_eq!(reduce_events(&once), reduce_events(&twice));
		assert_eq!(
			reduce_events(&once).content("lesson-1").map(|c| c.status),
			Some(ContentStatus::Passed)
		);
	}

	#[test]
	fn test_content_merge_keeps_higher_status() {
		let mut local = progress(ContentStatus::Completed, 1, "v1");
		local.completed_at = Some(at(1));
		let mut remote = progress(ContentStatus::Passed, 2, "v2");
		remote.score = Some(70.0);
		remote.completed_at = Some(at(2));

		assert_eq!(merge_content_progress(&local, &remote).status, ContentStatus::Passed);
		assert_eq!(merge_content_progress(&remote, &local).status, ContentStatus::Passed);
	}

	#[test]
	fn test_content_merge_keeps_best_score_and_drops_zero() {
		let mut local = progress(ContentStatus::InProgress, 1, "v1");
		local.score = Some(50.0);
		let mut remote = progress(ContentStatus::Completed, 2, "v2");
		remote.score = Some(0.0);
		assert_eq!(merge_content_progress(&local, &remote).score, Some(50.0));

		let local = progress(ContentStatus::InProgress, 1, "v1");
		let mut remote = progress(ContentStatus::InProgress, 2, "v2");
		remote.score = Some(0.0);
		assert_eq!(merge_content_progress(&local, &remote).score, None);
	}

	#[test]
	fn test_content_merge_takes_latest_dates() {
		let mut local = progress(ContentStatus::Completed, 1, "v1");
		local.completed_at = Some(at(1));
		let mut remote = progress(ContentStatus::Completed, 3, "v2");
		remote.completed_at = Some(at(2));

		let merged = merge_content_progress(&local, &remote);
		assert_eq!(merged.last_attempt_at, at(3));
		assert_eq!(merged.completed_at, Some(at(2)));
	}

	#[test]
	fn test_content_version_follows_latest_attempt_with_local_on_tie() {
		let mut local = progress(ContentStatus::InProgress, 2, "local");
		local.interactions = interactions(&[("q1", "a")]);
		let mut remote = progress(ContentStatus::InProgress, 2, "remote");
		remote.interactions = interactions(&[("q1", "b"), ("q2", "c")]);

		let merged = merge_content_progress(&local, &remote);
		assert_eq!(merged.content_version, "local");
		assert_eq!(merged.interactions, interactions(&[("q1", "a"), ("q2", "c")]));

		remote.last_attempt_at = at(3);
		assert_eq!(merge_content_progress(&local, &remote).content_version, "remote");
	}

	#[test]
	fn test_interaction_conflicts_prefer_latest_attempt() {
		let mut local = progress(ContentStatus::InProgress, 2, "v1");
		local.interactions = interactions(&[("q1", "a"), ("q2", "b")]);
		let mut remote = progress(ContentStatus::InProgress, 3, "v2");
		remote.interactions = interactions(&[("q2", "c"), ("q3", "d")]);

		assert_eq!(
			merge_content_progress(&local, &remote).interactions,
			interactions(&[("q1", "a"), ("q2", "c"), ("q3", "d")])
		);
	}

	fn day(d: u32) -> NaiveDate {
		at(d).date_naive()
	}

	#[test]
	fn test_snapshot_merge_unions_content() {
		let mut local = ProgressSnapshot::empty();
		local.last_updated = Some(at(1));
		let mut basics = progress(ContentStatus::Completed, 1, "v1");
		basics.content_id = "budget-basics".to_string();
		basics.completed_at = Some(at(1));
		local.content.insert("budget-basics".to_string(), basics);
		local.streak = StreakState {
			current_streak: 1,
			longest_streak: 1,
			last_activity_date: Some(day(1)),
		};

		let mut remote = ProgressSnapshot::empty();
		remote.version = 2;
		remote.onboarding = OnboardingState {
			path_id: Some("citizen".to_string()),
			related_paths: Vec::new(),
			completed_at: Some(at(2)),
		};
		remote.active_path_id = Some("citizen".to_string());
		remote.last_updated = Some(at(3));
		let mut basics = progress(ContentStatus::Passed, 2, "v2");
		basics.content_id = "budget-basics".to_string();
		basics.score = Some(80.0);
		basics.completed_at = Some(at(2));
		remote.content.insert("budget-basics".to_string(), basics);
		let mut m2 = progress(ContentStatus::InProgress, 3, "v1");
		m2.content_id = "m2".to_string();
		remote.content.insert("m2".to_string(), m2);
		remote.streak = StreakState {
			current_streak: 3,
			longest_streak: 5,
			last_activity_date: Some(day(3)),
		};

		let merged = merge_snapshots(&local, &remote);

		assert_eq!(merged.version, 2);
		assert_eq!(merged.last_updated, Some(at(3)));
		assert_eq!(merged.onboarding.path_id.as_deref(), Some("citizen"));
		assert_eq!(merged.active_path_id.as_deref(), Some("citizen"));
		assert_eq!(
			merged.content("budget-basics").map(|c| c.status),
			Some(ContentStatus::Passed)
		);
		assert_eq!(merged.content("budget-basics").and_then(|c| c.score), Some(80.0));
		assert_eq!(merged.content("m2").map(|c| c.content_id.as_str()), Some("m2"));
		assert_eq!(merged.streak.current_streak, 3);
		assert_eq!(merged.streak.longest_streak, 5);
	}

	#[test]
	fn test_snapshot_merge_keeps_local_active_path_when_remote_has_none() {
		let mut local = ProgressSnapshot::empty();
		local.active_path_id = Some("journalist".to_string());
		local.last_updated = Some(at(1));
		let mut remote = ProgressSnapshot::empty();
		remote.last_updated = Some(at(5));

		assert_eq!(
			merge_snapshots(&local, &remote).active_path_id.as_deref(),
			Some("journalist")
		);
	}

	#[test]
	fn test_remerging_the_same_remote_snapshot_changes_nothing() {
		let mut local = ProgressSnapshot::empty();
		local.last_updated = Some(at(1));
		local
			.content
			.insert("m1".to_string(), progress(ContentStatus::InProgress, 1, "v1"));

		let mut remote = ProgressSnapshot::empty();
		remote.onboarding = OnboardingState {
			path_id: Some("citizen".to_string()),
			related_paths: Vec::new(),
			completed_at: Some(at(2)),
		};
		remote.active_path_id = Some("journalist".to_string());
		remote.last_updated = Some(at(2));
		let mut m1 = progress(ContentStatus::Completed, 2, "v2");
		m1.completed_at = Some(at(2));
		remote.content.insert("m1".to_string(), m1);
		remote.streak = StreakState {
			current_streak: 2,
			longest_streak: 2,
			last_activity_date: Some(day(2)),
		};

		let once = merge_snapshots(&local, &remote);
		let twice = merge_snapshots(&once, &remote);

		assert_eq!(twice, once);
		assert_eq!(once.active_path_id.as_deref(), Some("journalist"));
	}
}
