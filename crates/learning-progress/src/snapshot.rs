use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{event::ContentStatus, interaction::InteractionState, streak::StreakState};

pub const SNAPSHOT_VERSION: u32 = 1;

pub const DEFAULT_CONTENT_VERSION: &str = "v1";

/// Current learning state, always derived from an event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressSnapshot {
	pub version: u32,
	pub onboarding: OnboardingState,
	pub active_path_id: Option<String>,
	pub content: BTreeMap<String, ContentProgress>,
	pub streak: StreakState,
	/// Time of the most recent event folded in, `None` for an empty log
	pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ProgressSnapshot {
	fn default() -> Self {
		Self::empty()
	}
}

impl ProgressSnapshot {
	pub fn empty() -> Self {
		Self {
			version: SNAPSHOT_VERSION,
			onboarding: OnboardingState::default(),
			active_path_id: None,
			content: BTreeMap::new(),
			streak: StreakState::default(),
			last_updated: None,
		}
	}

	pub fn content(&self, content_id: &str) -> Option<&ContentProgress> {
		self.content.get(content_id)
	}

	pub fn interaction(&self, content_id: &str, interaction_id: &str) -> Option<&InteractionState> {
		self.content
			.get(content_id)
			.and_then(|content| content.interactions.get(interaction_id))
	}

	pub fn completed_count(&self) -> usize {
		self.content
			.values()
			.filter(|content| content.status.is_complete())
			.count()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
	pub path_id: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub related_paths: Vec<String>,
	pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProgress {
	pub content_id: String,
	pub status: ContentStatus,
	/// Best score ever reached
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub score: Option<f64>,
	pub last_attempt_at: DateTime<Utc>,
	/// Set by the first transition into a complete status and never moved afterwards
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
	pub content_version: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub interactions: BTreeMap<String, InteractionState>,
}
