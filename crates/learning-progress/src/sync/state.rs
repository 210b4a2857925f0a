use std::mem;

use chrono::{DateTime, Utc};

use super::engine::SaveOnboardingInput;
use crate::{event::ContentProgressedPayload, resolver::InteractionAction};

/// A mutation as dispatched by the host, before it becomes an event
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
	SaveContentProgress(ContentProgressedPayload),
	Interaction(InteractionAction),
	SaveOnboarding(SaveOnboardingInput),
	SetActivePath(Option<String>),
	ResetOnboarding,
	ClearProgress,
}

/// A mutation held back while the log of the new identity is being assembled
#[derive(Debug, Clone)]
pub(crate) struct PendingMutation {
	/// Dispatch time, used as the event timestamp when the mutation is replayed
	pub queued_at: DateTime<Utc>,
	pub mutation: Mutation,
}

#[derive(Debug, Default)]
pub(crate) enum EnginePhase {
	/// Ready for mutations and syncs
	#[default]
	Idle,

	/// Merging guest, local and remote logs for a newly signed-in user
	Bootstrapping { queued: Vec<PendingMutation> },

	/// A push or pull is in flight
	Syncing,
}

impl EnginePhase {
	pub const fn is_bootstrapping(&self) -> bool {
		matches!(self, Self::Bootstrapping { .. })
	}

	pub const fn is_syncing(&self) -> bool {
		matches!(self, Self::Syncing)
	}

	/// Queue `pending` if bootstrapping, handing it back otherwise
	pub fn buffer(&mut self, pending: PendingMutation) -> Option<PendingMutation> {
		match self {
			Self::Bootstrapping { queued } => {
				queued.push(pending);
				None
			}
			Self::Idle | Self::Syncing => Some(pending),
		}
	}

	/// Move to `next`, returning whatever was queued in the previous phase
	pub fn transition(&mut self, next: Self) -> Vec<PendingMutation> {
		match mem::replace(self, next) {
			Self::Bootstrapping { queued } => queued,
			Self::Idle | Self::Syncing => Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pending() -> PendingMutation {
		PendingMutation {
			queued_at: "2025-01-15T10:00:00Z".parse().unwrap(),
			mutation: Mutation::ResetOnboarding,
		}
	}

	#[test]
	fn test_only_bootstrapping_buffers() {
		let mut phase = EnginePhase::Idle;
		assert!(phase.buffer(pending()).is_some());

		let mut phase_syncing = EnginePhase::Syncing;
		assert!(phase_syncing.buffer(pending()).is_some());

		phase.transition(EnginePhase::Bootstrapping { queued: Vec::new() });
		assert!(phase.buffer(pending()).is_none());
		assert!(phase.buffer(pending()).is_none());

		let drained = phase.transition(EnginePhase::Idle);
		assert_eq!(drained.len(), 2);
		assert!(!phase.is_bootstrapping());
	}
}
