use super::{
	InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::{
	event::ContentStatus,
	interaction::{AllocatorStep, BudgetAllocatorState, InteractionState},
};

/// "Allocate the national budget" exercise, completed on first submission
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetAllocatorResolver;

impl InteractionResolver for BudgetAllocatorResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::BudgetAllocatorSubmit {
				content_id,
				interaction_id,
				allocations,
				content_version,
			} => {
				if let Some((category, _)) = allocations.iter().find(|(_, v)| !v.is_finite()) {
					return Err(ResolverError::InvalidAction(format!(
						"allocation for {category} is not a finite number"
					)));
				}

				let completed_at = match ctx.interaction(content_id, interaction_id) {
					Some(InteractionState::BudgetAllocator(state)) => state.completed_at,
					_ => ctx.now,
				};
				let state = BudgetAllocatorState {
					allocations: allocations.clone(),
					step: AllocatorStep::Compare,
					completed_at,
				};

				Ok(
					SaveContentProgressInput::new(content_id.clone(), ContentStatus::Completed)
						.with_score(100.0)
						.with_content_version(content_version.clone())
						.with_interaction(
							interaction_id.clone(),
							Some(InteractionState::BudgetAllocator(state)),
						),
				)
			}
			InteractionAction::BudgetAllocatorReset(target) => Ok(ctx.reset(target)),
			other => Err(ResolverError::unsupported("budget allocator", other)),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use chrono::{DateTime, Duration, Utc};

	use super::*;
	use crate::{
		event::{EventKind, ProgressEvent},
		reducer::apply_event,
		resolver::ResetTarget,
		snapshot::ProgressSnapshot,
	};

	fn start() -> DateTime<Utc> {
		"2025-01-15T10:00:00Z".parse().unwrap()
	}

	fn submit(education: f64) -> InteractionAction {
		InteractionAction::BudgetAllocatorSubmit {
			content_id: "budget-game".to_string(),
			interaction_id: "allocator".to_string(),
			allocations: BTreeMap::from([
				("education".to_string(), education),
				("health".to_string(), 100.0 - education),
			]),
			content_version: None,
		}
	}

	#[test]
	fn test_submission_completes_with_full_score() {
		let mut snapshot = ProgressSnapshot::empty();
		let input = BudgetAllocatorResolver
			.resolve(&submit(40.0), &ResolverContext::new(&snapshot, start()))
			.unwrap();
		assert_eq!(input.status, ContentStatus::Completed);
		assert_eq!(input.score, Some(100.0));

		apply_event(
			&mut snapshot,
			&ProgressEvent::new("e1", start(), "client-a", EventKind::ContentProgressed(input.into_payload())),
		);

		let later = start() + Duration::hours(2);
		let resubmitted = BudgetAllocatorResolver
			.resolve(&submit(60.0), &ResolverContext::new(&snapshot, later))
			.unwrap();
		let Some(InteractionState::BudgetAllocator(state)) =
			resubmitted.interaction.and_then(|i| i.state)
		else {
			panic!("allocator state missing");
		};
		assert_eq!(state.completed_at, start());
		assert_eq!(state.allocations["education"], 60.0);
	}

	#[test]
	fn test_reset_on_untouched_content_is_in_progress() {
		let snapshot = ProgressSnapshot::empty();
		let input = BudgetAllocatorResolver
			.resolve(
				&InteractionAction::BudgetAllocatorReset(ResetTarget::new("budget-game", "allocator")),
				&ResolverContext::new(&snapshot, start()),
			)
			.unwrap();

		assert_eq!(input.status, ContentStatus::InProgress);
		assert_eq!(input.interaction.map(|i| i.state), Some(None));
	}

	#[test]
	fn test_non_finite_allocation_rejected() {
		let snapshot = ProgressSnapshot::empty();
		let result = BudgetAllocatorResolver
			.resolve(&submit(f64::INFINITY), &ResolverContext::new(&snapshot, start()));

		assert!(matches!(result, Err(ResolverError::InvalidAction(_))));
	}
}
