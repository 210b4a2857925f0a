use strum::EnumCount;

use super::{
	InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::{
	event::ContentStatus,
	interaction::{BudgetCycleState, BudgetPhase, InteractionState},
};

/// Budget cycle explorer, scored by the share of phases visited
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetCycleResolver;

fn coverage_score(explored: usize) -> f64 {
	let explored = u32::try_from(explored).unwrap_or(u32::MAX);
	let total = u32::try_from(BudgetPhase::COUNT).unwrap_or(u32::MAX);
	(f64::from(explored) / f64::from(total) * 100.0).round()
}

impl InteractionResolver for BudgetCycleResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::BudgetCycleExplore {
				content_id,
				interaction_id,
				phase,
				content_version,
			} => {
				let mut state = match ctx.interaction(content_id, interaction_id) {
					Some(InteractionState::BudgetCycle(state)) => state.clone(),
					_ => BudgetCycleState::default(),
				};
				if !state.explored_phases.contains(phase) {
					state.explored_phases.push(*phase);
				}
				state.last_explored_phase = Some(*phase);

				let all_explored = state.explored_phases.len() >= BudgetPhase::COUNT;
				if all_explored && state.completed_at.is_none() {
					state.completed_at = Some(ctx.now);
				}
				let status = if all_explored {
					ContentStatus::Completed
				} else {
					ContentStatus::InProgress
				};
				let score = coverage_score(state.explored_phases.len());

				Ok(SaveContentProgressInput::new(content_id.clone(), status)
					.with_score(score)
					.with_content_version(content_version.clone())
					.with_interaction(
						interaction_id.clone(),
						Some(InteractionState::BudgetCycle(state)),
					))
			}
			InteractionAction::BudgetCycleReset(target) => Ok(ctx.reset(target)),
			other => Err(ResolverError::unsupported("budget cycle", other)),
		}
	}
}
