use super::{
	InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::{
	event::ContentStatus,
	interaction::{InteractionState, UatFinderState, UatFinderStep},
};

/// "Find your local administrative unit" exercise
///
/// Selecting a unit starts the lesson; exploring what the unit spends completes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UatFinderResolver;

fn previous_state<'a>(
	ctx: &ResolverContext<'a>,
	content_id: &str,
	interaction_id: &str,
) -> Option<&'a UatFinderState> {
	match ctx.interaction(content_id, interaction_id) {
		Some(InteractionState::UatFinder(state)) => Some(state),
		_ => None,
	}
}

impl InteractionResolver for UatFinderResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::UatFinderSelect {
				content_id,
				interaction_id,
				cui,
				name,
				content_version,
			} => {
				if cui.is_empty() {
					return Err(ResolverError::InvalidAction("cui is empty".to_string()));
				}
				let previous = previous_state(ctx, content_id, interaction_id);
				let state = UatFinderState {
					step: UatFinderStep::Selected,
					selected_cui: cui.clone(),
					selected_name: name.clone(),
					explored_action: None,
					completed_at: previous.and_then(|state| state.completed_at),
				};

				Ok(
					SaveContentProgressInput::new(content_id.clone(), ContentStatus::InProgress)
						.with_content_version(content_version.clone())
						.with_interaction(interaction_id.clone(), Some(InteractionState::UatFinder(state))),
				)
			}
			InteractionAction::UatFinderExplore {
				content_id,
				interaction_id,
				cui,
				action,
				content_version,
			} => {
				if cui.is_empty() {
					return Err(ResolverError::InvalidAction("cui is empty".to_string()));
				}
				let previous = previous_state(ctx, content_id, interaction_id);
				let selected_name = previous
					.filter(|state| state.selected_cui == *cui)
					.and_then(|state| state.selected_name.clone());
				let state = UatFinderState {
					step: UatFinderStep::Explored,
					selected_cui: cui.clone(),
					selected_name,
					explored_action: Some(action.clone()),
					completed_at: previous
						.and_then(|state| state.completed_at)
						.or(Some(ctx.now)),
				};

				Ok(
					SaveContentProgressInput::new(content_id.clone(), ContentStatus::Completed)
						.with_content_version(content_version.clone())
						.with_interaction(interaction_id.clone(), Some(InteractionState::UatFinder(state))),
				)
			}
			InteractionAction::UatFinderReset(target) => Ok(ctx.reset(target)),
			other => Err(ResolverError::unsupported("UAT finder", other)),
		}
	}
}
