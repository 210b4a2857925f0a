use super::{
	clamp_score, InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::{
	event::ContentStatus,
	interaction::{InteractionState, QuizState},
};

/// Minimum score for a quiz answer to count as passed
pub const QUIZ_PASS_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct QuizResolver;

impl InteractionResolver for QuizResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::QuizAnswer {
				content_id,
				interaction_id,
				selected_option_id,
				score,
				content_version,
			} => {
				let score = clamp_score(*score);
				let status = match score {
					Some(score) if score >= QUIZ_PASS_THRESHOLD => ContentStatus::Passed,
					_ => ContentStatus::InProgress,
				};
				let state = InteractionState::Quiz(QuizState {
					selected_option_id: Some(selected_option_id.clone()),
				});

				let mut input = SaveContentProgressInput::new(content_id.clone(), status)
					.with_content_version(content_version.clone())
					.with_interaction(interaction_id.clone(), Some(state));
				input.score = score;

				Ok(input)
			}
			InteractionAction::QuizReset(target) => Ok(ctx.reset(target)),
			other => Err(ResolverError::unsupported("quiz", other)),
		}
	}
}
