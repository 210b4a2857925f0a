use super::{
	InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::{
	event::ContentStatus,
	interaction::{InteractionState, PredictionReveal, PredictionState},
};

/// Accumulates yearly guesses for the inflation/deficit prediction game
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionResolver;

fn percentage(field: &str, value: f64) -> Result<f64, ResolverError> {
	if value.is_nan() {
		return Err(ResolverError::InvalidAction(format!("{field} is not a number")));
	}
	Ok(value.clamp(0.0, 100.0))
}

impl InteractionResolver for PredictionResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::PredictionReveal {
				content_id,
				interaction_id,
				year,
				guess,
				actual_rate,
				content_version,
			} => {
				if year.is_empty() {
					return Err(ResolverError::InvalidAction("year is empty".to_string()));
				}

				let mut reveals = match ctx.interaction(content_id, interaction_id) {
					Some(InteractionState::Prediction(state)) => state.reveals.clone(),
					_ => Default::default(),
				};
				reveals.insert(
					year.clone(),
					PredictionReveal {
						guess: percentage("guess", *guess)?,
						actual_rate: percentage("actualRate", *actual_rate)?,
						revealed_at: ctx.now,
					},
				);

				Ok(
					SaveContentProgressInput::new(content_id.clone(), ContentStatus::InProgress)
						.with_content_version(content_version.clone())
						.with_interaction(
							interaction_id.clone(),
							Some(InteractionState::Prediction(PredictionState { reveals })),
						),
				)
			}
			InteractionAction::PredictionReset(target) => Ok(ctx.reset(target)),
			other => Err(ResolverError::unsupported("prediction", other)),
		}
	}
}
