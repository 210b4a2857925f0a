use super::{
	InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::{
	event::ContentStatus,
	interaction::{InteractionState, SalaryCalculatorState, SalaryStep},
};

/// Gross-to-net salary exercise, completed once the real net pay is revealed
#[derive(Debug, Clone, Copy, Default)]
pub struct SalaryCalculatorResolver;

fn amount(field: &str, value: f64) -> Result<f64, ResolverError> {
	if value.is_nan() {
		return Err(ResolverError::InvalidAction(format!("{field} is not a number")));
	}
	Ok(value.max(0.0))
}

impl InteractionResolver for SalaryCalculatorResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::SalaryCalculatorSave {
				content_id,
				interaction_id,
				gross,
				user_guess,
				step,
				content_version,
			} => {
				let previous_completion = match ctx.interaction(content_id, interaction_id) {
					Some(InteractionState::SalaryCalculator(state)) => state.completed_at,
					_ => None,
				};
				let revealed = *step == SalaryStep::Reveal;
				let completed_at = previous_completion.or_else(|| revealed.then_some(ctx.now));

				let state = SalaryCalculatorState {
					gross: amount("gross", *gross)?,
					user_guess: amount("userGuess", *user_guess)?,
					step: *step,
					completed_at,
				};
				let status = if revealed {
					ContentStatus::Completed
				} else {
					ContentStatus::InProgress
				};

				Ok(SaveContentProgressInput::new(content_id.clone(), status)
					.with_content_version(content_version.clone())
					.with_interaction(
						interaction_id.clone(),
						Some(InteractionState::SalaryCalculator(state)),
					))
			}
			InteractionAction::SalaryCalculatorReset(target) => Ok(ctx.reset(target)),
			other => Err(ResolverError::unsupported("salary calculator", other)),
		}
	}
}
