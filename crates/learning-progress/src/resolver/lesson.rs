use super::{
	InteractionAction, InteractionResolver, ResolverContext, ResolverError,
	SaveContentProgressInput,
};
use crate::event::ContentStatus;

/// Marks a plain reading lesson as completed
#[derive(Debug, Clone, Copy, Default)]
pub struct LessonResolver;

impl InteractionResolver for LessonResolver {
	fn resolve(
		&self,
		action: &InteractionAction,
		_ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		match action {
			InteractionAction::LessonComplete {
				content_id,
				content_version,
			} => Ok(
				SaveContentProgressInput::new(content_id.clone(), ContentStatus::Completed)
					.with_content_version(content_version.clone()),
			),
			other => Err(ResolverError::unsupported("lesson", other)),
		}
	}
}
