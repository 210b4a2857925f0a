//! Interaction resolvers
//!
//! A resolver turns a typed [`InteractionAction`] plus the current snapshot into a
//! [`SaveContentProgressInput`]. All grading and completion policy lives here, so the engine can
//! stay ignorant of what a quiz or a simulator is.
//!
//! Resolvers are looked up by [`ActionType`] in a [`ResolverRegistry`]. The built-in set is
//! installed by [`ResolverRegistry::with_defaults`]; hosts can override or extend it with
//! [`ResolverRegistry::register`], and the last registration for an action type wins.

use std::{
	collections::{BTreeMap, HashMap},
	fmt,
	sync::Arc,
};

use chrono::{DateTime, Utc};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
	event::{ContentProgressedPayload, ContentStatus, InteractionUpdate},
	interaction::{BudgetPhase, InteractionState, SalaryStep},
	snapshot::ProgressSnapshot,
};

mod budget_allocator;
mod budget_cycle;
mod lesson;
mod prediction;
mod quiz;
mod salary_calculator;
mod uat_finder;

pub use budget_allocator::BudgetAllocatorResolver;
pub use budget_cycle::BudgetCycleResolver;
pub use lesson::LessonResolver;
pub use prediction::PredictionResolver;
pub use quiz::{QuizResolver, QUIZ_PASS_THRESHOLD};
pub use salary_calculator::SalaryCalculatorResolver;
pub use uat_finder::UatFinderResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum ActionType {
	#[strum(serialize = "quiz.answer")]
	QuizAnswer,
	#[strum(serialize = "quiz.reset")]
	QuizReset,
	#[strum(serialize = "prediction.reveal")]
	PredictionReveal,
	#[strum(serialize = "prediction.reset")]
	PredictionReset,
	#[strum(serialize = "salaryCalculator.save")]
	SalaryCalculatorSave,
	#[strum(serialize = "salaryCalculator.reset")]
	SalaryCalculatorReset,
	#[strum(serialize = "budgetAllocator.submit")]
	BudgetAllocatorSubmit,
	#[strum(serialize = "budgetAllocator.reset")]
	BudgetAllocatorReset,
	#[strum(serialize = "uatFinder.select")]
	UatFinderSelect,
	#[strum(serialize = "uatFinder.explore")]
	UatFinderExplore,
	#[strum(serialize = "uatFinder.reset")]
	UatFinderReset,
	#[strum(serialize = "budgetCycle.explore")]
	BudgetCycleExplore,
	#[strum(serialize = "budgetCycle.reset")]
	BudgetCycleReset,
	#[strum(serialize = "lesson.complete")]
	LessonComplete,
}

/// Which interaction a reset action clears
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTarget {
	pub content_id: String,
	pub interaction_id: String,
}

impl ResetTarget {
	pub fn new(content_id: impl Into<String>, interaction_id: impl Into<String>) -> Self {
		Self {
			content_id: content_id.into(),
			interaction_id: interaction_id.into(),
		}
	}
}

/// A user action on an interactive learning component
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionAction {
	QuizAnswer {
		content_id: String,
		interaction_id: String,
		selected_option_id: String,
		score: f64,
		content_version: Option<String>,
	},
	QuizReset(ResetTarget),
	PredictionReveal {
		content_id: String,
		interaction_id: String,
		year: String,
		guess: f64,
		actual_rate: f64,
		content_version: Option<String>,
	},
	PredictionReset(ResetTarget),
	SalaryCalculatorSave {
		content_id: String,
		interaction_id: String,
		gross: f64,
		user_guess: f64,
		step: SalaryStep,
		content_version: Option<String>,
	},
	SalaryCalculatorReset(ResetTarget),
	BudgetAllocatorSubmit {
		content_id: String,
		interaction_id: String,
		allocations: BTreeMap<String, f64>,
		content_version: Option<String>,
	},
	BudgetAllocatorReset(ResetTarget),
	UatFinderSelect {
		content_id: String,
		interaction_id: String,
		cui: String,
		name: Option<String>,
		content_version: Option<String>,
	},
	UatFinderExplore {
		content_id: String,
		interaction_id: String,
		cui: String,
		action: String,
		content_version: Option<String>,
	},
	UatFinderReset(ResetTarget),
	BudgetCycleExplore {
		content_id: String,
		interaction_id: String,
		phase: BudgetPhase,
		content_version: Option<String>,
	},
	BudgetCycleReset(ResetTarget),
	LessonComplete {
		content_id: String,
		content_version: Option<String>,
	},
}

impl InteractionAction {
	pub const fn action_type(&self) -> ActionType {
		match self {
			Self::QuizAnswer { .. } => ActionType::QuizAnswer,
			Self::QuizReset(_) => ActionType::QuizReset,
			Self::PredictionReveal { .. } => ActionType::PredictionReveal,
			Self::PredictionReset(_) => ActionType::PredictionReset,
			Self::SalaryCalculatorSave { .. } => ActionType::SalaryCalculatorSave,
			Self::SalaryCalculatorReset(_) => ActionType::SalaryCalculatorReset,
			Self::BudgetAllocatorSubmit { .. } => ActionType::BudgetAllocatorSubmit,
			Self::BudgetAllocatorReset(_) => ActionType::BudgetAllocatorReset,
			Self::UatFinderSelect { .. } => ActionType::UatFinderSelect,
			Self::UatFinderExplore { .. } => ActionType::UatFinderExplore,
			Self::UatFinderReset(_) => ActionType::UatFinderReset,
			Self::BudgetCycleExplore { .. } => ActionType::BudgetCycleExplore,
			Self::BudgetCycleReset(_) => ActionType::BudgetCycleReset,
			Self::LessonComplete { .. } => ActionType::LessonComplete,
		}
	}

	pub fn content_id(&self) -> &str {
		match self {
			Self::QuizAnswer { content_id, .. }
			| Self::PredictionReveal { content_id, .. }
			| Self::SalaryCalculatorSave { content_id, .. }
			| Self::BudgetAllocatorSubmit { content_id, .. }
			| Self::UatFinderSelect { content_id, .. }
			| Self::UatFinderExplore { content_id, .. }
			| Self::BudgetCycleExplore { content_id, .. }
			| Self::LessonComplete { content_id, .. } => content_id,
			Self::QuizReset(target)
			| Self::PredictionReset(target)
			| Self::SalaryCalculatorReset(target)
			| Self::BudgetAllocatorReset(target)
			| Self::UatFinderReset(target)
			| Self::BudgetCycleReset(target) => &target.content_id,
		}
	}
}

/// A request to record progress on one content item
#[derive(Debug, Clone, PartialEq)]
pub struct SaveContentProgressInput {
	pub content_id: String,
	pub status: ContentStatus,
	pub score: Option<f64>,
	pub content_version: Option<String>,
	pub interaction: Option<InteractionUpdate>,
}

impl SaveContentProgressInput {
	pub fn new(content_id: impl Into<String>, status: ContentStatus) -> Self {
		Self {
			content_id: content_id.into(),
			status,
			score: None,
			content_version: None,
			interaction: None,
		}
	}

	#[must_use]
	pub fn with_score(mut self, score: f64) -> Self {
		self.score = Some(score);
		self
	}

	#[must_use]
	pub fn with_content_version(mut self, content_version: Option<String>) -> Self {
		self.content_version = content_version;
		self
	}

	#[must_use]
	pub fn with_interaction(
		mut self,
		interaction_id: impl Into<String>,
		state: Option<InteractionState>,
	) -> Self {
		self.interaction = Some(InteractionUpdate {
			interaction_id: interaction_id.into(),
			state,
		});
		self
	}

	/// Build the event payload, clamping the score into `0..=100` and dropping NaN.
	pub fn into_payload(self) -> ContentProgressedPayload {
		ContentProgressedPayload {
			content_id: self.content_id,
			status: self.status,
			score: self.score.and_then(clamp_score),
			content_version: self.content_version,
			interaction: self.interaction,
		}
	}
}

pub(crate) fn clamp_score(score: f64) -> Option<f64> {
	if score.is_nan() {
		None
	} else {
		Some(score.clamp(0.0, 100.0))
	}
}

/// What a resolver may look at besides the action itself
#[derive(Debug, Clone, Copy)]
pub struct ResolverContext<'a> {
	pub snapshot: &'a ProgressSnapshot,
	pub now: DateTime<Utc>,
}

impl<'a> ResolverContext<'a> {
	pub const fn new(snapshot: &'a ProgressSnapshot, now: DateTime<Utc>) -> Self {
		Self { snapshot, now }
	}

	pub fn status_of(&self, content_id: &str) -> Option<ContentStatus> {
		self.snapshot.content(content_id).map(|content| content.status)
	}

	pub fn interaction(&self, content_id: &str, interaction_id: &str) -> Option<&'a InteractionState> {
		self.snapshot.interaction(content_id, interaction_id)
	}

	/// Resets keep whatever status the content already earned.
	pub fn reset(&self, target: &ResetTarget) -> SaveContentProgressInput {
		let status = self
			.status_of(&target.content_id)
			.unwrap_or(ContentStatus::InProgress);

		SaveContentProgressInput::new(target.content_id.clone(), status)
			.with_interaction(target.interaction_id.clone(), None)
	}
}

#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
	#[error("no resolver registered for action type {0}")]
	Unregistered(ActionType),
	#[error("{resolver} resolver cannot handle action type {action_type}")]
	UnsupportedAction {
		resolver: &'static str,
		action_type: ActionType,
	},
	#[error("invalid action: {0}")]
	InvalidAction(String),
}

impl ResolverError {
	pub(crate) const fn unsupported(resolver: &'static str, action: &InteractionAction) -> Self {
		Self::UnsupportedAction {
			resolver,
			action_type: action.action_type(),
		}
	}
}

/// Pure mapping from an action to the progress it records
pub trait InteractionResolver: Send + Sync {
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError>;
}

impl<F> InteractionResolver for F
where
	F: Fn(&InteractionAction, &ResolverContext<'_>) -> Result<SaveContentProgressInput, ResolverError>
		+ Send
		+ Sync,
{
	fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		self(action, ctx)
	}
}

#[derive(Clone, Default)]
pub struct ResolverRegistry {
	resolvers: HashMap<ActionType, Arc<dyn InteractionResolver>>,
}

impl fmt::Debug for ResolverRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResolverRegistry")
			.field("action_types", &self.resolvers.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl ResolverRegistry {
	/// A registry with no resolvers at all
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry with every built-in resolver installed
	pub fn with_defaults() -> Self {
		let mut registry = Self::new();

		registry.register(ActionType::QuizAnswer, QuizResolver);
		registry.register(ActionType::QuizReset, QuizResolver);
		registry.register(ActionType::PredictionReveal, PredictionResolver);
		registry.register(ActionType::PredictionReset, PredictionResolver);
		registry.register(ActionType::SalaryCalculatorSave, SalaryCalculatorResolver);
		registry.register(ActionType::SalaryCalculatorReset, SalaryCalculatorResolver);
		registry.register(ActionType::BudgetAllocatorSubmit, BudgetAllocatorResolver);
		registry.register(ActionType::BudgetAllocatorReset, BudgetAllocatorResolver);
		registry.register(ActionType::UatFinderSelect, UatFinderResolver);
		registry.register(ActionType::UatFinderExplore, UatFinderResolver);
		registry.register(ActionType::UatFinderReset, UatFinderResolver);
		registry.register(ActionType::BudgetCycleExplore, BudgetCycleResolver);
		registry.register(ActionType::BudgetCycleReset, BudgetCycleResolver);
		registry.register(ActionType::LessonComplete, LessonResolver);

		registry
	}

	/// Install `resolver` for `action_type`, returning the one it replaces
	pub fn register(
		&mut self,
		action_type: ActionType,
		resolver: impl InteractionResolver + 'static,
	) -> Option<Arc<dyn InteractionResolver>> {
		self.resolvers.insert(action_type, Arc::new(resolver))
	}

	pub fn has_resolver(&self, action_type: ActionType) -> bool {
		self.resolvers.contains_key(&action_type)
	}

	pub fn resolve(
		&self,
		action: &InteractionAction,
		ctx: &ResolverContext<'_>,
	) -> Result<SaveContentProgressInput, ResolverError> {
		let action_type = action.action_type();
		self.resolvers
			.get(&action_type)
			.ok_or(ResolverError::Unregistered(action_type))?
			.resolve(action, ctx)
	}
}
