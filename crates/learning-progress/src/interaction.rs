//! Interaction states stored under a content item
//!
//! Each variant is discriminated by its `kind` tag on the wire, so a stored map of interactions
//! can hold a quiz answer next to a simulator state without ambiguity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumIter, EnumString};

use crate::event::EventError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InteractionState {
	Quiz(QuizState),
	Prediction(PredictionState),
	SalaryCalculator(SalaryCalculatorState),
	BudgetAllocator(BudgetAllocatorState),
	UatFinder(UatFinderState),
	BudgetCycle(BudgetCycleState),
}

impl InteractionState {
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Quiz(_) => "quiz",
			Self::Prediction(_) => "prediction",
			Self::SalaryCalculator(_) => "salary-calculator",
			Self::BudgetAllocator(_) => "budget-allocator",
			Self::UatFinder(_) => "uat-finder",
			Self::BudgetCycle(_) => "budget-cycle",
		}
	}

	/// Check the numeric ranges the wire schema enforces
	pub fn validate(&self) -> Result<(), EventError> {
		match self {
			Self::Quiz(_) | Self::UatFinder(_) | Self::BudgetCycle(_) => Ok(()),
			Self::Prediction(state) => state.reveals.values().try_for_each(|reveal| {
				check_range("guess", reveal.guess, 0.0, 100.0)?;
				check_range("actualRate", reveal.actual_rate, 0.0, 100.0)
			}),
			Self::SalaryCalculator(state) => {
				check_range("gross", state.gross, 0.0, f64::MAX)?;
				check_range("userGuess", state.user_guess, 0.0, f64::MAX)
			}
			Self::BudgetAllocator(state) => state
				.allocations
				.values()
				.try_for_each(|value| check_range("allocations", *value, f64::MIN, f64::MAX)),
		}
	}
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), EventError> {
	if value.is_finite() && value >= min && value <= max {
		Ok(())
	} else {
		Err(EventError::OutOfRange { field, value })
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizState {
	pub selected_option_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionState {
	/// Reveals keyed by the year being predicted
	pub reveals: BTreeMap<String, PredictionReveal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionReveal {
	pub guess: f64,
	pub actual_rate: f64,
	pub revealed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SalaryStep {
	Input,
	Guess,
	Reveal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryCalculatorState {
	pub gross: f64,
	pub user_guess: f64,
	pub step: SalaryStep,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocatorStep {
	Compare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAllocatorState {
	pub allocations: BTreeMap<String, f64>,
	pub step: AllocatorStep,
	pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UatFinderStep {
	Selected,
	Explored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UatFinderState {
	pub step: UatFinderStep,
	pub selected_cui: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selected_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub explored_action: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
}

/// Phases of the public budget cycle, in calendar order
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Serialize,
	Deserialize,
	Display,
	EnumString,
	EnumIter,
	EnumCount,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BudgetPhase {
	Planning,
	Drafting,
	Approval,
	Execution,
	Reporting,
	Audit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCycleState {
	pub explored_phases: Vec<BudgetPhase>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_explored_phase: Option<BudgetPhase>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
}
