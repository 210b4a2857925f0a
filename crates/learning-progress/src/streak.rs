use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Consecutive-day completion streak, keyed by UTC calendar day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
	pub current_streak: u32,
	pub longest_streak: u32,
	pub last_activity_date: Option<NaiveDate>,
}

impl StreakState {
	/// Count an activity (a first completion) that happened on `date`.
	///
	/// Activities earlier than the last recorded day are ignored, as are repeats on the same day.
	#[must_use]
	pub fn record_activity(self, date: NaiveDate) -> Self {
		let current_streak = match self.last_activity_date {
			None => 1,
			Some(last) => match days_between(date, last) {
				0 => return self,
				1 => self.current_streak.saturating_add(1),
				gap if gap > 1 => 1,
				_ => return self,
			},
		};

		Self {
			current_streak,
			longest_streak: self.longest_streak.max(current_streak),
			last_activity_date: Some(date),
		}
	}

	/// Streak to show on `today`: a streak is only alive if the last activity was today or
	/// yesterday.
	pub fn display_streak(&self, today: NaiveDate) -> u32 {
		match self.last_activity_date {
			Some(last) if (0..=1).contains(&days_between(today, last)) => self.current_streak,
			_ => 0,
		}
	}
}

/// Whole calendar days from `earlier` to `later` (negative when `later` is before `earlier`)
pub fn days_between(later: NaiveDate, earlier: NaiveDate) -> i64 {
	(later - earlier).num_days()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn day(s: &str) -> NaiveDate {
		s.parse().unwrap()
	}

	#[test]
	fn test_first_activity_starts_streak() {
		let streak = StreakState::default().record_activity(day("2024-03-15"));

		assert_eq!(streak.current_streak, 1);
		assert_eq!(streak.longest_streak, 1);
		assert_eq!(streak.last_activity_date, Some(day("2024-03-15")));
	}

	#[test]
	fn test_same_day_is_a_noop() {
		let streak = StreakState::default()
			.record_activity(day("2024-03-15"))
			.record_activity(day("2024-03-15"));

		assert_eq!(streak.current_streak, 1);
	}

	#[test]
	fn test_consecutive_days_extend_and_gap_resets() {
		let streak = StreakState::default()
			.record_activity(day("2024-03-15"))
			.record_activity(day("2024-03-16"))
			.record_activity(day("2024-03-17"));
		assert_eq!(streak.current_streak, 3);

		let after_gap = streak.record_activity(day("2024-03-20"));
		assert_eq!(after_gap.current_streak, 1);
		assert_eq!(after_gap.longest_streak, 3);
	}

	#[test]
	fn test_earlier_date_is_ignored() {
		let streak = StreakState::default()
			.record_activity(day("2024-03-15"))
			.record_activity(day("2024-03-16"));

		assert_eq!(streak.record_activity(day("2024-03-10")), streak);
	}

	#[test]
	fn test_days_between_crosses_months() {
		assert_eq!(days_between(day("2024-03-01"), day("2024-02-28")), 2);
		assert_eq!(days_between(day("2024-01-01"), day("2023-12-31")), 1);
		assert_eq!(days_between(day("2024-01-01"), day("2024-01-05")), -4);
	}

	#[test]
	fn test_display_streak_expires() {
		let streak = StreakState::default()
			.record_activity(day("2024-03-15"))
			.record_activity(day("2024-03-16"));

		assert_eq!(streak.display_streak(day("2024-03-16")), 2);
		assert_eq!(streak.display_streak(day("2024-03-17")), 2);
		assert_eq!(streak.display_streak(day("2024-03-18")), 0);
		assert_eq!(StreakState::default().display_streak(day("2024-03-18")), 0);
	}
}
