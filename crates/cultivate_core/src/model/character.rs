//! Character model: fatigue, overdraft and spirit-stone bookkeeping.
//!
//! # Responsibility
//! - Hold the per-user character record.
//! - Provide the arithmetic helpers services use to mutate it.
//!
//! # Invariants
//! - `fatigue_cap == fatigue_cap_for_level(fatigue_level)` after every reset.
//! - `spirit_stones` never drops below zero.
//! - `overdraft_penalty` only grows until the daily reset clears it.

use crate::realm::rules::{fatigue_cap_for_level, realm_name};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Account identifier issued by the external user system.
pub type UserId = i64;

/// Per-user character state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub user_id: UserId,
    /// In-game currency.
    pub spirit_stones: i64,
    /// May exceed `fatigue_cap`; the excess is the overdraft.
    pub fatigue: i64,
    pub fatigue_cap: i64,
    pub fatigue_level: u32,
    pub overdraft_penalty: f64,
    /// Derived from attribute realms; see `realm::rules::title_for_attributes`.
    pub title: String,
    pub last_activity_date: NaiveDate,
    pub last_fatigue_reset: Option<NaiveDate>,
}

impl Character {
    /// New Mortal character whose first day of activity is `today`.
    pub fn new(user_id: UserId, today: NaiveDate) -> Self {
        Self {
            user_id,
            spirit_stones: 0,
            fatigue: 0,
            fatigue_cap: fatigue_cap_for_level(0),
            fatigue_level: 0,
            overdraft_penalty: 0.0,
            title: realm_name(0).to_string(),
            last_activity_date: today,
            last_fatigue_reset: Some(today),
        }
    }

    /// Adds a task's fatigue cost, recording any overdraft.
    ///
    /// Fatigue may exceed the cap. The part of the new total above the cap is
    /// added to `overdraft_penalty`. Returns that overdraft amount.
    pub fn consume_fatigue(&mut self, cost: i64) -> i64 {
        self.fatigue = self.fatigue.saturating_add(cost);
        let overdraft = (self.fatigue - self.fatigue_cap).max(0);
        if overdraft > 0 {
            self.overdraft_penalty += overdraft as f64;
        }
        overdraft
    }

    /// Lowers fatigue by `amount`, never below zero.
    pub fn restore_fatigue(&mut self, amount: i64) {
        self.fatigue = (self.fatigue - amount).max(0);
    }

    pub fn earn_spirit_stones(&mut self, amount: i64) {
        self.spirit_stones = self.spirit_stones.saturating_add(amount).max(0);
    }

    /// Deducts `amount`, flooring the balance at zero. Returns what was actually taken.
    pub fn deduct_spirit_stones(&mut self, amount: i64) -> i64 {
        let taken = amount.clamp(0, self.spirit_stones);
        self.spirit_stones -= taken;
        taken
    }

    /// Whether fatigue currently exceeds the cap.
    pub fn is_overdrawn(&self) -> bool {
        self.fatigue > self.fatigue_cap
    }

    /// Resets fatigue for a new calendar day.
    ///
    /// Returns `false` (and changes nothing) when `today` was already reset.
    pub fn reset_daily_fatigue(&mut self, today: NaiveDate) -> bool {
        if self.last_fatigue_reset == Some(today) {
            return false;
        }
        self.fatigue = 0;
        self.fatigue_cap = fatigue_cap_for_level(self.fatigue_level);
        self.overdraft_penalty = 0.0;
        self.last_fatigue_reset = Some(today);
        true
    }

    /// Whole days between the last activity and `today`; never negative.
    pub fn days_inactive(&self, today: NaiveDate) -> i64 {
        (today - self.last_activity_date).num_days().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn overdraft_accumulates_only_the_excess() {
        let mut character = Character::new(1, day(1));
        assert_eq!(character.consume_fatigue(90), 0);
        assert_eq!(character.consume_fatigue(30), 20);
        assert_eq!(character.fatigue, 120);
        assert_eq!(character.overdraft_penalty, 20.0);
        assert!(character.is_overdrawn());
    }

    #[test]
    fn deduction_floors_at_zero() {
        let mut character = Character::new(1, day(1));
        character.earn_spirit_stones(40);
        assert_eq!(character.deduct_spirit_stones(100), 40);
        assert_eq!(character.spirit_stones, 0);
    }

    #[test]
    fn daily_reset_runs_once_per_day() {
        let mut character = Character::new(1, day(1));
        character.fatigue_level = 1;
        character.consume_fatigue(250);
        assert!(!character.reset_daily_fatigue(day(1)));
        assert_eq!(character.fatigue, 250);

        assert!(character.reset_daily_fatigue(day(2)));
        assert_eq!(character.fatigue, 0);
        assert_eq!(character.fatigue_cap, 200);
        assert_eq!(character.overdraft_penalty, 0.0);
        assert!(!character.reset_daily_fatigue(day(2)));
    }
}
