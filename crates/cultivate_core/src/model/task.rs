//! Task and task-log domain model.
//!
//! # Responsibility
//! - Define task kinds, lifecycle states and reward/penalty fields.
//! - Own the counter rules for repeatable completions and reminder timing.
//!
//! # Invariants
//! - `completed`, `failed` and `deleted` are terminal; only `active` tasks mutate.
//! - A challenge task always has a deadline.
//! - Task log entries are append-only audit records.

use crate::model::attribute::AttrKey;
use crate::model::character::UserId;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Completed once, then terminal.
    Once,
    /// Completable repeatedly within daily/total limits.
    Repeatable,
    /// Deadline-bound; fails with penalties when the deadline passes.
    Challenge,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Repeatable => "repeatable",
            Self::Challenge => "challenge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "once" => Some(Self::Once),
            "repeatable" => Some(Self::Repeatable),
            "challenge" => Some(Self::Challenge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Completed,
    Failed,
    Deleted,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

/// Audit action recorded in the task log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Complete,
    Fail,
    Delete,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "complete" => Some(Self::Complete),
            "fail" => Some(Self::Fail),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Per-attribute reward amounts, one per growth attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrRewards {
    pub physique: f64,
    pub willpower: f64,
    pub intelligence: f64,
    pub perception: f64,
    pub charisma: f64,
    pub agility: f64,
}

impl AttrRewards {
    /// Reward for `key`; luck never has one.
    pub fn get(&self, key: AttrKey) -> f64 {
        match key {
            AttrKey::Physique => self.physique,
            AttrKey::Willpower => self.willpower,
            AttrKey::Intelligence => self.intelligence,
            AttrKey::Perception => self.perception,
            AttrKey::Charisma => self.charisma,
            AttrKey::Agility => self.agility,
            AttrKey::Luck => 0.0,
        }
    }

    /// Sets the reward for `key`. Setting luck is ignored.
    pub fn set(&mut self, key: AttrKey, amount: f64) {
        match key {
            AttrKey::Physique => self.physique = amount,
            AttrKey::Willpower => self.willpower = amount,
            AttrKey::Intelligence => self.intelligence = amount,
            AttrKey::Perception => self.perception = amount,
            AttrKey::Charisma => self.charisma = amount,
            AttrKey::Agility => self.agility = amount,
            AttrKey::Luck => {}
        }
    }

    /// Positive rewards in canonical key order.
    pub fn positive(&self) -> impl Iterator<Item = (AttrKey, f64)> + '_ {
        AttrKey::GROWTH
            .into_iter()
            .map(|key| (key, self.get(key)))
            .filter(|(_, amount)| *amount > 0.0)
    }

    pub fn total(&self) -> f64 {
        AttrKey::GROWTH.into_iter().map(|key| self.get(key)).sum()
    }
}

/// Why a repeatable completion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionLimit {
    Total { limit: u32 },
    Daily { limit: u32 },
}

impl Display for CompletionLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Total { limit } => write!(f, "total completion limit reached ({limit})"),
            Self::Daily { limit } => write!(f, "daily completion limit reached ({limit})"),
        }
    }
}

impl Error for CompletionLimit {}

/// User-created task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    /// Comma-separated tags.
    pub category: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub deadline: Option<DateTime<Utc>>,
    /// Quick-task star rating, `0..=5`; informational for custom tasks.
    pub difficulty: u8,
    pub reward_attributes: AttrRewards,
    pub reward_spirit_stones: i64,
    pub fatigue_cost: i64,
    pub penalty_spirit_stones: i64,
    /// Abstract failure severity; attributes lose `penalty_experience / 10`.
    pub penalty_experience: i64,
    /// 0 means unlimited.
    pub daily_limit: u32,
    /// 0 means unlimited.
    pub total_limit: u32,
    pub completed_count: u32,
    pub today_completion_count: u32,
    pub last_completed_date: Option<NaiveDate>,
    pub remind_before_minutes: u32,
    pub remind_interval_minutes: u32,
    pub last_reminded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates an active task with zeroed rewards and counters.
    pub fn new(
        user_id: UserId,
        kind: TaskKind,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            description: String::new(),
            category: String::new(),
            kind,
            status: TaskStatus::Active,
            deadline: None,
            difficulty: 0,
            reward_attributes: AttrRewards::default(),
            reward_spirit_stones: 0,
            fatigue_cost: 0,
            penalty_spirit_stones: 0,
            penalty_experience: 0,
            daily_limit: 0,
            total_limit: 0,
            completed_count: 0,
            today_completion_count: 0,
            last_completed_date: None,
            remind_before_minutes: 0,
            remind_interval_minutes: 0,
            last_reminded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// Records one completion and moves the task to its next state.
    ///
    /// Once and challenge tasks complete directly. Repeatable tasks check the
    /// total limit, reset the day counter on a new day, check the daily limit,
    /// then count the completion and complete once the total limit is met.
    /// Nothing is changed when a limit refuses the completion.
    pub fn record_completion(&mut self, today: NaiveDate) -> Result<(), CompletionLimit> {
        if self.kind != TaskKind::Repeatable {
            self.status = TaskStatus::Completed;
            return Ok(());
        }

        if self.total_limit > 0 && self.completed_count >= self.total_limit {
            return Err(CompletionLimit::Total {
                limit: self.total_limit,
            });
        }
        let today_count = if self.last_completed_date == Some(today) {
            self.today_completion_count
        } else {
            0
        };
        if self.daily_limit > 0 && today_count >= self.daily_limit {
            return Err(CompletionLimit::Daily {
                limit: self.daily_limit,
            });
        }

        self.completed_count += 1;
        self.today_completion_count = today_count + 1;
        self.last_completed_date = Some(today);
        if self.total_limit > 0 && self.completed_count >= self.total_limit {
            self.status = TaskStatus::Completed;
        }
        Ok(())
    }

    /// Active challenge whose deadline lies strictly before `now`.
    pub fn is_expired_challenge(&self, now: DateTime<Utc>) -> bool {
        self.is_active()
            && self.kind == TaskKind::Challenge
            && self.deadline.is_some_and(|deadline| deadline < now)
    }

    /// Whether a deadline reminder should be sent at `now`.
    ///
    /// The first reminder fires once `now >= deadline - remind_before`.
    /// Follow-ups fire every `remind_interval` after the previous one, when an
    /// interval is configured. Nothing fires after the deadline.
    pub fn reminder_due(&self, now: DateTime<Utc>) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if !self.is_active() || self.remind_before_minutes == 0 || now > deadline {
            return false;
        }

        match self.last_reminded_at {
            None => now >= deadline - Duration::minutes(i64::from(self.remind_before_minutes)),
            Some(last) => {
                self.remind_interval_minutes > 0
                    && now >= last + Duration::minutes(i64::from(self.remind_interval_minutes))
            }
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    /// Store-assigned; `0` before insertion.
    pub id: i64,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub action: TaskAction,
    /// Channel that triggered the action (`web`, `telegram`, `system`, ...).
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl TaskLogEntry {
    pub fn new(task: &Task, action: TaskAction, source: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            task_id: task.id,
            user_id: task.user_id,
            action,
            source: source.to_string(),
            created_at: now,
        }
    }
}
