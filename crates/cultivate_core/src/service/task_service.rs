//! Task lifecycle use-cases.
//!
//! # Responsibility
//! - Create, update, complete, fail and delete tasks.
//! - Apply completion rewards and failure penalties to the owning character.
//! - Provide the difficulty-tier quick-task entry point.
//!
//! # Invariants
//! - Each mutating call runs in one store transaction; on any error nothing
//!   it wrote is kept.
//! - Every status change out of `active` appends exactly one task log entry.
//! - Only the owner may update, complete, delete or read a task.

use crate::clock::Clock;
use crate::config::TaskConfig;
use crate::model::attribute::{AttrKey, AttributeSet};
use crate::model::character::{Character, UserId};
use crate::model::task::{
    AttrRewards, Task, TaskAction, TaskId, TaskKind, TaskLogEntry, TaskStatus,
};
use crate::realm::growth::{apply_gain, apply_penalty};
use crate::realm::rules::title_for_attributes;
use crate::repo::{Store, TaskListQuery};
use crate::service::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;

/// Source recorded when a foreground caller does not name one.
pub const DEFAULT_SOURCE: &str = "web";
/// Source recorded for quick tasks created without one.
pub const QUICK_TASK_SOURCE: &str = "api";
/// Source recorded for engine-initiated actions.
pub const SYSTEM_SOURCE: &str = "system";

/// Reward preset for one quick-task difficulty star rating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuickTier {
    pub fatigue: i64,
    pub spirit_stones: i64,
    /// Added to every attribute named in the quick task's categories.
    pub attr_bonus: f64,
}

const QUICK_TIERS: [QuickTier; 6] = [
    QuickTier { fatigue: 1, spirit_stones: 10, attr_bonus: 0.0 },
    QuickTier { fatigue: 5, spirit_stones: 50, attr_bonus: 0.1 },
    QuickTier { fatigue: 10, spirit_stones: 120, attr_bonus: 0.2 },
    QuickTier { fatigue: 20, spirit_stones: 300, attr_bonus: 0.4 },
    QuickTier { fatigue: 40, spirit_stones: 800, attr_bonus: 0.7 },
    QuickTier { fatigue: 90, spirit_stones: 2500, attr_bonus: 1.0 },
];

/// Preset for `difficulty`, or `None` outside `0..=5`.
pub fn quick_tier(difficulty: u8) -> Option<QuickTier> {
    QUICK_TIERS.get(usize::from(difficulty)).copied()
}

/// Input for `TaskService::create`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub kind: TaskKind,
    pub deadline: Option<DateTime<Utc>>,
    pub difficulty: u8,
    pub reward_attributes: AttrRewards,
    pub reward_spirit_stones: i64,
    /// 0 falls back to the configured default cost.
    pub fatigue_cost: i64,
    /// Challenges: 0 falls back to `reward_spirit_stones`.
    pub penalty_spirit_stones: i64,
    /// Challenges: 0 falls back to ten times the summed attribute rewards.
    pub penalty_experience: i64,
    pub daily_limit: u32,
    pub total_limit: u32,
    pub remind_before_minutes: u32,
    pub remind_interval_minutes: u32,
}

impl NewTask {
    pub fn new(kind: TaskKind, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category: String::new(),
            kind,
            deadline: None,
            difficulty: 0,
            reward_attributes: AttrRewards::default(),
            reward_spirit_stones: 0,
            fatigue_cost: 0,
            penalty_spirit_stones: 0,
            penalty_experience: 0,
            daily_limit: 0,
            total_limit: 0,
            remind_before_minutes: 0,
            remind_interval_minutes: 0,
        }
    }
}

/// Partial update for an active task. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub reward_attributes: Option<AttrRewards>,
    pub reward_spirit_stones: Option<i64>,
    pub fatigue_cost: Option<i64>,
    pub penalty_spirit_stones: Option<i64>,
    pub penalty_experience: Option<i64>,
    pub daily_limit: Option<u32>,
    pub total_limit: Option<u32>,
    pub remind_before_minutes: Option<u32>,
    pub remind_interval_minutes: Option<u32>,
}

/// Input for `TaskService::quick_create`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickTaskRequest {
    /// Blank titles become `Quick task (★N)`.
    pub title: String,
    pub difficulty: u8,
    /// Attribute keys (rewarded at the tier bonus) or free-form tags.
    pub categories: Vec<String>,
    /// `once`, `repeatable` or `challenge`; blank means `once`.
    pub kind: String,
    pub deadline: Option<DateTime<Utc>>,
    /// Repeatable tasks only; 0 means unlimited.
    pub daily_limit: u32,
    pub total_limit: u32,
    pub source: String,
}

/// Character state after a successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub task: Task,
    pub character: Character,
    pub attributes: AttributeSet,
    /// Fatigue above the cap after this completion; 0 when within the cap.
    pub overdraft: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    Failed {
        task: Task,
        character: Character,
        attributes: AttributeSet,
        /// Spirit stones actually removed after flooring at zero.
        spirit_stones_lost: i64,
        /// Amount subtracted from each growth attribute before flooring.
        attribute_penalty: f64,
        reason: String,
    },
    /// The task had already left `active`; nothing changed.
    AlreadySettled { task: Task },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuickTaskOutcome {
    pub task: Task,
    /// Present for `once` quick tasks, which complete on creation.
    pub completion: Option<CompletionOutcome>,
    pub message: String,
}

/// Task lifecycle facade over a store.
pub struct TaskService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    config: TaskConfig,
}

impl<S: Store> TaskService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: TaskConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Creates one task for `user_id`.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank title, a challenge without deadline,
    ///   a difficulty above 5 or negative amounts.
    /// - `NotFound` when the user has no character.
    pub fn create(&self, user_id: UserId, new_task: NewTask) -> EngineResult<Task> {
        let now = self.clock.now();
        let task = self
            .store
            .in_transaction(|store| self.insert_new_task(store, user_id, new_task, now))?;
        info!(
            "event=task_create module=task status=ok user_id={} task_id={} kind={}",
            user_id,
            task.id,
            task.kind.as_str()
        );
        Ok(task)
    }

    /// Applies `patch` to an active task owned by `user_id`.
    ///
    /// Moving the deadline clears the reminder stamp so the new window
    /// reminds again.
    pub fn update(&self, task_id: TaskId, user_id: UserId, patch: TaskPatch) -> EngineResult<Task> {
        let now = self.clock.now();
        self.store.in_transaction(|store| {
            let mut task = load_owned_task(store, task_id, user_id)?;
            ensure_active(&task)?;

            if let Some(title) = patch.title {
                task.title = normalize_title(&title)?;
            }
            if let Some(description) = patch.description {
                task.description = description;
            }
            if let Some(category) = patch.category {
                task.category = category;
            }
            if let Some(deadline) = patch.deadline {
                if task.deadline != Some(deadline) {
                    task.last_reminded_at = None;
                }
                task.deadline = Some(deadline);
            }
            if let Some(rewards) = patch.reward_attributes {
                task.reward_attributes = rewards;
            }
            if let Some(amount) = patch.reward_spirit_stones {
                task.reward_spirit_stones = amount;
            }
            if let Some(cost) = patch.fatigue_cost {
                task.fatigue_cost = cost;
            }
            if let Some(amount) = patch.penalty_spirit_stones {
                task.penalty_spirit_stones = amount;
            }
            if let Some(amount) = patch.penalty_experience {
                task.penalty_experience = amount;
            }
            if let Some(limit) = patch.daily_limit {
                task.daily_limit = limit;
            }
            if let Some(limit) = patch.total_limit {
                if limit != 0 && limit <= task.completed_count {
                    return Err(EngineError::InvalidArgument(format!(
                        "total_limit {limit} is already reached ({} completions)",
                        task.completed_count
                    )));
                }
                task.total_limit = limit;
            }
            if let Some(minutes) = patch.remind_before_minutes {
                task.remind_before_minutes = minutes;
            }
            if let Some(minutes) = patch.remind_interval_minutes {
                task.remind_interval_minutes = minutes;
            }

            validate_amounts(
                &task.reward_attributes,
                task.reward_spirit_stones,
                task.fatigue_cost,
                task.penalty_spirit_stones,
                task.penalty_experience,
            )?;
            if task.kind == TaskKind::Challenge && task.deadline.is_none() {
                return Err(EngineError::InvalidArgument(
                    "challenge tasks require a deadline".to_string(),
                ));
            }

            task.updated_at = now;
            store.save_task(&task)?;
            Ok(task)
        })
    }

    /// Completes a task and applies its rewards to the owner's character.
    ///
    /// # Errors
    /// - `NotFound`, `Unauthorized`, `InvalidState` (task not active).
    /// - `LimitExceeded` when a repeatable task hit its total or daily limit.
    pub fn complete(
        &self,
        task_id: TaskId,
        user_id: UserId,
        source: &str,
    ) -> EngineResult<CompletionOutcome> {
        let source = source_or(source, DEFAULT_SOURCE);
        let outcome = self
            .store
            .in_transaction(|store| self.complete_within(store, task_id, user_id, source))?;
        info!(
            "event=task_complete module=task status=ok user_id={} task_id={} task_status={} overdraft={}",
            user_id,
            task_id,
            outcome.task.status.as_str(),
            outcome.overdraft
        );
        Ok(outcome)
    }

    /// Fails a challenge task and applies its penalties.
    ///
    /// A task that already left `active` is reported as `AlreadySettled`
    /// without changes.
    ///
    /// # Errors
    /// - `NotFound` when the task does not exist.
    /// - `InvalidState` when the task is not a challenge.
    pub fn fail(&self, task_id: TaskId, reason: &str) -> EngineResult<FailOutcome> {
        let now = self.clock.now();
        let outcome = self.store.in_transaction(|store| {
            let mut task = store
                .load_task(task_id)?
                .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;
            if task.kind != TaskKind::Challenge {
                return Err(EngineError::InvalidState(format!(
                    "only challenge tasks can fail, task {} is {}",
                    task.id,
                    task.kind.as_str()
                )));
            }
            if !task.is_active() {
                return Ok(FailOutcome::AlreadySettled { task });
            }

            let mut character = load_character(store, task.user_id)?;
            let spirit_stones_lost = character.deduct_spirit_stones(task.penalty_spirit_stones);

            let attribute_penalty = task.penalty_experience.max(0) as f64 / 10.0;
            let mut attributes = store.load_attributes(task.user_id)?;
            if attribute_penalty > 0.0 {
                let penalized: Vec<_> = attributes
                    .growth()
                    .map(|attribute| apply_penalty(attribute, attribute_penalty))
                    .collect();
                for attribute in penalized {
                    store.save_attribute(&attribute)?;
                    attributes.insert(attribute);
                }
                character.title = title_for_attributes(&attributes);
            }
            store.save_character(&character)?;

            task.status = TaskStatus::Failed;
            task.updated_at = now;
            store.save_task(&task)?;
            store.append_task_log(&TaskLogEntry::new(
                &task,
                TaskAction::Fail,
                SYSTEM_SOURCE,
                now,
            ))?;

            Ok(FailOutcome::Failed {
                task,
                character,
                attributes,
                spirit_stones_lost,
                attribute_penalty,
                reason: reason.to_string(),
            })
        })?;

        if let FailOutcome::Failed {
            task,
            spirit_stones_lost,
            ..
        } = &outcome
        {
            info!(
                "event=task_fail module=task status=ok user_id={} task_id={} spirit_stones_lost={} reason={}",
                task.user_id, task.id, spirit_stones_lost, reason
            );
        }
        Ok(outcome)
    }

    /// Soft-deletes an active task owned by `user_id`.
    pub fn delete(&self, task_id: TaskId, user_id: UserId, source: &str) -> EngineResult<Task> {
        let source = source_or(source, DEFAULT_SOURCE);
        let now = self.clock.now();
        let task = self.store.in_transaction(|store| {
            let mut task = load_owned_task(store, task_id, user_id)?;
            ensure_active(&task)?;
            task.status = TaskStatus::Deleted;
            task.updated_at = now;
            store.save_task(&task)?;
            store.append_task_log(&TaskLogEntry::new(&task, TaskAction::Delete, source, now))?;
            Ok::<_, EngineError>(task)
        })?;
        info!(
            "event=task_delete module=task status=ok user_id={} task_id={} source={}",
            user_id, task_id, source
        );
        Ok(task)
    }

    /// Creates a task from a difficulty preset; `once` tasks also complete
    /// in the same transaction.
    ///
    /// # Errors
    /// - `InvalidArgument` for a difficulty outside `0..=5`, an unknown kind
    ///   or a challenge without deadline.
    pub fn quick_create(
        &self,
        user_id: UserId,
        request: QuickTaskRequest,
    ) -> EngineResult<QuickTaskOutcome> {
        let tier = quick_tier(request.difficulty).ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "difficulty must be within 0..=5, got {}",
                request.difficulty
            ))
        })?;
        let kind = parse_quick_kind(&request.kind)?;
        if kind == TaskKind::Challenge && request.deadline.is_none() {
            return Err(EngineError::InvalidArgument(
                "challenge tasks require a deadline".to_string(),
            ));
        }

        let title = if request.title.trim().is_empty() {
            format!("Quick task (★{})", request.difficulty)
        } else {
            request.title
        };
        let (reward_attributes, category) = quick_rewards(&request.categories, tier.attr_bonus);

        let mut new_task = NewTask::new(kind, title);
        new_task.category = category;
        new_task.deadline = request.deadline;
        new_task.difficulty = request.difficulty;
        new_task.reward_attributes = reward_attributes;
        new_task.reward_spirit_stones = tier.spirit_stones;
        new_task.fatigue_cost = tier.fatigue;
        new_task.daily_limit = request.daily_limit;
        new_task.total_limit = request.total_limit;

        let source = source_or(&request.source, QUICK_TASK_SOURCE);
        let now = self.clock.now();
        let outcome = self.store.in_transaction(|store| {
            let task = self.insert_new_task(store, user_id, new_task, now)?;
            if kind != TaskKind::Once {
                let message = format!("Created `{}`", task.title);
                return Ok::<_, EngineError>(QuickTaskOutcome {
                    task,
                    completion: None,
                    message,
                });
            }

            let completion = self.complete_within(store, task.id, user_id, source)?;
            Ok(QuickTaskOutcome {
                task: completion.task.clone(),
                message: completion.message.clone(),
                completion: Some(completion),
            })
        })?;

        info!(
            "event=task_quick_create module=task status=ok user_id={} task_id={} difficulty={} completed={}",
            user_id,
            outcome.task.id,
            outcome.task.difficulty,
            outcome.completion.is_some()
        );
        Ok(outcome)
    }

    /// Gets one task owned by `user_id`.
    pub fn get_task(&self, task_id: TaskId, user_id: UserId) -> EngineResult<Task> {
        load_owned_task(&self.store, task_id, user_id)
    }

    pub fn list_tasks(&self, query: &TaskListQuery) -> EngineResult<Vec<Task>> {
        Ok(self.store.list_tasks(query)?)
    }

    /// Audit trail of one task owned by `user_id`, oldest first.
    pub fn list_task_logs(&self, task_id: TaskId, user_id: UserId) -> EngineResult<Vec<TaskLogEntry>> {
        load_owned_task(&self.store, task_id, user_id)?;
        Ok(self.store.list_task_logs(task_id)?)
    }

    fn insert_new_task(
        &self,
        store: &S,
        user_id: UserId,
        new_task: NewTask,
        now: DateTime<Utc>,
    ) -> EngineResult<Task> {
        let title = normalize_title(&new_task.title)?;
        if new_task.kind == TaskKind::Challenge && new_task.deadline.is_none() {
            return Err(EngineError::InvalidArgument(
                "challenge tasks require a deadline".to_string(),
            ));
        }
        if quick_tier(new_task.difficulty).is_none() {
            return Err(EngineError::InvalidArgument(format!(
                "difficulty must be within 0..=5, got {}",
                new_task.difficulty
            )));
        }
        validate_amounts(
            &new_task.reward_attributes,
            new_task.reward_spirit_stones,
            new_task.fatigue_cost,
            new_task.penalty_spirit_stones,
            new_task.penalty_experience,
        )?;
        load_character(store, user_id)?;

        let mut task = Task::new(user_id, new_task.kind, title, now);
        task.description = new_task.description;
        task.category = new_task.category;
        task.deadline = new_task.deadline;
        task.difficulty = new_task.difficulty;
        task.reward_attributes = new_task.reward_attributes;
        task.reward_spirit_stones = new_task.reward_spirit_stones;
        task.fatigue_cost = if new_task.fatigue_cost == 0 {
            self.config.default_fatigue_cost
        } else {
            new_task.fatigue_cost
        };
        task.penalty_spirit_stones = new_task.penalty_spirit_stones;
        task.penalty_experience = new_task.penalty_experience;
        task.daily_limit = new_task.daily_limit;
        task.total_limit = new_task.total_limit;
        task.remind_before_minutes = new_task.remind_before_minutes;
        task.remind_interval_minutes = new_task.remind_interval_minutes;

        if task.kind == TaskKind::Challenge {
            if task.penalty_spirit_stones == 0 {
                task.penalty_spirit_stones = task.reward_spirit_stones;
            }
            if task.penalty_experience == 0 {
                task.penalty_experience = (task.reward_attributes.total() * 10.0).round() as i64;
            }
        }

        store.insert_task(&task)?;
        Ok(task)
    }

    fn complete_within(
        &self,
        store: &S,
        task_id: TaskId,
        user_id: UserId,
        source: &str,
    ) -> EngineResult<CompletionOutcome> {
        let now = self.clock.now();
        let today = self.clock.today();

        let mut task = load_owned_task(store, task_id, user_id)?;
        ensure_active(&task)?;
        task.record_completion(today)?;
        task.updated_at = now;
        store.save_task(&task)?;

        let mut character = load_character(store, user_id)?;
        character.reset_daily_fatigue(today);
        let overdraft = character.consume_fatigue(task.fatigue_cost);
        character.earn_spirit_stones(task.reward_spirit_stones);

        let mut attributes = store.load_attributes(user_id)?;
        for (key, amount) in task.reward_attributes.positive() {
            let Some(current) = attributes.get(key) else {
                continue;
            };
            let grown = apply_gain(current, amount);
            store.save_attribute(&grown)?;
            attributes.insert(grown);
        }

        character.title = title_for_attributes(&attributes);
        character.last_activity_date = today;
        store.save_character(&character)?;
        store.append_task_log(&TaskLogEntry::new(&task, TaskAction::Complete, source, now))?;

        let message = completion_message(&task, &attributes, overdraft);
        Ok(CompletionOutcome {
            task,
            character,
            attributes,
            overdraft,
            message,
        })
    }
}

fn load_owned_task<S: Store>(store: &S, task_id: TaskId, user_id: UserId) -> EngineResult<Task> {
    let task = store
        .load_task(task_id)?
        .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;
    if task.user_id != user_id {
        return Err(EngineError::Unauthorized);
    }
    Ok(task)
}

fn load_character<S: Store>(store: &S, user_id: UserId) -> EngineResult<Character> {
    store
        .load_character(user_id)?
        .ok_or_else(|| EngineError::NotFound(format!("character {user_id}")))
}

fn ensure_active(task: &Task) -> EngineResult<()> {
    if task.is_active() {
        return Ok(());
    }
    Err(EngineError::InvalidState(format!(
        "task {} is {}",
        task.id,
        task.status.as_str()
    )))
}

fn normalize_title(title: &str) -> EngineResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidArgument(
            "title must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_amounts(
    rewards: &AttrRewards,
    reward_spirit_stones: i64,
    fatigue_cost: i64,
    penalty_spirit_stones: i64,
    penalty_experience: i64,
) -> EngineResult<()> {
    let negative = AttrKey::GROWTH
        .into_iter()
        .find(|key| rewards.get(*key) < 0.0 || !rewards.get(*key).is_finite());
    if let Some(key) = negative {
        return Err(EngineError::InvalidArgument(format!(
            "reward for {} must be a non-negative number",
            key.as_str()
        )));
    }
    for (name, value) in [
        ("reward_spirit_stones", reward_spirit_stones),
        ("fatigue_cost", fatigue_cost),
        ("penalty_spirit_stones", penalty_spirit_stones),
        ("penalty_experience", penalty_experience),
    ] {
        if value < 0 {
            return Err(EngineError::InvalidArgument(format!(
                "{name} must not be negative"
            )));
        }
    }
    Ok(())
}

fn source_or<'a>(source: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

fn parse_quick_kind(value: &str) -> EngineResult<TaskKind> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(TaskKind::Once);
    }
    TaskKind::parse(&trimmed.to_ascii_lowercase())
        .ok_or_else(|| EngineError::InvalidArgument(format!("unknown task kind `{trimmed}`")))
}

/// Splits quick-task categories into attribute rewards and a tag list.
fn quick_rewards(categories: &[String], bonus: f64) -> (AttrRewards, String) {
    let mut rewards = AttrRewards::default();
    let mut tags: Vec<&str> = Vec::new();
    let normalized: Vec<String> = categories
        .iter()
        .map(|category| category.trim().to_ascii_lowercase())
        .filter(|category| !category.is_empty())
        .collect();

    for category in &normalized {
        let tag = match AttrKey::parse(category) {
            Some(key) if key.has_realm() => {
                rewards.set(key, bonus);
                key.default_tag()
            }
            _ => category.as_str(),
        };
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    (rewards, tags.join(","))
}

fn completion_message(task: &Task, attributes: &AttributeSet, overdraft: i64) -> String {
    let mut message = format!(
        "Completed `{}`: +{} spirit stones",
        task.title, task.reward_spirit_stones
    );
    for (key, _) in task.reward_attributes.positive() {
        if attributes.get(key).is_some_and(|attribute| attribute.is_bottleneck) {
            message.push_str(&format!(", {} is at a bottleneck", key.as_str()));
        }
    }
    if overdraft > 0 {
        message.push_str(&format!(", fatigue overdrawn by {overdraft}"));
    }
    message
}
