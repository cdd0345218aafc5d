//! Task and task-log persistence.
//!
//! # Responsibility
//! - CRUD over `tasks` plus the scheduler scans (expired challenges,
//!   reminder candidates) and the bulk day-counter reset.
//! - Append-only access to `task_logs`.
//!
//! # Invariants
//! - Listing order is deterministic: `created_at ASC, uuid ASC`.
//! - The log table exposes insert and read only.

use super::convert::{
    date_to_db, instant_to_db, parse_instant, parse_optional_date, parse_optional_instant,
    parse_u32,
};
use super::store::SqliteStore;
use super::{RepoError, RepoResult};
use crate::model::character::UserId;
use crate::model::task::{
    AttrRewards, Task, TaskAction, TaskId, TaskKind, TaskLogEntry, TaskStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    user_id,
    title,
    description,
    category,
    kind,
    status,
    deadline,
    difficulty,
    reward_physique,
    reward_willpower,
    reward_intelligence,
    reward_perception,
    reward_charisma,
    reward_agility,
    reward_spirit_stones,
    fatigue_cost,
    penalty_spirit_stones,
    penalty_experience,
    daily_limit,
    total_limit,
    completed_count,
    today_completion_count,
    last_completed_date,
    remind_before_minutes,
    remind_interval_minutes,
    last_reminded_at,
    created_at,
    updated_at
FROM tasks";

/// Filter options for listing one user's tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskListQuery {
    pub user_id: UserId,
    pub kind: Option<TaskKind>,
    pub status: Option<TaskStatus>,
    pub limit: Option<u32>,
}

/// Repository interface for tasks and their audit log.
pub trait TaskRepository {
    fn insert_task(&self, task: &Task) -> RepoResult<()>;
    fn load_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    fn save_task(&self, task: &Task) -> RepoResult<()>;
    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>>;
    /// Appends one audit entry and returns its store-assigned id.
    fn append_task_log(&self, entry: &TaskLogEntry) -> RepoResult<i64>;
    fn list_task_logs(&self, task_id: TaskId) -> RepoResult<Vec<TaskLogEntry>>;
    /// Zeroes the day counter of active repeatable tasks not completed on
    /// `today`. Returns the number of rows touched.
    fn reset_daily_completion_counts(&self, today: NaiveDate) -> RepoResult<usize>;
    /// Active challenge tasks whose deadline is strictly before `now`.
    fn list_expired_active_challenge_tasks(&self, now: DateTime<Utc>) -> RepoResult<Vec<Task>>;
    /// Active tasks whose reminder should fire at `now`.
    fn list_tasks_due_for_reminder(&self, now: DateTime<Utc>) -> RepoResult<Vec<Task>>;
    /// Stamps `last_reminded_at`.
    fn mark_reminded(&self, id: TaskId, at: DateTime<Utc>) -> RepoResult<()>;
}

impl TaskRepository for SqliteStore<'_> {
    fn insert_task(&self, task: &Task) -> RepoResult<()> {
        self.conn().execute(
            "INSERT INTO tasks (
                uuid, user_id, title, description, category, kind, status, deadline,
                difficulty, reward_physique, reward_willpower, reward_intelligence,
                reward_perception, reward_charisma, reward_agility, reward_spirit_stones,
                fatigue_cost, penalty_spirit_stones, penalty_experience, daily_limit,
                total_limit, completed_count, today_completion_count, last_completed_date,
                remind_before_minutes, remind_interval_minutes, last_reminded_at,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29
            );",
            params![
                task.id.to_string(),
                task.user_id,
                task.title.as_str(),
                task.description.as_str(),
                task.category.as_str(),
                task.kind.as_str(),
                task.status.as_str(),
                task.deadline.map(instant_to_db),
                task.difficulty,
                task.reward_attributes.physique,
                task.reward_attributes.willpower,
                task.reward_attributes.intelligence,
                task.reward_attributes.perception,
                task.reward_attributes.charisma,
                task.reward_attributes.agility,
                task.reward_spirit_stones,
                task.fatigue_cost,
                task.penalty_spirit_stones,
                task.penalty_experience,
                task.daily_limit,
                task.total_limit,
                task.completed_count,
                task.today_completion_count,
                task.last_completed_date.map(date_to_db),
                task.remind_before_minutes,
                task.remind_interval_minutes,
                task.last_reminded_at.map(instant_to_db),
                instant_to_db(task.created_at),
                instant_to_db(task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn load_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn save_task(&self, task: &Task) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE tasks
             SET
                title = ?1, description = ?2, category = ?3, kind = ?4, status = ?5,
                deadline = ?6, difficulty = ?7, reward_physique = ?8, reward_willpower = ?9,
                reward_intelligence = ?10, reward_perception = ?11, reward_charisma = ?12,
                reward_agility = ?13, reward_spirit_stones = ?14, fatigue_cost = ?15,
                penalty_spirit_stones = ?16, penalty_experience = ?17, daily_limit = ?18,
                total_limit = ?19, completed_count = ?20, today_completion_count = ?21,
                last_completed_date = ?22, remind_before_minutes = ?23,
                remind_interval_minutes = ?24, last_reminded_at = ?25, updated_at = ?26
             WHERE uuid = ?27;",
            params![
                task.title.as_str(),
                task.description.as_str(),
                task.category.as_str(),
                task.kind.as_str(),
                task.status.as_str(),
                task.deadline.map(instant_to_db),
                task.difficulty,
                task.reward_attributes.physique,
                task.reward_attributes.willpower,
                task.reward_attributes.intelligence,
                task.reward_attributes.perception,
                task.reward_attributes.charisma,
                task.reward_attributes.agility,
                task.reward_spirit_stones,
                task.fatigue_cost,
                task.penalty_spirit_stones,
                task.penalty_experience,
                task.daily_limit,
                task.total_limit,
                task.completed_count,
                task.today_completion_count,
                task.last_completed_date.map(date_to_db),
                task.remind_before_minutes,
                task.remind_interval_minutes,
                task.last_reminded_at.map(instant_to_db),
                instant_to_db(task.updated_at),
                task.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE user_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Integer(query.user_id)];

        if let Some(kind) = query.kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }

        sql.push_str(" ORDER BY created_at ASC, uuid ASC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        query_tasks(self, &sql, bind_values)
    }

    fn append_task_log(&self, entry: &TaskLogEntry) -> RepoResult<i64> {
        self.conn().execute(
            "INSERT INTO task_logs (task_id, user_id, action, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.task_id.to_string(),
                entry.user_id,
                entry.action.as_str(),
                entry.source.as_str(),
                instant_to_db(entry.created_at),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    fn list_task_logs(&self, task_id: TaskId) -> RepoResult<Vec<TaskLogEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, task_id, user_id, action, source, created_at
             FROM task_logs
             WHERE task_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_task_log_row(row)?);
        }
        Ok(entries)
    }

    fn reset_daily_completion_counts(&self, today: NaiveDate) -> RepoResult<usize> {
        let changed = self.conn().execute(
            "UPDATE tasks
             SET today_completion_count = 0
             WHERE kind = 'repeatable'
               AND status = 'active'
               AND today_completion_count != 0
               AND (last_completed_date IS NULL OR last_completed_date != ?1);",
            [date_to_db(today)],
        )?;
        Ok(changed)
    }

    fn list_expired_active_challenge_tasks(&self, now: DateTime<Utc>) -> RepoResult<Vec<Task>> {
        query_tasks(
            self,
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE kind = 'challenge'
                   AND status = 'active'
                   AND deadline IS NOT NULL
                   AND deadline < ?
                 ORDER BY deadline ASC, uuid ASC"
            ),
            vec![Value::Integer(instant_to_db(now))],
        )
    }

    fn list_tasks_due_for_reminder(&self, now: DateTime<Utc>) -> RepoResult<Vec<Task>> {
        // SQL narrows to live deadlines with a reminder window; the cadence
        // check itself lives on the model.
        let candidates = query_tasks(
            self,
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE status = 'active'
                   AND deadline IS NOT NULL
                   AND deadline >= ?
                   AND remind_before_minutes > 0
                 ORDER BY deadline ASC, uuid ASC"
            ),
            vec![Value::Integer(instant_to_db(now))],
        )?;
        Ok(candidates
            .into_iter()
            .filter(|task| task.reminder_due(now))
            .collect())
    }

    fn mark_reminded(&self, id: TaskId, at: DateTime<Utc>) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE tasks SET last_reminded_at = ?1 WHERE uuid = ?2;",
            params![instant_to_db(at), id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("task {id}")));
        }
        Ok(())
    }
}

fn query_tasks(store: &SqliteStore<'_>, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Task>> {
    let mut stmt = store.conn().prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let uuid_text: String = row.get("uuid")?;
    let kind_text: String = row.get("kind")?;
    let kind = TaskKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task kind `{kind_text}` in tasks.kind"))
    })?;
    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid task status `{status_text}` in tasks.status"
        ))
    })?;
    let difficulty = u8::try_from(row.get::<_, i64>("difficulty")?)
        .map_err(|_| RepoError::InvalidData("invalid tasks.difficulty".to_string()))?;

    Ok(Task {
        id: parse_uuid(&uuid_text, "tasks.uuid")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        category: row.get("category")?,
        kind,
        status,
        deadline: parse_optional_instant(row.get("deadline")?, "tasks.deadline")?,
        difficulty,
        reward_attributes: AttrRewards {
            physique: row.get("reward_physique")?,
            willpower: row.get("reward_willpower")?,
            intelligence: row.get("reward_intelligence")?,
            perception: row.get("reward_perception")?,
            charisma: row.get("reward_charisma")?,
            agility: row.get("reward_agility")?,
        },
        reward_spirit_stones: row.get("reward_spirit_stones")?,
        fatigue_cost: row.get("fatigue_cost")?,
        penalty_spirit_stones: row.get("penalty_spirit_stones")?,
        penalty_experience: row.get("penalty_experience")?,
        daily_limit: parse_u32(row.get("daily_limit")?, "tasks.daily_limit")?,
        total_limit: parse_u32(row.get("total_limit")?, "tasks.total_limit")?,
        completed_count: parse_u32(row.get("completed_count")?, "tasks.completed_count")?,
        today_completion_count: parse_u32(
            row.get("today_completion_count")?,
            "tasks.today_completion_count",
        )?,
        last_completed_date: parse_optional_date(
            row.get("last_completed_date")?,
            "tasks.last_completed_date",
        )?,
        remind_before_minutes: parse_u32(
            row.get("remind_before_minutes")?,
            "tasks.remind_before_minutes",
        )?,
        remind_interval_minutes: parse_u32(
            row.get("remind_interval_minutes")?,
            "tasks.remind_interval_minutes",
        )?,
        last_reminded_at: parse_optional_instant(
            row.get("last_reminded_at")?,
            "tasks.last_reminded_at",
        )?,
        created_at: parse_instant(row.get("created_at")?, "tasks.created_at")?,
        updated_at: parse_instant(row.get("updated_at")?, "tasks.updated_at")?,
    })
}

fn parse_task_log_row(row: &Row<'_>) -> RepoResult<TaskLogEntry> {
    let task_id_text: String = row.get("task_id")?;
    let action_text: String = row.get("action")?;
    let action = TaskAction::parse(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid task action `{action_text}` in task_logs.action"
        ))
    })?;

    Ok(TaskLogEntry {
        id: row.get("id")?,
        task_id: parse_uuid(&task_id_text, "task_logs.task_id")?,
        user_id: row.get("user_id")?,
        action,
        source: row.get("source")?,
        created_at: parse_instant(row.get("created_at")?, "task_logs.created_at")?,
    })
}
