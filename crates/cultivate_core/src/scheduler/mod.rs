//! Background scheduler.
//!
//! # Responsibility
//! - Enforce time-based rules: daily resets, inactivity decay, challenge
//!   expiry and deadline reminders.
//! - Drive ticks from a tokio interval until shutdown is signalled.
//!
//! # Invariants
//! - Steps run in a fixed order and each is isolated: a failing step or item
//!   is logged and recorded, and the tick moves on.
//! - The daily reset runs at most once per calendar day; its guard is only
//!   stamped after the bulk counter reset succeeded.
//! - At most one tick is in flight; a slow tick delays the next one.
//! - Notifications go out after the state change committed.

pub mod notifier;

pub use notifier::{LogNotifier, Notifier, NotifyError};

use crate::clock::Clock;
use crate::config::{SchedulerConfig, TaskConfig};
use crate::model::character::UserId;
use crate::model::task::TaskId;
use crate::repo::{CharacterRepository, SqliteStore, TaskRepository};
use crate::service::{CharacterService, FailOutcome, TaskService};
use chrono::{Duration, NaiveDate};
use log::{error, info, warn};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Reason recorded on challenges failed by expiry.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// State carried from one tick to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    /// Day the daily reset last completed.
    pub last_reset_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStep {
    Store,
    DailyReset,
    InactivityDecay,
    ChallengeExpiry,
    Reminders,
}

impl TickStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::DailyReset => "daily_reset",
            Self::InactivityDecay => "inactivity_decay",
            Self::ChallengeExpiry => "challenge_expiry",
            Self::Reminders => "reminders",
        }
    }
}

/// One isolated failure inside a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickFailure {
    pub step: TickStep,
    pub user_id: Option<UserId>,
    pub task_id: Option<TaskId>,
    pub detail: String,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub daily_reset_ran: bool,
    pub repeatable_counters_reset: usize,
    pub fatigue_resets: usize,
    pub decayed_users: usize,
    pub expired_challenges: usize,
    pub reminders_sent: usize,
    pub notify_failures: usize,
    pub failures: Vec<TickFailure>,
}

impl TickReport {
    fn record(
        &mut self,
        step: TickStep,
        user_id: Option<UserId>,
        task_id: Option<TaskId>,
        detail: impl std::fmt::Display,
    ) {
        let detail = detail.to_string();
        error!(
            "event=scheduler_step module=scheduler status=error step={} user_id={} task_id={} error={}",
            step.as_str(),
            user_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            task_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            detail
        );
        self.failures.push(TickFailure {
            step,
            user_id,
            task_id,
            detail,
        });
    }
}

/// Time-driven maintenance over one dedicated connection.
pub struct Scheduler {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    task_config: TaskConfig,
}

impl Scheduler {
    /// Creates a scheduler over a migrated connection (see `db::open_db`).
    pub fn new(
        conn: Connection,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
        task_config: TaskConfig,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock,
            notifier,
            config,
            task_config,
        }
    }

    /// Runs one tick: daily reset, inactivity decay, challenge expiry, reminders.
    pub fn tick(&self, state: &mut SchedulerState) -> TickReport {
        let mut report = TickReport::default();
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let store = match SqliteStore::try_new(&conn) {
            Ok(store) => store,
            Err(err) => {
                report.record(TickStep::Store, None, None, err);
                return report;
            }
        };

        self.run_daily_reset(store, state, &mut report);
        self.run_inactivity_decay(store, &mut report);
        self.run_challenge_expiry(store, &mut report);
        self.run_reminders(store, &mut report);

        info!(
            "event=scheduler_tick module=scheduler status=ok daily_reset={} counters_reset={} fatigue_resets={} decayed={} expired={} reminders={} notify_failures={} failures={}",
            report.daily_reset_ran,
            report.repeatable_counters_reset,
            report.fatigue_resets,
            report.decayed_users,
            report.expired_challenges,
            report.reminders_sent,
            report.notify_failures,
            report.failures.len()
        );
        report
    }

    /// Ticks every `tick_interval` until `shutdown` turns `true` or its
    /// sender is dropped. Returns the final state.
    pub async fn run(
        self: Arc<Self>,
        mut state: SchedulerState,
        mut shutdown: watch::Receiver<bool>,
    ) -> SchedulerState {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "event=scheduler_start module=scheduler status=ok interval_secs={}",
            self.config.tick_interval_secs
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    let scheduler = Arc::clone(&self);
                    let mut tick_state = state.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        let report = scheduler.tick(&mut tick_state);
                        (tick_state, report)
                    })
                    .await;
                    match joined {
                        Ok((next_state, _report)) => state = next_state,
                        Err(err) => error!(
                            "event=scheduler_tick module=scheduler status=error error={}",
                            err
                        ),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("event=scheduler_stop module=scheduler status=ok");
        state
    }

    fn task_service<'conn>(&self, store: SqliteStore<'conn>) -> TaskService<SqliteStore<'conn>> {
        TaskService::new(store, Arc::clone(&self.clock), self.task_config)
    }

    fn character_service<'conn>(
        &self,
        store: SqliteStore<'conn>,
    ) -> CharacterService<SqliteStore<'conn>> {
        CharacterService::new(store, Arc::clone(&self.clock))
    }

    fn run_daily_reset(
        &self,
        store: SqliteStore<'_>,
        state: &mut SchedulerState,
        report: &mut TickReport,
    ) {
        let today = self.clock.today();
        if state.last_reset_date == Some(today) {
            return;
        }

        match store.reset_daily_completion_counts(today) {
            Ok(count) => report.repeatable_counters_reset = count,
            Err(err) => {
                report.record(TickStep::DailyReset, None, None, err);
                return;
            }
        }

        match store.list_characters_needing_fatigue_reset(today) {
            Ok(user_ids) => {
                let characters = self.character_service(store);
                for user_id in user_ids {
                    match characters.reset_daily_fatigue_for(user_id) {
                        Ok(true) => report.fatigue_resets += 1,
                        Ok(false) => {}
                        Err(err) => {
                            report.record(TickStep::DailyReset, Some(user_id), None, err)
                        }
                    }
                }
            }
            Err(err) => report.record(TickStep::DailyReset, None, None, err),
        }

        state.last_reset_date = Some(today);
        report.daily_reset_ran = true;
    }

    fn run_inactivity_decay(&self, store: SqliteStore<'_>, report: &mut TickReport) {
        let cutoff =
            self.clock.today() - Duration::days(i64::from(self.config.inactivity_threshold_days));
        let user_ids = match store.list_inactive_characters(cutoff) {
            Ok(user_ids) => user_ids,
            Err(err) => {
                report.record(TickStep::InactivityDecay, None, None, err);
                return;
            }
        };

        let characters = self.character_service(store);
        for user_id in user_ids {
            match characters.apply_inactivity_decay(user_id) {
                Ok(Some(decay)) => {
                    report.decayed_users += 1;
                    let body = format!(
                        "You have been away for {} day(s); your attributes faded to {:.0}%.",
                        decay.days_inactive,
                        decay.multiplier * 100.0
                    );
                    self.send(report, user_id, "Your cultivation is fading", &body);
                }
                Ok(None) => {}
                Err(err) => report.record(TickStep::InactivityDecay, Some(user_id), None, err),
            }
        }
    }

    fn run_challenge_expiry(&self, store: SqliteStore<'_>, report: &mut TickReport) {
        let expired = match store.list_expired_active_challenge_tasks(self.clock.now()) {
            Ok(tasks) => tasks,
            Err(err) => {
                report.record(TickStep::ChallengeExpiry, None, None, err);
                return;
            }
        };

        let tasks = self.task_service(store);
        for task in expired {
            match tasks.fail(task.id, DEADLINE_EXCEEDED) {
                Ok(FailOutcome::Failed {
                    task,
                    spirit_stones_lost,
                    ..
                }) => {
                    report.expired_challenges += 1;
                    let body = format!(
                        "Challenge `{}` missed its deadline; {} spirit stones were lost.",
                        task.title, spirit_stones_lost
                    );
                    self.send(report, task.user_id, "Challenge failed", &body);
                }
                Ok(FailOutcome::AlreadySettled { .. }) => {}
                Err(err) => report.record(
                    TickStep::ChallengeExpiry,
                    Some(task.user_id),
                    Some(task.id),
                    err,
                ),
            }
        }
    }

    fn run_reminders(&self, store: SqliteStore<'_>, report: &mut TickReport) {
        let now = self.clock.now();
        let due = match store.list_tasks_due_for_reminder(now) {
            Ok(tasks) => tasks,
            Err(err) => {
                report.record(TickStep::Reminders, None, None, err);
                return;
            }
        };

        for task in due {
            let Some(deadline) = task.deadline else {
                continue;
            };
            let minutes_left = (deadline - now).num_minutes().max(0);
            let body = format!("`{}` is due in {} minute(s).", task.title, minutes_left);
            if self.send(report, task.user_id, "Task deadline approaching", &body) {
                report.reminders_sent += 1;
            }
            // Stamped regardless of the delivery result.
            if let Err(err) = store.mark_reminded(task.id, now) {
                report.record(TickStep::Reminders, Some(task.user_id), Some(task.id), err);
            }
        }
    }

    fn send(&self, report: &mut TickReport, user_id: UserId, title: &str, body: &str) -> bool {
        match self.notifier.notify(user_id, title, body) {
            Ok(()) => true,
            Err(err) => {
                report.notify_failures += 1;
                warn!(
                    "event=notify module=scheduler status=error user_id={} error={}",
                    user_id, err
                );
                false
            }
        }
    }
}
