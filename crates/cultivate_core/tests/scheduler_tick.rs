use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use cultivate_core::db::open_db;
use cultivate_core::{
    AttrKey, CharacterRepository, CharacterService, Clock, ManualClock, NewTask, Notifier,
    NotifyError, Scheduler, SchedulerConfig, SchedulerState, SqliteStore, TaskAction, TaskConfig,
    TaskId, TaskKind, TaskRepository, TaskService, TaskStatus, TickStep, UserId,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;

const USER: UserId = 21;
const OTHER_USER: UserId = 22;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
    failing_users: Mutex<HashSet<UserId>>,
}

impl RecordingNotifier {
    fn fail_for(&self, user_id: UserId) {
        self.failing_users.lock().unwrap().insert(user_id);
    }

    fn titles_for(&self, user_id: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, title)| title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: UserId, title: &str, _body: &str) -> Result<(), NotifyError> {
        if self.failing_users.lock().unwrap().contains(&user_id) {
            return Err(NotifyError::Delivery("channel down".to_string()));
        }
        self.sent.lock().unwrap().push((user_id, title.to_string()));
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    conn: Connection,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    scheduler: Scheduler,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    fn with_config(config: SchedulerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cultivate.db");
        let conn = open_db(&path).unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_for(&path, &clock, &notifier, config);

        let harness = Self {
            _dir: dir,
            conn,
            clock,
            notifier,
            scheduler,
        };
        harness.characters().create_character(USER).unwrap();
        harness.characters().create_character(OTHER_USER).unwrap();
        harness
    }

    fn store(&self) -> SqliteStore<'_> {
        SqliteStore::try_new(&self.conn).unwrap()
    }

    fn tasks(&self) -> TaskService<SqliteStore<'_>> {
        TaskService::new(self.store(), self.clock.clone(), TaskConfig::default())
    }

    fn characters(&self) -> CharacterService<SqliteStore<'_>> {
        CharacterService::new(self.store(), self.clock.clone())
    }

    fn create_challenge(&self, user_id: UserId, deadline_in: Duration) -> TaskId {
        let mut new_task = NewTask::new(TaskKind::Challenge, "finish the report");
        new_task.deadline = Some(self.clock.now() + deadline_in);
        new_task.reward_spirit_stones = 100;
        self.tasks().create(user_id, new_task).unwrap().id
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()
}

fn scheduler_for(
    path: &Path,
    clock: &Arc<ManualClock>,
    notifier: &Arc<RecordingNotifier>,
    config: SchedulerConfig,
) -> Scheduler {
    Scheduler::new(
        open_db(path).unwrap(),
        clock.clone(),
        notifier.clone(),
        config,
        TaskConfig::default(),
    )
}

#[test]
fn expired_challenge_fails_once_with_floored_penalty() {
    let harness = Harness::new();
    let task_id = harness.create_challenge(USER, Duration::hours(1));

    let mut warmup = NewTask::new(TaskKind::Once, "warmup");
    warmup.reward_spirit_stones = 30;
    let warmup = harness.tasks().create(USER, warmup).unwrap();
    harness.tasks().complete(warmup.id, USER, "web").unwrap();

    let mut state = SchedulerState::default();
    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.expired_challenges, 0);

    harness.clock.advance(Duration::hours(2));
    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.expired_challenges, 1);
    assert!(report.failures.is_empty());

    let task = harness.tasks().get_task(task_id, USER).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let character = harness.store().load_character(USER).unwrap().unwrap();
    assert_eq!(character.spirit_stones, 0);
    assert_eq!(
        harness.notifier.titles_for(USER),
        vec!["Challenge failed".to_string()]
    );

    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.expired_challenges, 0);
    let logs = harness.tasks().list_task_logs(task_id, USER).unwrap();
    let fail_logs = logs
        .iter()
        .filter(|entry| entry.action == TaskAction::Fail)
        .count();
    assert_eq!(fail_logs, 1);
}

#[test]
fn daily_reset_runs_once_per_day() {
    let harness = Harness::new();
    let mut new_task = NewTask::new(TaskKind::Repeatable, "meditate");
    new_task.daily_limit = 1;
    new_task.fatigue_cost = 40;
    let task = harness.tasks().create(USER, new_task).unwrap();
    harness.tasks().complete(task.id, USER, "web").unwrap();

    let mut state = SchedulerState::default();
    let report = harness.scheduler.tick(&mut state);
    assert!(report.daily_reset_ran);
    assert_eq!(report.repeatable_counters_reset, 0);
    assert_eq!(state.last_reset_date, Some(start().date_naive()));

    let report = harness.scheduler.tick(&mut state);
    assert!(!report.daily_reset_ran);

    harness.clock.advance(Duration::days(1));
    let report = harness.scheduler.tick(&mut state);
    assert!(report.daily_reset_ran);
    assert_eq!(report.repeatable_counters_reset, 1);
    assert_eq!(report.fatigue_resets, 2);

    let stored = harness.store().load_task(task.id).unwrap().unwrap();
    assert_eq!(stored.today_completion_count, 0);
    assert_eq!(stored.completed_count, 1);
    let character = harness.store().load_character(USER).unwrap().unwrap();
    assert_eq!(character.fatigue, 0);

    harness.tasks().complete(task.id, USER, "web").unwrap();
}

#[test]
fn daily_reset_guard_is_not_stamped_when_bulk_reset_fails() {
    let harness = Harness::new();
    let mut state = SchedulerState::default();

    harness
        .conn
        .execute_batch("ALTER TABLE tasks RENAME TO tasks_offline;")
        .unwrap();
    let report = harness.scheduler.tick(&mut state);
    assert!(!report.daily_reset_ran);
    assert_eq!(state.last_reset_date, None);
    assert!(report
        .failures
        .iter()
        .any(|failure| failure.step == TickStep::DailyReset));
    assert!(report
        .failures
        .iter()
        .any(|failure| failure.step == TickStep::ChallengeExpiry));

    harness
        .conn
        .execute_batch("ALTER TABLE tasks_offline RENAME TO tasks;")
        .unwrap();
    let report = harness.scheduler.tick(&mut state);
    assert!(report.daily_reset_ran);
    assert!(report.failures.is_empty());
    assert_eq!(state.last_reset_date, Some(start().date_naive()));
}

#[test]
fn inactive_users_decay_after_threshold_and_are_notified() {
    let harness = Harness::new();
    let store = harness.store();
    let mut physique = store
        .load_attributes(USER)
        .unwrap()
        .get(AttrKey::Physique)
        .unwrap()
        .clone();
    physique.value = 150.0;
    store.save_attribute(&physique).unwrap();

    let mut state = SchedulerState::default();
    harness.clock.advance(Duration::days(1));
    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.decayed_users, 0);

    harness.clock.advance(Duration::days(1));
    harness.notifier.fail_for(OTHER_USER);
    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.decayed_users, 2);
    assert_eq!(report.notify_failures, 1);
    assert!(report.failures.is_empty());

    let attributes = harness.store().load_attributes(USER).unwrap();
    let physique = attributes.value_of(AttrKey::Physique).unwrap();
    assert!((physique - 147.0).abs() < 1e-9);
    assert_eq!(attributes.value_of(AttrKey::Luck), Some(100.0));
    assert_eq!(
        harness.notifier.titles_for(USER),
        vec!["Your cultivation is fading".to_string()]
    );
    assert!(harness.notifier.titles_for(OTHER_USER).is_empty());

    let character = harness.store().load_character(OTHER_USER).unwrap().unwrap();
    assert_eq!(
        character.last_activity_date,
        NaiveDate::from_ymd_opt(2024, 2, 3).unwrap()
    );

    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.decayed_users, 0);
}

#[test]
fn reminders_follow_window_and_interval() {
    let harness = Harness::new();
    let mut new_task = NewTask::new(TaskKind::Once, "submit form");
    new_task.deadline = Some(harness.clock.now() + Duration::minutes(90));
    new_task.remind_before_minutes = 60;
    new_task.remind_interval_minutes = 15;
    let task = harness.tasks().create(USER, new_task).unwrap();

    let mut state = SchedulerState::default();
    assert_eq!(harness.scheduler.tick(&mut state).reminders_sent, 0);

    harness.clock.advance(Duration::minutes(31));
    assert_eq!(harness.scheduler.tick(&mut state).reminders_sent, 1);
    let stored = harness.store().load_task(task.id).unwrap().unwrap();
    assert_eq!(stored.last_reminded_at, Some(harness.clock.now()));

    assert_eq!(harness.scheduler.tick(&mut state).reminders_sent, 0);

    harness.clock.advance(Duration::minutes(15));
    assert_eq!(harness.scheduler.tick(&mut state).reminders_sent, 1);

    harness.clock.advance(Duration::minutes(60));
    assert_eq!(harness.scheduler.tick(&mut state).reminders_sent, 0);
    assert_eq!(
        harness.notifier.titles_for(USER),
        vec![
            "Task deadline approaching".to_string(),
            "Task deadline approaching".to_string()
        ]
    );
}

#[test]
fn failed_reminder_delivery_still_stamps_and_other_users_continue() {
    let harness = Harness::new();
    let make = |user_id| {
        let mut new_task = NewTask::new(TaskKind::Once, "call the bank");
        new_task.deadline = Some(harness.clock.now() + Duration::minutes(30));
        new_task.remind_before_minutes = 60;
        harness.tasks().create(user_id, new_task).unwrap()
    };
    let failing = make(OTHER_USER);
    let working = make(USER);
    harness.notifier.fail_for(OTHER_USER);

    let mut state = SchedulerState::default();
    let report = harness.scheduler.tick(&mut state);
    assert_eq!(report.reminders_sent, 1);
    assert_eq!(report.notify_failures, 1);

    let failing = harness.store().load_task(failing.id).unwrap().unwrap();
    assert_eq!(failing.last_reminded_at, Some(harness.clock.now()));
    let working = harness.store().load_task(working.id).unwrap().unwrap();
    assert_eq!(working.last_reminded_at, Some(harness.clock.now()));

    assert_eq!(harness.scheduler.tick(&mut state).notify_failures, 0);
}

#[tokio::test]
async fn run_loop_ticks_until_shutdown() {
    let harness = Harness::with_config(SchedulerConfig {
        tick_interval_secs: 1,
        inactivity_threshold_days: 1,
    });
    let task_id = harness.create_challenge(USER, Duration::minutes(5));
    harness.clock.advance(Duration::minutes(10));

    let Harness {
        _dir,
        conn,
        clock,
        notifier,
        scheduler,
    } = harness;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::new(scheduler).run(SchedulerState::default(), shutdown_rx));

    let store = SqliteStore::try_new(&conn).unwrap();
    let mut failed = false;
    for _ in 0..250 {
        let task = store.load_task(task_id).unwrap().unwrap();
        if task.status == TaskStatus::Failed {
            failed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(failed, "scheduler loop never expired the challenge");

    shutdown_tx.send(true).unwrap();
    let state = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.last_reset_date, Some(clock.today()));
    assert_eq!(
        notifier.titles_for(USER),
        vec!["Challenge failed".to_string()]
    );
}
