//! Cultivation progression and task economy engine.
//!
//! Users complete real-life tasks to grow a character through realm-bounded
//! attributes, earn and lose spirit stones, and receive deadline reminders.
//! This crate owns every business invariant; API layers and notification
//! channels sit outside it.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod realm;
pub mod repo;
pub mod scheduler;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, SchedulerConfig, TaskConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging};
pub use model::attribute::{AttrKey, Attribute, AttributeSet};
pub use model::character::{Character, UserId};
pub use model::item::ItemEffect;
pub use model::task::{AttrRewards, Task, TaskAction, TaskId, TaskKind, TaskLogEntry, TaskStatus};
pub use repo::{
    CharacterRepository, RepoError, RepoResult, SqliteStore, Store, TaskListQuery, TaskRepository,
};
pub use scheduler::{
    LogNotifier, Notifier, NotifyError, Scheduler, SchedulerState, TickFailure, TickReport,
    TickStep,
};
pub use service::{
    CharacterService, CharacterSnapshot, CompletionOutcome, EngineError, EngineResult,
    FailOutcome, NewTask, QuickTaskOutcome, QuickTaskRequest, TaskPatch, TaskService,
};

/// Returns the engine crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
