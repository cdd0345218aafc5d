//! Repository layer abstractions and SQLite implementation.
//!
//! # Responsibility
//! - Define the record-store contracts the engine needs (load, save, scans,
//!   bulk counter reset, append-only log).
//! - Provide `Store::in_transaction`, the unit of atomicity for one user
//!   operation.
//! - Isolate SQL details from services and the scheduler.
//!
//! # Invariants
//! - Save paths report `NotFound` when the target row does not exist.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Task log rows are only ever inserted.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod character_repo;
pub mod store;
pub mod task_repo;

pub use character_repo::CharacterRepository;
pub use store::{SqliteStore, Store};
pub use task_repo::{TaskListQuery, TaskRepository};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error shared by all repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Row addressed by a save does not exist.
    NotFound(String),
    /// Stored row cannot be mapped back into the model.
    InvalidData(String),
    /// Connection schema is not at the version this build expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "record not found: {what}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) mod convert {
    //! Column encodings shared by the SQLite repositories.

    use super::{RepoError, RepoResult};
    use chrono::{DateTime, NaiveDate, Utc};

    const DATE_FORMAT: &str = "%Y-%m-%d";

    pub fn date_to_db(date: NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }

    pub fn parse_date(value: &str, column: &'static str) -> RepoResult<NaiveDate> {
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
    }

    pub fn parse_optional_date(
        value: Option<String>,
        column: &'static str,
    ) -> RepoResult<Option<NaiveDate>> {
        value.map(|text| parse_date(&text, column)).transpose()
    }

    pub fn instant_to_db(instant: DateTime<Utc>) -> i64 {
        instant.timestamp_millis()
    }

    pub fn parse_instant(millis: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid timestamp `{millis}` in {column}"))
        })
    }

    pub fn parse_optional_instant(
        millis: Option<i64>,
        column: &'static str,
    ) -> RepoResult<Option<DateTime<Utc>>> {
        millis.map(|value| parse_instant(value, column)).transpose()
    }

    pub fn bool_to_int(value: bool) -> i64 {
        if value {
            1
        } else {
            0
        }
    }

    pub fn parse_bool(value: i64, column: &'static str) -> RepoResult<bool> {
        match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(RepoError::InvalidData(format!(
                "invalid boolean `{other}` in {column}"
            ))),
        }
    }

    pub fn parse_u32(value: i64, column: &'static str) -> RepoResult<u32> {
        u32::try_from(value)
            .map_err(|_| RepoError::InvalidData(format!("invalid count `{value}` in {column}")))
    }
}
