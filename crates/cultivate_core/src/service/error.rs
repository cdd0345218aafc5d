//! Engine error shared by task and character services.

use crate::model::task::CompletionLimit;
use crate::realm::growth::BreakthroughError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EngineResult<T> = Result<T, EngineError>;

/// Business and storage failures surfaced by the engine.
///
/// Business rejections are final; only `Repo` reflects an infrastructure
/// problem the caller may want to retry.
#[derive(Debug)]
pub enum EngineError {
    /// Task or character does not exist.
    NotFound(String),
    /// Caller does not own the task.
    Unauthorized,
    /// Operation is not valid in the record's current state.
    InvalidState(String),
    /// Daily or total completion limit reached.
    LimitExceeded(String),
    /// Input rejected before any state was read.
    InvalidArgument(String),
    Repo(RepoError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Unauthorized => write!(f, "not authorized for this task"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::LimitExceeded(message) => write!(f, "limit exceeded: {message}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<CompletionLimit> for EngineError {
    fn from(value: CompletionLimit) -> Self {
        Self::LimitExceeded(value.to_string())
    }
}

impl From<BreakthroughError> for EngineError {
    fn from(value: BreakthroughError) -> Self {
        Self::InvalidState(value.to_string())
    }
}
