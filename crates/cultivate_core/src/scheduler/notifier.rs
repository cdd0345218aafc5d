//! Outbound user notifications.
//!
//! Concrete channels (chat bots, mobile push) live outside the engine and
//! plug in through `Notifier`. Delivery failures are reported to the caller
//! and never undo engine state.

use crate::model::character::UserId;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The user has no reachable channel.
    NoChannel(UserId),
    /// The channel refused or dropped the message.
    Delivery(String),
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoChannel(user_id) => write!(f, "no notification channel for user {user_id}"),
            Self::Delivery(message) => write!(f, "notification delivery failed: {message}"),
        }
    }
}

impl Error for NotifyError {}

/// Delivery seam for scheduler notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: UserId, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that only writes the notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user_id: UserId, title: &str, body: &str) -> Result<(), NotifyError> {
        info!(
            "event=notify module=scheduler status=ok user_id={} title={:?} body_len={}",
            user_id,
            title,
            body.chars().count()
        );
        Ok(())
    }
}
