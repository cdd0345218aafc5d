//! Domain model for characters, attributes, tasks and item effects.
//!
//! # Responsibility
//! - Define the records the engine reads and writes.
//! - Keep per-record arithmetic (fatigue, counters, reminders) next to the data.
//!
//! # Invariants
//! - Models are storage-agnostic; SQL mapping lives in `repo`.
//! - Terminal task states are never left.

pub mod attribute;
pub mod character;
pub mod item;
pub mod task;
