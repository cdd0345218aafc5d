//! Cultivation realm rules and attribute growth.
//!
//! # Responsibility
//! - `rules`: stateless realm arithmetic (caps, floors, breakthrough cost).
//! - `growth`: apply gains, penalties, decay and breakthroughs to one attribute.
//!
//! # Invariants
//! - Nothing in this module touches storage; callers persist returned snapshots.
//! - `AttrKey::Luck` is never changed by any function here.

pub mod growth;
pub mod rules;
