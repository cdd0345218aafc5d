//! Attribute growth processor.
//!
//! # Responsibility
//! - Route gains into value or, while bottlenecked, into the accumulation pool.
//! - Apply penalties and decay without crossing the realm floor.
//! - Advance a bottlenecked attribute to the next realm on breakthrough.
//!
//! # Invariants
//! - Gains never push `value` above `attr_cap(realm)`; the excess of the
//!   capping gain is discarded, not pooled.
//! - Penalties and decay never push `value` below `attr_min(realm)` and leave
//!   bottleneck, pool and experience untouched.
//! - Luck is returned unchanged by every function.

use crate::model::attribute::Attribute;
use crate::realm::rules::{attr_cap, attr_min, breakthrough_exp_required, MAX_REALM};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reasons a breakthrough cannot happen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakthroughError {
    /// Luck has no realms.
    NoRealm,
    /// The attribute has not reached its realm cap.
    NotBottlenecked,
    /// Already at the highest realm.
    MaxRealmReached,
    InsufficientExperience { required: i64, current: i64 },
}

impl Display for BreakthroughError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRealm => write!(f, "attribute has no realm"),
            Self::NotBottlenecked => write!(f, "attribute has not reached its realm cap"),
            Self::MaxRealmReached => write!(f, "attribute is already at the highest realm"),
            Self::InsufficientExperience { required, current } => write!(
                f,
                "breakthrough needs {required} realm experience, have {current}"
            ),
        }
    }
}

impl Error for BreakthroughError {}

/// Applies a reward gain.
///
/// Non-positive gains and luck are no-ops.
pub fn apply_gain(attribute: &Attribute, gain: f64) -> Attribute {
    let mut next = attribute.clone();
    if !attribute.key.has_realm() || gain <= 0.0 {
        return next;
    }

    if next.is_bottleneck {
        next.accumulation_pool += gain;
        next.realm_exp = next.realm_exp.saturating_add(gain.floor() as i64);
        return next;
    }

    let cap = attr_cap(next.realm);
    next.value += gain;
    if next.value >= cap {
        next.value = cap;
        next.is_bottleneck = true;
    }
    next
}

/// Lowers the value by `amount`, stopping at the realm floor.
pub fn apply_penalty(attribute: &Attribute, amount: f64) -> Attribute {
    let mut next = attribute.clone();
    if !attribute.key.has_realm() || amount <= 0.0 {
        return next;
    }
    next.value = (next.value - amount).max(attr_min(next.realm));
    next
}

/// Scales the value by `multiplier`, stopping at the realm floor.
pub fn apply_decay(attribute: &Attribute, multiplier: f64) -> Attribute {
    let mut next = attribute.clone();
    if !attribute.key.has_realm() {
        return next;
    }
    next.value = (next.value * multiplier).max(attr_min(next.realm));
    next
}

/// Spends realm experience to advance one realm.
///
/// The value stays where it is; the old cap is the new realm's floor.
pub fn attempt_breakthrough(attribute: &Attribute) -> Result<Attribute, BreakthroughError> {
    if !attribute.key.has_realm() {
        return Err(BreakthroughError::NoRealm);
    }
    if !attribute.is_bottleneck {
        return Err(BreakthroughError::NotBottlenecked);
    }
    if attribute.realm >= MAX_REALM {
        return Err(BreakthroughError::MaxRealmReached);
    }
    let required = breakthrough_exp_required(attribute.realm);
    if attribute.realm_exp < required {
        return Err(BreakthroughError::InsufficientExperience {
            required,
            current: attribute.realm_exp,
        });
    }

    let mut next = attribute.clone();
    next.realm += 1;
    next.sub_realm = 0;
    next.realm_exp = 0;
    next.accumulation_pool = 0.0;
    next.is_bottleneck = false;
    next.value = next.value.max(attr_min(next.realm));
    Ok(next)
}
