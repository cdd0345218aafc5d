//! Consumable item effects.
//!
//! Shop stock, pricing and inventory live outside the engine; callers hand
//! the engine an already-resolved effect to apply to a character.

use crate::model::attribute::AttrKey;
use serde::{Deserialize, Serialize};

/// What using one unit of an item does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Lowers fatigue, never below zero.
    FatigueRestore { amount: i64 },
    /// Grows one attribute through the normal gain rules.
    AttributeBoost { key: AttrKey, amount: f64 },
    /// Grants spirit stones.
    SpiritStones { amount: i64 },
}

impl ItemEffect {
    /// Same effect scaled for `quantity` units.
    pub fn scaled(self, quantity: u32) -> Self {
        match self {
            Self::FatigueRestore { amount } => Self::FatigueRestore {
                amount: amount.saturating_mul(i64::from(quantity)),
            },
            Self::AttributeBoost { key, amount } => Self::AttributeBoost {
                key,
                amount: amount * f64::from(quantity),
            },
            Self::SpiritStones { amount } => Self::SpiritStones {
                amount: amount.saturating_mul(i64::from(quantity)),
            },
        }
    }
}
