//! Character state use-cases.
//!
//! # Responsibility
//! - Create characters and serve read snapshots with the lazy daily reset.
//! - Apply inactivity decay, realm breakthroughs and item effects.
//!
//! # Invariants
//! - Reads persist the daily reset they apply, in the same transaction.
//! - Decay recomputes inactivity inside its transaction, so a stale scan
//!   never decays a user who became active in between.
//! - The character title always reflects the stored attribute realms.

use crate::clock::Clock;
use crate::model::attribute::{AttrKey, Attribute, AttributeSet};
use crate::model::character::{Character, UserId};
use crate::model::item::ItemEffect;
use crate::realm::growth::{apply_decay, apply_gain, attempt_breakthrough};
use crate::realm::rules::title_for_attributes;
use crate::repo::Store;
use crate::service::error::{EngineError, EngineResult};
use log::info;
use std::sync::Arc;

/// Lowest fraction of value inactivity decay can leave.
pub const MIN_DECAY_MULTIPLIER: f64 = 0.5;
/// Fraction lost per inactive day.
pub const DECAY_PER_DAY: f64 = 0.01;

/// Character plus all of its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterSnapshot {
    pub character: Character,
    pub attributes: AttributeSet,
}

/// Result of one inactivity decay.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayOutcome {
    pub user_id: UserId,
    pub days_inactive: i64,
    pub multiplier: f64,
    pub snapshot: CharacterSnapshot,
}

/// Decay multiplier after `days` of inactivity: `max(0.5, 1 - 0.01 * days)`.
pub fn decay_multiplier(days: i64) -> f64 {
    (1.0 - DECAY_PER_DAY * days.max(0) as f64).max(MIN_DECAY_MULTIPLIER)
}

pub struct CharacterService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> CharacterService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates a Mortal character with all attributes at their initial value.
    ///
    /// # Errors
    /// - `InvalidState` when the user already has a character.
    pub fn create_character(&self, user_id: UserId) -> EngineResult<CharacterSnapshot> {
        let today = self.clock.today();
        let snapshot = self.store.in_transaction(|store| {
            if store.load_character(user_id)?.is_some() {
                return Err(EngineError::InvalidState(format!(
                    "character {user_id} already exists"
                )));
            }
            let attributes = AttributeSet::initial(user_id);
            let mut character = Character::new(user_id, today);
            character.title = title_for_attributes(&attributes);
            store.insert_character(&character, &attributes)?;
            Ok(CharacterSnapshot {
                character,
                attributes,
            })
        })?;
        info!(
            "event=character_create module=character status=ok user_id={}",
            user_id
        );
        Ok(snapshot)
    }

    /// Loads a character, applying and persisting today's fatigue reset first.
    pub fn get_character(&self, user_id: UserId) -> EngineResult<CharacterSnapshot> {
        let today = self.clock.today();
        self.store.in_transaction(|store| {
            let mut character = load_character(store, user_id)?;
            if character.reset_daily_fatigue(today) {
                store.save_character(&character)?;
            }
            let attributes = store.load_attributes(user_id)?;
            Ok(CharacterSnapshot {
                character,
                attributes,
            })
        })
    }

    /// Runs the daily fatigue reset for one user. Returns whether it changed anything.
    pub fn reset_daily_fatigue_for(&self, user_id: UserId) -> EngineResult<bool> {
        let today = self.clock.today();
        self.store.in_transaction(|store| {
            let mut character = load_character(store, user_id)?;
            if !character.reset_daily_fatigue(today) {
                return Ok(false);
            }
            store.save_character(&character)?;
            Ok::<_, EngineError>(true)
        })
    }

    /// Decays every growth attribute of an inactive user.
    ///
    /// Returns `None` when the user was active today. On decay, the last
    /// activity date moves to today so the same days are not charged twice.
    pub fn apply_inactivity_decay(&self, user_id: UserId) -> EngineResult<Option<DecayOutcome>> {
        let today = self.clock.today();
        let outcome = self.store.in_transaction(|store| {
            let mut character = load_character(store, user_id)?;
            let days_inactive = character.days_inactive(today);
            if days_inactive < 1 {
                return Ok(None);
            }

            let multiplier = decay_multiplier(days_inactive);
            let mut attributes = store.load_attributes(user_id)?;
            let decayed: Vec<Attribute> = attributes
                .growth()
                .map(|attribute| apply_decay(attribute, multiplier))
                .collect();
            for attribute in decayed {
                store.save_attribute(&attribute)?;
                attributes.insert(attribute);
            }

            character.title = title_for_attributes(&attributes);
            character.last_activity_date = today;
            store.save_character(&character)?;
            Ok::<_, EngineError>(Some(DecayOutcome {
                user_id,
                days_inactive,
                multiplier,
                snapshot: CharacterSnapshot {
                    character,
                    attributes,
                },
            }))
        })?;

        if let Some(decay) = &outcome {
            info!(
                "event=character_decay module=character status=ok user_id={} days_inactive={} multiplier={:.2}",
                user_id, decay.days_inactive, decay.multiplier
            );
        }
        Ok(outcome)
    }

    /// Spends realm experience to move `key` into its next realm.
    ///
    /// # Errors
    /// - `InvalidState` when the attribute is not ready (see `BreakthroughError`).
    pub fn attempt_breakthrough(&self, user_id: UserId, key: AttrKey) -> EngineResult<Attribute> {
        let attribute = self.store.in_transaction(|store| {
            let mut character = load_character(store, user_id)?;
            let mut attributes = store.load_attributes(user_id)?;
            let current = attributes.get(key).ok_or_else(|| {
                EngineError::NotFound(format!(
                    "attribute {} of character {user_id}",
                    key.as_str()
                ))
            })?;

            let advanced = attempt_breakthrough(current)?;
            store.save_attribute(&advanced)?;
            attributes.insert(advanced.clone());
            character.title = title_for_attributes(&attributes);
            store.save_character(&character)?;
            Ok::<_, EngineError>(advanced)
        })?;
        info!(
            "event=character_breakthrough module=character status=ok user_id={} attr={} realm={}",
            user_id,
            key.as_str(),
            attribute.realm
        );
        Ok(attribute)
    }

    /// Applies `quantity` units of an item effect.
    ///
    /// # Errors
    /// - `InvalidArgument` when `quantity` is zero or the effect amount is negative.
    pub fn apply_item_effect(
        &self,
        user_id: UserId,
        effect: ItemEffect,
        quantity: u32,
    ) -> EngineResult<CharacterSnapshot> {
        if quantity == 0 {
            return Err(EngineError::InvalidArgument(
                "quantity must be positive".to_string(),
            ));
        }
        let negative = match effect {
            ItemEffect::FatigueRestore { amount } | ItemEffect::SpiritStones { amount } => {
                amount < 0
            }
            ItemEffect::AttributeBoost { amount, .. } => amount < 0.0 || !amount.is_finite(),
        };
        if negative {
            return Err(EngineError::InvalidArgument(
                "item effect amount must not be negative".to_string(),
            ));
        }

        let today = self.clock.today();
        let effect = effect.scaled(quantity);
        let snapshot = self.store.in_transaction(|store| {
            let mut character = load_character(store, user_id)?;
            character.reset_daily_fatigue(today);
            let mut attributes = store.load_attributes(user_id)?;

            match effect {
                ItemEffect::FatigueRestore { amount } => character.restore_fatigue(amount),
                ItemEffect::SpiritStones { amount } => character.earn_spirit_stones(amount),
                ItemEffect::AttributeBoost { key, amount } => {
                    let current = attributes.get(key).ok_or_else(|| {
                        EngineError::NotFound(format!(
                            "attribute {} of character {user_id}",
                            key.as_str()
                        ))
                    })?;
                    let grown = apply_gain(current, amount);
                    store.save_attribute(&grown)?;
                    attributes.insert(grown);
                    character.title = title_for_attributes(&attributes);
                }
            }

            store.save_character(&character)?;
            Ok::<_, EngineError>(CharacterSnapshot {
                character,
                attributes,
            })
        })?;
        info!(
            "event=character_item module=character status=ok user_id={} quantity={}",
            user_id, quantity
        );
        Ok(snapshot)
    }
}

fn load_character<S: Store>(store: &S, user_id: UserId) -> EngineResult<Character> {
    store
        .load_character(user_id)?
        .ok_or_else(|| EngineError::NotFound(format!("character {user_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_multiplier_is_bounded() {
        assert_eq!(decay_multiplier(0), 1.0);
        assert!((decay_multiplier(10) - 0.9).abs() < 1e-9);
        assert_eq!(decay_multiplier(50), 0.5);
        assert_eq!(decay_multiplier(100), 0.5);
        assert_eq!(decay_multiplier(-3), 1.0);
    }
}
