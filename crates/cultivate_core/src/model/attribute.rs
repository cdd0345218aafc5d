//! Character attribute model.
//!
//! # Responsibility
//! - Define the seven attribute keys and the per-key growth record.
//! - Provide `AttributeSet`, the keyed collection services operate on.
//!
//! # Invariants
//! - Growth keys stay within `[attr_min(realm), attr_cap(realm)]`.
//! - `Luck` carries no realm mechanics.
//! - An `AttributeSet` holds at most one record per key.

use crate::model::character::UserId;
use crate::realm::rules::{attr_cap, attr_min};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Starting value for every attribute of a new character.
pub const INITIAL_ATTRIBUTE_VALUE: f64 = 100.0;

/// Attribute key. Six growth attributes plus luck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKey {
    Physique,
    Willpower,
    Intelligence,
    Perception,
    Charisma,
    Agility,
    /// Non-growth attribute; immune to rewards, penalties and decay.
    Luck,
}

impl AttrKey {
    /// Growth attributes in canonical order.
    pub const GROWTH: [AttrKey; 6] = [
        AttrKey::Physique,
        AttrKey::Willpower,
        AttrKey::Intelligence,
        AttrKey::Perception,
        AttrKey::Charisma,
        AttrKey::Agility,
    ];

    /// Every attribute key, luck last.
    pub const ALL: [AttrKey; 7] = [
        AttrKey::Physique,
        AttrKey::Willpower,
        AttrKey::Intelligence,
        AttrKey::Perception,
        AttrKey::Charisma,
        AttrKey::Agility,
        AttrKey::Luck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Physique => "physique",
            Self::Willpower => "willpower",
            Self::Intelligence => "intelligence",
            Self::Perception => "perception",
            Self::Charisma => "charisma",
            Self::Agility => "agility",
            Self::Luck => "luck",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == value)
    }

    /// Whether this key takes part in realm growth.
    pub fn has_realm(self) -> bool {
        self != Self::Luck
    }

    /// Default category tag used when a quick task names this attribute.
    pub fn default_tag(self) -> &'static str {
        match self {
            Self::Physique => "exercise",
            Self::Willpower => "focus",
            Self::Intelligence => "study",
            Self::Perception => "observation",
            Self::Charisma => "social",
            Self::Agility => "agility",
            Self::Luck => "luck",
        }
    }
}

/// One attribute row of one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub user_id: UserId,
    pub key: AttrKey,
    pub value: f64,
    /// Realm index, `0..=MAX_REALM`.
    pub realm: u32,
    /// Cosmetic stage within the realm; the engine never changes it.
    pub sub_realm: u32,
    /// Experience gathered while bottlenecked; spent by a breakthrough.
    pub realm_exp: i64,
    pub is_bottleneck: bool,
    pub accumulation_pool: f64,
}

impl Attribute {
    /// Fresh Mortal-realm attribute.
    pub fn new(user_id: UserId, key: AttrKey) -> Self {
        Self {
            user_id,
            key,
            value: INITIAL_ATTRIBUTE_VALUE,
            realm: 0,
            sub_realm: 0,
            realm_exp: 0,
            is_bottleneck: false,
            accumulation_pool: 0.0,
        }
    }

    /// Cap of the current realm.
    pub fn cap(&self) -> f64 {
        attr_cap(self.realm)
    }

    /// Floor of the current realm.
    pub fn floor(&self) -> f64 {
        attr_min(self.realm)
    }

    /// Whether `value` respects the realm bounds. Luck is always in range.
    pub fn is_within_realm_bounds(&self) -> bool {
        if !self.key.has_realm() {
            return true;
        }
        self.value >= self.floor() && self.value <= self.cap()
    }
}

/// Attributes of one character, keyed by `AttrKey`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: BTreeMap<AttrKey, Attribute>,
}

impl AttributeSet {
    /// Full set of fresh attributes for a new character.
    pub fn initial(user_id: UserId) -> Self {
        Self::from_vec(
            AttrKey::ALL
                .into_iter()
                .map(|key| Attribute::new(user_id, key))
                .collect(),
        )
    }

    /// Builds a set from loaded rows; a later row for the same key wins.
    pub fn from_vec(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes: attributes
                .into_iter()
                .map(|attribute| (attribute.key, attribute))
                .collect(),
        }
    }

    pub fn get(&self, key: AttrKey) -> Option<&Attribute> {
        self.attributes.get(&key)
    }

    pub fn insert(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.key, attribute);
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// All attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Growth attributes only (luck excluded).
    pub fn growth(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .values()
            .filter(|attribute| attribute.key.has_realm())
    }

    /// Current value of `key`, if loaded.
    pub fn value_of(&self, key: AttrKey) -> Option<f64> {
        self.get(key).map(|attribute| attribute.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_text() {
        for key in AttrKey::ALL {
            assert_eq!(AttrKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(AttrKey::parse("strength"), None);
    }

    #[test]
    fn initial_set_has_every_key_and_growth_excludes_luck() {
        let set = AttributeSet::initial(7);
        assert_eq!(set.len(), 7);
        assert_eq!(set.growth().count(), 6);
        assert!(set.growth().all(|attribute| attribute.key != AttrKey::Luck));
        assert_eq!(set.value_of(AttrKey::Luck), Some(INITIAL_ATTRIBUTE_VALUE));
    }

    #[test]
    fn bounds_check_uses_realm_range() {
        let mut attribute = Attribute::new(1, AttrKey::Agility);
        attribute.realm = 1;
        attribute.value = 150.0;
        assert!(!attribute.is_within_realm_bounds());
        attribute.value = 300.0;
        assert!(attribute.is_within_realm_bounds());
    }
}
