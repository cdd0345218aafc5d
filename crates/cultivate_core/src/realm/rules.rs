//! Realm arithmetic.
//!
//! A realm index `r` (0 = Mortal, 8 = Tribulation Transcendence) bounds an
//! attribute to `[attr_min(r), attr_cap(r)]`. Every function is pure; realm
//! indices come from stored, already-valid rows, so nothing here fails.

use crate::model::attribute::AttributeSet;

/// Highest realm index.
pub const MAX_REALM: u32 = 8;
/// Highest sub-realm index ("Peak").
pub const MAX_SUB_REALM: u32 = 3;

// Keeps `100 * 2^level` inside i64.
const MAX_FATIGUE_LEVEL: u32 = 40;

const REALM_NAMES: [&str; (MAX_REALM + 1) as usize] = [
    "Mortal",
    "Qi Refining",
    "Foundation Establishment",
    "Golden Core",
    "Nascent Soul",
    "Spirit Transformation",
    "Body Integration",
    "Great Ascension",
    "Tribulation Transcendence",
];

const SUB_REALM_NAMES: [&str; (MAX_SUB_REALM + 1) as usize] =
    ["Early", "Middle", "Late", "Peak"];

/// Attribute cap for realm `r`: `100 * 2^(r+1)`.
pub fn attr_cap(realm: u32) -> f64 {
    100.0 * 2f64.powi(realm as i32 + 1)
}

/// Attribute floor for realm `r`: the previous realm's cap, or `0` for Mortal.
pub fn attr_min(realm: u32) -> f64 {
    if realm == 0 {
        return 0.0;
    }
    attr_cap(realm - 1)
}

/// Realm experience needed to break out of realm `r`: `1000 * 2^r`.
pub fn breakthrough_exp_required(realm: u32) -> i64 {
    1000 * (1_i64 << realm.min(MAX_REALM))
}

/// Fatigue cap for fatigue level `l`: `100 * 2^l`.
pub fn fatigue_cap_for_level(level: u32) -> i64 {
    100 * (1_i64 << level.min(MAX_FATIGUE_LEVEL))
}

/// Realm whose range contains `value`.
pub fn realm_for_value(value: f64) -> u32 {
    (0..=MAX_REALM)
        .rev()
        .find(|realm| value >= attr_min(*realm))
        .unwrap_or(0)
}

/// Display name for a realm index; out-of-range indices read as "Unknown".
pub fn realm_name(realm: u32) -> &'static str {
    REALM_NAMES.get(realm as usize).copied().unwrap_or("Unknown")
}

/// Display name for a sub-realm index.
pub fn sub_realm_name(sub_realm: u32) -> &'static str {
    SUB_REALM_NAMES
        .get(sub_realm as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// Combined display name, e.g. `Foundation Establishment · Middle`.
pub fn full_realm_name(realm: u32, sub_realm: u32) -> String {
    format!("{} · {}", realm_name(realm), sub_realm_name(sub_realm))
}

/// Character title derived from the highest realm reached by any growth attribute.
pub fn title_for_attributes(attributes: &AttributeSet) -> String {
    let highest = attributes
        .growth()
        .map(|attribute| attribute.realm)
        .max()
        .unwrap_or(0);
    realm_name(highest).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_double_per_realm() {
        assert_eq!(attr_cap(0), 200.0);
        assert_eq!(attr_cap(1), 400.0);
        assert_eq!(attr_cap(8), 51_200.0);
    }

    #[test]
    fn floor_is_previous_cap() {
        assert_eq!(attr_min(0), 0.0);
        assert_eq!(attr_min(1), 200.0);
        assert_eq!(attr_min(3), attr_cap(2));
    }

    #[test]
    fn breakthrough_and_fatigue_costs() {
        assert_eq!(breakthrough_exp_required(0), 1000);
        assert_eq!(breakthrough_exp_required(3), 8000);
        assert_eq!(fatigue_cap_for_level(0), 100);
        assert_eq!(fatigue_cap_for_level(2), 400);
    }

    #[test]
    fn realm_for_value_picks_containing_range() {
        assert_eq!(realm_for_value(0.0), 0);
        assert_eq!(realm_for_value(199.9), 0);
        assert_eq!(realm_for_value(200.0), 1);
        assert_eq!(realm_for_value(1_000_000.0), MAX_REALM);
    }

    #[test]
    fn names_fall_back_to_unknown() {
        assert_eq!(realm_name(0), "Mortal");
        assert_eq!(realm_name(42), "Unknown");
        assert_eq!(full_realm_name(2, 1), "Foundation Establishment · Middle");
    }
}
