//! Character and attribute persistence.
//!
//! # Responsibility
//! - Load/save character rows and their per-key attribute rows.
//! - Provide the scans the scheduler needs (inactive users, pending resets).
//!
//! # Invariants
//! - A character and its attributes are inserted together.
//! - Attribute rows are addressed by `(user_id, attr_key)`.

use super::convert::{
    bool_to_int, date_to_db, parse_bool, parse_date, parse_optional_date, parse_u32,
};
use super::store::{SqliteStore, Store};
use super::{RepoError, RepoResult};
use crate::model::attribute::{AttrKey, Attribute, AttributeSet};
use crate::model::character::{Character, UserId};
use chrono::NaiveDate;
use rusqlite::{params, Row};

const CHARACTER_SELECT_SQL: &str = "SELECT
    user_id,
    spirit_stones,
    fatigue,
    fatigue_cap,
    fatigue_level,
    overdraft_penalty,
    title,
    last_activity_date,
    last_fatigue_reset
FROM characters";

const ATTRIBUTE_SELECT_SQL: &str = "SELECT
    user_id,
    attr_key,
    value,
    realm,
    sub_realm,
    realm_exp,
    is_bottleneck,
    accumulation_pool
FROM character_attributes";

/// Repository interface for character state.
pub trait CharacterRepository {
    /// Inserts a new character together with its attribute rows.
    fn insert_character(&self, character: &Character, attributes: &AttributeSet)
        -> RepoResult<()>;
    fn load_character(&self, user_id: UserId) -> RepoResult<Option<Character>>;
    fn save_character(&self, character: &Character) -> RepoResult<()>;
    fn load_attributes(&self, user_id: UserId) -> RepoResult<AttributeSet>;
    fn save_attribute(&self, attribute: &Attribute) -> RepoResult<()>;
    /// Users whose last activity date is strictly before `cutoff`.
    fn list_inactive_characters(&self, cutoff: NaiveDate) -> RepoResult<Vec<UserId>>;
    /// Users whose daily fatigue reset has not run on `today`.
    fn list_characters_needing_fatigue_reset(&self, today: NaiveDate)
        -> RepoResult<Vec<UserId>>;
}

impl CharacterRepository for SqliteStore<'_> {
    fn insert_character(
        &self,
        character: &Character,
        attributes: &AttributeSet,
    ) -> RepoResult<()> {
        self.in_transaction(|store| {
            store.conn().execute(
                "INSERT INTO characters (
                    user_id,
                    spirit_stones,
                    fatigue,
                    fatigue_cap,
                    fatigue_level,
                    overdraft_penalty,
                    title,
                    last_activity_date,
                    last_fatigue_reset
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                params![
                    character.user_id,
                    character.spirit_stones,
                    character.fatigue,
                    character.fatigue_cap,
                    character.fatigue_level,
                    character.overdraft_penalty,
                    character.title.as_str(),
                    date_to_db(character.last_activity_date),
                    character.last_fatigue_reset.map(date_to_db),
                ],
            )?;

            for attribute in attributes.iter() {
                store.conn().execute(
                    "INSERT INTO character_attributes (
                        user_id,
                        attr_key,
                        value,
                        realm,
                        sub_realm,
                        realm_exp,
                        is_bottleneck,
                        accumulation_pool
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                    params![
                        character.user_id,
                        attribute.key.as_str(),
                        attribute.value,
                        attribute.realm,
                        attribute.sub_realm,
                        attribute.realm_exp,
                        bool_to_int(attribute.is_bottleneck),
                        attribute.accumulation_pool,
                    ],
                )?;
            }
            Ok::<(), RepoError>(())
        })
    }

    fn load_character(&self, user_id: UserId) -> RepoResult<Option<Character>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{CHARACTER_SELECT_SQL} WHERE user_id = ?1;"))?;
        let mut rows = stmt.query([user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_character_row(row)?));
        }
        Ok(None)
    }

    fn save_character(&self, character: &Character) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE characters
             SET
                spirit_stones = ?1,
                fatigue = ?2,
                fatigue_cap = ?3,
                fatigue_level = ?4,
                overdraft_penalty = ?5,
                title = ?6,
                last_activity_date = ?7,
                last_fatigue_reset = ?8
             WHERE user_id = ?9;",
            params![
                character.spirit_stones,
                character.fatigue,
                character.fatigue_cap,
                character.fatigue_level,
                character.overdraft_penalty,
                character.title.as_str(),
                date_to_db(character.last_activity_date),
                character.last_fatigue_reset.map(date_to_db),
                character.user_id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(format!(
                "character {}",
                character.user_id
            )));
        }
        Ok(())
    }

    fn load_attributes(&self, user_id: UserId) -> RepoResult<AttributeSet> {
        let mut stmt = self.conn().prepare(&format!(
            "{ATTRIBUTE_SELECT_SQL} WHERE user_id = ?1 ORDER BY attr_key ASC;"
        ))?;
        let mut rows = stmt.query([user_id])?;
        let mut attributes = Vec::new();
        while let Some(row) = rows.next()? {
            attributes.push(parse_attribute_row(row)?);
        }
        Ok(AttributeSet::from_vec(attributes))
    }

    fn save_attribute(&self, attribute: &Attribute) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE character_attributes
             SET
                value = ?1,
                realm = ?2,
                sub_realm = ?3,
                realm_exp = ?4,
                is_bottleneck = ?5,
                accumulation_pool = ?6
             WHERE user_id = ?7 AND attr_key = ?8;",
            params![
                attribute.value,
                attribute.realm,
                attribute.sub_realm,
                attribute.realm_exp,
                bool_to_int(attribute.is_bottleneck),
                attribute.accumulation_pool,
                attribute.user_id,
                attribute.key.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(format!(
                "attribute {} of character {}",
                attribute.key.as_str(),
                attribute.user_id
            )));
        }
        Ok(())
    }

    fn list_inactive_characters(&self, cutoff: NaiveDate) -> RepoResult<Vec<UserId>> {
        collect_user_ids(
            self,
            "SELECT user_id FROM characters
             WHERE last_activity_date < ?1
             ORDER BY user_id ASC;",
            date_to_db(cutoff),
        )
    }

    fn list_characters_needing_fatigue_reset(
        &self,
        today: NaiveDate,
    ) -> RepoResult<Vec<UserId>> {
        collect_user_ids(
            self,
            "SELECT user_id FROM characters
             WHERE last_fatigue_reset IS NULL OR last_fatigue_reset != ?1
             ORDER BY user_id ASC;",
            date_to_db(today),
        )
    }
}

fn collect_user_ids(store: &SqliteStore<'_>, sql: &str, date: String) -> RepoResult<Vec<UserId>> {
    let mut stmt = store.conn().prepare(sql)?;
    let ids = stmt
        .query_map([date], |row| row.get::<_, UserId>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn parse_character_row(row: &Row<'_>) -> RepoResult<Character> {
    let last_activity: String = row.get("last_activity_date")?;
    Ok(Character {
        user_id: row.get("user_id")?,
        spirit_stones: row.get("spirit_stones")?,
        fatigue: row.get("fatigue")?,
        fatigue_cap: row.get("fatigue_cap")?,
        fatigue_level: parse_u32(row.get("fatigue_level")?, "characters.fatigue_level")?,
        overdraft_penalty: row.get("overdraft_penalty")?,
        title: row.get("title")?,
        last_activity_date: parse_date(&last_activity, "characters.last_activity_date")?,
        last_fatigue_reset: parse_optional_date(
            row.get("last_fatigue_reset")?,
            "characters.last_fatigue_reset",
        )?,
    })
}

fn parse_attribute_row(row: &Row<'_>) -> RepoResult<Attribute> {
    let key_text: String = row.get("attr_key")?;
    let key = AttrKey::parse(&key_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid attribute key `{key_text}` in character_attributes.attr_key"
        ))
    })?;

    Ok(Attribute {
        user_id: row.get("user_id")?,
        key,
        value: row.get("value")?,
        realm: parse_u32(row.get("realm")?, "character_attributes.realm")?,
        sub_realm: parse_u32(row.get("sub_realm")?, "character_attributes.sub_realm")?,
        realm_exp: row.get("realm_exp")?,
        is_bottleneck: parse_bool(
            row.get("is_bottleneck")?,
            "character_attributes.is_bottleneck",
        )?,
        accumulation_pool: row.get("accumulation_pool")?,
    })
}
