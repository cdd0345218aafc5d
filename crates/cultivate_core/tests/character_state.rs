use chrono::{Duration, NaiveDate, TimeZone, Utc};
use cultivate_core::db::open_db_in_memory;
use cultivate_core::service::decay_multiplier;
use cultivate_core::{
    AttrKey, CharacterRepository, CharacterService, EngineError, ItemEffect, ManualClock,
    NewTask, SqliteStore, TaskConfig, TaskKind, TaskService,
};
use std::sync::Arc;

const USER: i64 = 11;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap(),
    ))
}

fn set_attribute(
    store: &SqliteStore<'_>,
    key: AttrKey,
    value: f64,
    realm: u32,
    is_bottleneck: bool,
    realm_exp: i64,
) {
    let mut attribute = store.load_attributes(USER).unwrap().get(key).unwrap().clone();
    attribute.value = value;
    attribute.realm = realm;
    attribute.is_bottleneck = is_bottleneck;
    attribute.realm_exp = realm_exp;
    store.save_attribute(&attribute).unwrap();
}

#[test]
fn new_character_starts_mortal_with_seven_attributes() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let characters = CharacterService::new(store, clock());

    let snapshot = characters.create_character(USER).unwrap();
    assert_eq!(snapshot.character.title, "Mortal");
    assert_eq!(snapshot.character.fatigue_cap, 100);
    assert_eq!(snapshot.attributes.len(), 7);
    assert!(snapshot
        .attributes
        .iter()
        .all(|attribute| attribute.value == 100.0 && attribute.realm == 0));

    assert!(matches!(
        characters.create_character(USER),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        characters.get_character(USER + 1),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn reading_a_character_on_a_new_day_resets_fatigue() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let clock = clock();
    let characters = CharacterService::new(store, clock.clone());
    let tasks = TaskService::new(store, clock.clone(), TaskConfig::default());
    characters.create_character(USER).unwrap();

    let mut heavy = NewTask::new(TaskKind::Once, "move house");
    heavy.fatigue_cost = 150;
    let task = tasks.create(USER, heavy).unwrap();
    tasks.complete(task.id, USER, "web").unwrap();

    let same_day = characters.get_character(USER).unwrap();
    assert_eq!(same_day.character.fatigue, 150);
    assert_eq!(same_day.character.overdraft_penalty, 50.0);

    clock.advance(Duration::days(1));
    let next_day = characters.get_character(USER).unwrap();
    assert_eq!(next_day.character.fatigue, 0);
    assert_eq!(next_day.character.overdraft_penalty, 0.0);
    assert_eq!(
        next_day.character.last_fatigue_reset,
        Some(NaiveDate::from_ymd_opt(2024, 1, 11).unwrap())
    );

    let stored = store.load_character(USER).unwrap().unwrap();
    assert_eq!(stored, next_day.character);
    assert!(!characters.reset_daily_fatigue_for(USER).unwrap());
}

#[test]
fn bottlenecked_gain_goes_to_pool_and_experience() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let clock = clock();
    let characters = CharacterService::new(store, clock.clone());
    let tasks = TaskService::new(store, clock.clone(), TaskConfig::default());
    characters.create_character(USER).unwrap();
    set_attribute(&store, AttrKey::Physique, 200.0, 0, true, 0);
    set_attribute(&store, AttrKey::Agility, 190.0, 0, false, 0);

    let mut new_task = NewTask::new(TaskKind::Once, "triathlon");
    new_task.reward_attributes.physique = 50.0;
    new_task.reward_attributes.agility = 30.0;
    let task = tasks.create(USER, new_task).unwrap();
    let outcome = tasks.complete(task.id, USER, "web").unwrap();

    let physique = outcome.attributes.get(AttrKey::Physique).unwrap();
    assert_eq!(physique.value, 200.0);
    assert_eq!(physique.accumulation_pool, 50.0);
    assert_eq!(physique.realm_exp, 50);

    let agility = outcome.attributes.get(AttrKey::Agility).unwrap();
    assert_eq!(agility.value, 200.0);
    assert!(agility.is_bottleneck);
    assert_eq!(agility.accumulation_pool, 0.0);
    assert!(outcome.message.contains("bottleneck"));
}

#[test]
fn inactivity_decay_is_bounded_and_spares_luck() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let clock = clock();
    let characters = CharacterService::new(store, clock.clone());
    characters.create_character(USER).unwrap();
    set_attribute(&store, AttrKey::Physique, 150.0, 0, false, 0);
    set_attribute(&store, AttrKey::Intelligence, 300.0, 1, false, 0);

    assert!(characters.apply_inactivity_decay(USER).unwrap().is_none());

    clock.advance(Duration::days(100));
    let decay = characters.apply_inactivity_decay(USER).unwrap().unwrap();
    assert_eq!(decay.days_inactive, 100);
    assert_eq!(decay.multiplier, 0.5);
    assert_eq!(decay_multiplier(100), 0.5);

    let attributes = &decay.snapshot.attributes;
    assert_eq!(attributes.value_of(AttrKey::Physique), Some(75.0));
    // Realm 1 floor is 200.
    assert_eq!(attributes.value_of(AttrKey::Intelligence), Some(200.0));
    assert_eq!(attributes.value_of(AttrKey::Luck), Some(100.0));
    assert!(attributes.iter().all(|attribute| attribute.is_within_realm_bounds()));

    let character = store.load_character(USER).unwrap().unwrap();
    assert_eq!(
        character.last_activity_date,
        NaiveDate::from_ymd_opt(2024, 4, 19).unwrap()
    );
    assert!(characters.apply_inactivity_decay(USER).unwrap().is_none());
}

#[test]
fn breakthrough_requires_bottleneck_and_experience() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let characters = CharacterService::new(store, clock());
    characters.create_character(USER).unwrap();

    assert!(matches!(
        characters.attempt_breakthrough(USER, AttrKey::Willpower),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        characters.attempt_breakthrough(USER, AttrKey::Luck),
        Err(EngineError::InvalidState(_))
    ));

    set_attribute(&store, AttrKey::Willpower, 200.0, 0, true, 999);
    assert!(matches!(
        characters.attempt_breakthrough(USER, AttrKey::Willpower),
        Err(EngineError::InvalidState(_))
    ));

    set_attribute(&store, AttrKey::Willpower, 200.0, 0, true, 1000);
    let advanced = characters
        .attempt_breakthrough(USER, AttrKey::Willpower)
        .unwrap();
    assert_eq!(advanced.realm, 1);
    assert_eq!(advanced.value, 200.0);
    assert_eq!(advanced.realm_exp, 0);
    assert!(!advanced.is_bottleneck);

    let snapshot = characters.get_character(USER).unwrap();
    assert_eq!(snapshot.character.title, "Qi Refining");
    assert_eq!(snapshot.attributes.get(AttrKey::Willpower), Some(&advanced));
}

#[test]
fn item_effects_scale_with_quantity() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::try_new(&conn).unwrap();
    let clock = clock();
    let characters = CharacterService::new(store, clock.clone());
    let tasks = TaskService::new(store, clock.clone(), TaskConfig::default());
    characters.create_character(USER).unwrap();

    let mut chores = NewTask::new(TaskKind::Once, "chores");
    chores.fatigue_cost = 30;
    let task = tasks.create(USER, chores).unwrap();
    tasks.complete(task.id, USER, "web").unwrap();

    let restored = characters
        .apply_item_effect(USER, ItemEffect::FatigueRestore { amount: 20 }, 2)
        .unwrap();
    assert_eq!(restored.character.fatigue, 0);

    let rich = characters
        .apply_item_effect(USER, ItemEffect::SpiritStones { amount: 5 }, 3)
        .unwrap();
    assert_eq!(rich.character.spirit_stones, 15);

    let boosted = characters
        .apply_item_effect(
            USER,
            ItemEffect::AttributeBoost {
                key: AttrKey::Willpower,
                amount: 2.5,
            },
            2,
        )
        .unwrap();
    assert_eq!(boosted.attributes.value_of(AttrKey::Willpower), Some(105.0));

    let lucky = characters
        .apply_item_effect(
            USER,
            ItemEffect::AttributeBoost {
                key: AttrKey::Luck,
                amount: 10.0,
            },
            1,
        )
        .unwrap();
    assert_eq!(lucky.attributes.value_of(AttrKey::Luck), Some(100.0));

    assert!(matches!(
        characters.apply_item_effect(USER, ItemEffect::SpiritStones { amount: 5 }, 0),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        characters.apply_item_effect(USER, ItemEffect::FatigueRestore { amount: -1 }, 1),
        Err(EngineError::InvalidArgument(_))
    ));
}
