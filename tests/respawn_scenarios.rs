mod common;

use common::*;
use hearth_realm::content::{SpawnGroupFlags, SpawnGroupTemplate};
use hearth_realm::{
    AsyncRespawnStore, ContentCatalog, FileRespawnStore, InstancePolicy, MemoryRespawnStore,
    RespawnStore, SpawnCategory, SpawnKey, WorldInstance,
};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn test_earlier_record_fires_first_regardless_of_insertion_order() {
    let mut catalog = ContentCatalog::new();
    catalog.add_spawn_point(creature_point(1, 0.0));
    catalog.add_spawn_point(creature_point(2, 10.0));
    let mut instance = instance_with(catalog, Box::new(MemoryRespawnStore::new()));

    let t = instance.game_time() + 1;
    let b = record(&instance, 2, t + 10);
    let a = record(&instance, 1, t);
    instance.add_respawn_info(b);
    instance.add_respawn_info(a);
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(1)), Some(t));
    assert_eq!(
        instance.respawns().due_order(),
        vec![SpawnKey::creature(1), SpawnKey::creature(2)]
    );

    // Records hold the spawn points back while the cell loads
    load_origin(&mut instance);
    assert!(instance.lookup_by_spawn_identity(SpawnKey::creature(1)).is_empty());

    let report = instance.update(1_000);
    assert_eq!(report.respawns.fired, 1);
    assert_eq!(instance.lookup_by_spawn_identity(SpawnKey::creature(1)).len(), 1);
    assert!(instance.lookup_by_spawn_identity(SpawnKey::creature(2)).is_empty());
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(1)), None);
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(2)), Some(t + 10));
}

#[test]
fn test_duplicate_record_is_fatal_and_keeps_existing() {
    let mut instance = empty_instance();
    let due = instance.game_time() + 30;
    instance.add_respawn_info(record(&instance, 5, due));

    let duplicate = record(&instance, 5, due + 100);
    let result = catch_unwind(AssertUnwindSafe(|| instance.add_respawn_info(duplicate)));
    assert!(result.is_err());
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(5)), Some(due));
}

fn group_catalog() -> ContentCatalog {
    let mut catalog = ContentCatalog::new();
    catalog.add_spawn_group(SpawnGroupTemplate::new(7, "camp").with_flags(SpawnGroupFlags::default()));
    for id in 1..=3 {
        catalog.add_spawn_point(creature_point(id, id as f32 * 10.0).in_group(7));
    }
    catalog
}

fn live_group_with_records() -> (hearth_realm::WorldInstance, i64) {
    let mut instance = instance_with(group_catalog(), Box::new(MemoryRespawnStore::new()));
    load_origin(&mut instance);
    for id in 1..=3 {
        assert_eq!(instance.lookup_by_spawn_identity(SpawnKey::creature(id)).len(), 1);
    }
    let due = instance.game_time() + 500;
    for id in 1..=3 {
        let rec = record(&instance, id, due);
        instance.add_respawn_info(rec);
    }
    (instance, due)
}

#[test]
fn test_spawn_group_despawn_deleting_respawn_times() {
    let (mut instance, _) = live_group_with_records();

    assert_eq!(instance.spawn_group_despawn(7, true).unwrap(), 3);
    for id in 1..=3 {
        assert!(instance.lookup_by_spawn_identity(SpawnKey::creature(id)).is_empty());
        assert_eq!(instance.get_respawn_time(SpawnKey::creature(id)), None);
    }
    assert!(!instance.is_spawn_group_active(7));
}

#[test]
fn test_spawn_group_despawn_keeping_respawn_times() {
    let (mut instance, due) = live_group_with_records();

    assert_eq!(instance.spawn_group_despawn(7, false).unwrap(), 3);
    for id in 1..=3 {
        assert!(instance.lookup_by_spawn_identity(SpawnKey::creature(id)).is_empty());
        assert_eq!(instance.get_respawn_time(SpawnKey::creature(id)), Some(due));
    }
}

#[test]
fn test_disabled_group_reschedules_instead_of_deleting() {
    let mut instance = instance_with(group_catalog(), Box::new(MemoryRespawnStore::new()));
    instance.set_spawn_group_active(7, false);
    load_origin(&mut instance);
    assert!(instance.lookup_by_spawn_identity(SpawnKey::creature(1)).is_empty());

    let now = instance.game_time();
    instance.add_respawn_info(record(&instance, 1, now));
    let report = instance.update(0);
    assert_eq!(report.respawns.rescheduled, 1);
    let recheck = instance.context().config().respawn.group_recheck_secs as i64;
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(1)), Some(now + recheck));
}

#[test]
fn test_records_survive_restart_with_shared_store() {
    let store = MemoryRespawnStore::new();
    let mut instance = instance_with(ContentCatalog::new(), Box::new(store.clone()));
    let base = instance.game_time();
    for (id, offset) in [(9u64, 40i64), (3, 10), (6, 25)] {
        let rec = record(&instance, id, base + offset);
        instance.add_respawn_info(rec);
    }
    instance.remove_respawn_time(SpawnKey::creature(6), false);
    instance.shutdown().unwrap();
    drop(instance);

    let restarted = instance_with(ContentCatalog::new(), Box::new(store.clone()));
    let tuples: BTreeSet<(SpawnCategory, u64, i64)> = restarted
        .respawn_records()
        .map(|r| (r.category, r.spawn_id, r.due_time))
        .collect();
    let expected: BTreeSet<_> = [
        (SpawnCategory::Creature, 3, base + 10),
        (SpawnCategory::Creature, 9, base + 40),
    ]
    .into_iter()
    .collect();
    assert_eq!(tuples, expected);
    assert_eq!(store.row_count(1), 2);
}

#[test]
fn test_records_survive_restart_with_file_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut instance = instance_with(
        ContentCatalog::new(),
        Box::new(FileRespawnStore::open(dir.path()).unwrap()),
    );
    let due = instance.game_time() + 90;
    instance.add_respawn_info(record(&instance, 4, due));
    instance.shutdown().unwrap();
    drop(instance);

    let restarted = instance_with(
        ContentCatalog::new(),
        Box::new(FileRespawnStore::open(dir.path()).unwrap()),
    );
    assert_eq!(restarted.get_respawn_time(SpawnKey::creature(4)), Some(due));
}

#[test]
fn test_failed_store_write_is_retried_next_tick() {
    let store = MemoryRespawnStore::new();
    let mut instance = instance_with(ContentCatalog::new(), Box::new(store.clone()));

    store.fail_next_writes(1);
    let due = instance.game_time() + 300;
    instance.add_respawn_info(record(&instance, 8, due));
    // Memory keeps the record even though the write failed
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(8)), Some(due));
    assert_eq!(store.row_count(1), 0);
    assert_eq!(instance.respawns().pending_write_count(), 1);

    instance.update(100);
    assert_eq!(store.row(1, SpawnCategory::Creature, 8).map(|r| r.due_time), Some(due));
    assert_eq!(instance.respawns().pending_write_count(), 0);
}

#[test]
fn test_due_respawn_in_unloaded_cell_waits_for_load() {
    let mut catalog = ContentCatalog::new();
    catalog.add_spawn_point(creature_point(1, 0.0));
    let mut instance = instance_with(catalog, Box::new(MemoryRespawnStore::new()));
    let due = instance.game_time();
    instance.add_respawn_info(record(&instance, 1, due));

    let report = instance.update(1_000);
    assert_eq!(report.respawns.parked, 1);
    let origin = instance.cell_of(&hearth_realm::Position::default()).unwrap();
    assert!(!instance.is_cell_loaded(origin));
    assert_eq!(instance.get_respawn_time(SpawnKey::creature(1)), Some(due));

    assert_eq!(instance.add_player(player(1, 0.0, 0.0)), hearth_realm::EnterState::CanEnter);
    let report = instance.update(1_000);
    assert_eq!(report.respawns.fired, 1);
    assert_eq!(instance.lookup_by_spawn_identity(SpawnKey::creature(1)).len(), 1);
}

#[test]
fn test_open_uses_configured_file_backend() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = config();
    config.persistence.backend = hearth_realm::config::PersistenceBackend::File;
    config.persistence.directory = dir.path().to_path_buf();
    config.persistence.asynchronous = true;

    let context = context_with(config, ContentCatalog::new());
    let mut instance = hearth_realm::WorldInstance::open(
        4,
        context.clone(),
        hearth_realm::InstancePolicy::open_world(),
        START_MS,
    )
    .unwrap();
    let due = instance.game_time() + 15;
    instance.add_respawn_info(record(&instance, 2, due));
    instance.shutdown().unwrap();
    drop(instance);

    let mut reopened = FileRespawnStore::open(dir.path()).unwrap();
    let rows = reopened.load_all_respawns(4).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].due_time, due);
}

#[test]
fn test_failed_file_delete_does_not_resurrect_spawn() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut instance = instance_with(
        ContentCatalog::new(),
        Box::new(FileRespawnStore::open(dir.path()).unwrap()),
    );
    let due = instance.game_time() + 90;
    instance.add_respawn_info(record(&instance, 6, due));

    // A directory on the temp path makes the rewrite fail
    let blocker = FileRespawnStore::open(dir.path())
        .unwrap()
        .instance_path(1)
        .with_extension("tmp");
    std::fs::create_dir(&blocker).unwrap();
    instance.remove_respawn_time(SpawnKey::creature(6), false);
    assert_eq!(instance.respawns().pending_write_count(), 1);

    std::fs::remove_dir(&blocker).unwrap();
    instance.update(100);
    assert_eq!(instance.respawns().pending_write_count(), 0);
    instance.shutdown().unwrap();
    drop(instance);

    let restarted = instance_with(
        ContentCatalog::new(),
        Box::new(FileRespawnStore::open(dir.path()).unwrap()),
    );
    assert_eq!(restarted.get_respawn_time(SpawnKey::creature(6)), None);
}

/// Arena instance over an async writer, starting with one stored record
fn arena_over(backing: &MemoryRespawnStore) -> WorldInstance {
    {
        let mut seeder = instance_with(ContentCatalog::new(), Box::new(backing.clone()));
        let due = seeder.game_time() + 90;
        let rec = record(&seeder, 2, due);
        seeder.add_respawn_info(rec);
    }
    let instance = WorldInstance::new(
        1,
        context_with(config(), ContentCatalog::new()),
        InstancePolicy::arena(10),
        Box::new(AsyncRespawnStore::spawn(backing.clone()).unwrap()),
        START_MS,
    )
    .unwrap();
    assert!(instance.get_respawn_time(SpawnKey::creature(2)).is_some());
    instance
}

#[test]
fn test_async_teardown_clear_is_retried() {
    let backing = MemoryRespawnStore::new();
    let mut instance = arena_over(&backing);

    backing.fail_next_writes(1);
    instance.shutdown().unwrap();
    drop(instance);
    assert_eq!(backing.row_count(1), 0);

    let restarted = instance_with(ContentCatalog::new(), Box::new(backing.clone()));
    assert_eq!(restarted.get_respawn_time(SpawnKey::creature(2)), None);
}

#[test]
fn test_teardown_reports_clear_that_never_lands() {
    let backing = MemoryRespawnStore::new();
    let mut instance = arena_over(&backing);

    backing.fail_next_writes(100);
    assert!(instance.shutdown().is_err());
    assert_eq!(instance.respawns().pending_write_count(), 1);
    assert_eq!(backing.row_count(1), 1);
}

#[test]
fn test_async_file_store_retries_failed_delete() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut instance = instance_with(
        ContentCatalog::new(),
        Box::new(AsyncRespawnStore::spawn(FileRespawnStore::open(dir.path()).unwrap()).unwrap()),
    );
    let due = instance.game_time() + 45;
    instance.add_respawn_info(record(&instance, 3, due));
    instance.shutdown().unwrap();

    let blocker = FileRespawnStore::open(dir.path())
        .unwrap()
        .instance_path(1)
        .with_extension("tmp");
    std::fs::create_dir(&blocker).unwrap();
    instance.remove_respawn_time(SpawnKey::creature(3), false);
    // The failure surfaces once the writer has run, and stays pending
    assert!(instance.shutdown().is_err());

    std::fs::remove_dir(&blocker).unwrap();
    instance.shutdown().unwrap();
    drop(instance);

    let mut reopened = FileRespawnStore::open(dir.path()).unwrap();
    assert!(reopened.load_all_respawns(1).unwrap().is_empty());
}
