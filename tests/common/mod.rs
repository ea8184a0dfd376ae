#![allow(dead_code)]

use hearth_realm::{
    ContentCatalog, EntityKind, FlatTerrain, GuidCategory, InstancePolicy, MemoryRespawnStore,
    ObjectGuid, Position, RealmConfig, RespawnRecord, RespawnStore, SpawnCategory, SpawnPoint,
    TemplateMaterializer, WorldContext, WorldEntity, WorldInstance,
};
use std::sync::Arc;

pub const CREATURE_TEMPLATE: u32 = 1;
pub const EFFECT_TEMPLATE: u32 = 2;
pub const ZONE: u32 = 10;
/// Game time the test instances start at, in milliseconds
pub const START_MS: i64 = 1_000_000;

pub fn config() -> RealmConfig {
    let mut config = RealmConfig::default();
    config.grid.width = 8;
    config.grid.height = 8;
    config.grid.cell_size = 100.0;
    config.grid.unload_delay_ms = 1_000;
    config.grid.load_radius_cells = 0;
    config
}

pub fn context_with(config: RealmConfig, catalog: ContentCatalog) -> Arc<WorldContext> {
    let materializer = TemplateMaterializer::new()
        .with_template(CREATURE_TEMPLATE, EntityKind::Creature)
        .with_template(EFFECT_TEMPLATE, EntityKind::DynamicEffect);
    WorldContext::new(
        config,
        catalog,
        Arc::new(materializer),
        Arc::new(FlatTerrain { zone_id: ZONE }),
    )
    .expect("valid test context")
}

pub fn instance_with(catalog: ContentCatalog, store: Box<dyn RespawnStore>) -> WorldInstance {
    WorldInstance::new(
        1,
        context_with(config(), catalog),
        InstancePolicy::open_world(),
        store,
        START_MS,
    )
    .expect("instance")
}

pub fn empty_instance() -> WorldInstance {
    instance_with(ContentCatalog::new(), Box::new(MemoryRespawnStore::new()))
}

/// Spawn point `spawn_id` at `x`, 0 in the default group
pub fn creature_point(spawn_id: u64, x: f32) -> SpawnPoint {
    SpawnPoint::new(
        hearth_realm::SpawnKey::creature(spawn_id),
        CREATURE_TEMPLATE,
        Position::new(x, 0.0, 0.0),
        60,
    )
}

pub fn record(instance: &WorldInstance, spawn_id: u64, due_time: i64) -> RespawnRecord {
    let coord = instance
        .cell_of(&Position::default())
        .expect("origin is inside the grid");
    RespawnRecord {
        category: SpawnCategory::Creature,
        spawn_id,
        template_id: CREATURE_TEMPLATE,
        due_time,
        cell_id: instance.cell_id(coord).0,
    }
}

pub fn player(n: u64, x: f32, y: f32) -> WorldEntity {
    WorldEntity::player(
        ObjectGuid::new(GuidCategory::Player, n),
        Position::new(x, y, 0.0),
    )
}

pub fn load_origin(instance: &mut WorldInstance) {
    let coord = instance.cell_of(&Position::default()).expect("origin");
    instance.ensure_cell_loaded(coord);
}
