// Hearth Realm - world instance core
//
// Spatial partitioning and entity lifecycle for persistent, continuously simulated world instances.
// - GridIndex splits the terrain into a fixed grid of lazily loaded cells
// - ObjectStore indexes every world-resident entity by identity, spawn identity and kind
// - DeferredQueues hold mutations raised while the tick driver iterates
// - RespawnScheduler keeps the time-ordered, durably mirrored respawn schedule
// - WorldInstance composes all of the above and drives the tick
//
// One instance is owned by exactly one worker. The only thing that crosses instance
// boundaries is the callback queue in instance::callbacks.

// Constants module
pub mod constants;

// Ambient modules
pub mod config;
pub mod error;
pub mod logging;

// Shared data types
pub mod content;
pub mod entity;
pub mod guid;
pub mod types;

// Core engine modules
pub mod active;
pub mod deferred;
pub mod grid;
pub mod object_store;
pub mod persistence;
pub mod respawn;
pub mod zone;

// World instance and tick driver
pub mod instance;

pub use config::RealmConfig;
pub use content::{
    ContentCatalog, FlatTerrain, MaterializeError, MaterializeRequest, Materializer,
    SpawnGroupTemplate, SpawnPoint, TemplateMaterializer, TerrainInfo,
};
pub use entity::{
    Capabilities, EntityArena, EntityHandle, EntityKind, SpawnCategory, SpawnKey, WorldEntity,
};
pub use error::{RealmError, RealmResult};
pub use grid::{CellState, GridIndex};
pub use guid::{GuidAllocator, GuidCategory, ObjectGuid};
pub use instance::{
    CallbackSender, EnterState, EntityUpdater, InstancePolicy, InstanceWorker, RespawnOutcome,
    TickPhase, TickReport, UpdateContext, UpdateError, WorldContext, WorldInstance,
};
pub use object_store::ObjectStore;
pub use persistence::{
    AsyncRespawnStore, FileRespawnStore, MemoryRespawnStore, PersistenceError,
    PersistenceResult, RespawnStore,
};
pub use respawn::{RespawnDecision, RespawnRecord, RespawnScheduler};
pub use types::{CellCoord, CellId, Position};
pub use zone::{ZoneBroadcaster, ZoneChange, ZoneDynamicInfo, ZoneStateTable};
