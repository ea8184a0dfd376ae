//! Engine-wide constants

/// Grid dimensions and geometry
pub mod grid {
    /// Cells along each axis of a world instance
    pub const DEFAULT_GRID_SIZE: u32 = 64;
    /// World units covered by one cell edge
    pub const DEFAULT_CELL_SIZE: f32 = 533.333_3;
    /// Time a cell without interest stays loaded (5 minutes)
    pub const DEFAULT_UNLOAD_DELAY_MS: u32 = 300_000;
    /// Smallest accepted unload delay, effectively immediate
    pub const MIN_UNLOAD_DELAY_MS: u32 = 1;
    /// Cells around a player that are kept loaded
    pub const DEFAULT_LOAD_RADIUS_CELLS: u32 = 1;
}

/// Zones
pub mod zone {
    /// Zone id reported for positions the terrain cannot place
    pub const INVALID_ZONE: u32 = u32::MAX;
}

/// Respawn scheduling
pub mod respawn {
    pub const DEFAULT_RETRY_BASE_SECS: u32 = 5;
    pub const DEFAULT_RETRY_MAX_SECS: u32 = 300;
    pub const DEFAULT_GROUP_RECHECK_SECS: u32 = 60;
    pub const DEFAULT_DYNAMIC_RATE: f32 = 10.0;
    pub const DEFAULT_DYNAMIC_MINIMUM_SECS: u32 = 10;
    /// Spawn group id 0 is the implicit, always active default group
    pub const DEFAULT_SPAWN_GROUP: u32 = 0;
}

/// Corpse decay
pub mod corpses {
    /// Owned corpses turn into bones after three days
    pub const DEFAULT_CORPSE_EXPIRY_SECS: u32 = 3 * 24 * 3600;
    pub const DEFAULT_BONES_EXPIRY_SECS: u32 = 3600;
    pub const DEFAULT_DECAY_CHECK_INTERVAL_MS: u32 = 20 * 60 * 1000;
}

/// Deferred mutation queues
pub mod queues {
    pub const DEFAULT_DRAIN_PASS_LIMIT: u32 = 16;
}

/// On-disk respawn table format
pub mod storage {
    pub const RESPAWN_FILE_MAGIC: [u8; 4] = *b"HRSP";
    pub const RESPAWN_FILE_VERSION: u32 = 1;
    pub const RESPAWN_FILE_EXTENSION: &str = "bin";
}
