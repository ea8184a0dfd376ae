//! World-resident entities
//!
//! An entity is a plain record: identity, kind, position and the lifecycle
//! metadata the instance needs (spawn identity, owner, respawn delay). Per-kind
//! behavior lives outside the crate, behind `EntityUpdater`.

pub mod arena;

pub use arena::{EntityArena, EntityHandle};

use crate::guid::{GuidCategory, ObjectGuid};
use crate::types::{CellCoord, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static spawn categories that own a respawn schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpawnCategory {
    Creature,
    GameObject,
    AreaTrigger,
}

impl SpawnCategory {
    pub fn guid_category(self) -> GuidCategory {
        match self {
            SpawnCategory::Creature => GuidCategory::Creature,
            SpawnCategory::GameObject => GuidCategory::GameObject,
            SpawnCategory::AreaTrigger => GuidCategory::AreaTrigger,
        }
    }
}

/// Static content identity: which spawn point an entity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpawnKey {
    pub category: SpawnCategory,
    pub spawn_id: u64,
}

impl SpawnKey {
    pub const fn new(category: SpawnCategory, spawn_id: u64) -> Self {
        Self { category, spawn_id }
    }

    pub const fn creature(spawn_id: u64) -> Self {
        Self::new(SpawnCategory::Creature, spawn_id)
    }

    pub const fn game_object(spawn_id: u64) -> Self {
        Self::new(SpawnCategory::GameObject, spawn_id)
    }
}

impl fmt::Display for SpawnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.category, self.spawn_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Creature,
    StaticObject,
    DynamicEffect,
    Corpse,
    AreaEffect,
    Transport,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Player,
        EntityKind::Creature,
        EntityKind::StaticObject,
        EntityKind::DynamicEffect,
        EntityKind::Corpse,
        EntityKind::AreaEffect,
        EntityKind::Transport,
    ];

    pub fn capabilities(self) -> Capabilities {
        match self {
            EntityKind::Player => Capabilities {
                movable: true,
                combatant: true,
                spawned: false,
                transient: false,
            },
            EntityKind::Creature => Capabilities {
                movable: true,
                combatant: true,
                spawned: true,
                transient: false,
            },
            EntityKind::StaticObject => Capabilities {
                movable: false,
                combatant: false,
                spawned: true,
                transient: false,
            },
            EntityKind::DynamicEffect => Capabilities {
                movable: false,
                combatant: false,
                spawned: false,
                transient: true,
            },
            EntityKind::Corpse => Capabilities {
                movable: false,
                combatant: false,
                spawned: false,
                transient: false,
            },
            EntityKind::AreaEffect => Capabilities {
                movable: true,
                combatant: false,
                spawned: true,
                transient: true,
            },
            EntityKind::Transport => Capabilities {
                movable: true,
                combatant: false,
                spawned: false,
                transient: false,
            },
        }
    }

    /// Guid category used when the instance mints an identity for this kind
    pub fn guid_category(self) -> GuidCategory {
        match self {
            EntityKind::Player => GuidCategory::Player,
            EntityKind::Creature => GuidCategory::Creature,
            EntityKind::StaticObject => GuidCategory::GameObject,
            EntityKind::DynamicEffect => GuidCategory::DynamicObject,
            EntityKind::Corpse => GuidCategory::Corpse,
            EntityKind::AreaEffect => GuidCategory::AreaTrigger,
            EntityKind::Transport => GuidCategory::Transport,
        }
    }
}

/// Orthogonal capability flags derived from the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub movable: bool,
    pub combatant: bool,
    /// Can originate from a static spawn point and carry a respawn schedule
    pub spawned: bool,
    /// Owned by another entity and removed together with it
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldEntity {
    pub guid: ObjectGuid,
    pub kind: EntityKind,
    pub template_id: u32,
    pub position: Position,
    pub spawn: Option<SpawnKey>,
    pub owner: Option<ObjectGuid>,
    pub respawn_delay_secs: u32,
    /// Game time (seconds) the entity entered the world
    pub created_at: i64,
    pub(crate) zone_id: u32,
    pub(crate) cell: Option<CellCoord>,
}

impl WorldEntity {
    pub fn new(guid: ObjectGuid, kind: EntityKind, position: Position) -> Self {
        Self {
            guid,
            kind,
            template_id: 0,
            position,
            spawn: None,
            owner: None,
            respawn_delay_secs: 0,
            created_at: 0,
            zone_id: crate::constants::zone::INVALID_ZONE,
            cell: None,
        }
    }

    pub fn player(guid: ObjectGuid, position: Position) -> Self {
        Self::new(guid, EntityKind::Player, position)
    }

    pub fn with_template(mut self, template_id: u32) -> Self {
        self.template_id = template_id;
        self
    }

    pub fn with_spawn(mut self, spawn: SpawnKey, respawn_delay_secs: u32) -> Self {
        self.spawn = Some(spawn);
        self.respawn_delay_secs = respawn_delay_secs;
        self
    }

    pub fn with_owner(mut self, owner: ObjectGuid) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn created_at(mut self, game_time_secs: i64) -> Self {
        self.created_at = game_time_secs;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    pub fn is_player(&self) -> bool {
        self.kind == EntityKind::Player
    }

    /// Zone the entity was last placed in
    pub fn zone_id(&self) -> u32 {
        self.zone_id
    }

    /// Cell the entity currently occupies, `None` while not placed
    pub fn cell(&self) -> Option<CellCoord> {
        self.cell
    }
}
