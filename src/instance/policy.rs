//! Instance policy: who may enter, how far players see, how the instance
//! is torn down
//!
//! Open worlds, dungeons and arenas share one `WorldInstance`; they differ
//! only in the policy value they are created with.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceKind {
    OpenWorld,
    Dungeon,
    Arena,
}

/// Result of an entry check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterState {
    CanEnter,
    AlreadyInMap,
    MaxPlayers,
    Closed,
    /// Only players enter through the player entry path
    NotAPlayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterRules {
    pub max_players: Option<u32>,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityRules {
    /// Overrides the configured load radius around players
    pub load_radius_cells: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownRules {
    /// Empty time after which the instance may be unloaded, `None` keeps it forever
    pub unload_when_empty_ms: Option<u32>,
    /// Drop every stored respawn time when the instance shuts down
    pub delete_respawns_on_teardown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePolicy {
    pub kind: InstanceKind,
    pub enter: EnterRules,
    pub visibility: VisibilityRules,
    pub teardown: TeardownRules,
}

impl InstancePolicy {
    /// Persistent continent: unlimited entry, never unloads, respawns survive
    pub fn open_world() -> Self {
        Self {
            kind: InstanceKind::OpenWorld,
            enter: EnterRules {
                max_players: None,
                closed: false,
            },
            visibility: VisibilityRules {
                load_radius_cells: None,
            },
            teardown: TeardownRules {
                unload_when_empty_ms: None,
                delete_respawns_on_teardown: false,
            },
        }
    }

    /// Capped group instance that unloads after being empty for a while.
    /// Respawn times persist so a reset lockout survives restarts.
    pub fn dungeon(max_players: u32) -> Self {
        Self {
            kind: InstanceKind::Dungeon,
            enter: EnterRules {
                max_players: Some(max_players),
                closed: false,
            },
            visibility: VisibilityRules {
                load_radius_cells: None,
            },
            teardown: TeardownRules {
                unload_when_empty_ms: Some(30 * 60 * 1000),
                delete_respawns_on_teardown: false,
            },
        }
    }

    /// Short-lived match: everything is visible, nothing is kept
    pub fn arena(max_players: u32) -> Self {
        Self {
            kind: InstanceKind::Arena,
            enter: EnterRules {
                max_players: Some(max_players),
                closed: false,
            },
            visibility: VisibilityRules {
                load_radius_cells: Some(u32::MAX),
            },
            teardown: TeardownRules {
                unload_when_empty_ms: Some(0),
                delete_respawns_on_teardown: true,
            },
        }
    }

    pub fn can_enter(&self, player_count: u32, already_in_map: bool) -> EnterState {
        if already_in_map {
            return EnterState::AlreadyInMap;
        }
        if self.enter.closed {
            return EnterState::Closed;
        }
        match self.enter.max_players {
            Some(max) if player_count >= max => EnterState::MaxPlayers,
            _ => EnterState::CanEnter,
        }
    }
}

impl Default for InstancePolicy {
    fn default() -> Self {
        Self::open_world()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_checks() {
        let mut dungeon = InstancePolicy::dungeon(5);
        assert_eq!(dungeon.can_enter(4, false), EnterState::CanEnter);
        assert_eq!(dungeon.can_enter(5, false), EnterState::MaxPlayers);
        assert_eq!(dungeon.can_enter(0, true), EnterState::AlreadyInMap);

        dungeon.enter.closed = true;
        assert_eq!(dungeon.can_enter(0, false), EnterState::Closed);
    }

    #[test]
    fn test_presets() {
        assert_eq!(InstancePolicy::open_world().teardown.unload_when_empty_ms, None);
        assert_eq!(InstancePolicy::open_world().can_enter(100_000, false), EnterState::CanEnter);
        assert!(InstancePolicy::arena(10).teardown.delete_respawns_on_teardown);
        assert_eq!(InstancePolicy::default().kind, InstanceKind::OpenWorld);
    }
}
