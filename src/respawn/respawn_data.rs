//! Respawn schedule data

use crate::entity::{SpawnCategory, SpawnKey};
use serde::{Deserialize, Serialize};

/// A pending respawn of one static spawn point.
///
/// At most one record exists per (category, spawn id). The same shape is
/// persisted as a row of the respawn table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespawnRecord {
    pub category: SpawnCategory,
    pub spawn_id: u64,
    pub template_id: u32,
    /// Game time (seconds) at which the spawn becomes due
    pub due_time: i64,
    /// Home cell of the spawn point
    pub cell_id: u32,
}

impl RespawnRecord {
    pub fn key(&self) -> SpawnKey {
        SpawnKey::new(self.category, self.spawn_id)
    }

    pub(crate) fn order_key(&self) -> RespawnOrderKey {
        RespawnOrderKey {
            due_time: self.due_time,
            spawn_id: self.spawn_id,
            category: self.category,
        }
    }
}

/// Ordering of the due queue: earliest due time first, ties broken by spawn
/// id and then category. Field order drives the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct RespawnOrderKey {
    pub due_time: i64,
    pub spawn_id: u64,
    pub category: SpawnCategory,
}

impl RespawnOrderKey {
    pub fn key(&self) -> SpawnKey {
        SpawnKey::new(self.category, self.spawn_id)
    }
}

/// Outcome of checking a due record against the live world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnDecision {
    /// Spawn it now
    FireNow,
    /// Not yet allowed; check again at the given game time
    Reschedule(i64),
    /// Drop the record without spawning
    Cancel,
}

/// Counters from one respawn phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RespawnStats {
    pub fired: usize,
    pub rescheduled: usize,
    pub cancelled: usize,
    pub parked: usize,
    pub failed: usize,
}
