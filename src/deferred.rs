//! Deferred mutation queues
//!
//! While the tick driver walks cells and entities, nothing may change the
//! structures it is walking. Relocations, insertions and removals raised in
//! that window are parked here and applied between phases.
//!
//! Each queue holds an entity at most once. A second relocation request for
//! the same entity replaces the pending target (newest target wins) without
//! changing its queue position.

use crate::entity::{SpawnKey, WorldEntity};
use crate::guid::ObjectGuid;
use crate::types::Position;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// How a queued removal leaves the world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalMode {
    /// Remove without scheduling a respawn
    Despawn,
    /// Remove and schedule the spawn point's respawn after `delay_secs`
    DespawnWithRespawn { delay_secs: u32 },
}

#[derive(Debug, Default)]
pub struct DeferredQueues {
    relocations: VecDeque<ObjectGuid>,
    relocation_targets: FxHashMap<ObjectGuid, Position>,
    insertions: VecDeque<WorldEntity>,
    pending_inserts: FxHashSet<ObjectGuid>,
    removals: VecDeque<(ObjectGuid, RemovalMode)>,
    pending_removals: FxHashSet<ObjectGuid>,
}

impl DeferredQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a relocation. Returns false if the entity was already queued,
    /// in which case only its target changed.
    pub fn push_relocation(&mut self, guid: ObjectGuid, target: Position) -> bool {
        if self.relocation_targets.insert(guid, target).is_some() {
            return false;
        }
        self.relocations.push_back(guid);
        true
    }

    pub fn push_insertion(&mut self, entity: WorldEntity) -> bool {
        if !self.pending_inserts.insert(entity.guid) {
            log::warn!("[DeferredQueues] Insertion of {} already queued", entity.guid);
            return false;
        }
        self.insertions.push_back(entity);
        true
    }

    pub fn push_removal(&mut self, guid: ObjectGuid, mode: RemovalMode) -> bool {
        if !self.pending_removals.insert(guid) {
            return false;
        }
        self.removals.push_back((guid, mode));
        true
    }

    /// Drop a pending relocation, used when its entity leaves the world
    pub fn cancel_relocation(&mut self, guid: ObjectGuid) -> bool {
        if self.relocation_targets.remove(&guid).is_none() {
            return false;
        }
        self.relocations.retain(|g| *g != guid);
        true
    }

    /// Withdraw a queued insertion, used when its entity is removed before
    /// it ever entered the world
    pub fn cancel_insertion(&mut self, guid: ObjectGuid) -> Option<WorldEntity> {
        if !self.pending_inserts.remove(&guid) {
            return None;
        }
        let index = self.insertions.iter().position(|e| e.guid == guid)?;
        self.insertions.remove(index)
    }

    pub fn take_removals(&mut self) -> Vec<(ObjectGuid, RemovalMode)> {
        self.pending_removals.clear();
        self.removals.drain(..).collect()
    }

    pub fn take_insertions(&mut self) -> Vec<WorldEntity> {
        self.pending_inserts.clear();
        self.insertions.drain(..).collect()
    }

    pub fn take_relocations(&mut self) -> Vec<(ObjectGuid, Position)> {
        let mut relocations = Vec::with_capacity(self.relocations.len());
        for guid in self.relocations.drain(..) {
            if let Some(target) = self.relocation_targets.remove(&guid) {
                relocations.push((guid, target));
            }
        }
        relocations
    }

    pub fn pending_relocation(&self, guid: ObjectGuid) -> Option<Position> {
        self.relocation_targets.get(&guid).copied()
    }

    pub fn is_removal_pending(&self, guid: ObjectGuid) -> bool {
        self.pending_removals.contains(&guid)
    }

    pub fn is_insertion_pending(&self, guid: ObjectGuid) -> bool {
        self.pending_inserts.contains(&guid)
    }

    /// True when an entity for `spawn` is waiting to be inserted
    pub fn has_pending_spawn(&self, spawn: SpawnKey) -> bool {
        self.insertions.iter().any(|e| e.spawn == Some(spawn))
    }

    pub fn len(&self) -> usize {
        self.relocations.len() + self.insertions.len() + self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relocations.is_empty() && self.insertions.is_empty() && self.removals.is_empty()
    }
}
