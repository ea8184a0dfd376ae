//! Object store: authoritative registry of world-resident entities
//!
//! Entities live in a generational arena. Secondary indexes (identity, spawn
//! identity, kind, owner, corpses) are kept in lockstep with the arena on
//! every insert and remove, so an entity is either visible through all of
//! them or through none.

pub mod corpse_index;

pub use corpse_index::CorpseIndex;

use crate::entity::{EntityArena, EntityHandle, EntityKind, SpawnKey, WorldEntity};
use crate::guid::ObjectGuid;
use crate::types::{CellCoord, Position};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct ObjectStore {
    arena: EntityArena<WorldEntity>,
    by_guid: FxHashMap<ObjectGuid, EntityHandle>,
    by_spawn: FxHashMap<SpawnKey, FxHashSet<ObjectGuid>>,
    by_kind: FxHashMap<EntityKind, BTreeSet<ObjectGuid>>,
    by_owner: FxHashMap<ObjectGuid, BTreeSet<ObjectGuid>>,
    corpses: CorpseIndex,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity. A second entity with the same guid is an identity
    /// collision and aborts the instance.
    pub fn insert(&mut self, entity: WorldEntity) -> EntityHandle {
        let guid = entity.guid;
        if self.by_guid.contains_key(&guid) {
            log::error!("[ObjectStore] Identity collision on insert of {}", guid);
            panic!("Duplicate entity identity {}", guid);
        }

        if let Some(spawn) = entity.spawn {
            self.by_spawn.entry(spawn).or_default().insert(guid);
        }
        self.by_kind.entry(entity.kind).or_default().insert(guid);
        if let Some(owner) = entity.owner {
            self.by_owner.entry(owner).or_default().insert(guid);
        }
        if entity.kind == EntityKind::Corpse {
            self.corpses.insert(guid, entity.owner, entity.cell);
        }

        let handle = self.arena.insert(entity);
        self.by_guid.insert(guid, handle);
        handle
    }

    pub fn remove(&mut self, guid: ObjectGuid) -> Option<WorldEntity> {
        let handle = self.by_guid.remove(&guid)?;
        let entity = self.arena.remove(handle)?;

        if let Some(spawn) = entity.spawn {
            if let Some(set) = self.by_spawn.get_mut(&spawn) {
                set.remove(&guid);
                if set.is_empty() {
                    self.by_spawn.remove(&spawn);
                }
            }
        }
        if let Some(set) = self.by_kind.get_mut(&entity.kind) {
            set.remove(&guid);
        }
        if let Some(owner) = entity.owner {
            if let Some(set) = self.by_owner.get_mut(&owner) {
                set.remove(&guid);
                if set.is_empty() {
                    self.by_owner.remove(&owner);
                }
            }
        }
        if entity.kind == EntityKind::Corpse {
            self.corpses.remove(guid, entity.owner, entity.cell);
        }
        Some(entity)
    }

    pub fn remove_by_handle(&mut self, handle: EntityHandle) -> Option<WorldEntity> {
        let guid = self.arena.get(handle)?.guid;
        self.remove(guid)
    }

    pub fn get(&self, guid: ObjectGuid) -> Option<&WorldEntity> {
        self.by_guid.get(&guid).and_then(|h| self.arena.get(*h))
    }

    pub fn get_by_handle(&self, handle: EntityHandle) -> Option<&WorldEntity> {
        self.arena.get(handle)
    }

    pub fn handle_of(&self, guid: ObjectGuid) -> Option<EntityHandle> {
        self.by_guid.get(&guid).copied()
    }

    pub fn contains(&self, guid: ObjectGuid) -> bool {
        self.by_guid.contains_key(&guid)
    }

    /// All live entities that originated from `spawn`, ordered by guid
    pub fn by_spawn(&self, spawn: SpawnKey) -> Vec<&WorldEntity> {
        let mut entities: Vec<_> = self
            .by_spawn
            .get(&spawn)
            .into_iter()
            .flatten()
            .filter_map(|guid| self.get(*guid))
            .collect();
        entities.sort_by_key(|e| e.guid);
        entities
    }

    pub fn has_spawn(&self, spawn: SpawnKey) -> bool {
        self.by_spawn.get(&spawn).map_or(false, |set| !set.is_empty())
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &WorldEntity> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(move |guid| self.get(*guid))
    }

    pub fn count_of_kind(&self, kind: EntityKind) -> usize {
        self.by_kind.get(&kind).map_or(0, |set| set.len())
    }

    /// Entities owned by `owner` (summons, effects, corpses)
    pub fn owned_by(&self, owner: ObjectGuid) -> Vec<ObjectGuid> {
        self.by_owner
            .get(&owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn corpses(&self) -> &CorpseIndex {
        &self.corpses
    }

    pub(crate) fn set_position(&mut self, guid: ObjectGuid, position: Position) -> bool {
        let Some(handle) = self.by_guid.get(&guid).copied() else {
            return false;
        };
        match self.arena.get_mut(handle) {
            Some(entity) => {
                entity.position = position;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_placement(&mut self, guid: ObjectGuid, cell: CellCoord, zone_id: u32) {
        let Some(handle) = self.by_guid.get(&guid).copied() else {
            return;
        };
        let Some(entity) = self.arena.get_mut(handle) else {
            return;
        };
        let previous = entity.cell.replace(cell);
        entity.zone_id = zone_id;
        if entity.kind == EntityKind::Corpse && previous != Some(cell) {
            self.corpses.move_cell(guid, previous, cell);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &WorldEntity)> {
        self.arena.iter()
    }

    pub fn guids(&self) -> Vec<ObjectGuid> {
        let mut guids: Vec<_> = self.by_guid.keys().copied().collect();
        guids.sort();
        guids
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::GuidCategory;
    use crate::types::Position;

    fn creature(counter: u64, spawn_id: u64) -> WorldEntity {
        WorldEntity::new(
            ObjectGuid::new(GuidCategory::Creature, counter),
            EntityKind::Creature,
            Position::default(),
        )
        .with_spawn(SpawnKey::creature(spawn_id), 60)
    }

    #[test]
    fn test_indexes_follow_insert_and_remove() {
        let mut store = ObjectStore::new();
        let entity = creature(1, 100);
        let guid = entity.guid;
        let handle = store.insert(entity);

        assert_eq!(store.handle_of(guid), Some(handle));
        assert!(store.has_spawn(SpawnKey::creature(100)));
        assert_eq!(store.count_of_kind(EntityKind::Creature), 1);

        let removed = store.remove(guid).expect("entity present");
        assert_eq!(removed.guid, guid);
        assert!(!store.has_spawn(SpawnKey::creature(100)));
        assert_eq!(store.count_of_kind(EntityKind::Creature), 0);
        assert!(store.get_by_handle(handle).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_multiple_instances_per_spawn() {
        let mut store = ObjectStore::new();
        store.insert(creature(2, 7));
        store.insert(creature(1, 7));

        let found: Vec<_> = store.by_spawn(SpawnKey::creature(7)).iter().map(|e| e.guid.counter).collect();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "Duplicate entity identity")]
    fn test_duplicate_identity_panics() {
        let mut store = ObjectStore::new();
        store.insert(creature(1, 1));
        store.insert(creature(1, 2));
    }

    #[test]
    fn test_owner_index() {
        let mut store = ObjectStore::new();
        let owner = ObjectGuid::new(GuidCategory::Player, 1);
        let effect = WorldEntity::new(
            ObjectGuid::new(GuidCategory::DynamicObject, 1),
            EntityKind::DynamicEffect,
            Position::default(),
        )
        .with_owner(owner);
        store.insert(effect);

        assert_eq!(store.owned_by(owner).len(), 1);
        store.remove(ObjectGuid::new(GuidCategory::DynamicObject, 1));
        assert!(store.owned_by(owner).is_empty());
    }

    #[test]
    fn test_corpse_placement_updates_index() {
        let mut store = ObjectStore::new();
        let owner = ObjectGuid::new(GuidCategory::Player, 3);
        let guid = ObjectGuid::new(GuidCategory::Corpse, 1);
        store.insert(WorldEntity::new(guid, EntityKind::Corpse, Position::default()).with_owner(owner));
        store.set_placement(guid, CellCoord::new(4, 4), 12);

        assert_eq!(store.corpses().by_owner(owner), Some(guid));
        assert_eq!(store.corpses().in_cell(CellCoord::new(4, 4)), vec![guid]);
        assert_eq!(store.get(guid).map(|e| e.zone_id()), Some(12));
    }
}
