//! Active objects: entities that keep their cell loaded and are updated
//! even with no player nearby

use crate::guid::ObjectGuid;
use crate::types::CellCoord;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ActiveObjectSet {
    members: BTreeMap<ObjectGuid, CellCoord>,
}

impl ActiveObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the entity was already active
    pub fn activate(&mut self, guid: ObjectGuid, cell: CellCoord) -> bool {
        if self.members.contains_key(&guid) {
            return false;
        }
        self.members.insert(guid, cell);
        true
    }

    /// Returns the cell the entity was tracked in
    pub fn deactivate(&mut self, guid: ObjectGuid) -> Option<CellCoord> {
        self.members.remove(&guid)
    }

    /// Record a cell change. Returns the previous cell for members.
    pub fn relocate(&mut self, guid: ObjectGuid, cell: CellCoord) -> Option<CellCoord> {
        self.members.get_mut(&guid).map(|c| std::mem::replace(c, cell))
    }

    pub fn contains(&self, guid: ObjectGuid) -> bool {
        self.members.contains_key(&guid)
    }

    pub fn cell_of(&self, guid: ObjectGuid) -> Option<CellCoord> {
        self.members.get(&guid).copied()
    }

    /// Members in guid order
    pub fn guids(&self) -> Vec<ObjectGuid> {
        self.members.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
