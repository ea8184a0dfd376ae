//! Corpse lookup: by owner, by cell, and ownerless bones

use crate::guid::ObjectGuid;
use crate::types::CellCoord;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default)]
pub struct CorpseIndex {
    by_owner: FxHashMap<ObjectGuid, ObjectGuid>,
    by_cell: FxHashMap<CellCoord, FxHashSet<ObjectGuid>>,
    bones: FxHashSet<ObjectGuid>,
}

impl CorpseIndex {
    pub fn insert(&mut self, corpse: ObjectGuid, owner: Option<ObjectGuid>, cell: Option<CellCoord>) {
        match owner {
            Some(owner) => {
                if let Some(previous) = self.by_owner.insert(owner, corpse) {
                    log::warn!(
                        "[CorpseIndex] Owner {} already had corpse {}, replaced by {}",
                        owner,
                        previous,
                        corpse
                    );
                }
            }
            None => {
                self.bones.insert(corpse);
            }
        }
        if let Some(cell) = cell {
            self.by_cell.entry(cell).or_default().insert(corpse);
        }
    }

    pub fn remove(&mut self, corpse: ObjectGuid, owner: Option<ObjectGuid>, cell: Option<CellCoord>) {
        match owner {
            Some(owner) => {
                if self.by_owner.get(&owner) == Some(&corpse) {
                    self.by_owner.remove(&owner);
                }
            }
            None => {
                self.bones.remove(&corpse);
            }
        }
        if let Some(cell) = cell {
            self.remove_from_cell(corpse, cell);
        }
    }

    pub fn move_cell(&mut self, corpse: ObjectGuid, from: Option<CellCoord>, to: CellCoord) {
        if let Some(from) = from {
            self.remove_from_cell(corpse, from);
        }
        self.by_cell.entry(to).or_default().insert(corpse);
    }

    fn remove_from_cell(&mut self, corpse: ObjectGuid, cell: CellCoord) {
        if let Some(set) = self.by_cell.get_mut(&cell) {
            set.remove(&corpse);
            if set.is_empty() {
                self.by_cell.remove(&cell);
            }
        }
    }

    pub fn by_owner(&self, owner: ObjectGuid) -> Option<ObjectGuid> {
        self.by_owner.get(&owner).copied()
    }

    /// Corpses and bones in a cell, sorted for stable iteration
    pub fn in_cell(&self, cell: CellCoord) -> Vec<ObjectGuid> {
        let mut corpses: Vec<_> = self
            .by_cell
            .get(&cell)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        corpses.sort();
        corpses
    }

    pub fn owned(&self) -> impl Iterator<Item = (ObjectGuid, ObjectGuid)> + '_ {
        self.by_owner.iter().map(|(owner, corpse)| (*owner, *corpse))
    }

    pub fn bones(&self) -> impl Iterator<Item = ObjectGuid> + '_ {
        self.bones.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.by_owner.len() + self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::GuidCategory;

    fn corpse(n: u64) -> ObjectGuid {
        ObjectGuid::new(GuidCategory::Corpse, n)
    }

    fn player(n: u64) -> ObjectGuid {
        ObjectGuid::new(GuidCategory::Player, n)
    }

    #[test]
    fn test_owner_and_cell_lookup() {
        let mut index = CorpseIndex::default();
        let cell = CellCoord::new(2, 3);
        index.insert(corpse(1), Some(player(10)), Some(cell));
        index.insert(corpse(2), None, Some(cell));

        assert_eq!(index.by_owner(player(10)), Some(corpse(1)));
        assert_eq!(index.in_cell(cell), vec![corpse(1), corpse(2)]);
        assert_eq!(index.bones().count(), 1);
        assert_eq!(index.len(), 2);

        index.remove(corpse(1), Some(player(10)), Some(cell));
        assert_eq!(index.by_owner(player(10)), None);
        assert_eq!(index.in_cell(cell), vec![corpse(2)]);
    }

    #[test]
    fn test_move_cell() {
        let mut index = CorpseIndex::default();
        let from = CellCoord::new(0, 0);
        let to = CellCoord::new(1, 0);
        index.insert(corpse(5), None, Some(from));
        index.move_cell(corpse(5), Some(from), to);

        assert!(index.in_cell(from).is_empty());
        assert_eq!(index.in_cell(to), vec![corpse(5)]);
    }
}
