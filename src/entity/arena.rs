//! Generational arena backing the object store
//!
//! Slots are recycled through a free list. Every reuse bumps the slot's
//! generation, so a stale `EntityHandle` to a removed entity can never
//! resolve to whatever occupies the slot afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle to an entity stored in an `EntityArena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct EntityArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for EntityArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> EntityHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            return EntityHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len())
            .unwrap_or_else(|_| panic!("Entity arena exceeded {} slots", u32::MAX));
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        EntityHandle {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: EntityHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    EntityHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = EntityArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(b), Some("b"));
        assert_eq!(arena.get(b), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena = EntityArena::new();
        let old = arena.insert(1);
        arena.remove(old);

        let new = arena.insert(2);
        assert_eq!(new.index, old.index);
        assert_ne!(new.generation, old.generation);

        // Stale handle must not see the new occupant
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut arena = EntityArena::new();
        let handles: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.remove(handles[1]);

        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 3]);
    }
}
