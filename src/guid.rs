//! Object identities and the per-instance guid allocator
//!
//! Every world-resident entity carries an `ObjectGuid`: a category plus a
//! sequence number. Map-local categories are generated by the instance's
//! `GuidAllocator`; players arrive with a guid minted elsewhere and are only
//! observed so the allocator never hands the same number out again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Guid category (the "high" part of an identity)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GuidCategory {
    Player = 0,
    Creature = 1,
    GameObject = 2,
    DynamicObject = 3,
    Corpse = 4,
    AreaTrigger = 5,
    Transport = 6,
    Pet = 7,
}

impl GuidCategory {
    pub const COUNT: usize = 8;

    pub const ALL: [GuidCategory; Self::COUNT] = [
        GuidCategory::Player,
        GuidCategory::Creature,
        GuidCategory::GameObject,
        GuidCategory::DynamicObject,
        GuidCategory::Corpse,
        GuidCategory::AreaTrigger,
        GuidCategory::Transport,
        GuidCategory::Pet,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Globally unique runtime identity of a world entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectGuid {
    pub category: GuidCategory,
    pub counter: u64,
}

impl ObjectGuid {
    pub const fn new(category: GuidCategory, counter: u64) -> Self {
        Self { category, counter }
    }

    pub fn is_player(&self) -> bool {
        self.category == GuidCategory::Player
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-{}", self.category, self.counter)
    }
}

/// Monotonic sequence generator, one counter per category
#[derive(Debug, Clone)]
pub struct GuidAllocator {
    next: [u64; GuidCategory::COUNT],
}

impl Default for GuidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidAllocator {
    pub fn new() -> Self {
        Self {
            next: [1; GuidCategory::COUNT],
        }
    }

    /// Generate the next guid for `category`
    pub fn generate(&mut self, category: GuidCategory) -> ObjectGuid {
        let slot = &mut self.next[category.index()];
        if *slot == u64::MAX {
            log::error!("[GuidAllocator] {:?} guid space exhausted", category);
            panic!("Guid overflow for category {:?}", category);
        }
        let guid = ObjectGuid::new(category, *slot);
        *slot += 1;
        guid
    }

    /// First counter that has not been handed out or observed yet
    pub fn next_after_max_used(&self, category: GuidCategory) -> u64 {
        self.next[category.index()]
    }

    /// Record an externally minted guid so later generation skips past it
    pub fn observe(&mut self, guid: ObjectGuid) {
        let slot = &mut self.next[guid.category.index()];
        if guid.counter >= *slot {
            *slot = guid.counter.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_monotonic_per_category() {
        let mut guids = GuidAllocator::new();
        let a = guids.generate(GuidCategory::Creature);
        let b = guids.generate(GuidCategory::Creature);
        let c = guids.generate(GuidCategory::GameObject);

        assert_eq!(a.counter, 1);
        assert_eq!(b.counter, 2);
        // Independent sequence per category
        assert_eq!(c.counter, 1);
        assert_ne!(a, c);
    }

    #[test]
    fn test_observe_skips_external_guids() {
        let mut guids = GuidAllocator::new();
        guids.observe(ObjectGuid::new(GuidCategory::Player, 41));
        assert_eq!(guids.next_after_max_used(GuidCategory::Player), 42);

        // Observing a lower value never rewinds the counter
        guids.observe(ObjectGuid::new(GuidCategory::Player, 3));
        assert_eq!(guids.generate(GuidCategory::Player).counter, 42);
    }

    #[test]
    fn test_display() {
        let guid = ObjectGuid::new(GuidCategory::Corpse, 7);
        assert_eq!(guid.to_string(), "Corpse-7");
    }
}
