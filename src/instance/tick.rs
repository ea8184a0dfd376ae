//! Tick driver
//!
//! One `update` walks the fixed phase sequence
//! Idle → DrainingQueues → UpdatingEntities → RelocatingMoved →
//! CheckingRespawns → BroadcastingZoneState → Idle. No phase is skipped.
//! While entities are being walked every mutation goes through the deferred
//! queues, so no update observes another entity's move from the same tick.

use super::callbacks::InstanceCallback;
use super::world_instance::WorldInstance;
use crate::deferred::{DeferredQueues, RemovalMode};
use crate::entity::{EntityHandle, EntityKind, WorldEntity};
use crate::error::RealmResult;
use crate::grid::ops;
use crate::guid::{GuidAllocator, GuidCategory, ObjectGuid};
use crate::object_store::ObjectStore;
use crate::respawn::RespawnStats;
use crate::types::Position;
use crate::zone::ops as zone_ops;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    DrainingQueues,
    UpdatingEntities,
    RelocatingMoved,
    CheckingRespawns,
    BroadcastingZoneState,
}

impl TickPhase {
    /// Phases during which mutations are queued instead of applied
    pub fn defers_mutations(self) -> bool {
        matches!(
            self,
            TickPhase::DrainingQueues | TickPhase::UpdatingEntities | TickPhase::RelocatingMoved
        )
    }
}

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub diff_ms: u32,
    pub callbacks_run: usize,
    pub entities_updated: usize,
    pub update_failures: usize,
    pub drain_passes: u32,
    pub cells_unloaded: usize,
    pub entities_released: usize,
    pub respawns: RespawnStats,
    pub zone_notifications: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpdateError {
    #[error("Update of {guid} failed: {reason}")]
    Failed { guid: ObjectGuid, reason: String },
}

/// Per-entity simulation hook run in the UpdatingEntities phase
pub trait EntityUpdater: Send {
    fn update(
        &mut self,
        entity: &WorldEntity,
        world: &ObjectStore,
        ctx: &mut UpdateContext<'_>,
    ) -> Result<(), UpdateError>;
}

/// What an entity update may do to the world. Everything is queued and
/// applied after the walk.
pub struct UpdateContext<'a> {
    queues: &'a mut DeferredQueues,
    guids: &'a mut GuidAllocator,
    deferred_calls: &'a mut Vec<InstanceCallback>,
    now: i64,
    diff_ms: u32,
}

impl<'a> UpdateContext<'a> {
    /// Game time in seconds
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn diff_ms(&self) -> u32 {
        self.diff_ms
    }

    pub fn relocate(&mut self, guid: ObjectGuid, target: Position) {
        self.queues.push_relocation(guid, target);
    }

    pub fn despawn(&mut self, guid: ObjectGuid) {
        if self.queues.cancel_insertion(guid).is_none() {
            self.queues.push_removal(guid, RemovalMode::Despawn);
        }
    }

    pub fn despawn_with_respawn(&mut self, guid: ObjectGuid, delay_secs: u32) {
        self.queues
            .push_removal(guid, RemovalMode::DespawnWithRespawn { delay_secs });
    }

    /// Queue a new entity; it enters the world at the next drain
    pub fn spawn(&mut self, entity: WorldEntity) -> bool {
        self.guids.observe(entity.guid);
        self.queues.push_insertion(entity)
    }

    pub fn generate_guid(&mut self, category: GuidCategory) -> ObjectGuid {
        self.guids.generate(category)
    }

    /// Run arbitrary instance work after the walk, before the relocation drain
    pub fn defer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut WorldInstance) + Send + 'static,
    {
        self.deferred_calls.push(Box::new(f));
    }
}

impl WorldInstance {
    /// Advance the instance by `diff_ms` and run every phase once
    pub fn update(&mut self, diff_ms: u32) -> TickReport {
        self.game_time_ms += diff_ms as i64;
        let mut report = TickReport {
            tick: self.tick_count,
            diff_ms,
            ..Default::default()
        };

        // Cross-instance callbacks, queued mutations, grid expiry
        self.phase = TickPhase::DrainingQueues;
        for callback in self.callbacks.drain() {
            callback(self);
            report.callbacks_run += 1;
        }
        report.drain_passes += self.drain_deferred();
        let observed = ops::observed_cells(&self.grid, self.load_radius());
        let unloaded = ops::tick_cells(&mut self.grid, diff_ms, &observed);
        report.cells_unloaded = unloaded.len();
        report.entities_released = self.release_unloaded(unloaded);
        report.drain_passes += self.drain_deferred();

        self.phase = TickPhase::UpdatingEntities;
        let (updated, failures) = self.update_entities(diff_ms);
        report.entities_updated = updated;
        report.update_failures = failures;

        self.phase = TickPhase::RelocatingMoved;
        for call in std::mem::take(&mut self.deferred_calls) {
            call(self);
        }
        report.drain_passes += self.drain_deferred();

        self.phase = TickPhase::CheckingRespawns;
        report.respawns = self.process_respawns();

        self.phase = TickPhase::BroadcastingZoneState;
        self.tick_corpse_decay(diff_ms);
        report.zone_notifications = self.broadcast_zone_state();

        self.phase = TickPhase::Idle;
        self.tick_count += 1;
        log::trace!(
            "[WorldInstance] Instance {} tick {}: {} updated, {} cells unloaded",
            self.instance_id,
            report.tick,
            report.entities_updated,
            report.cells_unloaded
        );
        report
    }

    /// Entities in observed cells, then active members, then transports.
    /// Each handle appears once.
    fn update_set(&self) -> Vec<EntityHandle> {
        let mut seen = FxHashSet::default();
        let mut handles = Vec::new();
        for coord in ops::observed_cells(&self.grid, self.load_radius()) {
            if let Some(cell) = ops::cell(&self.grid, coord) {
                for handle in &cell.entities {
                    if seen.insert(*handle) {
                        handles.push(*handle);
                    }
                }
            }
        }
        let extra = self
            .active
            .guids()
            .into_iter()
            .chain(self.store.of_kind(EntityKind::Transport).map(|e| e.guid).collect::<Vec<_>>());
        for guid in extra {
            if let Some(handle) = self.store.handle_of(guid) {
                if seen.insert(handle) {
                    handles.push(handle);
                }
            }
        }
        handles
    }

    fn update_entities(&mut self, diff_ms: u32) -> (usize, usize) {
        let Some(mut updater) = self.updater.take() else {
            return (0, 0);
        };
        let handles = self.update_set();
        let mut updated = 0;
        let mut failures = 0;
        {
            let mut ctx = UpdateContext {
                queues: &mut self.queues,
                guids: &mut self.guids,
                deferred_calls: &mut self.deferred_calls,
                now: self.game_time_ms.div_euclid(1000),
                diff_ms,
            };
            for handle in handles {
                let Some(entity) = self.store.get_by_handle(handle) else {
                    continue;
                };
                if ctx.queues.is_removal_pending(entity.guid) {
                    continue;
                }
                updated += 1;
                if let Err(e) = updater.update(entity, &self.store, &mut ctx) {
                    failures += 1;
                    log::warn!(
                        "[WorldInstance] Instance {}: {}, removing entity",
                        self.instance_id,
                        e
                    );
                    ctx.queues.push_removal(entity.guid, RemovalMode::Despawn);
                }
            }
        }
        self.updater = Some(updater);
        (updated, failures)
    }

    fn broadcast_zone_state(&mut self) -> usize {
        let notifications = zone_ops::take_pending_notifications(&mut self.zones);
        if let Some(broadcaster) = self.broadcaster.as_mut() {
            for notification in &notifications {
                let info = zone_ops::zone_info(&self.zones, notification.zone_id)
                    .cloned()
                    .unwrap_or_default();
                broadcaster.zone_changed(notification.zone_id, &notification.change, &info);
            }
        }
        notifications.len()
    }

    /// Instance-level unload timer. True once the instance has been empty
    /// for the teardown policy's grace period.
    pub fn can_unload(&mut self, diff_ms: u32) -> bool {
        if self.player_count() > 0 {
            self.empty_for_ms = 0;
            return false;
        }
        let Some(limit) = self.policy.teardown.unload_when_empty_ms else {
            return false;
        };
        self.empty_for_ms = self.empty_for_ms.saturating_add(diff_ms as u64);
        self.empty_for_ms >= limit as u64
    }

    /// Tear the instance down: run pending callbacks and mutations, unload
    /// every cell and flush persistence. Returns once the store has
    /// acknowledged every write.
    pub fn shutdown(&mut self) -> RealmResult<()> {
        self.phase = TickPhase::DrainingQueues;
        for callback in self.callbacks.drain() {
            callback(self);
        }
        self.drain_deferred();
        self.phase = TickPhase::Idle;

        let unloaded = ops::unload_all(&mut self.grid);
        let cells = unloaded.len();
        let released = self.release_unloaded(unloaded);

        if self.policy.teardown.delete_respawns_on_teardown {
            self.respawns.delete_all();
        }
        self.respawns.retry_failed_writes();
        self.respawns.flush()?;

        log::info!(
            "[WorldInstance] Instance {} shut down ({} cells unloaded, {} entities released, {} respawn records kept)",
            self.instance_id,
            cells,
            released,
            self.respawns.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealmConfig;
    use crate::content::{ContentCatalog, FlatTerrain, TemplateMaterializer};
    use crate::instance::{InstancePolicy, WorldContext};
    use crate::persistence::MemoryRespawnStore;
    use std::sync::Arc;

    fn instance(policy: InstancePolicy) -> WorldInstance {
        let mut config = RealmConfig::default();
        config.grid.width = 8;
        config.grid.height = 8;
        config.grid.cell_size = 100.0;
        config.grid.unload_delay_ms = 1_000;
        config.grid.load_radius_cells = 0;
        let context = WorldContext::new(
            config,
            ContentCatalog::new(),
            Arc::new(TemplateMaterializer::new().with_template(1, EntityKind::Creature)),
            Arc::new(FlatTerrain { zone_id: 4 }),
        )
        .unwrap();
        WorldInstance::new(
            9,
            context,
            policy,
            Box::new(MemoryRespawnStore::new()),
            0,
        )
        .unwrap()
    }

    struct CountingUpdater {
        failing: Option<ObjectGuid>,
    }

    impl EntityUpdater for CountingUpdater {
        fn update(
            &mut self,
            entity: &WorldEntity,
            _world: &ObjectStore,
            _ctx: &mut UpdateContext<'_>,
        ) -> Result<(), UpdateError> {
            if Some(entity.guid) == self.failing {
                return Err(UpdateError::Failed {
                    guid: entity.guid,
                    reason: "script error".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_phase_deferral_table() {
        assert!(!TickPhase::Idle.defers_mutations());
        assert!(TickPhase::UpdatingEntities.defers_mutations());
        assert!(TickPhase::DrainingQueues.defers_mutations());
        assert!(!TickPhase::CheckingRespawns.defers_mutations());
    }

    #[test]
    fn test_failing_update_removes_only_that_entity() {
        let mut instance = instance(InstancePolicy::open_world());
        instance.add_player(WorldEntity::player(
            ObjectGuid::new(GuidCategory::Player, 1),
            Position::default(),
        ));
        let good = instance
            .summon(1, GuidCategory::Creature, Position::new(10.0, 0.0, 0.0), None)
            .unwrap();
        let bad = instance
            .summon(1, GuidCategory::Creature, Position::new(20.0, 0.0, 0.0), None)
            .unwrap();
        instance.set_updater(Box::new(CountingUpdater { failing: Some(bad) }));

        let report = instance.update(100);
        assert_eq!(report.entities_updated, 3);
        assert_eq!(report.update_failures, 1);
        assert!(instance.lookup_by_identity(good).is_some());
        assert!(instance.lookup_by_identity(bad).is_none());
        assert_eq!(instance.phase(), TickPhase::Idle);
    }

    #[test]
    fn test_cell_unloads_after_player_leaves() {
        let mut instance = instance(InstancePolicy::open_world());
        let player = ObjectGuid::new(GuidCategory::Player, 1);
        instance.add_player(WorldEntity::player(player, Position::default()));
        let creature = instance
            .summon(1, GuidCategory::Creature, Position::new(10.0, 0.0, 0.0), None)
            .unwrap();
        let coord = instance.cell_of(&Position::default()).unwrap();

        instance.update(500);
        assert!(instance.is_cell_loaded(coord));

        instance.remove_player(player);
        let report = instance.update(500);
        assert_eq!(report.cells_unloaded, 0);
        assert_eq!(instance.cell_state(coord), crate::grid::CellState::MarkedForUnload);

        instance.update(500);
        let report = instance.update(500);
        assert_eq!(report.cells_unloaded, 1);
        assert!(!instance.is_cell_loaded(coord));
        assert!(instance.lookup_by_identity(creature).is_none());
    }

    #[test]
    fn test_can_unload_follows_teardown_policy() {
        let mut open = instance(InstancePolicy::open_world());
        assert!(!open.can_unload(1_000_000));

        let mut arena = instance(InstancePolicy::arena(10));
        assert!(arena.can_unload(0));

        let mut dungeon = instance(InstancePolicy::dungeon(5));
        dungeon.add_player(WorldEntity::player(
            ObjectGuid::new(GuidCategory::Player, 1),
            Position::default(),
        ));
        assert!(!dungeon.can_unload(u32::MAX));
    }
}
