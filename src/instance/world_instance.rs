//! The world instance: one grid, one object store, one respawn scheduler,
//! owned and mutated by a single worker.
//!
//! Mutations requested while the tick driver is walking cells or draining
//! queues are redirected to the deferred queues and applied at the next safe
//! point. Outside those phases they apply immediately.

use super::callbacks::{CallbackQueue, CallbackSender, InstanceCallback};
use super::context::WorldContext;
use super::policy::{EnterState, InstancePolicy};
use super::tick::{EntityUpdater, TickPhase};
use crate::active::ActiveObjectSet;
use crate::content::{MaterializeError, MaterializeRequest};
use crate::deferred::{DeferredQueues, RemovalMode};
use crate::entity::{EntityKind, SpawnKey, WorldEntity};
use crate::error::RealmResult;
use crate::grid::{ops, CellState, GridIndex, UnloadedCell};
use crate::guid::{GuidAllocator, GuidCategory, ObjectGuid};
use crate::object_store::ObjectStore;
use crate::persistence::{open_store, RespawnStore};
use crate::respawn::RespawnScheduler;
use crate::types::{CellCoord, CellId, Position};
use crate::zone::{ops as zone_ops, WeatherState, ZoneBroadcaster, ZoneDynamicInfo, ZoneStateTable};
use std::sync::Arc;

pub struct WorldInstance {
    pub(crate) instance_id: u32,
    pub(crate) context: Arc<WorldContext>,
    pub(crate) policy: InstancePolicy,
    pub(crate) game_time_ms: i64,
    pub(crate) guids: GuidAllocator,
    pub(crate) grid: GridIndex,
    pub(crate) store: ObjectStore,
    pub(crate) queues: DeferredQueues,
    pub(crate) respawns: RespawnScheduler,
    pub(crate) active: ActiveObjectSet,
    pub(crate) zones: ZoneStateTable,
    pub(crate) callbacks: CallbackQueue,
    pub(crate) deferred_calls: Vec<InstanceCallback>,
    pub(crate) updater: Option<Box<dyn EntityUpdater>>,
    pub(crate) broadcaster: Option<Box<dyn ZoneBroadcaster>>,
    pub(crate) phase: TickPhase,
    pub(crate) corpse_timer_ms: u32,
    pub(crate) empty_for_ms: u64,
    pub(crate) tick_count: u64,
}

impl WorldInstance {
    /// Create an instance and load its persisted respawn records. Nothing
    /// ticks until the load has completed.
    pub fn new(
        instance_id: u32,
        context: Arc<WorldContext>,
        policy: InstancePolicy,
        store: Box<dyn RespawnStore>,
        start_time_ms: i64,
    ) -> RealmResult<Self> {
        let mut respawns = RespawnScheduler::new(instance_id, Arc::clone(&context), store);
        let loaded = respawns.load_from_store()?;
        let grid = ops::create_grid(&context.config().grid);

        log::info!(
            "[WorldInstance] Instance {} ({:?}) created with {} respawn records",
            instance_id,
            policy.kind,
            loaded
        );

        Ok(Self {
            instance_id,
            context,
            policy,
            game_time_ms: start_time_ms,
            guids: GuidAllocator::new(),
            grid,
            store: ObjectStore::new(),
            queues: DeferredQueues::new(),
            respawns,
            active: ActiveObjectSet::new(),
            zones: zone_ops::create_zone_table(),
            callbacks: CallbackQueue::new(instance_id),
            deferred_calls: Vec::new(),
            updater: None,
            broadcaster: None,
            phase: TickPhase::Idle,
            corpse_timer_ms: 0,
            empty_for_ms: 0,
            tick_count: 0,
        })
    }

    /// Create an instance backed by the respawn store described in the
    /// context's persistence config
    pub fn open(
        instance_id: u32,
        context: Arc<WorldContext>,
        policy: InstancePolicy,
        start_time_ms: i64,
    ) -> RealmResult<Self> {
        let store = open_store(&context.config().persistence)?;
        Self::new(instance_id, context, policy, store, start_time_ms)
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn context(&self) -> &Arc<WorldContext> {
        &self.context
    }

    pub fn policy(&self) -> &InstancePolicy {
        &self.policy
    }

    pub fn set_closed(&mut self, closed: bool) {
        self.policy.enter.closed = closed;
    }

    /// Game time in epoch seconds
    pub fn game_time(&self) -> i64 {
        self.game_time_ms.div_euclid(1000)
    }

    pub fn game_time_ms(&self) -> i64 {
        self.game_time_ms
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn grid(&self) -> &GridIndex {
        &self.grid
    }

    pub fn respawns(&self) -> &RespawnScheduler {
        &self.respawns
    }

    pub fn zones(&self) -> &ZoneStateTable {
        &self.zones
    }

    pub fn active_objects(&self) -> &ActiveObjectSet {
        &self.active
    }

    /// Mutations waiting for the next drain
    pub fn pending_mutations(&self) -> usize {
        self.queues.len()
    }

    pub fn callback_sender(&self) -> CallbackSender {
        self.callbacks.sender()
    }

    pub fn set_updater(&mut self, updater: Box<dyn EntityUpdater>) {
        self.updater = Some(updater);
    }

    pub fn set_broadcaster(&mut self, broadcaster: Box<dyn ZoneBroadcaster>) {
        self.broadcaster = Some(broadcaster);
    }

    pub fn generate_guid(&mut self, category: GuidCategory) -> ObjectGuid {
        self.guids.generate(category)
    }

    pub fn lookup_by_identity(&self, guid: ObjectGuid) -> Option<&WorldEntity> {
        self.store.get(guid)
    }

    /// Live entities of a spawn identity. Usually zero or one, briefly two
    /// while an old instance is leaving and a new one arriving.
    pub fn lookup_by_spawn_identity(&self, key: SpawnKey) -> Vec<&WorldEntity> {
        self.store.by_spawn(key)
    }

    pub fn player_count(&self) -> u32 {
        self.store.count_of_kind(crate::entity::EntityKind::Player) as u32
    }

    pub(crate) fn load_radius(&self) -> u32 {
        self.policy
            .visibility
            .load_radius_cells
            .unwrap_or(self.context.config().grid.load_radius_cells)
    }

    // Players

    /// Bring a player into the instance after the entry checks
    pub fn add_player(&mut self, player: WorldEntity) -> EnterState {
        if !player.is_player() {
            return EnterState::NotAPlayer;
        }
        let already = self.store.contains(player.guid) || self.queues.is_insertion_pending(player.guid);
        let state = self.policy.can_enter(self.player_count(), already);
        if state != EnterState::CanEnter {
            log::info!(
                "[WorldInstance] Instance {}: player {} refused ({:?})",
                self.instance_id,
                player.guid,
                state
            );
            return state;
        }
        if !self.add_to_map(player) {
            return EnterState::Closed;
        }
        state
    }

    pub fn remove_player(&mut self, guid: ObjectGuid) -> bool {
        if !guid.is_player() {
            return false;
        }
        self.remove_from_map(guid)
    }

    // World membership

    /// Place an entity into the world. Returns false when the position lies
    /// outside the grid.
    pub fn add_to_map(&mut self, entity: WorldEntity) -> bool {
        if ops::coord_for(&self.grid.geometry, &entity.position).is_none() {
            log::warn!(
                "[WorldInstance] Instance {}: {} at ({}, {}) is outside the grid",
                self.instance_id,
                entity.guid,
                entity.position.x,
                entity.position.y
            );
            return false;
        }
        if self.store.contains(entity.guid) || self.queues.is_insertion_pending(entity.guid) {
            log::error!(
                "[WorldInstance] Instance {}: identity {} is already in the world",
                self.instance_id,
                entity.guid
            );
            panic!("Duplicate entity identity {}", entity.guid);
        }
        self.guids.observe(entity.guid);

        if self.phase.defers_mutations() {
            return self.queues.push_insertion(entity);
        }
        self.apply_insertion(entity)
    }

    /// Remove an entity without scheduling a respawn. Returns false for
    /// entities that are not in the world.
    pub fn remove_from_map(&mut self, guid: ObjectGuid) -> bool {
        if self.queues.cancel_insertion(guid).is_some() {
            return true;
        }
        if !self.store.contains(guid) {
            return false;
        }
        if self.phase.defers_mutations() {
            self.queues.push_removal(guid, RemovalMode::Despawn);
            return true;
        }
        self.apply_removal(guid, RemovalMode::Despawn)
    }

    /// Remove a spawned entity and schedule its spawn point's respawn.
    /// `delay_override` replaces the entity's own respawn delay.
    pub fn despawn_with_respawn(&mut self, guid: ObjectGuid, delay_override: Option<u32>) -> bool {
        let Some(entity) = self.store.get(guid) else {
            return false;
        };
        let delay_secs = delay_override.unwrap_or(entity.respawn_delay_secs);
        let mode = RemovalMode::DespawnWithRespawn { delay_secs };
        if self.phase.defers_mutations() {
            self.queues.push_removal(guid, mode);
            return true;
        }
        self.apply_removal(guid, mode)
    }

    /// Remove every live entity of a spawn identity
    pub fn despawn_all(&mut self, key: SpawnKey) -> usize {
        let guids: Vec<ObjectGuid> = self.store.by_spawn(key).iter().map(|e| e.guid).collect();
        guids.into_iter().filter(|guid| self.remove_from_map(*guid)).count()
    }

    /// Move an entity. Relocations into unloaded cells are refused for
    /// entities that cannot load cells themselves.
    pub fn relocate(&mut self, guid: ObjectGuid, target: Position) -> bool {
        if !self.store.contains(guid) && !self.queues.is_insertion_pending(guid) {
            return false;
        }
        if self.phase.defers_mutations() {
            self.queues.push_relocation(guid, target);
            return true;
        }
        self.apply_relocation(guid, target)
    }

    /// Materialize a template at `position`, optionally owned by another
    /// entity. Owned transient entities leave the world with their owner.
    pub fn summon(
        &mut self,
        template_id: u32,
        category: GuidCategory,
        position: Position,
        owner: Option<ObjectGuid>,
    ) -> Result<ObjectGuid, MaterializeError> {
        let mut entity = self.materialize(template_id, category, position, None)?;
        entity.owner = owner;
        let guid = entity.guid;
        if !self.add_to_map(entity) {
            return Err(MaterializeError::InvalidPosition {
                x: position.x,
                y: position.y,
            });
        }
        Ok(guid)
    }

    pub(crate) fn materialize(
        &mut self,
        template_id: u32,
        category: GuidCategory,
        position: Position,
        spawn: Option<SpawnKey>,
    ) -> Result<WorldEntity, MaterializeError> {
        if ops::coord_for(&self.grid.geometry, &position).is_none() {
            return Err(MaterializeError::InvalidPosition {
                x: position.x,
                y: position.y,
            });
        }
        let guid = self.guids.generate(category);
        let request = MaterializeRequest {
            template_id,
            position,
            guid,
            spawn,
            instance_id: self.instance_id,
            now: self.game_time(),
        };
        let entity = self.context.materializer().materialize(&request)?;
        if entity.guid != guid {
            return Err(MaterializeError::GuidMismatch {
                expected: guid,
                found: entity.guid,
            });
        }
        Ok(entity)
    }

    // Active objects

    /// Keep an entity simulating and its cell loaded with no player nearby
    pub fn activate(&mut self, guid: ObjectGuid) -> bool {
        let Some(cell) = self.store.get(guid).and_then(|e| e.cell) else {
            return false;
        };
        if !self.active.activate(guid, cell) {
            return false;
        }
        ops::add_active(&mut self.grid, cell);
        self.ensure_cell_loaded(cell);
        log::debug!(
            "[WorldInstance] Instance {}: {} activated in {}",
            self.instance_id,
            guid,
            cell
        );
        true
    }

    pub fn deactivate(&mut self, guid: ObjectGuid) -> bool {
        match self.active.deactivate(guid) {
            Some(cell) => {
                ops::remove_active(&mut self.grid, cell);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, guid: ObjectGuid) -> bool {
        self.active.contains(guid)
    }

    // Cells

    /// Load a cell, put back the corpses that outlived its last unload and
    /// populate its spawn points. Idempotent: returns false when the cell was
    /// already loaded.
    pub fn ensure_cell_loaded(&mut self, coord: CellCoord) -> bool {
        if !ops::mark_loaded(&mut self.grid, coord) {
            return false;
        }
        for corpse in self.store.corpses().in_cell(coord) {
            if let Some(handle) = self.store.handle_of(corpse) {
                ops::add_entity(&mut self.grid, coord, handle, false);
            }
        }
        let cell_id = ops::cell_id(&self.grid.geometry, coord);
        let spawned = self.populate_cell(cell_id);
        let requeued = self.respawns.on_cell_loaded(cell_id);
        log::debug!(
            "[WorldInstance] Instance {}: loaded {} ({} spawned, {} parked respawns requeued)",
            self.instance_id,
            coord,
            spawned,
            requeued
        );
        true
    }

    pub fn is_cell_loaded(&self, coord: CellCoord) -> bool {
        ops::is_loaded(&self.grid, coord)
    }

    pub fn cell_state(&self, coord: CellCoord) -> CellState {
        ops::cell_state(&self.grid, coord)
    }

    pub fn cell_of(&self, position: &Position) -> Option<CellCoord> {
        ops::coord_for(&self.grid.geometry, position)
    }

    pub fn cell_id(&self, coord: CellCoord) -> CellId {
        ops::cell_id(&self.grid.geometry, coord)
    }

    pub fn mark_no_unload(&mut self, coord: CellCoord) -> bool {
        ops::mark_no_unload(&mut self.grid, coord)
    }

    pub fn unmark_no_unload(&mut self, coord: CellCoord) -> bool {
        ops::unmark_no_unload(&mut self.grid, coord)
    }

    fn load_around(&mut self, center: CellCoord) {
        for coord in ops::cells_in_radius(&self.grid.geometry, center, self.load_radius()) {
            self.ensure_cell_loaded(coord);
        }
    }

    // Zone state

    pub fn set_zone_music(&mut self, zone_id: u32, music_id: u32) {
        zone_ops::set_zone_music(&mut self.zones, zone_id, music_id);
    }

    pub fn set_zone_weather(&mut self, zone_id: u32, weather: WeatherState, intensity: f32) {
        zone_ops::set_zone_weather(&mut self.zones, zone_id, weather, intensity);
    }

    pub fn set_zone_override_light(
        &mut self,
        zone_id: u32,
        area_light_id: u32,
        override_light_id: u32,
        transition_ms: u32,
    ) {
        zone_ops::set_zone_override_light(
            &mut self.zones,
            zone_id,
            area_light_id,
            override_light_id,
            transition_ms,
        );
    }

    pub fn zone_info(&self, zone_id: u32) -> Option<&ZoneDynamicInfo> {
        zone_ops::zone_info(&self.zones, zone_id)
    }

    pub fn zone_player_count(&self, zone_id: u32) -> u32 {
        zone_ops::zone_player_count(&self.zones, zone_id)
    }

    // Applying mutations

    pub(crate) fn apply_insertion(&mut self, mut entity: WorldEntity) -> bool {
        let Some(coord) = ops::coord_for(&self.grid.geometry, &entity.position) else {
            return false;
        };
        // Corpses live in the map-wide corpse index; an unloaded cell picks
        // them up when it loads
        let attach = entity.kind != EntityKind::Corpse || ops::is_loaded(&self.grid, coord);
        if attach {
            self.ensure_cell_loaded(coord);
        }

        let zone_id = self.context.zone_id(&entity.position);
        entity.cell = Some(coord);
        entity.zone_id = zone_id;
        let is_player = entity.is_player();
        let guid = entity.guid;

        let handle = self.store.insert(entity);
        if attach {
            ops::add_entity(&mut self.grid, coord, handle, is_player);
        }

        if is_player {
            zone_ops::update_player_zone_stats(&mut self.zones, None, Some(zone_id));
            self.send_zone_info(guid, zone_id);
            self.empty_for_ms = 0;
            self.load_around(coord);
        }
        log::trace!(
            "[WorldInstance] Instance {}: {} entered {}",
            self.instance_id,
            guid,
            coord
        );
        true
    }

    pub(crate) fn apply_removal(&mut self, guid: ObjectGuid, mode: RemovalMode) -> bool {
        let Some(handle) = self.store.handle_of(guid) else {
            return false;
        };
        let Some(entity) = self.store.remove(guid) else {
            return false;
        };
        if let Some(cell) = entity.cell {
            ops::remove_entity(&mut self.grid, cell, handle, entity.is_player());
        }
        if let Some(cell) = self.active.deactivate(guid) {
            ops::remove_active(&mut self.grid, cell);
        }
        self.queues.cancel_relocation(guid);
        if entity.is_player() {
            zone_ops::update_player_zone_stats(&mut self.zones, Some(entity.zone_id), None);
        }

        for owned in self.store.owned_by(guid) {
            let transient = self
                .store
                .get(owned)
                .map_or(false, |e| e.capabilities().transient);
            if transient {
                self.remove_from_map(owned);
            }
        }

        if let RemovalMode::DespawnWithRespawn { delay_secs } = mode {
            self.schedule_respawn_for(&entity, delay_secs);
        }
        log::trace!("[WorldInstance] Instance {}: {} removed", self.instance_id, guid);
        true
    }

    pub(crate) fn apply_relocation(&mut self, guid: ObjectGuid, target: Position) -> bool {
        let Some(handle) = self.store.handle_of(guid) else {
            return false;
        };
        let Some((old_cell, old_zone, is_player)) = self
            .store
            .get(guid)
            .map(|e| (e.cell, e.zone_id, e.is_player()))
        else {
            return false;
        };
        let Some(new_cell) = ops::coord_for(&self.grid.geometry, &target) else {
            log::warn!(
                "[WorldInstance] Instance {}: relocation of {} outside the grid ignored",
                self.instance_id,
                guid
            );
            return false;
        };

        if old_cell != Some(new_cell) {
            if !ops::is_loaded(&self.grid, new_cell) {
                if !(is_player || self.active.contains(guid)) {
                    log::debug!(
                        "[WorldInstance] Instance {}: {} stays in place, {} is not loaded",
                        self.instance_id,
                        guid,
                        new_cell
                    );
                    return false;
                }
                self.ensure_cell_loaded(new_cell);
            }
            if let Some(old) = old_cell {
                ops::remove_entity(&mut self.grid, old, handle, is_player);
            }
            ops::add_entity(&mut self.grid, new_cell, handle, is_player);
            if let Some(previous) = self.active.relocate(guid, new_cell) {
                ops::remove_active(&mut self.grid, previous);
                ops::add_active(&mut self.grid, new_cell);
            }
        }

        let zone_id = self.context.zone_id(&target);
        self.store.set_position(guid, target);
        self.store.set_placement(guid, new_cell, zone_id);

        if is_player {
            zone_ops::update_player_zone_stats(&mut self.zones, Some(old_zone), Some(zone_id));
            if old_zone != zone_id {
                self.send_zone_info(guid, zone_id);
            }
            self.load_around(new_cell);
        }
        true
    }

    /// Push the zone's current music, weather and lights to a player who
    /// just entered it. Zones without dynamic state send nothing.
    fn send_zone_info(&mut self, player: ObjectGuid, zone_id: u32) {
        if let (Some(broadcaster), Some(info)) = (
            self.broadcaster.as_mut(),
            zone_ops::zone_info(&self.zones, zone_id),
        ) {
            broadcaster.player_entered_zone(player, zone_id, info);
        }
    }

    fn schedule_respawn_for(&mut self, entity: &WorldEntity, delay_secs: u32) {
        let Some(key) = entity.spawn else {
            log::debug!(
                "[WorldInstance] Instance {}: {} has no spawn point, nothing to respawn",
                self.instance_id,
                entity.guid
            );
            return;
        };
        let cell_id = match (self.context.home_cell(key), entity.cell) {
            (Some(home), _) => home,
            (None, Some(cell)) => ops::cell_id(&self.grid.geometry, cell),
            (None, None) => return,
        };
        let zone_players = zone_ops::zone_player_count(&self.zones, entity.zone_id);
        let now = self.game_time();
        let due = self.respawns.save_respawn_time(
            key,
            entity.template_id,
            delay_secs,
            cell_id,
            zone_players,
            now,
        );
        log::debug!(
            "[WorldInstance] Instance {}: {} respawns at {}",
            self.instance_id,
            key,
            due
        );
    }

    /// Apply queued mutations until the queues are empty. Each pass applies
    /// removals, then insertions, then relocations. Returns the pass count.
    pub(crate) fn drain_deferred(&mut self) -> u32 {
        let limit = self.context.config().queues.drain_pass_limit;
        let mut passes = 0;
        while !self.queues.is_empty() {
            passes += 1;
            if passes > limit {
                log::error!(
                    "[WorldInstance] Instance {}: deferred queues still hold {} mutations after {} passes",
                    self.instance_id,
                    self.queues.len(),
                    limit
                );
                panic!(
                    "Deferred queue drain exceeded {} passes in instance {}",
                    limit, self.instance_id
                );
            }
            for (guid, mode) in self.queues.take_removals() {
                self.apply_removal(guid, mode);
            }
            for entity in self.queues.take_insertions() {
                self.apply_insertion(entity);
            }
            for (guid, target) in self.queues.take_relocations() {
                self.apply_relocation(guid, target);
            }
        }
        passes
    }

    /// Remove the entities of unloaded cells from the world. Their spawn
    /// points repopulate when the cell loads again. Corpses and bones stay
    /// in the store until they decay.
    pub(crate) fn release_unloaded(&mut self, cells: Vec<UnloadedCell>) -> usize {
        let mut released = 0;
        for cell in cells {
            for handle in cell.entities {
                let Some((guid, kind)) = self.store.get_by_handle(handle).map(|e| (e.guid, e.kind))
                else {
                    continue;
                };
                if kind == EntityKind::Corpse {
                    continue;
                }
                if self.apply_removal(guid, RemovalMode::Despawn) {
                    released += 1;
                }
            }
        }
        released
    }
}

impl std::fmt::Debug for WorldInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldInstance")
            .field("instance_id", &self.instance_id)
            .field("kind", &self.policy.kind)
            .field("phase", &self.phase)
            .field("entities", &self.store.len())
            .field("respawns", &self.respawns.len())
            .finish()
    }
}
