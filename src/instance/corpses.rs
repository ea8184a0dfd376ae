//! Player corpses and their decay into bones

use super::world_instance::WorldInstance;
use crate::entity::{EntityKind, WorldEntity};
use crate::guid::{GuidCategory, ObjectGuid};
use crate::types::{CellCoord, Position};

impl WorldInstance {
    /// Leave a corpse for `owner` at `position`
    pub fn add_corpse(&mut self, owner: ObjectGuid, position: Position) -> Option<ObjectGuid> {
        let guid = self.guids.generate(GuidCategory::Corpse);
        let corpse = WorldEntity::new(guid, EntityKind::Corpse, position)
            .with_owner(owner)
            .created_at(self.game_time());
        self.add_to_map(corpse).then_some(guid)
    }

    pub fn corpse_by_owner(&self, owner: ObjectGuid) -> Option<&WorldEntity> {
        self.store
            .corpses()
            .by_owner(owner)
            .and_then(|guid| self.store.get(guid))
    }

    pub fn corpses_in_cell(&self, coord: CellCoord) -> Vec<&WorldEntity> {
        self.store
            .corpses()
            .in_cell(coord)
            .into_iter()
            .filter_map(|guid| self.store.get(guid))
            .collect()
    }

    /// Replace the owned corpse of `owner` with ownerless bones at the same
    /// spot. Returns the bones' guid.
    pub fn convert_corpse_to_bones(&mut self, owner: ObjectGuid) -> Option<ObjectGuid> {
        let corpse_guid = self.store.corpses().by_owner(owner)?;
        if self.queues.is_removal_pending(corpse_guid) {
            return None;
        }
        let (position, template_id) = self
            .store
            .get(corpse_guid)
            .map(|c| (c.position, c.template_id))?;

        self.remove_from_map(corpse_guid);
        let bones_guid = self.guids.generate(GuidCategory::Corpse);
        let bones = WorldEntity::new(bones_guid, EntityKind::Corpse, position)
            .with_template(template_id)
            .created_at(self.game_time());
        if !self.add_to_map(bones) {
            return None;
        }
        log::debug!(
            "[WorldInstance] Instance {}: corpse {} of {} turned to bones {}",
            self.instance_id,
            corpse_guid,
            owner,
            bones_guid
        );
        Some(bones_guid)
    }

    /// Turn expired corpses into bones and remove expired bones. Returns
    /// (corpses converted, bones removed).
    pub fn remove_old_corpses(&mut self) -> (usize, usize) {
        let now = self.game_time();
        let corpses = &self.context.config().corpses;
        let corpse_expiry = corpses.corpse_expiry_secs as i64;
        let bones_expiry = corpses.bones_expiry_secs as i64;

        let expired_bones: Vec<ObjectGuid> = self
            .store
            .corpses()
            .bones()
            .filter(|guid| {
                self.store
                    .get(*guid)
                    .map_or(false, |b| b.created_at + bones_expiry <= now)
            })
            .collect();
        let expired_owners: Vec<ObjectGuid> = self
            .store
            .corpses()
            .owned()
            .filter(|(_, corpse)| {
                self.store
                    .get(*corpse)
                    .map_or(false, |c| c.created_at + corpse_expiry <= now)
            })
            .map(|(owner, _)| owner)
            .collect();

        let removed = expired_bones
            .into_iter()
            .filter(|guid| self.remove_from_map(*guid))
            .count();
        let converted = expired_owners
            .into_iter()
            .filter(|owner| self.convert_corpse_to_bones(*owner).is_some())
            .count();

        if removed + converted > 0 {
            log::info!(
                "[WorldInstance] Instance {}: {} corpses turned to bones, {} bones removed",
                self.instance_id,
                converted,
                removed
            );
        }
        (converted, removed)
    }

    /// Run corpse decay once the configured interval has elapsed
    pub(crate) fn tick_corpse_decay(&mut self, diff_ms: u32) {
        self.corpse_timer_ms = self.corpse_timer_ms.saturating_add(diff_ms);
        if self.corpse_timer_ms < self.context.config().corpses.decay_check_interval_ms {
            return;
        }
        self.corpse_timer_ms = 0;
        self.remove_old_corpses();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RealmConfig;
    use crate::content::{ContentCatalog, FlatTerrain, TemplateMaterializer};
    use crate::guid::{GuidCategory, ObjectGuid};
    use crate::instance::{InstancePolicy, WorldContext, WorldInstance};
    use crate::persistence::MemoryRespawnStore;
    use crate::types::Position;
    use std::sync::Arc;

    fn instance() -> WorldInstance {
        let mut config = RealmConfig::default();
        config.grid.width = 8;
        config.grid.height = 8;
        config.grid.cell_size = 100.0;
        config.corpses.corpse_expiry_secs = 60;
        config.corpses.bones_expiry_secs = 30;
        let context = WorldContext::new(
            config,
            ContentCatalog::new(),
            Arc::new(TemplateMaterializer::new()),
            Arc::new(FlatTerrain::default()),
        )
        .unwrap();
        WorldInstance::new(
            2,
            context,
            InstancePolicy::open_world(),
            Box::new(MemoryRespawnStore::new()),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_corpse_lookup_and_bones() {
        let mut instance = instance();
        let owner = ObjectGuid::new(GuidCategory::Player, 1);
        let spot = Position::new(120.0, -40.0, 0.0);

        let corpse = instance.add_corpse(owner, spot).unwrap();
        assert_eq!(instance.corpse_by_owner(owner).map(|c| c.guid), Some(corpse));
        let coord = instance.cell_of(&spot).unwrap();
        assert_eq!(instance.corpses_in_cell(coord).len(), 1);

        let bones = instance.convert_corpse_to_bones(owner).unwrap();
        assert!(instance.corpse_by_owner(owner).is_none());
        assert!(instance.lookup_by_identity(corpse).is_none());
        let bones_entity = instance.lookup_by_identity(bones).unwrap();
        assert_eq!(bones_entity.owner, None);
        assert_eq!(instance.corpses_in_cell(coord).len(), 1);

        assert!(instance.convert_corpse_to_bones(owner).is_none());
    }

    #[test]
    fn test_remove_old_corpses() {
        let mut instance = instance();
        let owner = ObjectGuid::new(GuidCategory::Player, 1);
        instance.add_corpse(owner, Position::default()).unwrap();

        instance.game_time_ms = 59_000;
        assert_eq!(instance.remove_old_corpses(), (0, 0));

        instance.game_time_ms = 60_000;
        assert_eq!(instance.remove_old_corpses(), (1, 0));
        assert_eq!(instance.store().corpses().bones().count(), 1);

        instance.game_time_ms = 90_000;
        assert_eq!(instance.remove_old_corpses(), (0, 1));
        assert!(instance.store().corpses().is_empty());
    }
}
