//! Zone State Operations - DOP Functions
//!
//! Setters record the change and queue a notification; the tick driver
//! delivers queued notifications in the broadcast phase.

use super::zone_state_data::{
    LightOverride, WeatherState, ZoneChange, ZoneDynamicInfo, ZoneNotification, ZoneStateTable,
};

pub fn create_zone_table() -> ZoneStateTable {
    ZoneStateTable::default()
}

pub fn zone_info(table: &ZoneStateTable, zone_id: u32) -> Option<&ZoneDynamicInfo> {
    table.zones.get(&zone_id)
}

pub fn set_zone_music(table: &mut ZoneStateTable, zone_id: u32, music_id: u32) {
    table.zones.entry(zone_id).or_default().music_id = music_id;
    table.pending.push(ZoneNotification {
        zone_id,
        change: ZoneChange::Music { music_id },
    });
}

pub fn set_zone_weather(
    table: &mut ZoneStateTable,
    zone_id: u32,
    state: WeatherState,
    intensity: f32,
) {
    let intensity = intensity.clamp(0.0, 1.0);
    let info = table.zones.entry(zone_id).or_default();
    info.weather = state;
    info.weather_intensity = intensity;
    table.pending.push(ZoneNotification {
        zone_id,
        change: ZoneChange::Weather { state, intensity },
    });
}

/// Replace the override for `area_light_id`. An `override_light_id` of 0
/// clears it.
pub fn set_zone_override_light(
    table: &mut ZoneStateTable,
    zone_id: u32,
    area_light_id: u32,
    override_light_id: u32,
    transition_ms: u32,
) {
    let info = table.zones.entry(zone_id).or_default();
    info.light_overrides
        .retain(|o| o.area_light_id != area_light_id);
    if override_light_id != 0 {
        info.light_overrides.push(LightOverride {
            area_light_id,
            override_light_id,
            transition_ms,
        });
    }
    table.pending.push(ZoneNotification {
        zone_id,
        change: ZoneChange::Light {
            area_light_id,
            override_light_id,
            transition_ms,
        },
    });
}

pub fn take_pending_notifications(table: &mut ZoneStateTable) -> Vec<ZoneNotification> {
    std::mem::take(&mut table.pending)
}

/// Move one player between zones. `None` means not in any zone (entering
/// or leaving the instance).
pub fn update_player_zone_stats(
    table: &mut ZoneStateTable,
    old_zone: Option<u32>,
    new_zone: Option<u32>,
) {
    if old_zone == new_zone {
        return;
    }
    if let Some(old) = old_zone {
        match table.player_counts.get_mut(&old) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                table.player_counts.remove(&old);
            }
            None => log::warn!("[ZoneStateTable] Player left zone {} with no players", old),
        }
    }
    if let Some(new) = new_zone {
        *table.player_counts.entry(new).or_insert(0) += 1;
    }
}

pub fn zone_player_count(table: &ZoneStateTable, zone_id: u32) -> u32 {
    table.player_counts.get(&zone_id).copied().unwrap_or(0)
}
