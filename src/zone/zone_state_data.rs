//! Zone State Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in zone_state_operations.rs

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeatherState {
    #[default]
    Fine,
    Fog,
    LightRain,
    MediumRain,
    HeavyRain,
    LightSnow,
    MediumSnow,
    HeavySnow,
    LightSandstorm,
    MediumSandstorm,
    HeavySandstorm,
    Thunders,
}

/// Override of one area light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightOverride {
    pub area_light_id: u32,
    pub override_light_id: u32,
    pub transition_ms: u32,
}

/// Per-zone presentation state, created on first write
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneDynamicInfo {
    pub music_id: u32,
    pub weather: WeatherState,
    pub weather_intensity: f32,
    pub light_overrides: Vec<LightOverride>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZoneChange {
    Music {
        music_id: u32,
    },
    Weather {
        state: WeatherState,
        intensity: f32,
    },
    Light {
        area_light_id: u32,
        /// 0 clears the override
        override_light_id: u32,
        transition_ms: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneNotification {
    pub zone_id: u32,
    pub change: ZoneChange,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneStateTable {
    pub zones: FxHashMap<u32, ZoneDynamicInfo>,
    /// Changes not yet broadcast, in the order they were made
    pub pending: Vec<ZoneNotification>,
    pub player_counts: FxHashMap<u32, u32>,
}
