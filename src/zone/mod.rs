//! Zone presentation state - DOP
//!
//! Data lives in zone_state_data.rs, functions in zone_state_operations.rs.

use crate::guid::ObjectGuid;

pub mod zone_state_data;
pub mod zone_state_operations;

pub use zone_state_data::{
    LightOverride, WeatherState, ZoneChange, ZoneDynamicInfo, ZoneNotification, ZoneStateTable,
};
pub use zone_state_operations as ops;

/// Receives zone state changes during the broadcast phase
pub trait ZoneBroadcaster: Send {
    fn zone_changed(&mut self, zone_id: u32, change: &ZoneChange, info: &ZoneDynamicInfo);

    /// A player entered `zone_id`, which has dynamic state to catch up on
    fn player_entered_zone(&mut self, _player: ObjectGuid, _zone_id: u32, _info: &ZoneDynamicInfo) {}
}
