// ── Published domain types ──

use serde::{Deserialize, Serialize};

/// One observed wireless station, as published on the bus.
///
/// Every field is a verbatim copy of the router's string representation.
/// Durations and signal values keep their router-native formatting; this
/// system never parses them. Field order is the serialization order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiClientRecord {
    /// Colon-separated hex MAC of the station.
    pub mac_address: String,
    /// Wireless interface the station is registered on.
    pub interface: String,
    pub uptime: String,
    pub last_activity: String,
    pub signal_to_noise: String,
}
