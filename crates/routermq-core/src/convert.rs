// ── API-to-domain conversions ──
//
// Maps raw `routermq_api` registration rows into publishable records.
// Values are copied as strings with no parsing or validation; a field
// the router did not send becomes the empty string rather than failing
// the snapshot.

use routermq_api::Registration;

use crate::model::WifiClientRecord;

fn field(row: &Registration, name: &str) -> String {
    row.attribute(name).unwrap_or_default().to_owned()
}

impl From<&Registration> for WifiClientRecord {
    fn from(row: &Registration) -> Self {
        Self {
            mac_address: field(row, "mac-address"),
            interface: field(row, "interface"),
            uptime: field(row, "uptime"),
            last_activity: field(row, "last-activity"),
            signal_to_noise: field(row, "signal-to-noise"),
        }
    }
}

/// Build the snapshot record set for one poll, preserving row order.
pub fn wifi_clients(rows: &[Registration]) -> Vec<WifiClientRecord> {
    rows.iter().map(WifiClientRecord::from).collect()
}
