//! Snapshot wire contract.
//!
//! One snapshot is a point-in-time report of all live vehicle records from
//! the backend telemetry endpoint. This module owns the record shape, the
//! lenient batch parse (a malformed record is skipped, never aborts the
//! batch), and the cheap fingerprint used to suppress downstream work when
//! nothing materially changed between polls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single vehicle record as reported by the backend.
///
/// This is the entire input surface of the core: position plus the raw
/// status attributes the classifier maps to a render color.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Stable vehicle id
    pub id: String,

    /// Position in WGS84 degrees
    pub lon: f64,
    pub lat: f64,

    #[serde(default)]
    pub is_ev: bool,

    /// State of charge [0, 100]
    #[serde(default = "full_battery")]
    pub battery_percent: f64,

    #[serde(default)]
    pub is_charging: bool,

    #[serde(default)]
    pub is_queued: bool,

    #[serde(default)]
    pub is_stranded: bool,

    #[serde(default)]
    pub is_circling: bool,

    #[serde(default)]
    pub assigned_station: Option<String>,

    /// Vehicle-to-grid discharge currently active
    #[serde(default)]
    pub v2g_active: bool,
}

fn full_battery() -> f64 {
    100.0
}

impl VehicleRecord {
    /// A record is usable when it carries an id and finite coordinates.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Extracts the raw status attributes (everything but identity and
    /// position).
    pub fn status(&self) -> VehicleStatus {
        VehicleStatus {
            is_ev: self.is_ev,
            battery_percent: self.battery_percent,
            is_charging: self.is_charging,
            is_queued: self.is_queued,
            is_stranded: self.is_stranded,
            is_circling: self.is_circling,
            assigned_station: self.assigned_station.clone(),
            v2g_active: self.v2g_active,
        }
    }
}

/// Raw status attributes carried on a tracked entity between snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub is_ev: bool,
    pub battery_percent: f64,
    pub is_charging: bool,
    pub is_queued: bool,
    pub is_stranded: bool,
    pub is_circling: bool,
    pub assigned_station: Option<String>,
    pub v2g_active: bool,
}

/// Errors for snapshot parsing.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The payload is not a JSON array at all
    #[error("Malformed snapshot payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Parses a JSON snapshot payload into vehicle records.
///
/// Individually malformed records (missing id, non-finite coordinates,
/// wrong field types) are dropped; the rest of the batch survives. Only a
/// payload that is not an array at all is an error.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<VehicleRecord>, SnapshotError> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
    let total = values.len();

    let records: Vec<VehicleRecord> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<VehicleRecord>(value).ok())
        .filter(VehicleRecord::is_valid)
        .collect();

    if records.len() < total {
        tracing::debug!(
            dropped = total - records.len(),
            kept = records.len(),
            "skipped malformed snapshot records"
        );
    }

    Ok(records)
}

/// Cheap change fingerprint: record count plus first id.
///
/// Deliberately coarse. A matching fingerprint only gates redundant
/// downstream work; the per-entity noise threshold in the store is what
/// guarantees idempotence for snapshots that match but differ internally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub count: usize,
    pub first_id: Option<String>,
}

impl Fingerprint {
    pub fn of(records: &[VehicleRecord]) -> Self {
        Self {
            count: records.len(),
            first_id: records.first().map(|r| r.id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_malformed_records() {
        let payload = br#"[
            {"id": "v1", "lon": 13.4, "lat": 52.5},
            {"lon": 13.4, "lat": 52.5},
            {"id": "v3", "lon": "not-a-number", "lat": 52.5},
            {"id": "v4", "lon": 13.5, "lat": 52.6, "is_ev": true, "battery_percent": 41.0}
        ]"#;

        let records = parse_records(payload).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v4"]);
    }

    #[test]
    fn test_parse_rejects_non_array_payload() {
        assert!(parse_records(b"{\"not\": \"an array\"}").is_err());
    }

    #[test]
    fn test_parse_drops_non_finite_coordinates() {
        let payload = br#"[
            {"id": "v1", "lon": 13.4, "lat": 52.5},
            {"id": "v2", "lon": 13.4, "lat": 991.0}
        ]"#;
        let records = parse_records(payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "v1");
    }

    #[test]
    fn test_record_defaults() {
        let payload = br#"[{"id": "v1", "lon": 0.0, "lat": 0.0}]"#;
        let records = parse_records(payload).unwrap();
        let status = records[0].status();
        assert!(!status.is_ev);
        assert_eq!(status.battery_percent, 100.0);
        assert!(status.assigned_station.is_none());
    }

    #[test]
    fn test_fingerprint_detects_count_and_first_id() {
        let a = parse_records(br#"[{"id": "v1", "lon": 0.0, "lat": 0.0}]"#).unwrap();
        let b = parse_records(br#"[{"id": "v2", "lon": 0.0, "lat": 0.0}]"#).unwrap();

        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&a));
        assert_ne!(Fingerprint::of(&a), Fingerprint::default());
    }
}
