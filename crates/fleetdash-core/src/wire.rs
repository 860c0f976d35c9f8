//! Upstream telematics record shapes.
//!
//! Only the fields the dashboard consumes are modelled; everything else in an
//! upstream record is ignored. Identifiers arrive as strings from the live API
//! but are accepted as numbers too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn id_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or numeric id, got {other}"
        ))),
    }
}

fn opt_id_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(de)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or numeric id, got {other}"
        ))),
    }
}

// ── Roster ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterVehicle {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub static_assigned_driver: Option<DriverRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRef {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

// ── Engine-state stats ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleStat {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub engine_state: Option<EngineState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

// ── Locations ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLocation {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub location: Option<LocationFix>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub reverse_geo: Option<ReverseGeo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGeo {
    #[serde(default)]
    pub formatted_location: Option<String>,
}

// ── Hours of service ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HosClockRecord {
    #[serde(default)]
    pub driver: Option<DriverRef>,
    #[serde(default)]
    pub current_duty_status: Option<DutyStatus>,
    #[serde(default)]
    pub clocks: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyStatus {
    #[serde(default)]
    pub hos_status_type: Option<String>,
}

// ── Inspections ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DvirRecord {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub vehicle: Option<VehicleRef>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub inspection_type: Option<String>,
    #[serde(default)]
    pub safety_status: Option<String>,
    #[serde(default)]
    pub vehicle_defects: Vec<Value>,
    #[serde(default)]
    pub author_signature: Option<Signature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleRef {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub name: Option<String>,
}

// ── Trips ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRecord {
    #[serde(default)]
    pub start_ms: Option<i64>,
    #[serde(default)]
    pub end_ms: Option<i64>,
    #[serde(default)]
    pub start_address: Option<Value>,
    #[serde(default)]
    pub end_address: Option<Value>,
    #[serde(default)]
    pub distance_meters: Option<f64>,
}

/// Trip addresses come either as a bare string or as `{ "address": ... }`.
pub fn address_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("address")
            .or_else(|| map.get("name"))
            .and_then(address_text),
        _ => None,
    }
}

/// Decode each item of an upstream `data` array, skipping malformed records.
pub fn decode_records<T: DeserializeOwned>(items: &[Value], kind: &str) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(rec) => Some(rec),
            Err(err) => {
                tracing::debug!(kind, error = %err, "skipping malformed upstream record");
                None
            }
        })
        .collect()
}
