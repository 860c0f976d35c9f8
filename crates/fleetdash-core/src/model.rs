use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::clock::format_rfc3339;

/// Placeholder for text fields that have no upstream value.
pub const PLACEHOLDER: &str = "--";

/// Engine running-state classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunningState {
    Running,
    Stopped,
    Unknown,
}

impl RunningState {
    /// Classify a raw engine-state token. The token is upper-cased first, then
    /// `ON` and `OFF` are the only recognised values.
    pub fn from_engine_token(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("ON") => RunningState::Running,
            Some("OFF") => RunningState::Stopped,
            _ => RunningState::Unknown,
        }
    }
}

/// One fleet vehicle as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSummary {
    pub id: String,
    pub name: String,
    pub plate: String,
    pub make_model: String,
    pub driver_id: Option<String>,
    pub driver_name: String,
    pub status: RunningState,
    /// Raw upstream engine-state token, kept for display.
    pub engine_state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: String,
    /// Engine-state observation time. Doubles as the trip change-detection signal.
    pub state_time: Option<String>,
    pub location_time: Option<String>,
}

impl VehicleSummary {
    /// A roster entry with nothing joined onto it yet.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: PLACEHOLDER.to_string(),
            plate: PLACEHOLDER.to_string(),
            make_model: PLACEHOLDER.to_string(),
            driver_id: None,
            driver_name: PLACEHOLDER.to_string(),
            status: RunningState::Unknown,
            engine_state: None,
            latitude: None,
            longitude: None,
            address: PLACEHOLDER.to_string(),
            state_time: None,
            location_time: None,
        }
    }
}

/// An immutable, fully built vehicle list plus the time it was generated.
///
/// A refresh never edits a published snapshot; it builds a new one and swaps
/// it in whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub vehicles: Vec<VehicleSummary>,
    pub generated_at: String,
}

impl DashboardSnapshot {
    pub fn new(vehicles: Vec<VehicleSummary>, generated_at: OffsetDateTime) -> Self {
        Self {
            vehicles,
            generated_at: format_rfc3339(generated_at),
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&VehicleSummary> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    /// Distinct assigned-driver ids, in sorted order.
    pub fn driver_ids(&self) -> Vec<String> {
        self.vehicles
            .iter()
            .filter_map(|v| v.driver_id.clone())
            .filter(|id| !id.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_engine_tokens() {
        let statuses: Vec<RunningState> = [Some("ON"), Some("OFF"), Some("IDLE")]
            .into_iter()
            .map(RunningState::from_engine_token)
            .collect();
        assert_eq!(
            statuses,
            vec![
                RunningState::Running,
                RunningState::Stopped,
                RunningState::Unknown
            ]
        );
    }

    #[test]
    fn classification_upper_cases_first() {
        assert_eq!(RunningState::from_engine_token(Some("On")), RunningState::Running);
        assert_eq!(RunningState::from_engine_token(Some("off")), RunningState::Stopped);
        assert_eq!(RunningState::from_engine_token(Some(" ON")), RunningState::Unknown);
        assert_eq!(RunningState::from_engine_token(None), RunningState::Unknown);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let v = VehicleSummary::bare("v1");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["makeModel"], "--");
        assert_eq!(json["status"], "Unknown");
        assert!(json["latitude"].is_null());
        assert!(json["stateTime"].is_null());
    }

    #[test]
    fn driver_ids_are_distinct_and_sorted() {
        let mut a = VehicleSummary::bare("1");
        a.driver_id = Some("d2".into());
        let mut b = VehicleSummary::bare("2");
        b.driver_id = Some("d1".into());
        let mut c = VehicleSummary::bare("3");
        c.driver_id = Some("d2".into());
        let d = VehicleSummary::bare("4");
        let snap = DashboardSnapshot::new(vec![a, b, c, d], OffsetDateTime::UNIX_EPOCH);
        assert_eq!(snap.driver_ids(), vec!["d1".to_string(), "d2".to_string()]);
        assert_eq!(snap.generated_at, "1970-01-01T00:00:00Z");
    }
}
