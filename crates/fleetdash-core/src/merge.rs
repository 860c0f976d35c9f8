//! Left-join of the vehicle roster against engine-state stats and locations.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;

use crate::model::{DashboardSnapshot, RunningState, VehicleSummary, PLACEHOLDER};
use crate::wire::{DriverRef, RosterVehicle, VehicleLocation, VehicleStat};

/// Build a snapshot from the three bulk responses.
///
/// Every roster vehicle appears exactly once, in roster order, whether or not
/// stats or a location exist for it. Duplicate roster ids keep the first entry.
pub fn build_snapshot(
    roster: Vec<RosterVehicle>,
    stats: Vec<VehicleStat>,
    locations: Vec<VehicleLocation>,
    generated_at: OffsetDateTime,
) -> DashboardSnapshot {
    let stats_by_id: HashMap<String, VehicleStat> =
        stats.into_iter().map(|s| (s.id.clone(), s)).collect();
    let location_by_id: HashMap<String, VehicleLocation> =
        locations.into_iter().map(|l| (l.id.clone(), l)).collect();

    let mut seen = HashSet::new();
    let vehicles = roster
        .into_iter()
        .filter(|v| seen.insert(v.id.clone()))
        .map(|v| {
            let stat = stats_by_id.get(&v.id);
            let location = location_by_id.get(&v.id);
            summarize(v, stat, location)
        })
        .collect();

    DashboardSnapshot::new(vehicles, generated_at)
}

fn summarize(
    vehicle: RosterVehicle,
    stat: Option<&VehicleStat>,
    location: Option<&VehicleLocation>,
) -> VehicleSummary {
    let mut out = VehicleSummary::bare(vehicle.id);
    out.name = text_or_placeholder(vehicle.name.as_deref());
    out.plate = text_or_placeholder(vehicle.license_plate.as_deref());
    out.make_model = make_model(vehicle.make.as_deref(), vehicle.model.as_deref());

    if let Some(driver) = &vehicle.static_assigned_driver {
        out.driver_id = driver.id.clone().filter(|id| !id.is_empty());
        out.driver_name = driver_display_name(driver);
    }

    if let Some(engine) = stat.and_then(|s| s.engine_state.as_ref()) {
        out.status = RunningState::from_engine_token(engine.value.as_deref());
        out.engine_state = engine.value.clone();
        out.state_time = engine.time.clone();
    }

    if let Some(fix) = location.and_then(|l| l.location.as_ref()) {
        out.latitude = fix.latitude;
        out.longitude = fix.longitude;
        out.location_time = fix.time.clone();
        out.address = text_or_placeholder(
            fix.reverse_geo
                .as_ref()
                .and_then(|g| g.formatted_location.as_deref()),
        );
    }

    out
}

fn text_or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Join the non-empty make and model tokens with a space.
pub fn make_model(make: Option<&str>, model: Option<&str>) -> String {
    join_tokens(&[make, model])
}

/// Prefer the combined name; fall back to first + last.
pub fn driver_display_name(driver: &DriverRef) -> String {
    match driver.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => join_tokens(&[driver.first_name.as_deref(), driver.last_name.as_deref()]),
    }
}

fn join_tokens(tokens: &[Option<&str>]) -> String {
    let joined = tokens
        .iter()
        .flatten()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::decode_records;
    use serde_json::json;

    fn roster() -> Vec<RosterVehicle> {
        decode_records(
            &[
                json!({
                    "id": "1", "name": "Mixer 01", "licensePlate": "AB-123",
                    "make": "Volvo", "model": "FMX",
                    "staticAssignedDriver": { "id": "d1", "name": "Ana Silva" }
                }),
                json!({
                    "id": "2", "name": "Mixer 02", "make": "", "model": "Actros",
                    "staticAssignedDriver": { "id": "d2", "firstName": "Rui", "lastName": "Costa" }
                }),
                json!({ "id": "3" }),
            ],
            "roster",
        )
    }

    #[test]
    fn left_join_keeps_every_roster_vehicle() {
        let stats = decode_records(
            &[
                json!({ "id": "1", "engineState": { "value": "On", "time": "2026-05-01T10:00:00Z" } }),
                json!({ "id": "2", "engineState": { "value": "Off", "time": "2026-05-01T09:00:00Z" } }),
                json!({ "id": "99", "engineState": { "value": "On" } }),
            ],
            "stats",
        );
        let locations = decode_records(
            &[json!({
                "id": "1",
                "location": {
                    "latitude": 38.7, "longitude": -9.1, "time": "2026-05-01T10:01:00Z",
                    "reverseGeo": { "formattedLocation": "Lisbon" }
                }
            })],
            "locations",
        );

        let snap = build_snapshot(roster(), stats, locations, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(snap.len(), 3);

        let v1 = &snap.vehicles[0];
        assert_eq!(v1.status, RunningState::Running);
        assert_eq!(v1.make_model, "Volvo FMX");
        assert_eq!(v1.driver_name, "Ana Silva");
        assert_eq!(v1.address, "Lisbon");
        assert_eq!(v1.latitude, Some(38.7));
        assert_eq!(v1.state_time.as_deref(), Some("2026-05-01T10:00:00Z"));

        let v2 = &snap.vehicles[1];
        assert_eq!(v2.status, RunningState::Stopped);
        assert_eq!(v2.make_model, "Actros");
        assert_eq!(v2.driver_name, "Rui Costa");
        assert_eq!(v2.plate, "--");
        assert_eq!(v2.address, "--");
        assert!(v2.latitude.is_none());

        let v3 = &snap.vehicles[2];
        assert_eq!(v3.status, RunningState::Unknown);
        assert_eq!(v3.name, "--");
        assert_eq!(v3.driver_name, "--");
        assert!(v3.driver_id.is_none());
        assert!(v3.state_time.is_none());
    }

    #[test]
    fn duplicate_roster_ids_collapse_to_first() {
        let roster = decode_records(
            &[json!({ "id": "1", "name": "first" }), json!({ "id": "1", "name": "second" })],
            "roster",
        );
        let snap = build_snapshot(roster, vec![], vec![], OffsetDateTime::UNIX_EPOCH);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.vehicles[0].name, "first");
    }

    #[test]
    fn driver_name_falls_back_to_placeholder() {
        let driver = DriverRef {
            id: Some("d".into()),
            name: Some("   ".into()),
            first_name: None,
            last_name: Some("".into()),
        };
        assert_eq!(driver_display_name(&driver), "--");
    }

    #[test]
    fn engine_statuses_follow_tokens() {
        let roster = decode_records(
            &[json!({ "id": 1 }), json!({ "id": 2 }), json!({ "id": 3 })],
            "roster",
        );
        let stats = decode_records(
            &[
                json!({ "id": 1, "engineState": { "value": "ON" } }),
                json!({ "id": 2, "engineState": { "value": "OFF" } }),
                json!({ "id": 3, "engineState": { "value": "IDLE" } }),
            ],
            "stats",
        );
        let snap = build_snapshot(roster, stats, vec![], OffsetDateTime::UNIX_EPOCH);
        let statuses: Vec<_> = snap.vehicles.iter().map(|v| v.status).collect();
        assert_eq!(
            statuses,
            vec![
                RunningState::Running,
                RunningState::Stopped,
                RunningState::Unknown
            ]
        );
    }
}
