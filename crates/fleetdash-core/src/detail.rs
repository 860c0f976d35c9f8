//! Enrichment data layered onto a snapshot at read time.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::clock::{format_rfc3339, from_epoch_ms, parse_rfc3339};
use crate::model::{DashboardSnapshot, VehicleSummary};
use crate::wire::{address_text, DvirRecord, HosClockRecord, TripRecord};

// ── Hours of service ──

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverHosStatus {
    pub duty_status: Option<String>,
    pub has_clocks: bool,
    /// The upstream clock record, untouched, for detail views.
    pub raw: Value,
}

impl DriverHosStatus {
    /// Index one upstream clock record by its driver id.
    pub fn from_record(raw: Value) -> Option<(String, Self)> {
        let rec: HosClockRecord = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(err) => {
                tracing::debug!(error = %err, "skipping malformed hos clock record");
                return None;
            }
        };
        let driver_id = rec.driver.and_then(|d| d.id).filter(|id| !id.is_empty())?;
        let has_clocks = match &rec.clocks {
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        Some((
            driver_id,
            Self {
                duty_status: rec.current_duty_status.and_then(|s| s.hos_status_type),
                has_clocks,
                raw,
            },
        ))
    }
}

// ── Inspections ──

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvirItem {
    pub id: Option<String>,
    pub time: Option<String>,
    pub inspection_type: Option<String>,
    pub safety_status: Option<String>,
    pub defect_count: usize,
    pub inspector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDvirSummary {
    pub count: usize,
    pub last_inspection: Option<String>,
    /// Most recent first.
    pub items: Vec<DvirItem>,
}

impl VehicleDvirSummary {
    pub fn capped(&self, limit: usize) -> Self {
        Self {
            count: self.count,
            last_inspection: self.last_inspection.clone(),
            items: self.items.iter().take(limit).cloned().collect(),
        }
    }
}

/// Group inspection records by vehicle. Records without a vehicle id are
/// dropped; a record id seen twice (the two query windows share a boundary)
/// is counted once.
pub fn summarize_dvirs(records: Vec<DvirRecord>) -> HashMap<String, VehicleDvirSummary> {
    let mut seen_ids = HashSet::new();
    let mut by_vehicle: HashMap<String, Vec<DvirItem>> = HashMap::new();

    for rec in records {
        let Some(vehicle_id) = rec.vehicle.as_ref().and_then(|v| v.id.clone()) else {
            continue;
        };
        if let Some(id) = &rec.id {
            if !seen_ids.insert(id.clone()) {
                continue;
            }
        }
        let item = DvirItem {
            id: rec.id,
            time: rec.end_time.or(rec.start_time),
            inspection_type: rec.inspection_type.or(rec.kind),
            safety_status: rec.safety_status,
            defect_count: rec.vehicle_defects.len(),
            inspector: rec.author_signature.and_then(|s| s.name),
        };
        by_vehicle.entry(vehicle_id).or_default().push(item);
    }

    by_vehicle
        .into_iter()
        .map(|(vehicle_id, mut items)| {
            items.sort_by_key(|i| Reverse(i.time.as_deref().and_then(parse_rfc3339)));
            let summary = VehicleDvirSummary {
                count: items.len(),
                last_inspection: items.first().and_then(|i| i.time.clone()),
                items,
            };
            (vehicle_id, summary)
        })
        .collect()
}

// ── Trips ──

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripItem {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub start_address: Option<String>,
    pub end_address: Option<String>,
    pub distance_meters: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleTripSummary {
    pub count: usize,
    pub last_trip_end: Option<String>,
    /// Most recent first.
    pub items: Vec<TripItem>,
}

impl VehicleTripSummary {
    pub fn capped(&self, limit: usize) -> Self {
        Self {
            count: self.count,
            last_trip_end: self.last_trip_end.clone(),
            items: self.items.iter().take(limit).cloned().collect(),
        }
    }
}

pub fn summarize_trips(records: Vec<TripRecord>) -> VehicleTripSummary {
    let mut items: Vec<TripItem> = records
        .into_iter()
        .map(|t| TripItem {
            start_ms: t.start_ms,
            end_ms: t.end_ms,
            start_address: t.start_address.as_ref().and_then(address_text),
            end_address: t.end_address.as_ref().and_then(address_text),
            distance_meters: t.distance_meters,
        })
        .collect();
    items.sort_by_key(|t| Reverse(t.end_ms.or(t.start_ms)));

    VehicleTripSummary {
        count: items.len(),
        last_trip_end: items
            .first()
            .and_then(|t| t.end_ms)
            .and_then(from_epoch_ms)
            .map(format_rfc3339),
        items,
    }
}

// ── Detail cache ──

/// Per-vehicle and per-driver enrichment state.
#[derive(Debug, Clone, Default)]
pub struct DetailCache {
    /// Keyed by driver id. Merged per driver on each refresh.
    pub hos: HashMap<String, DriverHosStatus>,
    /// Keyed by vehicle id. Rebuilt wholesale on each refresh.
    pub dvirs: HashMap<String, VehicleDvirSummary>,
    /// Keyed by vehicle id. Updated only for re-fetched vehicles.
    pub trips: HashMap<String, VehicleTripSummary>,
    /// Engine-state observation time seen at the end of the last detail pass.
    pub watermarks: HashMap<String, Option<String>>,
}

impl DetailCache {
    /// True when the vehicle's current engine-state time differs from the one
    /// recorded at the end of the previous detail pass (or none was recorded).
    pub fn engine_time_changed(&self, vehicle: &VehicleSummary) -> bool {
        self.watermarks.get(&vehicle.id) != Some(&vehicle.state_time)
    }

    pub fn record_watermarks(&mut self, snapshot: &DashboardSnapshot) {
        for v in &snapshot.vehicles {
            self.watermarks.insert(v.id.clone(), v.state_time.clone());
        }
    }

    /// Join each snapshot vehicle with whatever detail exists for it right now.
    pub fn compose(&self, snapshot: &DashboardSnapshot, item_cap: usize) -> Vec<EnrichedVehicle> {
        snapshot
            .vehicles
            .iter()
            .map(|v| EnrichedVehicle {
                trips: self.trips.get(&v.id).map(|t| t.capped(item_cap)),
                hos: v
                    .driver_id
                    .as_ref()
                    .and_then(|d| self.hos.get(d))
                    .cloned(),
                dvir: self.dvirs.get(&v.id).map(|d| d.capped(item_cap)),
                summary: v.clone(),
            })
            .collect()
    }
}

/// A vehicle summary with its trip, hours-of-service and inspection detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedVehicle {
    #[serde(flatten)]
    pub summary: VehicleSummary,
    pub trips: Option<VehicleTripSummary>,
    pub hos: Option<DriverHosStatus>,
    pub dvir: Option<VehicleDvirSummary>,
}
