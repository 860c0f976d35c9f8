use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use fleetdash_core::{
    DashboardSnapshot, DetailCache, DriverHosStatus, EnrichedVehicle, VehicleDvirSummary,
    VehicleTripSummary,
};

/// The composed read model served to dashboard clients.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub vehicles: Vec<EnrichedVehicle>,
    pub timestamp: String,
}

/// Snapshot cache plus detail cache for one fleet.
///
/// Constructed empty, filled by [`RefreshOrchestrator`](crate::RefreshOrchestrator),
/// read by request handlers. Mutation is crate-private: only the refresh
/// pipeline writes. Locks are never held across an await point.
#[derive(Default)]
pub struct FleetCacheStore {
    snapshot: RwLock<Option<Arc<DashboardSnapshot>>>,
    details: RwLock<DetailCache>,
    detail_passes: AtomicU64,
}

impl FleetCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently published snapshot. Holding the returned `Arc` pins that
    /// exact list even if a newer one is published meanwhile.
    pub fn snapshot(&self) -> Option<Arc<DashboardSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn timestamp(&self) -> Option<String> {
        self.snapshot().map(|s| s.generated_at.clone())
    }

    /// Compose the published snapshot with the detail cache as it is right now.
    pub fn view(&self, item_cap: usize) -> Option<DashboardView> {
        let snapshot = self.snapshot()?;
        let vehicles = self.read_details(|d| d.compose(&snapshot, item_cap));
        Some(DashboardView {
            vehicles,
            timestamp: snapshot.generated_at.clone(),
        })
    }

    /// Number of completed detail passes since construction.
    pub fn detail_passes(&self) -> u64 {
        self.detail_passes.load(Ordering::SeqCst)
    }

    pub fn trips_for(&self, vehicle_id: &str) -> Option<VehicleTripSummary> {
        self.read_details(|d| d.trips.get(vehicle_id).cloned())
    }

    pub fn hos_for(&self, driver_id: &str) -> Option<DriverHosStatus> {
        self.read_details(|d| d.hos.get(driver_id).cloned())
    }

    pub fn dvir_for(&self, vehicle_id: &str) -> Option<VehicleDvirSummary> {
        self.read_details(|d| d.dvirs.get(vehicle_id).cloned())
    }

    pub(crate) fn read_details<R>(&self, f: impl FnOnce(&DetailCache) -> R) -> R {
        let details = self.details.read().unwrap_or_else(PoisonError::into_inner);
        f(&details)
    }

    // ── Writes (refresh pipeline only) ──

    /// Swap in a new snapshot; the previous one is dropped once its last reader lets go.
    pub(crate) fn publish_snapshot(&self, snapshot: DashboardSnapshot) -> Arc<DashboardSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub(crate) fn update_details<R>(&self, f: impl FnOnce(&mut DetailCache) -> R) -> R {
        let mut details = self.details.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut details)
    }

    pub(crate) fn finish_detail_pass(&self) {
        self.detail_passes.fetch_add(1, Ordering::SeqCst);
    }
}
