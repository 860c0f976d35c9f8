//! The refresh pipeline: snapshot pull, detail pull, and the single-flight
//! guard that keeps overlapping triggers from running two cycles at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use fleetdash_core::clock::{epoch_ms, format_rfc3339};
use fleetdash_core::detail::{summarize_dvirs, summarize_trips};
use fleetdash_core::merge::build_snapshot;
use fleetdash_core::wire::{
    decode_records, DvirRecord, RosterVehicle, TripRecord, VehicleLocation, VehicleStat,
};
use fleetdash_core::{DashboardSnapshot, DriverHosStatus};
use fleetdash_upstream::{endpoints, fetch_all, query, UpstreamApi, UpstreamError};

use crate::config::RefreshConfig;
use crate::parallel::run_bounded;
use crate::store::FleetCacheStore;

/// Result of one refresh cycle, shared by every trigger that joined it.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new snapshot was published and the detail pass ran against it.
    Refreshed { vehicles: usize, detail: DetailReport },
    /// The snapshot pull failed; the previous snapshot stays published.
    SnapshotFailed { error: String },
    /// The cycle task died before reporting.
    Aborted,
}

/// Counters from one detail pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailReport {
    /// No snapshot was published, so nothing ran.
    pub skipped: bool,
    /// Every vehicle was selected for a trip re-fetch.
    pub forced: bool,
    pub hos_drivers: usize,
    pub dvir_records: usize,
    pub dvir_vehicles: usize,
    pub trips_selected: usize,
    pub trips_refreshed: usize,
    pub trips_failed: usize,
    pub elapsed_ms: u64,
}

/// Sole writer of a [`FleetCacheStore`].
pub struct RefreshOrchestrator {
    api: Arc<dyn UpstreamApi>,
    store: Arc<FleetCacheStore>,
    config: RefreshConfig,
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
    /// Set by a forced trigger that joined a cycle already under way.
    force_pending: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl RefreshOrchestrator {
    pub fn new(api: Arc<dyn UpstreamApi>, store: Arc<FleetCacheStore>, config: RefreshConfig) -> Self {
        Self {
            api,
            store,
            config,
            in_flight: Mutex::new(None),
            force_pending: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<FleetCacheStore> {
        &self.store
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    // ── Single flight ──

    /// Run a full cycle (snapshot, then details), or join the one in flight.
    ///
    /// The cycle runs on its own task, so dropping this future does not stop
    /// it. A forced trigger only returns once a cycle has re-fetched trips for
    /// every vehicle: if the cycle it joined had already selected trips
    /// without forcing, it runs (or joins) another one.
    pub async fn refresh(self: &Arc<Self>, force_full: bool) -> RefreshOutcome {
        loop {
            let (outcome, joined) = self.trigger(force_full).await;
            let force_missed = matches!(
                &outcome,
                RefreshOutcome::Refreshed { detail, .. } if !detail.forced
            );
            if force_full && joined && force_missed {
                tracing::debug!("joined cycle was not forced, running a forced follow-up");
                continue;
            }
            return outcome;
        }
    }

    /// Start a cycle or subscribe to the running one. The flag is true when
    /// the outcome comes from a cycle some other trigger started.
    async fn trigger(self: &Arc<Self>, force_full: bool) -> (RefreshOutcome, bool) {
        let (mut rx, joined) = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(tx) => {
                    if force_full {
                        self.force_pending.store(true, Ordering::SeqCst);
                    }
                    tracing::debug!(force_full, "joining in-flight refresh");
                    (tx.subscribe(), true)
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    *slot = Some(tx);
                    let this = Arc::clone(self);
                    tokio::spawn(async move {
                        let slot = CycleSlot {
                            orchestrator: Arc::clone(&this),
                            outcome: None,
                        };
                        let outcome = this.run_cycle(force_full).await;
                        slot.finish(outcome);
                    });
                    (rx, false)
                }
            }
        };

        let outcome = rx.recv().await.unwrap_or(RefreshOutcome::Aborted);
        (outcome, joined)
    }

    async fn run_cycle(&self, force_full: bool) -> RefreshOutcome {
        match self.refresh_snapshot().await {
            Ok(snapshot) => {
                let detail = self.refresh_details(force_full).await;
                RefreshOutcome::Refreshed {
                    vehicles: snapshot.len(),
                    detail,
                }
            }
            Err(err) => RefreshOutcome::SnapshotFailed {
                error: err.to_string(),
            },
        }
    }

    /// Periodic trigger. The first tick fires immediately; cancellation is
    /// observed between cycles.
    pub fn spawn_interval(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_secs = period.as_secs(), "refresh loop started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let RefreshOutcome::Aborted = this.refresh(false).await {
                    tracing::error!("refresh cycle aborted");
                }
            }

            tracing::info!("refresh loop stopped");
        })
    }

    // ── Snapshot ──

    /// Pull roster, engine states and locations concurrently, merge, publish.
    ///
    /// On failure nothing is published and the previous snapshot keeps serving.
    pub async fn refresh_snapshot(&self) -> Result<Arc<DashboardSnapshot>, UpstreamError> {
        let started = Instant::now();
        let api = self.api.as_ref();
        let max_pages = self.config.max_pages;
        let stats_query = query([("types", "engineStates")]);

        let pulled = tokio::try_join!(
            fetch_all(api, endpoints::VEHICLES, &[], max_pages),
            fetch_all(api, endpoints::VEHICLE_STATS, &stats_query, max_pages),
            fetch_all(api, endpoints::VEHICLE_LOCATIONS, &[], max_pages),
        );

        let (roster, stats, locations) = match pulled {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!(
                    op = "snapshot",
                    status = err.status(),
                    upstream_ms = err.duration_ms(),
                    elapsed_ms = elapsed_ms(started),
                    error = %err,
                    "snapshot refresh failed, keeping previous snapshot"
                );
                return Err(err);
            }
        };

        let snapshot = build_snapshot(
            decode_records::<RosterVehicle>(&roster, "vehicle"),
            decode_records::<VehicleStat>(&stats, "vehicle stat"),
            decode_records::<VehicleLocation>(&locations, "vehicle location"),
            OffsetDateTime::now_utc(),
        );
        let snapshot = self.store.publish_snapshot(snapshot);

        tracing::info!(
            op = "snapshot",
            vehicles = snapshot.len(),
            stats = stats.len(),
            locations = locations.len(),
            elapsed_ms = elapsed_ms(started),
            "snapshot published"
        );
        Ok(snapshot)
    }

    // ── Details ──

    /// Refresh hours-of-service, inspections and (selectively) trips against
    /// the published snapshot. Best effort throughout; never fails.
    pub async fn refresh_details(&self, force_full: bool) -> DetailReport {
        self.refresh_details_at(force_full, OffsetDateTime::now_utc()).await
    }

    pub(crate) async fn refresh_details_at(&self, force_full: bool, now: OffsetDateTime) -> DetailReport {
        let started = Instant::now();
        let Some(snapshot) = self.store.snapshot() else {
            tracing::debug!(op = "details", "no snapshot published yet, skipping");
            return DetailReport {
                skipped: true,
                ..DetailReport::default()
            };
        };

        let drivers = snapshot.driver_ids();
        let (hos, dvir_records) = tokio::join!(self.fetch_hos(&drivers), self.fetch_dvirs(now));

        let mut report = DetailReport {
            hos_drivers: hos.len(),
            dvir_records: dvir_records.len(),
            ..DetailReport::default()
        };
        let dvirs = summarize_dvirs(dvir_records);
        report.dvir_vehicles = dvirs.len();
        self.store.update_details(|d| {
            d.hos.extend(hos);
            d.dvirs = dvirs;
        });

        let pending = self.force_pending.swap(false, Ordering::SeqCst);
        report.forced = force_full || pending || self.store.detail_passes() == 0;
        let selected: Vec<String> = self.store.read_details(|d| {
            snapshot
                .vehicles
                .iter()
                .filter(|v| report.forced || d.engine_time_changed(v))
                .map(|v| v.id.clone())
                .collect()
        });
        report.trips_selected = selected.len();

        let start_ms = epoch_ms(now - self.config.trip_window).to_string();
        let end_ms = epoch_ms(now).to_string();
        let tasks: Vec<_> = selected
            .iter()
            .map(|vehicle_id| {
                let api = Arc::clone(&self.api);
                let params = query([
                    ("vehicleId", vehicle_id.as_str()),
                    ("startMs", start_ms.as_str()),
                    ("endMs", end_ms.as_str()),
                ]);
                async move { api.fetch(endpoints::TRIPS, &params).await }
            })
            .collect();
        let results = run_bounded(tasks, self.config.trip_concurrency).await;

        self.store.update_details(|d| {
            for (vehicle_id, result) in selected.iter().zip(results) {
                match result {
                    Ok(resp) => {
                        d.trips
                            .insert(vehicle_id.clone(), summarize_trips(trip_records(&resp.body)));
                        report.trips_refreshed += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            op = "trips",
                            vehicle_id = %vehicle_id,
                            status = err.status(),
                            upstream_ms = err.duration_ms(),
                            "trip fetch failed, keeping previous entry"
                        );
                        d.trips.entry(vehicle_id.clone()).or_default();
                        report.trips_failed += 1;
                    }
                }
            }
            d.record_watermarks(&snapshot);
        });
        self.store.finish_detail_pass();

        report.elapsed_ms = elapsed_ms(started);
        tracing::info!(
            op = "details",
            forced = report.forced,
            hos_drivers = report.hos_drivers,
            dvir_records = report.dvir_records,
            dvir_vehicles = report.dvir_vehicles,
            trips_selected = report.trips_selected,
            trips_refreshed = report.trips_refreshed,
            trips_failed = report.trips_failed,
            elapsed_ms = report.elapsed_ms,
            "detail refresh complete"
        );
        report
    }

    async fn fetch_hos(&self, drivers: &[String]) -> Vec<(String, DriverHosStatus)> {
        if drivers.is_empty() {
            return Vec::new();
        }
        let params = query([("driverIds", drivers.join(","))]);
        match fetch_all(self.api.as_ref(), endpoints::HOS_CLOCKS, &params, self.config.max_pages).await {
            Ok(items) => items
                .into_iter()
                .filter_map(DriverHosStatus::from_record)
                .collect(),
            Err(err) => {
                tracing::warn!(
                    op = "hos",
                    drivers = drivers.len(),
                    status = err.status(),
                    upstream_ms = err.duration_ms(),
                    "hours-of-service fetch failed"
                );
                Vec::new()
            }
        }
    }

    /// The inspection window as two half-window queries, concatenated.
    async fn fetch_dvirs(&self, now: OffsetDateTime) -> Vec<DvirRecord> {
        let oldest = now - self.config.dvir_window;
        let split = now - self.config.dvir_split;
        let (older, recent) = tokio::join!(
            self.fetch_dvir_window(oldest, split),
            self.fetch_dvir_window(split, now)
        );

        let mut items = older;
        items.extend(recent);
        decode_records(&items, "dvir")
    }

    async fn fetch_dvir_window(&self, start: OffsetDateTime, end: OffsetDateTime) -> Vec<Value> {
        let params = query([
            ("startTime", format_rfc3339(start)),
            ("endTime", format_rfc3339(end)),
        ]);
        match fetch_all(self.api.as_ref(), endpoints::DVIR_HISTORY, &params, self.config.max_pages).await {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(
                    op = "dvir",
                    start = %params[0].1,
                    end = %params[1].1,
                    status = err.status(),
                    upstream_ms = err.duration_ms(),
                    "inspection fetch failed for window"
                );
                Vec::new()
            }
        }
    }
}

fn trip_records(body: &Value) -> Vec<TripRecord> {
    match body.get("trips") {
        Some(Value::Array(items)) => decode_records(items, "trip"),
        _ => Vec::new(),
    }
}

/// Clears the in-flight slot when a cycle ends. If the cycle task unwinds
/// before reporting, the sender is dropped and waiters see `Aborted`.
struct CycleSlot {
    orchestrator: Arc<RefreshOrchestrator>,
    outcome: Option<RefreshOutcome>,
}

impl CycleSlot {
    fn finish(mut self, outcome: RefreshOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for CycleSlot {
    fn drop(&mut self) {
        let sender = lock(&self.orchestrator.in_flight).take();
        if let (Some(tx), Some(outcome)) = (sender, self.outcome.take()) {
            // No receivers left is fine: every trigger may have gone away.
            let _ = tx.send(outcome);
        }
    }
}
