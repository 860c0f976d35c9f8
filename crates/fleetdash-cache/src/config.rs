use time::Duration;

/// Tuning for the refresh pipeline.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum per-vehicle trip requests in flight.
    pub trip_concurrency: usize,
    /// Trailing window of trips fetched per vehicle.
    pub trip_window: Duration,
    /// Total inspection history window.
    pub dvir_window: Duration,
    /// Age at which the inspection window is split into two queries.
    pub dvir_split: Duration,
    /// Pages followed per paginated bulk call.
    pub max_pages: usize,
    /// Items per trip/inspection list in the read API.
    pub item_cap: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            trip_concurrency: 30,
            trip_window: Duration::days(7),
            dvir_window: Duration::days(180),
            dvir_split: Duration::days(90),
            max_pages: fleetdash_upstream::DEFAULT_MAX_PAGES,
            item_cap: 5,
        }
    }
}
