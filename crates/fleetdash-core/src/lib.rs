pub mod clock;
pub mod detail;
pub mod merge;
pub mod model;
pub mod wire;

pub use detail::{
    DetailCache, DriverHosStatus, EnrichedVehicle, VehicleDvirSummary, VehicleTripSummary,
};
pub use model::{DashboardSnapshot, RunningState, VehicleSummary};
