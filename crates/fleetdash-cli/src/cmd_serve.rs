use std::sync::Arc;
use std::time::Duration;

use fleetdash_cache::{FleetCacheStore, RefreshConfig, RefreshOrchestrator};
use fleetdash_serve::{AppState, AuthGate, ServeConfig};
use fleetdash_upstream::{HttpUpstream, UpstreamApi};

use crate::ServeArgs;

pub fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let api: Arc<dyn UpstreamApi> = Arc::new(HttpUpstream::new(args.upstream.config())?);
    let refresher = Arc::new(RefreshOrchestrator::new(
        Arc::clone(&api),
        Arc::new(FleetCacheStore::new()),
        RefreshConfig::default(),
    ));
    let state = AppState {
        refresher,
        api,
        auth: Arc::new(AuthGate::new(args.auth_user, args.auth_password)),
    };
    let config = ServeConfig {
        addr: args.addr,
        static_dir: args.static_dir,
        refresh_period: Duration::from_secs(args.refresh_secs),
    };

    tracing::info!(
        base_url = %args.upstream.api_base_url,
        refresh_secs = args.refresh_secs,
        "starting fleetdash"
    );
    tokio::runtime::Runtime::new()?.block_on(fleetdash_serve::serve(config, state))
}
