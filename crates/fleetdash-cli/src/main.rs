mod cmd_fetch;
mod cmd_serve;
mod logging;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fleetdash_upstream::UpstreamConfig;

#[derive(Parser)]
#[command(name = "fleetdash", version, about = "Fleet telematics dashboard and API proxy")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "FLEETDASH_LOG_JSON")]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the dashboard, its read API and the upstream proxy
    Serve(ServeArgs),
    /// Perform one authenticated upstream GET and print the result
    Fetch {
        /// Upstream path (e.g. /fleet/vehicles)
        endpoint: String,
        /// Query parameter in key=value form (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
}

#[derive(Args)]
struct UpstreamArgs {
    /// Upstream API base URL
    #[arg(long, env = "FLEET_API_BASE_URL", default_value = "https://api.eu.samsara.com")]
    api_base_url: String,
    /// Upstream API bearer token
    #[arg(long, env = "FLEET_API_TOKEN", hide_env_values = true, value_parser = non_empty)]
    api_token: String,
    /// Per-request upstream timeout in seconds
    #[arg(
        long,
        env = "FLEET_API_TIMEOUT_SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    upstream_timeout_secs: u64,
}

impl UpstreamArgs {
    fn config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.api_base_url.clone(),
            token: self.api_token.clone(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
        }
    }
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address
    #[arg(long, env = "FLEETDASH_ADDR", default_value = "0.0.0.0:3000")]
    addr: SocketAddr,
    /// Dashboard login username
    #[arg(long, env = "FLEETDASH_USER", value_parser = non_empty)]
    auth_user: String,
    /// Dashboard login password
    #[arg(long, env = "FLEETDASH_PASSWORD", hide_env_values = true, value_parser = non_empty)]
    auth_password: String,
    /// Directory of static dashboard assets
    #[arg(long, env = "FLEETDASH_STATIC_DIR", default_value = "public")]
    static_dir: PathBuf,
    /// Background refresh interval in seconds
    #[arg(
        long,
        env = "FLEETDASH_REFRESH_SECS",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    refresh_secs: u64,
    #[command(flatten)]
    upstream: UpstreamArgs,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

fn non_empty(raw: &str) -> Result<String, String> {
    if raw.trim().is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(raw.to_string())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match cli.cmd {
        Command::Serve(args) => cmd_serve::execute(args),
        Command::Fetch {
            endpoint,
            params,
            upstream,
        } => cmd_fetch::execute(&upstream, &endpoint, &params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_parsing() {
        assert_eq!(
            parse_param("types=engineStates"),
            Ok(("types".to_string(), "engineStates".to_string()))
        );
        assert_eq!(parse_param("q=a=b"), Ok(("q".to_string(), "a=b".to_string())));
        assert_eq!(parse_param("flag="), Ok(("flag".to_string(), String::new())));
        assert!(parse_param("=x").is_err());
        assert!(parse_param("novalue").is_err());
    }

    #[test]
    fn fetch_collects_repeated_params() {
        let cli = Cli::try_parse_from([
            "fleetdash",
            "fetch",
            "/fleet/vehicles/stats",
            "--param",
            "types=engineStates",
            "--param",
            "limit=10",
            "--api-token",
            "tok",
        ])
        .unwrap();
        let Command::Fetch {
            endpoint, params, ..
        } = cli.cmd
        else {
            panic!("expected fetch");
        };
        assert_eq!(endpoint, "/fleet/vehicles/stats");
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], ("limit".to_string(), "10".to_string()));
    }

    #[test]
    fn serve_rejects_zero_refresh_interval() {
        let parsed = Cli::try_parse_from([
            "fleetdash",
            "serve",
            "--api-token",
            "tok",
            "--auth-user",
            "admin",
            "--auth-password",
            "pw",
            "--refresh-secs",
            "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn serve_flags_build_upstream_config() {
        let cli = Cli::try_parse_from([
            "fleetdash",
            "serve",
            "--api-base-url",
            "http://localhost:9000",
            "--api-token",
            "tok",
            "--auth-user",
            "admin",
            "--auth-password",
            "pw",
            "--upstream-timeout-secs",
            "5",
            "--addr",
            "127.0.0.1:8080",
        ])
        .unwrap();
        let Command::Serve(args) = cli.cmd else {
            panic!("expected serve");
        };
        assert_eq!(args.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        let config = args.upstream.config();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
