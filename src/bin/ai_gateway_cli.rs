//! ai-gateway-cli: route a single completion request from the command line.
//!
//! Usage:
//!   ai-gateway-cli route <endpoints.json> <payload.json>   Route one request with failover
//!   ai-gateway-cli probe                                    Print a status probe body
//!   ai-gateway-cli version                                  Show version information

use ai_gateway_router::config::{MetricsConfig, RouterConfig};
use ai_gateway_router::metrics::StatusReport;
use ai_gateway_router::{EndpointDescriptor, MetricsRegistry, RouteRequest, Router};
use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const APP_ID: &str = "cli";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "route" => cmd_route(&args[2..]).await,
        "probe" => cmd_probe(),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"ai-gateway-cli: priority failover router for AI completion endpoints

USAGE:
    ai-gateway-cli <COMMAND> [OPTIONS]

COMMANDS:
    route <endpoints.json> <payload.json>   Route one request; prints the response and metrics
    probe                                   Print a status probe body
    version                                 Show version information
    help                                    Show this help message

ENVIRONMENT:
    API_GATEWAY_METRICS_CINTERVAL           Metrics window length in minutes (default 60)
    API_GATEWAY_METRICS_CHISTORY            Closed windows kept per endpoint (default 5)
    API_GATEWAY_ATTEMPT_TIMEOUT_SECS        Per-endpoint attempt timeout (default 30)
    API_GATEWAY_UPSTREAM_ERROR_POLICY       failover | surface (default failover)
    API_GATEWAY_PROXY_URL                   Outbound proxy
    RUST_LOG                                Log filter (default info)"#
    );
}

fn cmd_version() {
    println!("ai-gateway-cli {}", env!("CARGO_PKG_VERSION"));
}

fn cmd_probe() -> anyhow::Result<()> {
    let report = StatusReport::ok("ai-gateway-cli probe");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

async fn cmd_route(args: &[String]) -> anyhow::Result<()> {
    let [endpoints_path, payload_path] = args else {
        bail!("route expects <endpoints.json> <payload.json>");
    };

    let endpoints: Vec<EndpointDescriptor> =
        serde_json::from_value(read_json(Path::new(endpoints_path))?)
            .context("endpoints file must be a JSON array of {uri, apikey}")?;
    let payload = read_json(Path::new(payload_path))?;

    let metrics = Arc::new(MetricsRegistry::new(MetricsConfig::from_env()?)?);
    metrics.register_application(APP_ID, &endpoints)?;
    let router_cfg = RouterConfig::from_env()?;
    let router = Router::with_http(&router_cfg, metrics.clone())?;

    let request = RouteRequest::new(format!("/lb/{APP_ID}"), endpoints, payload).with_app_id(APP_ID);
    let response = router.route(&request).await;

    println!("status: {}", response.status);
    if let Some(secs) = response.retry_after_secs {
        println!("retry-after: {secs}");
    }
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    let report = metrics.report(router_cfg.instance_name.as_deref())?;
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
