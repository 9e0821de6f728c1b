//! NetVis Collector Binary Entry Point
//!
//! Runs the collector agent until SIGINT or SIGTERM.
//! Core functionality is provided by the `netvis_collector` library crate.

use std::sync::Arc;

use clap::Parser;
use netvis_collector::{
    Agent, AgentTimers, AppConfig, CollectorIdentity, ConfigOverrides, DeviceProber,
    DeviceRegistry, HttpCollectorApi, PollingEngine,
    collector::ping::IcmpPinger,
    collector::snmp::UdpSnmpConnector,
    logging,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the topology report queue.
const TOPOLOGY_QUEUE_CAPACITY: usize = 256;

/// NetVis Collector - network device telemetry agent
#[derive(Parser, Debug)]
#[command(name = "netvis-collector", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", env = "NETVIS_CONFIG")]
    config: String,

    /// API endpoint (overrides config file)
    #[arg(long, env = "NETVIS_API_ENDPOINT")]
    api_endpoint: Option<String>,

    /// API bearer token (overrides config file)
    #[arg(long, env = "NETVIS_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // CLI > ENV > config file
    let overrides = ConfigOverrides {
        api_endpoint: cli.api_endpoint,
        api_token: cli.api_token,
    };
    let mut config = AppConfig::load(&cli.config, &overrides)?;

    logging::init(&config.logging)?;
    config.normalize();

    tracing::info!(config = %cli.config, "NetVis Collector starting");
    tracing::info!(
        collector_id = %config.collector.id,
        endpoint = %config.api.endpoint,
        interval = %humantime::format_duration(config.collector.interval),
        concurrency = config.collector.concurrency,
        device_sync = %humantime::format_duration(config.collector.device_sync_interval),
        heartbeat = %humantime::format_duration(config.collector.heartbeat_interval),
        "Configuration loaded"
    );

    let identity = CollectorIdentity::new(&config.collector.id, config.collector.display_name());
    let api = Arc::new(HttpCollectorApi::new(
        &config.api.endpoint,
        &config.api.token,
        config.api.timeout,
        identity,
    )?);

    let (topology_tx, topology_rx) = mpsc::channel(TOPOLOGY_QUEUE_CAPACITY);
    let prober = DeviceProber::new(
        config.collector.id.clone(),
        Arc::new(IcmpPinger::new(config.ping.clone())),
        Arc::new(UdpSnmpConnector::new(config.snmp.clone())),
    )
    .with_topology(topology_tx);

    let engine = Arc::new(PollingEngine::new(
        config.collector.engine(),
        Arc::new(DeviceRegistry::new()),
        Arc::new(prober),
    ));

    let timers = AgentTimers {
        device_sync: config.collector.device_sync_interval,
        heartbeat: config.collector.heartbeat_interval,
        ..AgentTimers::default()
    };
    let agent = Agent::new(api, engine, config.reporter.clone())
        .with_timers(timers)
        .with_topology(topology_rx);

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    tracing::info!("Press Ctrl+C to shutdown");
    agent.run(token).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    token.cancel();
}
