//! NetVis Collector - network device telemetry agent
//!
//! Polls a fleet of network devices (ICMP reachability, then SNMP system,
//! interface and LLDP data) with bounded concurrency and ships the results in
//! batches to the NetVis collection API.
//!
//! # Architecture
//!
//! - **Registry**: Atomically swapped device snapshot
//! - **Collector**: Polling engine, device prober, ping and SNMP clients
//! - **Reporter**: HTTP API client, metrics batcher, topology forwarder
//! - **Agent**: Registration, fleet sync, heartbeat and ordered shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netvis_collector::{Agent, AppConfig, ConfigOverrides, HttpCollectorApi, CollectorIdentity};
//! use netvis_collector::{DeviceProber, DeviceRegistry, PollingEngine};
//! use netvis_collector::collector::ping::IcmpPinger;
//! use netvis_collector::collector::snmp::UdpSnmpConnector;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("config.yaml", &ConfigOverrides::default())?;
//! let identity = CollectorIdentity::new(&config.collector.id, config.collector.display_name());
//! let api = Arc::new(HttpCollectorApi::new(
//!     &config.api.endpoint,
//!     &config.api.token,
//!     config.api.timeout,
//!     identity,
//! )?);
//! let prober = DeviceProber::new(
//!     config.collector.id.clone(),
//!     Arc::new(IcmpPinger::new(config.ping.clone())),
//!     Arc::new(UdpSnmpConnector::new(config.snmp.clone())),
//! );
//! let engine = Arc::new(PollingEngine::new(
//!     config.collector.engine(),
//!     Arc::new(DeviceRegistry::new()),
//!     Arc::new(prober),
//! ));
//! Agent::new(api, engine, config.reporter.clone())
//!     .run(CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod collector;
pub mod config;
pub mod logging;
pub mod model;
pub mod registry;
pub mod reporter;

pub use agent::{Agent, AgentError, AgentTimers};
pub use collector::{CycleReport, DeviceProber, EngineConfig, PollingEngine};
pub use config::{AppConfig, ConfigError, ConfigOverrides};
pub use model::{
    Device, DeviceStatus, InterfaceStat, InterfaceStatus, MetricsRecord, Neighbor, TopologyReport,
};
pub use registry::DeviceRegistry;
pub use reporter::{ApiError, CollectorApi, CollectorIdentity, HttpCollectorApi, Reporter};
