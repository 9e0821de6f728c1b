//! Collector Layer
//!
//! Periodic device polling with bounded concurrency. Probe results flow to
//! the reporter over a bounded MPSC queue.
//!
//! # Architecture
//!
//! - [`PollingEngine`]: Runs cycles over the device snapshot, one task per device
//! - [`ProbeRunner`]: One-device collection protocol, implemented by [`DeviceProber`]
//! - [`Pinger`]: Reachability capability, implemented by [`ping::IcmpPinger`]
//! - [`snmp`]: SNMP session traits, UDP client, MIB and LLDP readers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netvis_collector::collector::ping::{IcmpPinger, PingConfig};
//! use netvis_collector::collector::snmp::{SnmpConfig, UdpSnmpConnector};
//! use netvis_collector::{DeviceProber, DeviceRegistry, EngineConfig, PollingEngine};
//!
//! let prober = DeviceProber::new(
//!     "edge-01",
//!     Arc::new(IcmpPinger::new(PingConfig::default())),
//!     Arc::new(UdpSnmpConnector::new(SnmpConfig::default())),
//! );
//! let engine = PollingEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(DeviceRegistry::new()),
//!     Arc::new(prober),
//! );
//! let metrics = engine.metrics_output();
//! ```

mod engine;
pub mod ping;
mod prober;
pub mod snmp;
mod traits;

pub use engine::{
    CycleReport, DEFAULT_CONCURRENCY, DEFAULT_INTERVAL, DEFAULT_QUEUE_CAPACITY, EngineConfig,
    PollingEngine,
};
pub use prober::DeviceProber;
pub use traits::{MIN_INTERVAL, PingError, PingStats, Pinger, ProbeRunner};
