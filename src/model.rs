//! Core data types shared by the collector and the reporter.
//!
//! - [`Device`]: One fleet entry as served by `/collector/devices`
//! - [`MetricsRecord`]: One device's result for one collection cycle
//! - [`InterfaceStat`]: Per-interface counters from IF-MIB
//! - [`Neighbor`] / [`TopologyReport`]: LLDP adjacency data
//!
//! Field names on the wire follow the remote API (`ip`, `latency`, ...), which
//! is why several fields carry `serde(rename)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A device to be polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Remote API identifier.
    pub id: String,
    /// Hostname or IP address.
    #[serde(rename = "ip")]
    pub address: String,
    /// Device type as reported by the API (e.g. "switch", "router").
    #[serde(rename = "type", default)]
    pub device_type: String,
    /// SNMP community. Empty means the device is not polled over SNMP.
    #[serde(rename = "community", default)]
    pub credential: String,
}

impl Device {
    /// Create a device without an SNMP community.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            device_type: String::new(),
            credential: String::new(),
        }
    }

    /// Set the device type.
    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Set the SNMP community.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Whether SNMP collection should be attempted.
    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }
}

/// Reachability status of a device within one cycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceStatus {
    /// Ping succeeded.
    Online,
    /// Ping failed; SNMP was not attempted.
    Offline,
}

/// Operational status of an interface.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InterfaceStatus {
    /// `ifOperStatus` reported `1`.
    Up,
    /// `ifOperStatus` reported anything else.
    Down,
    /// `ifOperStatus` could not be read.
    #[default]
    Unknown,
}

impl InterfaceStatus {
    /// Map a raw `ifOperStatus` value.
    pub fn from_oper_status(value: i64) -> Self {
        if value == 1 { Self::Up } else { Self::Down }
    }
}

/// Per-interface statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStat {
    pub name: String,
    pub in_bytes: u64,
    pub out_bytes: u64,
    pub in_errors: u64,
    pub out_errors: u64,
    pub status: InterfaceStatus,
}

impl InterfaceStat {
    /// Create an entry with zero counters and unknown status.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One device's metrics for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub device_id: String,
    #[serde(rename = "ip")]
    pub address: String,
    pub status: DeviceStatus,
    /// Mean round-trip time in milliseconds.
    #[serde(rename = "latency")]
    pub latency_ms: f64,
    /// Unanswered echoes as a percentage of echoes sent.
    #[serde(rename = "packetLoss")]
    pub packet_loss_pct: f64,
    #[serde(rename = "cpuUsage")]
    pub cpu_usage_pct: f64,
    #[serde(rename = "memoryUsage")]
    pub memory_usage_pct: f64,
    #[serde(rename = "uptime")]
    pub uptime_seconds: u64,
    pub interfaces: Vec<InterfaceStat>,
    pub collected_at: DateTime<Utc>,
}

impl MetricsRecord {
    /// Record for a device whose reachability stage failed.
    ///
    /// All numeric fields are zero and no interfaces are listed.
    pub fn offline(device: &Device, collected_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device.id.clone(),
            address: device.address.clone(),
            status: DeviceStatus::Offline,
            latency_ms: 0.0,
            packet_loss_pct: 0.0,
            cpu_usage_pct: 0.0,
            memory_usage_pct: 0.0,
            uptime_seconds: 0,
            interfaces: Vec::new(),
            collected_at,
        }
    }

    /// Record for a reachable device, SNMP fields still at zero.
    pub fn online(
        device: &Device,
        latency_ms: f64,
        packet_loss_pct: f64,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: DeviceStatus::Online,
            latency_ms,
            packet_loss_pct,
            ..Self::offline(device, collected_at)
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }
}

/// An LLDP neighbor seen on one local port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub local_port: String,
    pub remote_port: String,
    pub remote_chassis_id: String,
    pub remote_system_name: String,
    #[serde(rename = "remoteIp", skip_serializing_if = "Option::is_none", default)]
    pub remote_address: Option<String>,
    pub link_type: String,
}

/// Body of `POST /collector/topology`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyReport {
    pub collector_id: String,
    pub device_id: String,
    pub ip: String,
    pub neighbors: Vec<Neighbor>,
}
