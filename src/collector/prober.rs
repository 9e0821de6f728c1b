//! One-device collection protocol: ping, then SNMP when a community is set.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::collector::snmp::{SnmpConnector, lldp, mib};
use crate::collector::{Pinger, ProbeRunner};
use crate::model::{Device, MetricsRecord, TopologyReport};

/// Default [`ProbeRunner`] built from a pinger and an SNMP connector.
pub struct DeviceProber {
    collector_id: String,
    pinger: Arc<dyn Pinger>,
    snmp: Arc<dyn SnmpConnector>,
    topology: Option<mpsc::Sender<TopologyReport>>,
}

impl DeviceProber {
    pub fn new(
        collector_id: impl Into<String>,
        pinger: Arc<dyn Pinger>,
        snmp: Arc<dyn SnmpConnector>,
    ) -> Self {
        Self {
            collector_id: collector_id.into(),
            pinger,
            snmp,
            topology: None,
        }
    }

    /// Forward discovered neighbors to `sender`. Without a sender LLDP is not walked.
    pub fn with_topology(mut self, sender: mpsc::Sender<TopologyReport>) -> Self {
        self.topology = Some(sender);
        self
    }

    async fn collect_snmp(&self, device: &Device, record: &mut MetricsRecord) {
        let session = match self.snmp.connect(&device.address, &device.credential).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    device_id = %device.id,
                    ip = %device.address,
                    error = %e,
                    "SNMP session failed"
                );
                return;
            }
        };

        let metrics = mib::collect(session.as_ref(), &device.id).await;
        record.cpu_usage_pct = metrics.cpu_usage_pct;
        record.memory_usage_pct = metrics.memory_usage_pct;
        record.uptime_seconds = metrics.uptime_seconds;
        record.interfaces = metrics.interfaces;

        let Some(topology) = &self.topology else {
            return;
        };
        let neighbors = lldp::read_neighbors(session.as_ref(), &device.id).await;
        if neighbors.is_empty() {
            return;
        }

        tracing::debug!(device_id = %device.id, count = neighbors.len(), "LLDP neighbors found");
        let report = TopologyReport {
            collector_id: self.collector_id.clone(),
            device_id: device.id.clone(),
            ip: device.address.clone(),
            neighbors,
        };
        match topology.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(device_id = %device.id, "Topology queue full, dropping report");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(device_id = %device.id, "Topology queue closed");
            }
        }
    }
}

#[async_trait::async_trait]
impl ProbeRunner for DeviceProber {
    async fn probe(&self, device: &Device) -> MetricsRecord {
        let collected_at = Utc::now();

        let stats = match self.pinger.ping(&device.address).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    device_id = %device.id,
                    ip = %device.address,
                    error = %e,
                    "Device unreachable"
                );
                return MetricsRecord::offline(device, collected_at);
            }
        };

        let mut record = MetricsRecord::online(
            device,
            stats.avg_latency_ms,
            stats.packet_loss_pct(),
            collected_at,
        );

        if device.has_credential() {
            self.collect_snmp(device, &mut record).await;
        }

        tracing::debug!(
            device_id = %device.id,
            latency_ms = record.latency_ms,
            cpu = record.cpu_usage_pct,
            interfaces = record.interfaces.len(),
            "Device probed"
        );
        record
    }
}
