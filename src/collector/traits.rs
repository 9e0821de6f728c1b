//! Core collector traits and types.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::model::{Device, MetricsRecord};

/// Minimum allowed polling interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from the reachability stage.
#[derive(Debug, Error)]
pub enum PingError {
    /// Hostname could not be resolved.
    #[error("failed to resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// ICMP socket could not be created or used.
    #[error("icmp socket error: {0}")]
    Socket(String),

    /// No echo reply arrived within the timeout.
    #[error("no reply after {sent} echo requests")]
    Timeout { sent: u32 },
}

/// Result of a successful ping run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    /// Echo requests sent.
    pub sent: u32,
    /// Echo replies received.
    pub received: u32,
    /// Mean round-trip time over received replies, in milliseconds.
    pub avg_latency_ms: f64,
}

impl PingStats {
    /// Build stats from the round-trip times of the answered echoes.
    pub fn from_rtts(sent: u32, rtts: &[Duration]) -> Self {
        let received = rtts.len() as u32;
        let avg_latency_ms = if rtts.is_empty() {
            0.0
        } else {
            rtts.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>() / rtts.len() as f64
        };
        Self {
            sent,
            received,
            avg_latency_ms,
        }
    }

    /// Unanswered echoes as a percentage of echoes sent.
    pub fn packet_loss_pct(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.sent.saturating_sub(self.received)) / f64::from(self.sent) * 100.0
    }
}

/// Reachability capability: `ping(address) -> (latency, loss)`.
///
/// Implementations must return an error rather than stats with zero replies,
/// so that the caller can treat every `Ok` as "device reachable".
#[async_trait::async_trait]
pub trait Pinger: Send + Sync + 'static {
    async fn ping(&self, address: &str) -> Result<PingStats, PingError>;
}

/// One-device collection protocol driven by the polling engine.
///
/// Implementations never fail: every outcome, including an unreachable
/// device, is encoded in the returned record.
#[async_trait::async_trait]
pub trait ProbeRunner: Send + Sync + 'static {
    async fn probe(&self, device: &Device) -> MetricsRecord;
}

/// Resolve hostname to IP address.
pub(crate) async fn resolve_host(host: &str) -> Result<IpAddr, std::io::Error> {
    // First, try to parse as an IP address directly
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    // Otherwise, resolve the hostname using tokio's DNS lookup
    let addrs = tokio::net::lookup_host(format!("{host}:0")).await?;
    addrs
        .into_iter()
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_stats_mean_latency() {
        let stats = PingStats::from_rtts(
            3,
            &[
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ],
        );
        assert_eq!(stats.received, 3);
        assert!((stats.avg_latency_ms - 20.0).abs() < 1e-9);
        assert_eq!(stats.packet_loss_pct(), 0.0);
    }

    #[test]
    fn test_ping_stats_partial_loss() {
        let stats = PingStats::from_rtts(4, &[Duration::from_millis(5)]);
        assert_eq!(stats.packet_loss_pct(), 75.0);
        assert!((stats.avg_latency_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_ping_stats_nothing_sent() {
        let stats = PingStats::from_rtts(0, &[]);
        assert_eq!(stats.packet_loss_pct(), 0.0);
        assert_eq!(stats.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_ping_error_display() {
        let err = PingError::Timeout { sent: 3 };
        assert!(err.to_string().contains("3 echo requests"));
    }

    #[tokio::test]
    async fn test_resolve_host_ipv4() {
        let ip = resolve_host("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[tokio::test]
    async fn test_resolve_host_ipv6() {
        let ip = resolve_host("::1").await.unwrap();
        assert_eq!(ip, IpAddr::V6(std::net::Ipv6Addr::LOCALHOST));
    }
}
