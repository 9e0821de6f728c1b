//! ICMP echo pinger.
//!
//! Sends a fixed number of echo requests to a host and reports the mean
//! round-trip time and packet loss.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};

use crate::collector::traits::resolve_host;
use crate::collector::{PingError, PingStats, Pinger};

/// Default number of echo requests per probe.
pub const DEFAULT_COUNT: u32 = 3;

/// Default time budget for the whole probe (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default gap between consecutive echo requests (1 second).
pub const DEFAULT_ECHO_INTERVAL: Duration = Duration::from_secs(1);

const PAYLOAD: [u8; 56] = [0; 56];

fn default_count() -> u32 {
    DEFAULT_COUNT
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_echo_interval() -> Duration {
    DEFAULT_ECHO_INTERVAL
}

/// Configuration for the ICMP pinger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Echo requests per probe (default: 3).
    #[serde(default = "default_count")]
    pub count: u32,
    /// Time budget for all echoes of one probe (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Gap between echo requests (default: 1s).
    #[serde(default = "default_echo_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_ECHO_INTERVAL,
        }
    }
}

impl PingConfig {
    /// Set the echo count.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the gap between echoes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// [`Pinger`] that sends ICMP echo requests through `surge-ping`.
#[derive(Debug, Clone, Default)]
pub struct IcmpPinger {
    config: PingConfig,
}

impl IcmpPinger {
    /// Zero count or timeout fall back to the defaults.
    pub fn new(mut config: PingConfig) -> Self {
        if config.count == 0 {
            tracing::warn!(default = DEFAULT_COUNT, "Zero ping count, using default");
            config.count = DEFAULT_COUNT;
        }
        if config.timeout.is_zero() {
            tracing::warn!(default = ?DEFAULT_TIMEOUT, "Zero ping timeout, using default");
            config.timeout = DEFAULT_TIMEOUT;
        }
        Self { config }
    }

    pub fn config(&self) -> &PingConfig {
        &self.config
    }
}

/// Reply wait for a single echo: an equal share of the probe budget.
fn echo_timeout(budget: Duration, count: u32) -> Duration {
    budget / count.max(1)
}

/// Bookkeeping for one probe. Loss is computed over echoes actually sent.
#[derive(Debug)]
struct EchoRun {
    sent: u32,
    rtts: Vec<Duration>,
}

impl EchoRun {
    fn new(count: u32) -> Self {
        Self {
            sent: 0,
            rtts: Vec::with_capacity(count as usize),
        }
    }

    fn answered(&mut self, rtt: Duration) {
        self.sent += 1;
        self.rtts.push(rtt);
    }

    fn lost(&mut self) {
        self.sent += 1;
    }

    fn finish(self) -> Result<PingStats, PingError> {
        if self.rtts.is_empty() {
            return Err(PingError::Timeout { sent: self.sent });
        }
        Ok(PingStats::from_rtts(self.sent, &self.rtts))
    }
}

#[async_trait::async_trait]
impl Pinger for IcmpPinger {
    async fn ping(&self, address: &str) -> Result<PingStats, PingError> {
        let ip_addr = resolve_host(address)
            .await
            .map_err(|source| PingError::Resolve {
                host: address.to_string(),
                source,
            })?;

        let client = match ip_addr {
            IpAddr::V4(_) => Client::new(&Config::default()),
            IpAddr::V6(_) => Client::new(&Config::builder().kind(ICMP::V6).build()),
        }
        .map_err(|e| PingError::Socket(e.to_string()))?;

        let mut pinger = client.pinger(ip_addr, PingIdentifier(rand::random())).await;

        let count = self.config.count.max(1);
        let per_echo = echo_timeout(self.config.timeout, count);
        let deadline = Instant::now() + self.config.timeout;
        let mut run = EchoRun::new(count);

        for seq in 0..count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            pinger.timeout(per_echo.min(remaining));

            match pinger.ping(PingSequence(seq as u16), &PAYLOAD).await {
                Ok((_, rtt)) => run.answered(rtt),
                Err(e) => {
                    run.lost();
                    tracing::debug!(host = %address, seq, error = %e, "Echo request unanswered");
                }
            }

            if seq + 1 < count {
                let pause = self
                    .config
                    .interval
                    .min(deadline.saturating_duration_since(Instant::now()));
                tokio::time::sleep(pause).await;
            }
        }

        let stats = run.finish()?;
        tracing::debug!(
            host = %address,
            latency_ms = stats.avg_latency_ms,
            loss_pct = stats.packet_loss_pct(),
            "Ping probe successful"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_config_defaults() {
        let config = PingConfig::default();
        assert_eq!(config.count, DEFAULT_COUNT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.interval, DEFAULT_ECHO_INTERVAL);
    }

    #[test]
    fn test_ping_config_builder() {
        let config = PingConfig::default()
            .with_count(5)
            .with_timeout(Duration::from_secs(10))
            .with_interval(Duration::from_millis(200));

        assert_eq!(config.count, 5);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.interval, Duration::from_millis(200));
    }

    #[test]
    fn test_ping_config_serde_defaults() {
        let config: PingConfig = serde_yaml::from_str("count: 4").unwrap();
        assert_eq!(config.count, 4);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_ping_config_humantime() {
        let config: PingConfig = serde_yaml::from_str("timeout: 2s\ninterval: 250ms").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.interval, Duration::from_millis(250));
    }

    #[test]
    fn test_pinger_replaces_zero_values() {
        let pinger = IcmpPinger::new(
            PingConfig::default()
                .with_count(0)
                .with_timeout(Duration::ZERO),
        );
        assert_eq!(pinger.config().count, DEFAULT_COUNT);
        assert_eq!(pinger.config().timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_echo_timeout_splits_budget() {
        assert_eq!(echo_timeout(Duration::from_secs(6), 3), Duration::from_secs(2));
        assert_eq!(echo_timeout(Duration::from_secs(5), 0), Duration::from_secs(5));
    }

    #[test]
    fn test_loss_counts_only_sent_echoes() {
        // Second echo lost, budget gone before the third was sent.
        let mut run = EchoRun::new(3);
        run.answered(Duration::from_millis(10));
        run.lost();
        let stats = run.finish().unwrap();

        assert_eq!(stats.sent, 2);
        assert_eq!(stats.received, 1);
        assert_eq!(stats.packet_loss_pct(), 50.0);
        assert_eq!(stats.avg_latency_ms, 10.0);
    }

    #[test]
    fn test_all_echoes_lost_is_timeout() {
        let mut run = EchoRun::new(3);
        run.lost();
        run.lost();
        run.lost();
        assert!(matches!(run.finish(), Err(PingError::Timeout { sent: 3 })));
    }
}
