//! SNMPv2c client over UDP.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use super::ber::{self, PduKind, Response};
use super::{Oid, SnmpConnector, SnmpError, SnmpSession, SnmpValue};
use crate::collector::traits::resolve_host;

/// Default agent port.
pub const DEFAULT_PORT: u16 = 161;

/// Default per-request timeout (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retransmissions after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;

/// Upper bound on rows returned by a single walk.
const MAX_WALK_ROWS: usize = 10_000;

/// error-status `noSuchName`, sent by v1-style agents at the end of a walk.
const NO_SUCH_NAME: i64 = 2;

const RECV_BUFFER: usize = 65_535;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

/// SNMP transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpConfig {
    /// Agent UDP port (default: 161).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request timeout (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Retransmissions after a timeout (default: 2).
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl SnmpConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// [`SnmpConnector`] that speaks SNMPv2c over UDP.
#[derive(Debug, Clone, Default)]
pub struct UdpSnmpConnector {
    config: SnmpConfig,
}

impl UdpSnmpConnector {
    pub fn new(config: SnmpConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl SnmpConnector for UdpSnmpConnector {
    async fn connect(
        &self,
        address: &str,
        community: &str,
    ) -> Result<Box<dyn SnmpSession>, SnmpError> {
        let ip = resolve_host(address).await?;
        let local: SocketAddr = match ip {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect((ip, self.config.port)).await?;

        tracing::trace!(host = %address, port = self.config.port, "SNMP session opened");

        Ok(Box::new(UdpSession {
            socket,
            community: community.to_string(),
            timeout: self.config.timeout,
            retries: self.config.retries,
            next_id: AtomicI32::new(rand::random::<i32>() & 0x3FFF_FFFF),
        }))
    }
}

struct UdpSession {
    socket: UdpSocket,
    community: String,
    timeout: Duration,
    retries: u32,
    next_id: AtomicI32,
}

impl UdpSession {
    fn next_request_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF
    }

    async fn request(&self, kind: PduKind, oid: &Oid) -> Result<Response, SnmpError> {
        let request_id = self.next_request_id();
        let packet = ber::encode_request(kind, &self.community, request_id, oid);
        let attempts = self.retries + 1;
        let mut buf = vec![0u8; RECV_BUFFER];

        for attempt in 1..=attempts {
            self.socket.send(&packet).await?;
            let deadline = Instant::now() + self.timeout;

            loop {
                let received =
                    match tokio::time::timeout_at(deadline, self.socket.recv(&mut buf)).await {
                        Ok(result) => result?,
                        Err(_) => break,
                    };

                let response = match ber::decode_response(&buf[..received]) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::debug!(error = %e, "Discarding undecodable SNMP datagram");
                        continue;
                    }
                };
                if response.request_id != request_id {
                    tracing::trace!(
                        expected = request_id,
                        got = response.request_id,
                        "Discarding stale SNMP response"
                    );
                    continue;
                }
                return Ok(response);
            }

            tracing::trace!(%oid, attempt, attempts, "SNMP request timed out");
        }

        Err(SnmpError::Timeout { attempts })
    }
}

#[async_trait::async_trait]
impl SnmpSession for UdpSession {
    async fn get(&self, oid: &Oid) -> Result<SnmpValue, SnmpError> {
        let response = self.request(PduKind::Get, oid).await?;
        if response.error_status != 0 {
            return Err(SnmpError::Status {
                status: response.error_status,
                index: response.error_index,
            });
        }
        response
            .varbinds
            .into_iter()
            .next()
            .map(|(_, value)| value)
            .ok_or_else(|| SnmpError::Decode("response carried no varbinds".to_string()))
    }

    async fn walk(&self, base: &Oid) -> Result<Vec<(Oid, SnmpValue)>, SnmpError> {
        let mut rows = Vec::new();
        let mut current = base.clone();

        while rows.len() < MAX_WALK_ROWS {
            let response = self.request(PduKind::GetNext, &current).await?;
            match response.error_status {
                0 => {}
                NO_SUCH_NAME => break,
                status => {
                    return Err(SnmpError::Status {
                        status,
                        index: response.error_index,
                    });
                }
            }

            let Some((oid, value)) = response.varbinds.into_iter().next() else {
                break;
            };
            if value == SnmpValue::EndOfMibView || !oid.starts_with(base) {
                break;
            }
            if oid <= current {
                tracing::warn!(%base, %oid, "Agent returned non-increasing OID, stopping walk");
                break;
            }

            current = oid.clone();
            rows.push((oid, value));
        }

        Ok(rows)
    }
}
