//! SNMP collection.
//!
//! The prober talks to devices through two capability traits:
//!
//! - [`SnmpConnector`]: opens a community-authenticated session to a device
//! - [`SnmpSession`]: scalar `get` and table `walk`
//!
//! [`UdpSnmpConnector`] implements them with a minimal SNMPv2c client. The
//! [`mib`] and [`lldp`] modules turn raw walks into metrics and neighbors.

mod ber;
mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod lldp;
pub mod mib;
mod oid;
mod value;

use thiserror::Error;

pub use client::{SnmpConfig, UdpSnmpConnector};
pub use oid::Oid;
pub use value::SnmpValue;

/// Errors from the SNMP stage.
#[derive(Debug, Error)]
pub enum SnmpError {
    /// Socket I/O failed.
    #[error("snmp i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// No response after all retries.
    #[error("snmp request timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Response could not be decoded.
    #[error("snmp decode error: {0}")]
    Decode(String),

    /// Agent answered with a non-zero error-status.
    #[error("snmp agent returned error-status {status} (index {index})")]
    Status { status: i64, index: i64 },

    /// OID string could not be parsed.
    #[error("invalid oid: '{0}'")]
    InvalidOid(String),
}

/// An open SNMP session to one device.
///
/// SNMPv2 exception values (`noSuchObject`, `noSuchInstance`,
/// `endOfMibView`) are returned as [`SnmpValue`] variants, not errors.
#[async_trait::async_trait]
pub trait SnmpSession: Send + Sync {
    /// Read a single scalar.
    async fn get(&self, oid: &Oid) -> Result<SnmpValue, SnmpError>;

    /// Walk every instance below `base`, in agent order.
    async fn walk(&self, base: &Oid) -> Result<Vec<(Oid, SnmpValue)>, SnmpError>;
}

/// Opens sessions to devices.
#[async_trait::async_trait]
pub trait SnmpConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        address: &str,
        community: &str,
    ) -> Result<Box<dyn SnmpSession>, SnmpError>;
}
