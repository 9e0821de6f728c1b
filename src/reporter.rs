//! Reporter Layer
//!
//! Ships collected data to the remote collection API.
//!
//! - [`CollectorApi`]: Remote endpoints as a capability trait
//! - [`HttpCollectorApi`]: JSON-over-HTTP implementation with bearer auth
//! - [`Reporter`]: Buffers the metrics stream and uploads it in batches
//! - [`forward_topology`]: Uploads LLDP topology reports as they arrive

mod batcher;
mod client;
mod topology;

use thiserror::Error;

use crate::model::{Device, MetricsRecord, TopologyReport};

pub use batcher::{Reporter, ReporterConfig};
pub use client::{CollectorIdentity, HttpCollectorApi};
pub use topology::forward_topology;

/// Errors from the remote API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),

    /// Request could not be sent or the response not read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a failure status.
    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not the expected JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// Server answered with a non-zero application code.
    #[error("api error {code}: {message}")]
    Rejected { code: i64, message: String },
}

/// Remote collection API.
#[async_trait::async_trait]
pub trait CollectorApi: Send + Sync + 'static {
    /// Announce this collector.
    async fn register(&self) -> Result<(), ApiError>;

    /// Liveness signal.
    async fn heartbeat(&self) -> Result<(), ApiError>;

    /// Upload one batch of metrics records.
    async fn report_metrics(&self, metrics: &[MetricsRecord]) -> Result<(), ApiError>;

    /// Upload the neighbor list of one device.
    async fn report_topology(&self, report: &TopologyReport) -> Result<(), ApiError>;

    /// Fetch the fleet this collector should poll.
    async fn fetch_devices(&self) -> Result<Vec<Device>, ApiError>;
}
