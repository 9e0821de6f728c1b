//! Topology report forwarding.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::TopologyReport;
use crate::reporter::CollectorApi;

/// Upload topology reports until `token` fires or the channel closes.
///
/// Failed uploads are logged and not retried; the next cycle produces a
/// fresh report for the same device.
pub async fn forward_topology(
    api: Arc<dyn CollectorApi>,
    token: CancellationToken,
    mut source: mpsc::Receiver<TopologyReport>,
) {
    loop {
        let report = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = source.recv() => match received {
                Some(report) => report,
                None => break,
            },
        };

        if let Err(e) = api.report_topology(&report).await {
            tracing::warn!(
                device_id = %report.device_id,
                count = report.neighbors.len(),
                error = %e,
                "Failed to report topology"
            );
        }
    }
    tracing::debug!("Topology forwarder stopped");
}
