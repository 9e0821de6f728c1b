//! Metrics batching with requeue-on-failure.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::model::MetricsRecord;
use crate::reporter::CollectorApi;

/// Default number of buffered records that triggers a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default period of the flush timer (10 seconds).
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_flush_interval() -> Duration {
    DEFAULT_FLUSH_INTERVAL
}

/// Reporter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Flush as soon as this many records are buffered (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush a non-empty buffer this often (default: 10s).
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Keep at most this many records, dropping the oldest. Unbounded when unset.
    #[serde(default)]
    pub max_buffered: Option<usize>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffered: None,
        }
    }
}

impl ReporterConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = Some(max_buffered);
        self
    }

    fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            tracing::warn!(default = DEFAULT_BATCH_SIZE, "Zero batch size, using default");
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.flush_interval.is_zero() {
            tracing::warn!(default = ?DEFAULT_FLUSH_INTERVAL, "Zero flush interval, using default");
            self.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        if self.max_buffered == Some(0) {
            tracing::warn!("Zero max_buffered, buffer left unbounded");
            self.max_buffered = None;
        }
        self
    }
}

/// Turns the metrics stream into batched uploads.
///
/// The buffer is owned by the reporter task. A failed batch is put back in
/// front of newer records and retried on the next flush.
pub struct Reporter {
    api: Arc<dyn CollectorApi>,
    config: ReporterConfig,
    buffer: Vec<MetricsRecord>,
}

impl Reporter {
    pub fn new(api: Arc<dyn CollectorApi>, config: ReporterConfig) -> Self {
        let config = config.normalized();
        Self {
            buffer: Vec::with_capacity(config.batch_size),
            api,
            config,
        }
    }

    /// Records waiting to be sent.
    pub fn pending(&self) -> &[MetricsRecord] {
        &self.buffer
    }

    /// Consume `source` until `token` fires or the channel closes, then make
    /// one final flush attempt.
    pub async fn start(
        &mut self,
        token: CancellationToken,
        mut source: mpsc::Receiver<MetricsRecord>,
    ) {
        let period = self.config.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            batch_size = self.config.batch_size,
            flush_interval = ?period,
            "Reporter started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = source.recv() => match received {
                    Some(record) => {
                        self.push(record);
                        if self.buffer.len() >= self.config.batch_size {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }

        while let Ok(record) = source.try_recv() {
            self.push(record);
        }
        if !self.flush().await {
            tracing::warn!(count = self.buffer.len(), "Unsent metrics discarded at shutdown");
        }
        tracing::info!("Reporter stopped");
    }

    /// Send the whole buffer. Returns `false` if the upload failed and the
    /// records were requeued.
    pub async fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            return true;
        }

        let batch = std::mem::take(&mut self.buffer);
        match self.api.report_metrics(&batch).await {
            Ok(()) => {
                tracing::debug!(count = batch.len(), "Batch flushed");
                true
            }
            Err(e) => {
                tracing::error!(count = batch.len(), error = %e, "Failed to report metrics");
                let newer = std::mem::replace(&mut self.buffer, batch);
                self.buffer.extend(newer);
                self.enforce_cap();
                false
            }
        }
    }

    fn push(&mut self, record: MetricsRecord) {
        self.buffer.push(record);
        self.enforce_cap();
    }

    fn enforce_cap(&mut self) {
        let Some(max) = self.config.max_buffered else {
            return;
        };
        if self.buffer.len() > max {
            let excess = self.buffer.len() - max;
            self.buffer.drain(..excess);
            tracing::warn!(dropped = excess, max, "Metrics buffer full, dropping oldest records");
        }
    }
}
