//! Collector agent: wires the pipeline together and runs it until shutdown.
//!
//! Startup registers the collector and loads the fleet, then runs these
//! loops concurrently:
//!
//! - the [`PollingEngine`] cycle loop
//! - the metrics [`Reporter`]
//! - the topology forwarder (when a topology queue is attached)
//! - fleet sync, replacing the device set every `device_sync` period
//! - heartbeat, every `heartbeat` period
//!
//! On cancellation the engine is stopped first so that the reporter's final
//! flush sees every record of the last cycle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::collector::PollingEngine;
use crate::config::{DEFAULT_DEVICE_SYNC_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL};
use crate::model::TopologyReport;
use crate::reporter::{ApiError, CollectorApi, Reporter, ReporterConfig, forward_topology};

/// Default time allowed for the reporter and forwarder to drain (10 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Agent errors.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The engine's metrics receiver was already handed out.
    #[error("metrics output of the polling engine was already taken")]
    MetricsOutputTaken,
}

/// Periods of the background timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTimers {
    pub device_sync: Duration,
    pub heartbeat: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for AgentTimers {
    fn default() -> Self {
        Self {
            device_sync: DEFAULT_DEVICE_SYNC_INTERVAL,
            heartbeat: DEFAULT_HEARTBEAT_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Owns the pipeline components for one collector process.
pub struct Agent {
    api: Arc<dyn CollectorApi>,
    engine: Arc<PollingEngine>,
    reporter: ReporterConfig,
    timers: AgentTimers,
    topology: Option<mpsc::Receiver<TopologyReport>>,
}

impl Agent {
    pub fn new(
        api: Arc<dyn CollectorApi>,
        engine: Arc<PollingEngine>,
        reporter: ReporterConfig,
    ) -> Self {
        Self {
            api,
            engine,
            reporter,
            timers: AgentTimers::default(),
            topology: None,
        }
    }

    pub fn with_timers(mut self, timers: AgentTimers) -> Self {
        self.timers = timers;
        self
    }

    /// Forward topology reports from `receiver` to the API.
    pub fn with_topology(mut self, receiver: mpsc::Receiver<TopologyReport>) -> Self {
        self.topology = Some(receiver);
        self
    }

    /// Run until `token` is cancelled, then drain and stop every loop.
    ///
    /// # Errors
    /// Fails before any I/O if the engine's metrics output was already taken.
    pub async fn run(self, token: CancellationToken) -> Result<(), AgentError> {
        let metrics = self
            .engine
            .metrics_output()
            .ok_or(AgentError::MetricsOutputTaken)?;

        match self.api.register().await {
            Ok(()) => tracing::info!("Collector registered"),
            Err(e) => tracing::warn!(error = %e, "Failed to register collector"),
        }

        match sync_devices(self.api.as_ref(), &self.engine).await {
            Ok(count) => tracing::info!(count, "Initial device list loaded"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch devices, starting with empty fleet")
            }
        }

        // Drain loops get their own token, cancelled once the engine has stopped.
        let drain = CancellationToken::new();
        let mut drainers = JoinSet::new();
        let mut reporter = Reporter::new(Arc::clone(&self.api), self.reporter);
        let reporter_token = drain.clone();
        drainers.spawn(async move { reporter.start(reporter_token, metrics).await });
        if let Some(receiver) = self.topology {
            drainers.spawn(forward_topology(Arc::clone(&self.api), drain.clone(), receiver));
        }

        let mut timers = JoinSet::new();
        timers.spawn(fleet_sync_loop(
            Arc::clone(&self.api),
            Arc::clone(&self.engine),
            self.timers.device_sync,
            token.clone(),
        ));
        timers.spawn(heartbeat_loop(
            Arc::clone(&self.api),
            self.timers.heartbeat,
            token.clone(),
        ));

        let engine = Arc::clone(&self.engine);
        let engine_token = token.clone();
        let engine_task = tokio::spawn(async move { engine.start(engine_token).await });

        token.cancelled().await;
        tracing::info!("Shutting down collector agent");

        self.engine.stop().await;
        if let Err(e) = engine_task.await {
            tracing::error!(error = %e, "Polling engine task failed");
        }
        while let Some(result) = timers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Timer task failed");
            }
        }

        drain.cancel();
        let drained = tokio::time::timeout(self.timers.shutdown_timeout, async {
            while let Some(result) = drainers.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Reporter task failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                timeout = ?self.timers.shutdown_timeout,
                "Reporter drain timed out"
            );
            drainers.abort_all();
        }

        tracing::info!(dropped = self.engine.dropped_total(), "Collector agent stopped");
        Ok(())
    }
}

/// Fetch the fleet and install it. On error the current set is kept.
pub async fn sync_devices(
    api: &dyn CollectorApi,
    engine: &PollingEngine,
) -> Result<usize, ApiError> {
    let devices = api.fetch_devices().await?;
    let count = devices.len();
    engine.set_devices(devices);
    Ok(count)
}

async fn fleet_sync_loop(
    api: Arc<dyn CollectorApi>,
    engine: Arc<PollingEngine>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => match sync_devices(api.as_ref(), &engine).await {
                Ok(count) => tracing::info!(count, "Device list synced"),
                Err(e) => tracing::warn!(error = %e, "Device sync failed, keeping current list"),
            },
        }
    }
}

async fn heartbeat_loop(api: Arc<dyn CollectorApi>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = api.heartbeat().await {
                    tracing::warn!(error = %e, "Heartbeat failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::collector::{EngineConfig, ProbeRunner};
    use crate::model::{Device, MetricsRecord};
    use crate::registry::DeviceRegistry;

    #[derive(Default)]
    struct FleetApi {
        registrations: AtomicUsize,
        heartbeats: AtomicUsize,
        fetches: AtomicUsize,
        fail_fetch_after: Option<usize>,
        reported: Mutex<Vec<String>>,
        topology: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CollectorApi for FleetApi {
        async fn register(&self) -> Result<(), ApiError> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }

        async fn heartbeat(&self) -> Result<(), ApiError> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn report_metrics(&self, metrics: &[MetricsRecord]) -> Result<(), ApiError> {
            self.reported
                .lock()
                .unwrap()
                .extend(metrics.iter().map(|m| m.device_id.clone()));
            Ok(())
        }

        async fn report_topology(&self, _report: &TopologyReport) -> Result<(), ApiError> {
            self.topology.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_devices(&self) -> Result<Vec<Device>, ApiError> {
            let call = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch_after.is_some_and(|n| call >= n) {
                return Err(ApiError::Rejected {
                    code: 1,
                    message: "nope".into(),
                });
            }
            Ok(vec![
                Device::new("sw-1", "10.0.0.1"),
                Device::new("sw-2", "10.0.0.2"),
            ])
        }
    }

    struct InstantProber;

    #[async_trait::async_trait]
    impl ProbeRunner for InstantProber {
        async fn probe(&self, device: &Device) -> MetricsRecord {
            MetricsRecord::online(device, 1.0, 0.0, Utc::now())
        }
    }

    fn engine(registry: Arc<DeviceRegistry>) -> Arc<PollingEngine> {
        Arc::new(PollingEngine::new(
            EngineConfig::default().with_interval(Duration::from_secs(60)),
            registry,
            Arc::new(InstantProber),
        ))
    }

    fn timers() -> AgentTimers {
        AgentTimers {
            device_sync: Duration::from_secs(20),
            heartbeat: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_registers_polls_and_flushes_on_shutdown() {
        let api = Arc::new(FleetApi::default());
        let registry = Arc::new(DeviceRegistry::new());
        let agent = Agent::new(api.clone(), engine(registry.clone()), ReporterConfig::default())
            .with_timers(timers());

        let token = CancellationToken::new();
        let handle = tokio::spawn(agent.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        // Registration failure is not fatal.
        assert_eq!(api.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(api.heartbeats.load(Ordering::SeqCst), 2);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);

        // The first cycle ran right away; its records reach the API by the final flush.
        let mut reported = api.reported.lock().unwrap().clone();
        reported.sort();
        assert_eq!(reported, vec!["sw-1", "sw-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sync_keeps_current_fleet() {
        let api = Arc::new(FleetApi {
            fail_fetch_after: Some(1),
            ..FleetApi::default()
        });
        let registry = Arc::new(DeviceRegistry::new());
        let agent = Agent::new(api.clone(), engine(registry.clone()), ReporterConfig::default())
            .with_timers(timers());

        let token = CancellationToken::new();
        let handle = tokio::spawn(agent.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(45)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_failure_starts_empty() {
        let api = Arc::new(FleetApi {
            fail_fetch_after: Some(0),
            ..FleetApi::default()
        });
        let registry = Arc::new(DeviceRegistry::new());
        let agent = Agent::new(api.clone(), engine(registry.clone()), ReporterConfig::default())
            .with_timers(timers());

        let token = CancellationToken::new();
        let handle = tokio::spawn(agent.run(token.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert!(registry.is_empty());
        assert!(api.reported.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_topology_forwarded_until_shutdown() {
        let api = Arc::new(FleetApi::default());
        let (tx, rx) = mpsc::channel(4);
        let agent = Agent::new(
            api.clone(),
            engine(Arc::new(DeviceRegistry::new())),
            ReporterConfig::default(),
        )
        .with_timers(timers())
        .with_topology(rx);

        let token = CancellationToken::new();
        let handle = tokio::spawn(agent.run(token.clone()));
        tx.send(TopologyReport {
            collector_id: "c1".into(),
            device_id: "sw-1".into(),
            ip: "10.0.0.1".into(),
            neighbors: Vec::new(),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(api.topology.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_fails_when_output_taken() {
        let api = Arc::new(FleetApi::default());
        let engine = engine(Arc::new(DeviceRegistry::new()));
        let _taken = engine.metrics_output();

        let result = Agent::new(api.clone(), engine, ReporterConfig::default())
            .run(CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::MetricsOutputTaken)));
        assert_eq!(api.registrations.load(Ordering::SeqCst), 0);
    }
}
