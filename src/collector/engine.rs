//! Polling engine: periodic cycles of bounded-concurrency device probes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::collector::ProbeRunner;
use crate::model::{Device, MetricsRecord};
use crate::registry::DeviceRegistry;

/// Default cycle interval (60 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
/// Default number of concurrent probes.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Default metrics queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Engine settings. Zero values are replaced by the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub interval: Duration,
    pub concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    fn normalized(mut self) -> Self {
        if self.interval.is_zero() {
            tracing::warn!(default = ?DEFAULT_INTERVAL, "Zero polling interval, using default");
            self.interval = DEFAULT_INTERVAL;
        }
        if self.concurrency == 0 {
            tracing::warn!(default = DEFAULT_CONCURRENCY, "Zero concurrency, using default");
            self.concurrency = DEFAULT_CONCURRENCY;
        }
        if self.queue_capacity == 0 {
            tracing::warn!(default = DEFAULT_QUEUE_CAPACITY, "Zero queue capacity, using default");
            self.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        self
    }
}

/// Summary of one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices in the snapshot the cycle started with.
    pub devices: usize,
    pub online: usize,
    pub offline: usize,
    /// Records that could not be queued.
    pub dropped: usize,
    /// Tasks that observed cancellation before being admitted.
    pub skipped: usize,
    pub elapsed: Duration,
}

enum TaskOutcome {
    Queued { online: bool },
    Dropped { online: bool },
    Skipped,
}

/// Drives periodic collection over the registry's device snapshot.
///
/// Each cycle spawns one task per device; at most `concurrency` of them
/// probe at the same time. Records go onto a bounded queue without blocking.
pub struct PollingEngine {
    config: EngineConfig,
    registry: Arc<DeviceRegistry>,
    prober: Arc<dyn ProbeRunner>,
    gate: Arc<Semaphore>,
    sender: mpsc::Sender<MetricsRecord>,
    receiver: Mutex<Option<mpsc::Receiver<MetricsRecord>>>,
    stop: CancellationToken,
    cycle_lock: tokio::sync::Mutex<()>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for PollingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingEngine")
            .field("config", &self.config)
            .field("devices", &self.registry.len())
            .field("dropped", &self.dropped_total())
            .finish_non_exhaustive()
    }
}

impl PollingEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<DeviceRegistry>,
        prober: Arc<dyn ProbeRunner>,
    ) -> Self {
        let config = config.normalized();
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        Self {
            gate: Arc::new(Semaphore::new(config.concurrency)),
            config,
            registry,
            prober,
            sender,
            receiver: Mutex::new(Some(receiver)),
            stop: CancellationToken::new(),
            cycle_lock: tokio::sync::Mutex::new(()),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Take the receiving end of the metrics queue. Returns `None` after the first call.
    pub fn metrics_output(&self) -> Option<mpsc::Receiver<MetricsRecord>> {
        self.receiver.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Replace the device set used from the next cycle on.
    pub fn set_devices(&self, devices: Vec<Device>) {
        self.registry.replace(devices);
    }

    /// Records dropped on a full queue since the engine was created.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Run one cycle now, then one per interval, until `token` fires or
    /// [`stop`](Self::stop) is called.
    pub async fn start(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval = ?self.config.interval,
            concurrency = self.config.concurrency,
            "Polling engine started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle(&token).await;
                }
            }
        }

        tracing::info!("Polling engine stopped");
    }

    /// Request termination and wait for the in-flight cycle to finish.
    pub async fn stop(&self) {
        self.stop.cancel();
        let _barrier = self.cycle_lock.lock().await;
    }

    /// Run a single cycle over the current snapshot and wait for every task.
    pub async fn run_cycle(&self, token: &CancellationToken) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        if token.is_cancelled() || self.stop.is_cancelled() {
            return CycleReport::default();
        }

        let started = Instant::now();
        let devices = self.registry.snapshot();
        let mut report = CycleReport {
            devices: devices.len(),
            ..CycleReport::default()
        };

        let mut tasks = JoinSet::new();
        for device in devices.iter().cloned() {
            tasks.spawn(probe_task(
                device,
                Arc::clone(&self.prober),
                Arc::clone(&self.gate),
                self.sender.clone(),
                token.clone(),
                self.stop.clone(),
                Arc::clone(&self.dropped),
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Queued { online }) => report.count(online),
                Ok(TaskOutcome::Dropped { online }) => {
                    report.count(online);
                    report.dropped += 1;
                }
                Ok(TaskOutcome::Skipped) => report.skipped += 1,
                Err(e) => tracing::error!(error = %e, "Probe task failed"),
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            devices = report.devices,
            online = report.online,
            offline = report.offline,
            dropped = report.dropped,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Polling cycle complete"
        );
        report
    }
}

impl CycleReport {
    fn count(&mut self, online: bool) {
        if online {
            self.online += 1;
        } else {
            self.offline += 1;
        }
    }
}

async fn probe_task(
    device: Device,
    prober: Arc<dyn ProbeRunner>,
    gate: Arc<Semaphore>,
    sender: mpsc::Sender<MetricsRecord>,
    token: CancellationToken,
    stop: CancellationToken,
    dropped: Arc<AtomicU64>,
) -> TaskOutcome {
    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        _ = stop.cancelled() => None,
        permit = gate.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        tracing::debug!(device_id = %device.id, "Cycle cancelled before probe");
        return TaskOutcome::Skipped;
    };

    let record = prober.probe(&device).await;
    let online = record.is_online();

    match sender.try_send(record) {
        Ok(()) => TaskOutcome::Queued { online },
        Err(TrySendError::Full(_)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(device_id = %device.id, "Metrics queue full, dropping record");
            TaskOutcome::Dropped { online }
        }
        Err(TrySendError::Closed(_)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(device_id = %device.id, "Metrics queue closed, dropping record");
            TaskOutcome::Dropped { online }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;

    use super::*;

    /// Sleeps for `delay` per probe and tracks concurrency.
    #[derive(Default)]
    struct SlowProber {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl SlowProber {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Self::default()
            })
        }
    }

    #[async_trait::async_trait]
    impl ProbeRunner for SlowProber {
        async fn probe(&self, device: &Device) -> MetricsRecord {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            if device.id.ends_with("-down") {
                MetricsRecord::offline(device, Utc::now())
            } else {
                MetricsRecord::online(device, 1.0, 0.0, Utc::now())
            }
        }
    }

    fn devices(n: usize) -> Vec<Device> {
        (0..n)
            .map(|i| Device::new(format!("dev-{i}"), format!("10.0.0.{i}")))
            .collect()
    }

    fn engine(config: EngineConfig, prober: Arc<SlowProber>, n: usize) -> PollingEngine {
        let registry = Arc::new(DeviceRegistry::with_devices(devices(n)));
        PollingEngine::new(config, registry, prober)
    }

    #[test]
    fn test_zero_config_uses_defaults() {
        let config = EngineConfig::default()
            .with_interval(Duration::ZERO)
            .with_concurrency(0)
            .with_queue_capacity(0)
            .normalized();
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_respects_concurrency_limit() {
        let prober = SlowProber::new(Duration::from_millis(50));
        let engine = engine(
            EngineConfig::default().with_concurrency(4),
            prober.clone(),
            25,
        );
        let mut rx = engine.metrics_output().unwrap();

        let report = engine.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.devices, 25);
        assert_eq!(report.online, 25);
        assert_eq!(report.dropped, 0);
        assert!(prober.max_in_flight.load(Ordering::SeqCst) <= 4);
        assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 4);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_records() {
        let prober = SlowProber::new(Duration::from_millis(1));
        let engine = engine(
            EngineConfig::default().with_queue_capacity(2),
            prober,
            5,
        );
        let mut rx = engine.metrics_output().unwrap();

        let report = engine.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.dropped, 3);
        assert_eq!(report.online, 5);
        assert_eq!(engine.dropped_total(), 3);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_metrics_output_is_taken_once() {
        let engine = engine(EngineConfig::default(), SlowProber::new(Duration::ZERO), 0);
        assert!(engine.metrics_output().is_some());
        assert!(engine.metrics_output().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_per_interval() {
        let prober = SlowProber::new(Duration::ZERO);
        let engine = Arc::new(engine(
            EngineConfig::default().with_interval(Duration::from_secs(60)),
            prober.clone(),
            2,
        ));
        let _rx = engine.metrics_output();
        let token = CancellationToken::new();

        let handle = {
            let engine = Arc::clone(&engine);
            let token = token.clone();
            tokio::spawn(async move { engine.start(token).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(prober.finished.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(prober.finished.load(Ordering::SeqCst), 4);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_probes() {
        let prober = SlowProber::new(Duration::from_secs(5));
        let engine = Arc::new(engine(
            EngineConfig::default().with_concurrency(3),
            prober.clone(),
            3,
        ));
        let _rx = engine.metrics_output();

        let handle = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.start(CancellationToken::new()).await })
        };

        while prober.started.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(prober.finished.load(Ordering::SeqCst), 0);

        engine.stop().await;
        assert_eq!(prober.finished.load(Ordering::SeqCst), 3);

        handle.await.unwrap();
        assert_eq!(prober.started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_tasks_skip_after_cancel() {
        let prober = SlowProber::new(Duration::from_secs(10));
        let engine = Arc::new(engine(
            EngineConfig::default().with_concurrency(1),
            prober.clone(),
            3,
        ));
        let _rx = engine.metrics_output();
        let token = CancellationToken::new();

        let cycle = {
            let engine = Arc::clone(&engine);
            let token = token.clone();
            tokio::spawn(async move { engine.run_cycle(&token).await })
        };

        while prober.started.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();

        let report = cycle.await.unwrap();
        assert_eq!(report.online, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(prober.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_devices_applies_to_next_cycle() {
        let prober = SlowProber::new(Duration::ZERO);
        let engine = engine(EngineConfig::default(), prober, 1);
        let _rx = engine.metrics_output();
        let token = CancellationToken::new();

        assert_eq!(engine.run_cycle(&token).await.devices, 1);

        engine.set_devices(vec![
            Device::new("a", "10.0.1.1"),
            Device::new("b-down", "10.0.1.2"),
        ]);
        let report = engine.run_cycle(&token).await;
        assert_eq!(report.devices, 2);
        assert_eq!(report.online, 1);
        assert_eq!(report.offline, 1);
    }
}
