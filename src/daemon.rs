//! Collector pipeline: heartbeat, collection and delivery tasks.
//!
//! The three tasks run concurrently and share only the [`DeviceRegistry`] (snapshotted at
//! the start of every cycle) and the [`ReadingQueue`] (collection produces, delivery
//! consumes). None of them has a stop condition; the daemon ends when its tasks are
//! aborted. Failures are logged and counted at device/sensor/reading granularity and never
//! end a loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{DeliveryError, IngestClient, ReadingSink};
use crate::config::Config;
use crate::queue::ReadingQueue;
use crate::reading::{machine_fingerprint, Reading};
use crate::registry::DeviceRegistry;

/// Pipeline counters, shared by the tasks and readable from the control surface.
#[derive(Debug, Default)]
pub struct PipelineStats {
    heartbeats_ok: AtomicU64,
    heartbeats_failed: AtomicU64,
    readings_collected: AtomicU64,
    read_failures: AtomicU64,
    readings_delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Heartbeats answered with "alive"
    pub heartbeats_ok: u64,

    /// Heartbeats answered with "not alive" or not answered at all
    pub heartbeats_failed: u64,

    /// Readings enqueued by the collection task
    pub readings_collected: u64,

    /// Sensor reads that failed and were skipped
    pub read_failures: u64,

    /// Readings accepted by the ingestion endpoint
    pub readings_delivered: u64,

    /// Readings dropped after a failed delivery
    pub delivery_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            heartbeats_ok: self.heartbeats_ok.load(Ordering::Relaxed),
            heartbeats_failed: self.heartbeats_failed.load(Ordering::Relaxed),
            readings_collected: self.readings_collected.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            readings_delivered: self.readings_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Result of one heartbeat cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Devices that answered "alive"
    pub alive: usize,

    /// Devices that answered but reported not alive
    pub silent: usize,

    /// Devices that failed to answer
    pub unreachable: usize,
}

/// Result of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Devices visited
    pub devices: usize,

    /// Readings pushed to the queue
    pub enqueued: usize,

    /// Sensor reads (or sensor listings) that failed
    pub failed: usize,
}

/// Check every registered device once.
///
/// A failed heartbeat is logged and counted; the device stays registered.
pub async fn heartbeat_cycle(registry: &DeviceRegistry, stats: &PipelineStats) -> HeartbeatReport {
    let mut report = HeartbeatReport::default();

    for device in registry.snapshot() {
        let dev_id = device.dev_id();
        match device.heartbeat().await {
            Ok(true) => {
                debug!(dev_id = dev_id, "Heartbeat ok");
                report.alive += 1;
                PipelineStats::bump(&stats.heartbeats_ok);
            }
            Ok(false) => {
                warn!(dev_id = dev_id, "Heartbeat: device reports not alive");
                report.silent += 1;
                PipelineStats::bump(&stats.heartbeats_failed);
            }
            Err(e) => {
                warn!(dev_id = dev_id, error = %e, "Heartbeat failed");
                report.unreachable += 1;
                PipelineStats::bump(&stats.heartbeats_failed);
            }
        }
    }

    report
}

/// Heartbeat loop: one cycle per `period`, forever.
///
/// When `uplink` is given, each cycle also pings the core API in a separate task, bounded
/// by `period`, and logs its round-trip time. A failed ping is informational only.
pub async fn run_heartbeat(
    registry: DeviceRegistry,
    period: Duration,
    uplink: Option<Arc<IngestClient>>,
    stats: Arc<PipelineStats>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let report = heartbeat_cycle(&registry, &stats).await;
        info!(
            alive = report.alive,
            silent = report.silent,
            unreachable = report.unreachable,
            "Heartbeat cycle complete"
        );

        if let Some(client) = &uplink {
            tokio::spawn(ping_uplink(client.clone(), period));
        }
    }
}

/// Ping the core API once, giving up after `limit`.
///
/// Runs beside the heartbeat loop so a slow core API never delays device heartbeats.
async fn ping_uplink(client: Arc<IngestClient>, limit: Duration) {
    match tokio::time::timeout(limit, client.ping()).await {
        Ok(Ok(rtt)) => debug!(rtt_ms = rtt.as_secs_f64() * 1000.0, "Core API reachable"),
        Ok(Err(e)) => warn!(url = client.ping_url(), error = %e, "Core API ping failed"),
        Err(_) => warn!(
            url = client.ping_url(),
            limit_ms = limit.as_millis() as u64,
            "Core API ping timed out"
        ),
    }
}

/// Read every sensor of every registered device once and enqueue the readings.
///
/// Sensor names are snapshotted at the start of each device pass. After every enqueued
/// reading the task sleeps `pacing`. A failed read skips that sensor only; a failed listing
/// skips that device only.
pub async fn collect_cycle(
    registry: &DeviceRegistry,
    queue: &ReadingQueue,
    fingerprint: &str,
    pacing: Duration,
    stats: &PipelineStats,
) -> CollectionReport {
    let mut report = CollectionReport::default();

    for device in registry.snapshot() {
        let dev_id = device.dev_id();
        report.devices += 1;

        let sensors = match device.list_sensors().await {
            Ok(sensors) => sensors,
            Err(e) => {
                warn!(dev_id = dev_id, error = %e, "Failed to list sensors, skipping device");
                report.failed += 1;
                continue;
            }
        };

        for sensor in sensors {
            let value = match device.read_sensor(&sensor).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(dev_id = dev_id, sensor = %sensor, error = %e, "Sensor read failed");
                    report.failed += 1;
                    PipelineStats::bump(&stats.read_failures);
                    continue;
                }
            };

            let reading = Reading::new(fingerprint, dev_id, sensor, value);
            queue.push(reading).await;
            report.enqueued += 1;
            PipelineStats::bump(&stats.readings_collected);

            tokio::time::sleep(pacing).await;
        }
    }

    report
}

/// Collection loop, forever.
///
/// A cycle that enqueues nothing (no devices, no sensors, or only failures) is followed by
/// one pacing delay so the loop never spins.
pub async fn run_collection(
    registry: DeviceRegistry,
    queue: Arc<ReadingQueue>,
    fingerprint: String,
    pacing: Duration,
    stats: Arc<PipelineStats>,
) {
    loop {
        let report = collect_cycle(&registry, &queue, &fingerprint, pacing, &stats).await;
        debug!(
            devices = report.devices,
            enqueued = report.enqueued,
            failed = report.failed,
            queue_depth = queue.len(),
            "Collection cycle complete"
        );

        if report.enqueued == 0 {
            tokio::time::sleep(pacing).await;
        }
    }
}

/// Dequeue one reading (waiting if needed) and hand it to `sink`.
///
/// The reading is consumed whatever the outcome: a failed delivery drops it.
pub async fn deliver_next<S>(
    queue: &ReadingQueue,
    sink: &S,
    stats: &PipelineStats,
) -> Result<Reading, (Reading, DeliveryError)>
where
    S: ReadingSink + ?Sized,
{
    let reading = queue.pop().await;

    match sink.deliver(&reading).await {
        Ok(()) => {
            debug!(
                dev_id = reading.mcu_dev_id,
                sensor = %reading.sensor_name,
                value = reading.value,
                "Reading delivered"
            );
            PipelineStats::bump(&stats.readings_delivered);
            Ok(reading)
        }
        Err(e) => {
            warn!(
                dev_id = reading.mcu_dev_id,
                sensor = %reading.sensor_name,
                error = %e,
                "Delivery failed, reading dropped"
            );
            PipelineStats::bump(&stats.delivery_failures);
            Err((reading, e))
        }
    }
}

/// Delivery loop, forever.
pub async fn run_delivery<S>(queue: Arc<ReadingQueue>, sink: Arc<S>, stats: Arc<PipelineStats>)
where
    S: ReadingSink + ?Sized,
{
    loop {
        let _ = deliver_next(&queue, sink.as_ref(), &stats).await;
    }
}

/// Pacing settings for the pipeline tasks.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Period between heartbeat cycles
    pub heartbeat_interval: Duration,

    /// Pause after each enqueued reading
    pub collect_delay: Duration,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            collect_delay: config.collect_delay,
        }
    }
}

/// The collector daemon: owns the queue and wires the three tasks together.
///
/// Everything is injected at construction; nothing is global.
pub struct Collector {
    registry: DeviceRegistry,
    queue: Arc<ReadingQueue>,
    client: Arc<IngestClient>,
    fingerprint: String,
    settings: PipelineSettings,
    stats: Arc<PipelineStats>,
}

impl Collector {
    /// Build a collector from configuration around an existing registry.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` if the HTTP client cannot be built.
    pub fn new(config: &Config, registry: DeviceRegistry) -> Result<Self, DeliveryError> {
        let client = Arc::new(IngestClient::new(config)?);
        let queue = Arc::new(ReadingQueue::new(
            config.queue_capacity,
            config.overflow_policy,
        ));
        let fingerprint = config
            .fingerprint
            .clone()
            .unwrap_or_else(machine_fingerprint);

        Ok(Self::from_parts(
            registry,
            queue,
            client,
            fingerprint,
            PipelineSettings::from(config),
        ))
    }

    /// Assemble a collector from already-built parts.
    pub fn from_parts(
        registry: DeviceRegistry,
        queue: Arc<ReadingQueue>,
        client: Arc<IngestClient>,
        fingerprint: String,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            queue,
            client,
            fingerprint,
            settings,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<ReadingQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Spawn the heartbeat, collection and delivery tasks on the current runtime.
    pub fn spawn(&self) -> CollectorHandle {
        info!(
            fingerprint = %self.fingerprint,
            devices = self.registry.len(),
            queue_capacity = self.queue.capacity(),
            overflow_policy = ?self.queue.policy(),
            "Starting collector pipeline"
        );

        let heartbeat = tokio::spawn(run_heartbeat(
            self.registry.clone(),
            self.settings.heartbeat_interval,
            Some(self.client.clone()),
            self.stats.clone(),
        ));

        let collection = tokio::spawn(run_collection(
            self.registry.clone(),
            self.queue.clone(),
            self.fingerprint.clone(),
            self.settings.collect_delay,
            self.stats.clone(),
        ));

        let delivery = tokio::spawn(run_delivery(
            self.queue.clone(),
            self.client.clone(),
            self.stats.clone(),
        ));

        CollectorHandle {
            heartbeat,
            collection,
            delivery,
        }
    }
}

/// Handles of the running pipeline tasks.
pub struct CollectorHandle {
    heartbeat: JoinHandle<()>,
    collection: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

impl CollectorHandle {
    /// Cancel all three tasks. Queued readings are discarded.
    pub fn abort(&self) {
        self.heartbeat.abort();
        self.collection.abort();
        self.delivery.abort();
    }

    /// True once any task has ended (only by abort or panic).
    pub fn is_finished(&self) -> bool {
        self.heartbeat.is_finished() || self.collection.is_finished() || self.delivery.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ConnectionMedium, DeviceClient, DeviceError, DeviceInfo, SimulatedClient};
    use crate::sensor::{Sensor, SignalModel};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::timeout;

    const PACING: Duration = Duration::from_millis(2);

    fn constant(name: &str, target: f64) -> Sensor {
        Sensor::with_seed(name, SignalModel::constant(target, 0.0), 0).unwrap()
    }

    fn simulated(dev_id: u32, sensors: Vec<Sensor>) -> Arc<dyn DeviceClient> {
        Arc::new(SimulatedClient::with_sensors(dev_id, ConnectionMedium::Usb, sensors).unwrap())
    }

    fn drain(queue: &ReadingQueue) -> Vec<Reading> {
        std::iter::from_fn(|| queue.try_pop().ok()).collect()
    }

    /// Device whose sensors listed in `broken` always fail to read.
    struct FlakyDevice {
        info: DeviceInfo,
        sensors: Vec<&'static str>,
        broken: Vec<&'static str>,
        alive: Option<bool>,
    }

    impl FlakyDevice {
        fn new(dev_id: u32, sensors: Vec<&'static str>, broken: Vec<&'static str>) -> Self {
            Self {
                info: DeviceInfo {
                    class: crate::device::DeviceClass::Real,
                    dev_id,
                    connected: true,
                    medium: ConnectionMedium::Tcp,
                },
                sensors,
                broken,
                alive: Some(true),
            }
        }
    }

    #[async_trait]
    impl DeviceClient for FlakyDevice {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        async fn heartbeat(&self) -> Result<bool, DeviceError> {
            self.alive.ok_or_else(|| DeviceError::Unreachable {
                dev_id: self.info.dev_id,
                reason: "no answer".to_string(),
            })
        }

        async fn list_sensors(&self) -> Result<Vec<String>, DeviceError> {
            Ok(self.sensors.iter().map(|s| s.to_string()).collect())
        }

        async fn read_sensor(&self, name: &str) -> Result<f64, DeviceError> {
            if self.broken.contains(&name) {
                return Err(DeviceError::Unreachable {
                    dev_id: self.info.dev_id,
                    reason: "read timed out".to_string(),
                });
            }
            Ok(self.sensors.iter().position(|s| *s == name).unwrap_or(0) as f64)
        }
    }

    /// Sink that records every reading and fails the ones whose value is listed.
    #[derive(Default)]
    struct RecordingSink {
        fail_values: Vec<f64>,
        delivered: Mutex<Vec<Reading>>,
        attempts: AtomicU64,
    }

    #[async_trait]
    impl ReadingSink for RecordingSink {
        async fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_values.contains(&reading.value) {
                return Err(DeliveryError::Timeout);
            }
            self.delivered.lock().unwrap().push(reading.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collect_cycle_reads_in_listing_order() {
        let registry = DeviceRegistry::new();
        registry
            .attach(simulated(1, vec![constant("a", 1.0), constant("b", 2.0)]))
            .unwrap();
        let queue = ReadingQueue::with_defaults();
        let stats = PipelineStats::new();

        let report = collect_cycle(&registry, &queue, "fp", PACING, &stats).await;
        assert_eq!(report.enqueued, 2);
        assert_eq!(report.failed, 0);

        let readings = drain(&queue);
        let names: Vec<&str> = readings.iter().map(|r| r.sensor_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(readings[1].timestamp >= readings[0].timestamp);
        assert_eq!(stats.snapshot().readings_collected, 2);
    }

    #[tokio::test]
    async fn test_collect_cycle_constant_sensors_end_to_end() {
        let registry = DeviceRegistry::new();
        registry
            .attach(simulated(
                302,
                vec![constant("temp0", 20.0), constant("temp1", -5.0)],
            ))
            .unwrap();
        let queue = ReadingQueue::with_defaults();

        collect_cycle(&registry, &queue, "fp", PACING, &PipelineStats::new()).await;

        let readings = drain(&queue);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].value, 20.0);
        assert_eq!(readings[1].value, -5.0);
        assert!(readings.iter().all(|r| r.mcu_dev_id == 302));
        assert!(readings.iter().all(|r| r.fingerprint == "fp"));
        assert!(readings[1].timestamp > readings[0].timestamp);
    }

    #[tokio::test]
    async fn test_collect_cycle_isolates_read_failures() {
        let registry = DeviceRegistry::new();
        registry
            .attach(Arc::new(FlakyDevice::new(
                7,
                vec!["s0", "s1", "s2"],
                vec!["s1"],
            )))
            .unwrap();
        registry.attach(simulated(8, vec![constant("t", 3.0)])).unwrap();
        let queue = ReadingQueue::with_defaults();
        let stats = PipelineStats::new();

        let report = collect_cycle(&registry, &queue, "fp", PACING, &stats).await;
        assert_eq!(report.devices, 2);
        assert_eq!(report.enqueued, 3);
        assert_eq!(report.failed, 1);

        let readings = drain(&queue);
        let keys: Vec<(u32, &str)> = readings
            .iter()
            .map(|r| (r.mcu_dev_id, r.sensor_name.as_str()))
            .collect();
        assert_eq!(keys, vec![(7, "s0"), (7, "s2"), (8, "t")]);
        assert_eq!(stats.snapshot().read_failures, 1);
    }

    #[tokio::test]
    async fn test_cycles_preserve_order_per_sensor() {
        let registry = DeviceRegistry::new();
        let model = SignalModel::gaussian(0.0, 1.0);
        registry
            .attach(simulated(
                1,
                vec![Sensor::with_seed("g", model.clone(), 4).unwrap()],
            ))
            .unwrap();
        let queue = ReadingQueue::with_defaults();
        let stats = PipelineStats::new();

        for _ in 0..3 {
            collect_cycle(&registry, &queue, "fp", PACING, &stats).await;
        }

        let mut reference = Sensor::with_seed("g", model, 4).unwrap();
        let expected: Vec<f64> = (0..3).map(|_| reference.read()).collect();
        let values: Vec<f64> = drain(&queue).iter().map(|r| r.value).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_hung_core_api_does_not_delay_heartbeats() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let uplink = Arc::new(
            IngestClient::with_settings(
                format!("{}/data", base),
                format!("{}/ping", base),
                Duration::from_secs(10),
                0,
            )
            .unwrap(),
        );
        let registry = DeviceRegistry::new();
        registry.attach(simulated(1, vec![])).unwrap();
        let stats = Arc::new(PipelineStats::new());

        let task = tokio::spawn(run_heartbeat(
            registry,
            Duration::from_millis(50),
            Some(uplink),
            stats.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(400)).await;
        task.abort();

        assert!(
            stats.snapshot().heartbeats_ok >= 4,
            "only {} heartbeats",
            stats.snapshot().heartbeats_ok
        );
    }

    #[tokio::test]
    async fn test_heartbeat_cycle_counts_outcomes() {
        let registry = DeviceRegistry::new();
        registry.attach(simulated(1, vec![])).unwrap();
        registry
            .attach(Arc::new(
                SimulatedClient::new(2, ConnectionMedium::Usb).set_connected(false),
            ))
            .unwrap();
        let mut unreachable = FlakyDevice::new(3, vec![], vec![]);
        unreachable.alive = None;
        registry.attach(Arc::new(unreachable)).unwrap();

        let stats = PipelineStats::new();
        let report = heartbeat_cycle(&registry, &stats).await;

        assert_eq!(
            report,
            HeartbeatReport {
                alive: 1,
                silent: 1,
                unreachable: 1
            }
        );
        // Heartbeat failures never detach a device.
        assert_eq!(registry.len(), 3);
        assert_eq!(stats.snapshot().heartbeats_failed, 2);
    }

    #[tokio::test]
    async fn test_deliver_next_fifo() {
        let queue = ReadingQueue::with_defaults();
        for v in [1.0, 2.0, 3.0] {
            queue.push(Reading::new("fp", 1, "s", v)).await;
        }
        let sink = RecordingSink::default();
        let stats = PipelineStats::new();

        for _ in 0..3 {
            deliver_next(&queue, &sink, &stats).await.unwrap();
        }

        let values: Vec<f64> = sink.delivered.lock().unwrap().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(stats.snapshot().readings_delivered, 3);
    }

    #[tokio::test]
    async fn test_delivery_failure_drops_reading_and_continues() {
        let queue = Arc::new(ReadingQueue::with_defaults());
        for v in [1.0, 2.0, 3.0] {
            queue.push(Reading::new("fp", 1, "s", v)).await;
        }
        let sink = Arc::new(RecordingSink {
            fail_values: vec![2.0],
            ..RecordingSink::default()
        });
        let stats = Arc::new(PipelineStats::new());

        let task = tokio::spawn(run_delivery(queue.clone(), sink.clone(), stats.clone()));

        timeout(Duration::from_secs(2), async {
            while sink.attempts.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("delivery loop should process all readings");

        assert!(!task.is_finished());
        task.abort();

        let values: Vec<f64> = sink.delivered.lock().unwrap().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 3.0]);
        assert!(queue.is_empty());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.readings_delivered, 2);
        assert_eq!(snapshot.delivery_failures, 1);
    }

    #[tokio::test]
    async fn test_collection_loop_idles_without_devices() {
        let registry = DeviceRegistry::new();
        let queue = Arc::new(ReadingQueue::with_defaults());
        let stats = Arc::new(PipelineStats::new());

        let task = tokio::spawn(run_collection(
            registry.clone(),
            queue.clone(),
            "fp".to_string(),
            Duration::from_millis(5),
            stats.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(queue.is_empty());

        // Devices attached while the loop runs are picked up on a later cycle.
        registry.attach(simulated(9, vec![constant("x", 4.0)])).unwrap();
        let reading = timeout(Duration::from_secs(2), queue.pop())
            .await
            .expect("new device should be collected");
        assert_eq!(reading.mcu_dev_id, 9);
        assert_eq!(reading.value, 4.0);

        task.abort();
    }

    #[tokio::test]
    async fn test_collector_spawn_and_abort() {
        let config = Config::default().with_api_url("http://127.0.0.1:9");
        let registry = DeviceRegistry::new();
        let collector = Collector::new(
            &Config {
                fingerprint: Some("edge-test".to_string()),
                ..config
            },
            registry,
        )
        .unwrap();
        assert_eq!(collector.fingerprint(), "edge-test");

        let handle = collector.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        handle.abort();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());
    }
}
