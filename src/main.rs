//! Sensor Collector - edge daemon streaming microcontroller readings to the core API
//!
//! This service keeps a registry of attached devices, checks their liveness, reads every
//! sensor in turn, and posts each reading to the core ingestion endpoint.
//!
//! ## Features
//!
//! - Heartbeat, collection and delivery as independent tokio tasks
//! - Bounded reading queue with blocking or drop-oldest overflow
//! - Per-reading HTTP delivery with optional retry
//! - HTTP control surface for attaching devices and sensors at runtime
//!
//! ## Configuration
//!
//! Configuration is loaded from `COLLECTOR_*` environment variables (see
//! `sensor_collector::config::Config`), plus:
//!
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sensor_collector::config::Config;
use sensor_collector::control::{self, ControlState};
use sensor_collector::daemon::Collector;
use sensor_collector::device::{ConnectionMedium, SimulatedClient};
use sensor_collector::registry::DeviceRegistry;
use sensor_collector::sensor::{SeasonalParams, Sensor, SignalModel};

/// Device id of the built-in simulated device
const DEMO_DEVICE_ID: u32 = 302;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    info!("Starting Sensor Collector service...");

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                api_url = %config.api_url,
                heartbeat_interval_secs = config.heartbeat_interval.as_secs(),
                collect_delay_ms = config.collect_delay.as_millis() as u64,
                queue_capacity = config.queue_capacity,
                overflow_policy = %config.overflow_policy,
                max_retries = config.max_retries,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let registry = DeviceRegistry::new();
    if config.demo_device {
        match demo_device() {
            Ok(device) => {
                if let Err(e) = registry.attach(Arc::new(device)) {
                    warn!(error = %e, "Failed to attach demo device");
                }
            }
            Err(e) => warn!(error = %e, "Failed to build demo device"),
        }
    }

    let collector = match Collector::new(&config, registry) {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(config.control_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.control_addr, error = %e, "Failed to bind control surface");
            std::process::exit(1);
        }
    };

    let pipeline = collector.spawn();

    let control_state = ControlState::for_collector(&collector, config.device_timeout);
    let control_handle = tokio::spawn(async move {
        if let Err(e) = control::serve(listener, control_state).await {
            error!(error = %e, "Control surface stopped");
        }
    });

    // Wait for shutdown signal
    info!("Sensor Collector running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    // Queued readings are not flushed on shutdown.
    let pending = collector.queue().len();
    if pending > 0 {
        warn!(pending = pending, "Discarding undelivered readings");
    }

    pipeline.abort();
    control_handle.abort();

    let stats = collector.stats().snapshot();
    info!(
        collected = stats.readings_collected,
        delivered = stats.readings_delivered,
        delivery_failures = stats.delivery_failures,
        "Sensor Collector stopped"
    );
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// The built-in simulated device: a seasonal `temp0` and a gaussian `temp1`.
fn demo_device() -> Result<SimulatedClient, Box<dyn std::error::Error>> {
    let sensors = vec![
        Sensor::new("temp0", SignalModel::Seasonal(SeasonalParams::default()))?,
        Sensor::new("temp1", SignalModel::gaussian(0.0, 1.0))?,
    ];

    Ok(SimulatedClient::with_sensors(
        DEMO_DEVICE_ID,
        ConnectionMedium::Usb,
        sensors,
    )?)
}
