//! Sensor Collector Library
//!
//! This library provides the components of the edge collector daemon, which polls
//! microcontroller sensors and streams readings to the core ingestion API:
//!
//! - **sensor**: Simulated sensor signal models (constant, gaussian, cosine, seasonal)
//! - **device**: The `DeviceClient` trait with simulated and TCP-bridge implementations
//! - **registry**: Shared set of attached devices
//! - **reading**: The reading record and host fingerprint
//! - **queue**: Bounded FIFO between collection and delivery
//! - **client**: HTTP client for `POST {api_url}/data` with optional retry
//! - **daemon**: Heartbeat, collection and delivery tasks
//! - **control**: HTTP control surface for attaching devices and sensors at runtime
//! - **config**: Environment-based configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sensor_collector::config::Config;
//! use sensor_collector::daemon::Collector;
//! use sensor_collector::device::{ConnectionMedium, SimulatedClient};
//! use sensor_collector::registry::DeviceRegistry;
//! use sensor_collector::sensor::{Sensor, SignalModel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!
//!     let registry = DeviceRegistry::new();
//!     let sensor = Sensor::new("temp0", SignalModel::constant(20.0, 0.5)).unwrap();
//!     let device = SimulatedClient::with_sensors(1, ConnectionMedium::Usb, vec![sensor]).unwrap();
//!     registry.attach(Arc::new(device)).unwrap();
//!
//!     let collector = Collector::new(&config, registry).expect("Failed to build collector");
//!     let handle = collector.spawn();
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.abort();
//! }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod control;
pub mod daemon;
pub mod device;
pub mod queue;
pub mod reading;
pub mod registry;
pub mod sensor;

// Re-export commonly used types at crate root for convenience
pub use client::{DeliveryError, IngestClient, ReadingSink};
pub use config::{Config, ConfigError};
pub use control::{ControlError, ControlState};
pub use daemon::{Collector, CollectorHandle, PipelineSettings, PipelineStats, StatsSnapshot};
pub use device::{
    ConnectionMedium, DeviceClass, DeviceClient, DeviceError, DeviceInfo, RealClient,
    SimulatedClient,
};
pub use queue::{OverflowPolicy, PushOutcome, QueueError, QueueStats, ReadingQueue};
pub use reading::{machine_fingerprint, Reading};
pub use registry::{DeviceRegistry, RegistryError};
pub use sensor::{Sensor, SensorError, SignalModel};
