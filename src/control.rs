//! HTTP control surface.
//!
//! Lets operators attach devices and sensors while the pipeline runs, and exposes a liveness
//! probe plus pipeline counters:
//!
//! | method | path                        | result                                   |
//! |--------|-----------------------------|------------------------------------------|
//! | GET    | `/ping`                     | `{"message":"pong"}`                     |
//! | GET    | `/devices`                  | attached devices                         |
//! | POST   | `/devices`                  | attach a device (201, 400, 409)          |
//! | POST   | `/devices/{dev_id}/sensors` | attach a sensor (201, 400, 404, 409)     |
//! | GET    | `/status`                   | queue and pipeline counters              |

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::daemon::{Collector, PipelineStats, StatsSnapshot};
use crate::device::{
    ConnectionMedium, DeviceClass, DeviceClient, DeviceError, DeviceInfo, RealClient,
    SimulatedClient,
};
use crate::queue::{QueueStats, ReadingQueue};
use crate::registry::{DeviceRegistry, RegistryError};
use crate::sensor::{Sensor, SensorError, SignalModel};

/// Shared state of the control handlers.
pub struct ControlState {
    registry: DeviceRegistry,
    queue: Arc<ReadingQueue>,
    stats: Arc<PipelineStats>,
    fingerprint: String,
    device_timeout: Duration,
}

impl ControlState {
    pub fn new(
        registry: DeviceRegistry,
        queue: Arc<ReadingQueue>,
        stats: Arc<PipelineStats>,
        fingerprint: impl Into<String>,
        device_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            stats,
            fingerprint: fingerprint.into(),
            device_timeout,
        }
    }

    /// State sharing the collector's registry, queue and counters.
    pub fn for_collector(collector: &Collector, device_timeout: Duration) -> Self {
        Self::new(
            collector.registry().clone(),
            collector.queue().clone(),
            collector.stats().clone(),
            collector.fingerprint(),
            device_timeout,
        )
    }
}

/// Errors returned by control handlers, each mapped to one HTTP status.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    BadRequest(String),

    #[error("device {0} is not attached")]
    NotFound(u32),

    #[error("{0}")]
    Conflict(String),
}

impl ControlError {
    fn status(&self) -> StatusCode {
        match self {
            ControlError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<SensorError> for ControlError {
    fn from(err: SensorError) -> Self {
        ControlError::BadRequest(err.to_string())
    }
}

impl From<RegistryError> for ControlError {
    fn from(err: RegistryError) -> Self {
        ControlError::Conflict(err.to_string())
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "Control request rejected");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Sensor description accepted by the attach endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorSpec {
    pub name: String,

    /// Fixed seed; OS entropy when omitted
    #[serde(default)]
    pub seed: Option<u64>,

    pub model: SignalModel,
}

impl SensorSpec {
    pub fn build(self) -> Result<Sensor, SensorError> {
        match self.seed {
            Some(seed) => Sensor::with_seed(self.name, self.model, seed),
            None => Sensor::new(self.name, self.model),
        }
    }
}

fn default_class() -> DeviceClass {
    DeviceClass::Simulated
}

/// Device description accepted by `POST /devices`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub dev_id: u32,

    #[serde(default = "default_class")]
    pub class: DeviceClass,

    /// Simulated devices only; real devices are always reached over TCP
    #[serde(default)]
    pub medium: Option<ConnectionMedium>,

    /// Simulated devices only; defaults to connected
    #[serde(default)]
    pub connected: Option<bool>,

    /// Bridge address, required for real devices
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

impl DeviceSpec {
    /// Build the device client described by this request.
    pub fn into_client(
        self,
        device_timeout: Duration,
    ) -> Result<Arc<dyn DeviceClient>, ControlError> {
        match self.class {
            DeviceClass::Simulated => {
                let sensors = self
                    .sensors
                    .into_iter()
                    .map(SensorSpec::build)
                    .collect::<Result<Vec<_>, _>>()?;
                let medium = self.medium.unwrap_or_default();
                let client = SimulatedClient::with_sensors(self.dev_id, medium, sensors)
                    .map_err(|e| ControlError::BadRequest(e.to_string()))?
                    .set_connected(self.connected.unwrap_or(true));
                Ok(Arc::new(client))
            }
            DeviceClass::Real => {
                if !self.sensors.is_empty() {
                    return Err(ControlError::BadRequest(
                        "real devices report their own sensors".to_string(),
                    ));
                }
                if self.medium.is_some_and(|m| m != ConnectionMedium::Tcp) {
                    return Err(ControlError::BadRequest(
                        "real devices are reached over tcp".to_string(),
                    ));
                }
                if self.connected.is_some() {
                    return Err(ControlError::BadRequest(
                        "real devices report their own connectivity".to_string(),
                    ));
                }
                let address = self.address.ok_or_else(|| {
                    ControlError::BadRequest("real devices require an address".to_string())
                })?;
                Ok(Arc::new(RealClient::new(self.dev_id, address, device_timeout)))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SensorAttached {
    dev_id: u32,
    sensor: String,
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    fingerprint: String,
    devices: usize,
    queue_capacity: usize,
    queue: QueueStats,
    pipeline: StatsSnapshot,
}

async fn handle_ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn handle_list_devices(State(state): State<Arc<ControlState>>) -> Json<Vec<DeviceInfo>> {
    Json(state.registry.infos())
}

async fn handle_attach_device(
    State(state): State<Arc<ControlState>>,
    Json(spec): Json<DeviceSpec>,
) -> Result<(StatusCode, Json<DeviceInfo>), ControlError> {
    if state.registry.get(spec.dev_id).is_some() {
        return Err(RegistryError::DuplicateDevice(spec.dev_id).into());
    }

    let device = spec.into_client(state.device_timeout)?;
    let info = device.info().clone();
    state.registry.attach(device)?;

    Ok((StatusCode::CREATED, Json(info)))
}

async fn handle_add_sensor(
    State(state): State<Arc<ControlState>>,
    Path(dev_id): Path<u32>,
    Json(spec): Json<SensorSpec>,
) -> Result<(StatusCode, Json<SensorAttached>), ControlError> {
    let device = state
        .registry
        .get(dev_id)
        .ok_or(ControlError::NotFound(dev_id))?;

    let sensor = spec.build()?;
    let attached = SensorAttached {
        dev_id,
        sensor: sensor.name().to_string(),
        kind: sensor.model().kind(),
    };

    device.add_sensor(sensor).map_err(|e| match e {
        DeviceError::DuplicateSensor { .. } => ControlError::Conflict(e.to_string()),
        other => ControlError::BadRequest(other.to_string()),
    })?;

    info!(dev_id = dev_id, sensor = %attached.sensor, kind = attached.kind, "Sensor attached");
    Ok((StatusCode::CREATED, Json(attached)))
}

async fn handle_status(State(state): State<Arc<ControlState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        fingerprint: state.fingerprint.clone(),
        devices: state.registry.len(),
        queue_capacity: state.queue.capacity(),
        queue: state.queue.stats(),
        pipeline: state.stats.snapshot(),
    })
}

/// Build the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/ping", get(handle_ping))
        .route("/devices", get(handle_list_devices).post(handle_attach_device))
        .route("/devices/{dev_id}/sensors", post(handle_add_sensor))
        .route("/status", get(handle_status))
        .with_state(Arc::new(state))
}

/// Serve the control surface on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: ControlState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Control surface listening");
    }
    axum::serve(listener, router(state)).await
}
