//! Device client module.
//!
//! A device client is the collector's handle on one microcontroller. The pipeline only sees
//! the [`DeviceClient`] trait; two implementations exist:
//!
//! - [`SimulatedClient`]: in-process sensors driven by [`Sensor`] models
//! - [`RealClient`]: hardware reached through a TCP serial bridge speaking a line protocol

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::sensor::Sensor;

/// Device class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Simulated,
    Real,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Simulated => write!(f, "simulated"),
            DeviceClass::Real => write!(f, "real"),
        }
    }
}

/// How the device is attached to the collector host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMedium {
    #[default]
    Usb,
    Tcp,
}

/// Identity of an attached device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub class: DeviceClass,
    pub dev_id: u32,
    pub connected: bool,
    pub medium: ConnectionMedium,
}

/// Errors returned by device clients.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// The device did not answer within its timeout
    #[error("device {dev_id} unreachable: {reason}")]
    Unreachable { dev_id: u32, reason: String },

    /// No sensor with this name is attached
    #[error("device {dev_id} has no sensor named '{sensor}'")]
    UnknownSensor { dev_id: u32, sensor: String },

    /// A sensor with this name is already attached
    #[error("device {dev_id} already has a sensor named '{sensor}'")]
    DuplicateSensor { dev_id: u32, sensor: String },

    /// The operation is not available for this device class
    #[error("device {dev_id} does not support {operation}")]
    Unsupported {
        dev_id: u32,
        operation: &'static str,
    },

    /// The device answered with something that could not be interpreted
    #[error("device {dev_id} sent an invalid reply: {message}")]
    Protocol { dev_id: u32, message: String },
}

/// Capability interface shared by every device variant.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Device identity.
    fn info(&self) -> &DeviceInfo;

    /// Liveness check, bounded by the client's timeout.
    async fn heartbeat(&self) -> Result<bool, DeviceError>;

    /// Names of attached sensors, in a stable order.
    async fn list_sensors(&self) -> Result<Vec<String>, DeviceError>;

    /// Read one fresh value from the named sensor.
    async fn read_sensor(&self, name: &str) -> Result<f64, DeviceError>;

    /// Attach a sensor. Only simulated devices accept new sensors.
    fn add_sensor(&self, sensor: Sensor) -> Result<(), DeviceError> {
        let _ = sensor;
        Err(DeviceError::Unsupported {
            dev_id: self.info().dev_id,
            operation: "add_sensor",
        })
    }

    fn dev_id(&self) -> u32 {
        self.info().dev_id
    }
}

/// Device backed by in-process sensor models.
///
/// All sensor access goes through one mutex, so a management call such as
/// [`add_sensor`](DeviceClient::add_sensor) never interleaves with a read on the same device.
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct SimulatedClient {
    info: DeviceInfo,
    sensors: Mutex<Vec<Sensor>>,
}

impl SimulatedClient {
    /// Create a simulated device with no sensors.
    pub fn new(dev_id: u32, medium: ConnectionMedium) -> Self {
        Self {
            info: DeviceInfo {
                class: DeviceClass::Simulated,
                dev_id,
                connected: true,
                medium,
            },
            sensors: Mutex::new(Vec::new()),
        }
    }

    /// Create a simulated device with an initial sensor set.
    ///
    /// Fails with `DuplicateSensor` if two sensors share a name.
    pub fn with_sensors(
        dev_id: u32,
        medium: ConnectionMedium,
        sensors: impl IntoIterator<Item = Sensor>,
    ) -> Result<Self, DeviceError> {
        let client = Self::new(dev_id, medium);
        for sensor in sensors {
            client.add_sensor(sensor)?;
        }
        Ok(client)
    }

    /// Mark the simulated link as up or down; heartbeats report this flag.
    pub fn set_connected(mut self, connected: bool) -> Self {
        self.info.connected = connected;
        self
    }

    fn sensors(&self) -> MutexGuard<'_, Vec<Sensor>> {
        self.sensors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DeviceClient for SimulatedClient {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn heartbeat(&self) -> Result<bool, DeviceError> {
        Ok(self.info.connected)
    }

    async fn list_sensors(&self) -> Result<Vec<String>, DeviceError> {
        Ok(self.sensors().iter().map(|s| s.name().to_string()).collect())
    }

    async fn read_sensor(&self, name: &str) -> Result<f64, DeviceError> {
        let mut sensors = self.sensors();
        sensors
            .iter_mut()
            .find(|s| s.name() == name)
            .map(Sensor::read)
            .ok_or_else(|| DeviceError::UnknownSensor {
                dev_id: self.info.dev_id,
                sensor: name.to_string(),
            })
    }

    fn add_sensor(&self, sensor: Sensor) -> Result<(), DeviceError> {
        let mut sensors = self.sensors();
        if sensors.iter().any(|s| s.name() == sensor.name()) {
            return Err(DeviceError::DuplicateSensor {
                dev_id: self.info.dev_id,
                sensor: sensor.name().to_string(),
            });
        }
        debug!(
            dev_id = self.info.dev_id,
            sensor = sensor.name(),
            kind = sensor.model().kind(),
            "Sensor attached"
        );
        sensors.push(sensor);
        Ok(())
    }
}

/// Device reached through a TCP serial bridge.
///
/// Each call opens a connection, writes one command line and reads one reply line:
///
/// | request       | reply                                    |
/// |---------------|------------------------------------------|
/// | `PING`        | `PONG`                                   |
/// | `LIST`        | comma-separated sensor names             |
/// | `READ <name>` | decimal value, or `ERR UNKNOWN`          |
///
/// The whole exchange is bounded by the client's timeout.
#[derive(Debug, Clone)]
pub struct RealClient {
    info: DeviceInfo,
    address: String,
    timeout: Duration,
}

impl RealClient {
    pub fn new(dev_id: u32, address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            info: DeviceInfo {
                class: DeviceClass::Real,
                dev_id,
                connected: true,
                medium: ConnectionMedium::Tcp,
            },
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one command and return the trimmed reply line.
    async fn request(&self, command: &str) -> Result<String, DeviceError> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.address).await?;
            stream.write_all(format!("{}\n", command).as_bytes()).await?;

            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed without a reply",
                ));
            }
            Ok(line.trim_end().to_string())
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(DeviceError::Unreachable {
                dev_id: self.info.dev_id,
                reason: e.to_string(),
            }),
            Err(_) => Err(DeviceError::Unreachable {
                dev_id: self.info.dev_id,
                reason: format!("no reply within {:?}", self.timeout),
            }),
        }
    }
}

#[async_trait]
impl DeviceClient for RealClient {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn heartbeat(&self) -> Result<bool, DeviceError> {
        let reply = self.request("PING").await?;
        Ok(reply == "PONG")
    }

    async fn list_sensors(&self) -> Result<Vec<String>, DeviceError> {
        let reply = self.request("LIST").await?;
        Ok(reply
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect())
    }

    async fn read_sensor(&self, name: &str) -> Result<f64, DeviceError> {
        let reply = self.request(&format!("READ {}", name)).await?;

        if reply == "ERR UNKNOWN" {
            return Err(DeviceError::UnknownSensor {
                dev_id: self.info.dev_id,
                sensor: name.to_string(),
            });
        }

        match reply.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(DeviceError::Protocol {
                dev_id: self.info.dev_id,
                message: format!("'{}' is not a finite reading", reply),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SignalModel;
    use tokio::net::TcpListener;

    fn constant(name: &str, target: f64) -> Sensor {
        Sensor::with_seed(name, SignalModel::constant(target, 0.0), 0).unwrap()
    }

    /// Serve the line protocol with a fixed sensor table until the test ends.
    async fn spawn_bridge(sensors: Vec<(&'static str, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let sensors = sensors.clone();
                tokio::spawn(async move {
                    let (read_half, mut write_half) = stream.into_split();
                    let mut reader = BufReader::new(read_half);
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.is_err() {
                        return;
                    }
                    let command = line.trim_end();
                    let reply = if command == "PING" {
                        "PONG".to_string()
                    } else if command == "LIST" {
                        sensors.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(",")
                    } else if let Some(name) = command.strip_prefix("READ ") {
                        sensors
                            .iter()
                            .find(|(n, _)| *n == name)
                            .map(|(_, v)| v.to_string())
                            .unwrap_or_else(|| "ERR UNKNOWN".to_string())
                    } else {
                        "ERR COMMAND".to_string()
                    };
                    let _ = write_half.write_all(format!("{}\n", reply).as_bytes()).await;
                });
            }
        });

        address
    }

    #[tokio::test]
    async fn test_simulated_lists_in_attach_order() {
        let client = SimulatedClient::with_sensors(
            1,
            ConnectionMedium::Usb,
            vec![constant("b", 1.0), constant("a", 2.0), constant("c", 3.0)],
        )
        .unwrap();

        assert_eq!(client.list_sensors().await.unwrap(), vec!["b", "a", "c"]);
        assert_eq!(client.list_sensors().await.unwrap(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_simulated_empty_sensor_list() {
        let client = SimulatedClient::new(1, ConnectionMedium::Usb);
        assert!(client.list_sensors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_read_and_unknown_sensor() {
        let client =
            SimulatedClient::with_sensors(5, ConnectionMedium::Usb, vec![constant("temp0", 20.0)])
                .unwrap();

        assert_eq!(client.read_sensor("temp0").await.unwrap(), 20.0);
        assert_eq!(
            client.read_sensor("missing").await.unwrap_err(),
            DeviceError::UnknownSensor {
                dev_id: 5,
                sensor: "missing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_sensor_leaves_existing_state() {
        let model = SignalModel::gaussian(0.0, 1.0);
        let client = SimulatedClient::new(9, ConnectionMedium::Usb);
        client
            .add_sensor(Sensor::with_seed("g", model.clone(), 1).unwrap())
            .unwrap();

        // Advance the attached sensor, then try to replace it.
        let first = client.read_sensor("g").await.unwrap();
        let err = client
            .add_sensor(Sensor::with_seed("g", SignalModel::constant(99.0, 0.0), 2).unwrap())
            .unwrap_err();
        assert!(matches!(err, DeviceError::DuplicateSensor { dev_id: 9, .. }));

        // The attached sensor continues its own sequence.
        let mut reference = Sensor::with_seed("g", model, 1).unwrap();
        assert_eq!(reference.read(), first);
        assert_eq!(client.read_sensor("g").await.unwrap(), reference.read());
        assert_eq!(client.list_sensors().await.unwrap(), vec!["g"]);
    }

    #[test]
    fn test_with_sensors_rejects_duplicates() {
        let result = SimulatedClient::with_sensors(
            1,
            ConnectionMedium::Usb,
            vec![constant("x", 1.0), constant("x", 2.0)],
        );
        assert!(matches!(result, Err(DeviceError::DuplicateSensor { .. })));
    }

    #[tokio::test]
    async fn test_simulated_heartbeat_reports_link_flag() {
        let up = SimulatedClient::new(1, ConnectionMedium::Usb);
        assert!(up.heartbeat().await.unwrap());

        let down = SimulatedClient::new(2, ConnectionMedium::Usb).set_connected(false);
        assert!(!down.heartbeat().await.unwrap());
        assert!(!down.info().connected);
    }

    #[tokio::test]
    async fn test_real_client_protocol() {
        let address = spawn_bridge(vec![("temp", "21.5"), ("hum", "40")]).await;
        let client = RealClient::new(77, address, Duration::from_secs(2));

        assert!(client.heartbeat().await.unwrap());
        assert_eq!(client.list_sensors().await.unwrap(), vec!["temp", "hum"]);
        assert_eq!(client.read_sensor("temp").await.unwrap(), 21.5);
        assert_eq!(client.read_sensor("hum").await.unwrap(), 40.0);
        assert!(matches!(
            client.read_sensor("nope").await,
            Err(DeviceError::UnknownSensor { dev_id: 77, .. })
        ));
    }

    #[tokio::test]
    async fn test_real_client_rejects_non_numeric_reply() {
        let address = spawn_bridge(vec![("bad", "NaN"), ("text", "hello")]).await;
        let client = RealClient::new(3, address, Duration::from_secs(2));

        assert!(matches!(
            client.read_sensor("bad").await,
            Err(DeviceError::Protocol { .. })
        ));
        assert!(matches!(
            client.read_sensor("text").await,
            Err(DeviceError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_real_client_times_out_as_unreachable() {
        // Accept connections but never answer.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = RealClient::new(4, address, Duration::from_millis(100));
        let result = tokio::time::timeout(Duration::from_secs(2), client.heartbeat())
            .await
            .expect("heartbeat must respect its own timeout");
        assert!(matches!(result, Err(DeviceError::Unreachable { dev_id: 4, .. })));
    }

    #[tokio::test]
    async fn test_real_client_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = RealClient::new(6, address, Duration::from_millis(500));
        assert!(matches!(
            client.list_sensors().await,
            Err(DeviceError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_real_client_rejects_add_sensor() {
        let client = RealClient::new(8, "127.0.0.1:1", Duration::from_millis(10));
        let err = client.add_sensor(constant("x", 0.0)).unwrap_err();
        assert_eq!(
            err,
            DeviceError::Unsupported {
                dev_id: 8,
                operation: "add_sensor"
            }
        );
        assert_eq!(client.info().class, DeviceClass::Real);
    }

    #[test]
    fn test_device_class_serialization() {
        assert_eq!(serde_json::to_string(&DeviceClass::Simulated).unwrap(), r#""simulated""#);
        let medium: ConnectionMedium = serde_json::from_str(r#""tcp""#).unwrap();
        assert_eq!(medium, ConnectionMedium::Tcp);
    }
}
