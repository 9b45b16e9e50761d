//! Device registry.
//!
//! Many readers (the pipeline tasks and the control surface) and a single writer (attach).
//! Readers take a [`snapshot`](DeviceRegistry::snapshot) at the start of a cycle and iterate
//! that, so the lock is never held while a device call is awaited.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::info;

use crate::device::{DeviceClient, DeviceInfo};

/// Errors raised by registry mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A device with the same id is already attached
    #[error("device {0} is already attached")]
    DuplicateDevice(u32),
}

/// Shared, append-only set of attached devices.
///
/// Cloning the registry yields another handle to the same device set.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<Vec<Arc<dyn DeviceClient>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device. Device ids are unique within the registry.
    pub fn attach(&self, device: Arc<dyn DeviceClient>) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);

        let dev_id = device.dev_id();
        if devices.iter().any(|d| d.dev_id() == dev_id) {
            return Err(RegistryError::DuplicateDevice(dev_id));
        }

        let info = device.info();
        info!(
            dev_id = dev_id,
            class = %info.class,
            medium = ?info.medium,
            "Device attached"
        );
        devices.push(device);
        Ok(())
    }

    /// Devices in attach order, as of now.
    pub fn snapshot(&self) -> Vec<Arc<dyn DeviceClient>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a device by id.
    pub fn get(&self, dev_id: u32) -> Option<Arc<dyn DeviceClient>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.dev_id() == dev_id)
            .cloned()
    }

    /// Identity of every attached device, in attach order.
    pub fn infos(&self) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|d| d.info().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.infos())
            .finish()
    }
}
