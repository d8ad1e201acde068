//! Device registry: device identifier to measurement state.
//!
//! # Thread Safety
//!
//! The registry is internally thread-safe using DashMap, so it can be shared as
//! `Arc<DeviceRegistry>` without an outer lock. Each device's state sits behind its
//! own mutex: concurrent bursts for the same device serialise their matrix updates,
//! while bursts for different devices never contend on anything but a map shard
//! during lookup.
//!
//! # Lifetime
//!
//! Entries are created lazily on first contact and never removed. Memory therefore
//! grows with the number of distinct devices ever seen by the process.

use super::{DeviceId, DeviceState};
use crate::geometry::Geometry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Handle to one device's state, shared between the registry and its users.
pub type SharedDeviceState = Arc<Mutex<DeviceState>>;

/// Keyed store of per-device state.
pub struct DeviceRegistry {
    geometry: Arc<Geometry>,
    devices: DashMap<DeviceId, SharedDeviceState>,
}

impl DeviceRegistry {
    /// Create an empty registry whose devices use `geometry`.
    pub fn new(geometry: Arc<Geometry>) -> Self {
        Self {
            geometry,
            devices: DashMap::new(),
        }
    }

    /// Return the state of `device_id`, creating it on first contact.
    ///
    /// Creation is atomic: two racing first bursts from one device get the same handle.
    pub fn resolve(&self, device_id: &DeviceId) -> SharedDeviceState {
        if let Some(existing) = self.devices.get(device_id) {
            return Arc::clone(existing.value());
        }

        let entry = self.devices.entry(device_id.clone()).or_insert_with(|| {
            info!(device = %device_id, "No state for device, creating new anemometer");
            Arc::new(Mutex::new(DeviceState::new(&self.geometry)))
        });
        Arc::clone(entry.value())
    }

    /// State of `device_id` if it has been seen.
    pub fn get(&self, device_id: &DeviceId) -> Option<SharedDeviceState> {
        self.devices
            .get(device_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of distinct devices seen.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Identifiers of every known device, sorted.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}
