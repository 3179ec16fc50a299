// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The host's device table: one entry per attached accelerator with
//! lock-free memory accounting.
//!
//! An ordered map keeps device iteration stable, so logical→physical
//! assignment is deterministic across runs.

use crate::error::HostError;
use runtime_types::{DeviceConfig, DeviceId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One attached device: its config plus the bytes currently reserved.
#[derive(Debug)]
pub struct Device {
    config: DeviceConfig,
    used: AtomicU64,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            used: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn capacity(&self) -> u64 {
        self.config.device_memory
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> u64 {
        self.capacity().saturating_sub(self.used())
    }

    /// Reserves `bytes`, failing without side effects when they do not
    /// fit.
    pub fn try_reserve(&self, bytes: u64) -> Result<(), HostError> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let new = current + bytes;
            if new > self.capacity() {
                return Err(HostError::DeviceOutOfMemory {
                    device: self.config.device_id,
                    needed: bytes,
                    available: self.capacity().saturating_sub(current),
                });
            }
            match self
                .used
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Returns `bytes` to the device. Saturates at zero so a double
    /// release cannot underflow the counter.
    pub fn release(&self, bytes: u64) {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let new = current.saturating_sub(bytes);
            match self
                .used
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

/// All devices attached to the host, keyed by id.
#[derive(Debug, Default)]
pub struct DeviceTable {
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceTable {
    /// Builds a table from configs; device ids must be unique.
    pub fn new(configs: Vec<DeviceConfig>) -> Result<Self, HostError> {
        let mut devices = BTreeMap::new();
        for config in configs {
            let id = config.device_id;
            if devices.insert(id, Device::new(config)).is_some() {
                return Err(HostError::DuplicateDevice(id));
            }
        }
        Ok(Self { devices })
    }

    pub fn get(&self, id: DeviceId) -> Result<&Device, HostError> {
        self.devices.get(&id).ok_or(HostError::UnknownDevice(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Ids of the devices driven by `backend_name`, in id order.
    pub fn ids_for_backend(&self, backend_name: &str) -> Vec<DeviceId> {
        self.devices
            .values()
            .filter(|d| d.config.backend_name == backend_name)
            .map(|d| d.config.device_id)
            .collect()
    }

    pub fn used_total(&self) -> u64 {
        self.iter().map(Device::used).sum()
    }

    pub fn available_total(&self) -> u64 {
        self.iter().map(Device::available).sum()
    }

    pub fn capacity_total(&self) -> u64 {
        self.iter().map(Device::capacity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DeviceTable {
        DeviceTable::new(vec![
            DeviceConfig::new("CPU", "cpu:0", 0, 1000),
            DeviceConfig::new("CPU", "cpu:1", 1, 1000),
            DeviceConfig::new("GPU", "gpu:0", 2, 4000),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = DeviceTable::new(vec![
            DeviceConfig::new("CPU", "a", 0, 1),
            DeviceConfig::new("CPU", "b", 0, 1),
        ])
        .unwrap_err();
        assert!(matches!(err, HostError::DuplicateDevice(0)));
    }

    #[test]
    fn test_reserve_and_release() {
        let t = table();
        let d = t.get(0).unwrap();
        d.try_reserve(600).unwrap();
        assert_eq!(d.used(), 600);
        assert_eq!(d.available(), 400);

        let err = d.try_reserve(500).unwrap_err();
        assert!(matches!(err, HostError::DeviceOutOfMemory { available: 400, .. }));

        d.release(600);
        assert_eq!(d.used(), 0);
        // Releasing more than reserved saturates.
        d.release(100);
        assert_eq!(d.used(), 0);
    }

    #[test]
    fn test_backend_lookup_ordered() {
        let t = table();
        assert_eq!(t.ids_for_backend("CPU"), vec![0, 1]);
        assert_eq!(t.ids_for_backend("GPU"), vec![2]);
        assert!(t.ids_for_backend("NPU").is_empty());
    }

    #[test]
    fn test_totals() {
        let t = table();
        assert_eq!(t.capacity_total(), 6000);
        assert_eq!(t.available_total(), 6000);
        t.get(2).unwrap().try_reserve(1500).unwrap();
        assert_eq!(t.used_total(), 1500);
        assert_eq!(t.available_total(), 4500);
    }

    #[test]
    fn test_unknown_device() {
        let t = table();
        assert!(matches!(t.get(9), Err(HostError::UnknownDevice(9))));
    }
}
