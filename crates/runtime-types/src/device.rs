// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device descriptors.
//!
//! [`DeviceInfo`] is the partitioner's view of one physical accelerator:
//! capacity, roofline figures, and which operator kinds it accepts.
//! [`DeviceConfig`] is the host's bookkeeping record for the same device.

use graph_ir::NodeKind;

/// Identifies one physical or logical device.
pub type DeviceId = usize;

/// Constraint and cost information for one device, consumed by the
/// partitioner.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeviceInfo {
    /// Backend kind this device is driven by (e.g. `"CPU"`, `"GPU"`).
    pub backend_name: String,
    /// Available memory on the device in bytes.
    pub available_memory: u64,
    /// On-chip SRAM capacity in bytes.
    pub sram_capacity: u64,
    /// Peak compute in ops/second.
    pub peak_compute: f64,
    /// Peak DRAM bandwidth in bytes/second.
    pub peak_dram_bw: f64,
    /// Peak SRAM bandwidth in bytes/second.
    pub peak_sram_bw: f64,
    /// Peak PCI-E ingress/egress bandwidth in bytes/second.
    pub peak_pcie_bw: f64,
    /// Kinds this device supports. Empty means "accept all except
    /// `non_supported_nodes`".
    pub supported_nodes: Vec<NodeKind>,
    /// Kinds this device never supports.
    pub non_supported_nodes: Vec<NodeKind>,
}

impl DeviceInfo {
    /// Creates a descriptor with the given backend and memory; roofline
    /// figures default to zero (disabled) and the kind filters to empty.
    pub fn new(backend_name: impl Into<String>, available_memory: u64) -> Self {
        Self {
            backend_name: backend_name.into(),
            available_memory,
            sram_capacity: 0,
            peak_compute: 0.0,
            peak_dram_bw: 0.0,
            peak_sram_bw: 0.0,
            peak_pcie_bw: 0.0,
            supported_nodes: Vec::new(),
            non_supported_nodes: Vec::new(),
        }
    }

    /// Restricts this device to the given kinds.
    pub fn with_supported(mut self, kinds: Vec<NodeKind>) -> Self {
        self.supported_nodes = kinds;
        self
    }

    /// Excludes the given kinds from this device.
    pub fn with_non_supported(mut self, kinds: Vec<NodeKind>) -> Self {
        self.non_supported_nodes = kinds;
        self
    }

    /// Sets the roofline figures used by load-balanced placement.
    pub fn with_rooflines(mut self, peak_compute: f64, peak_dram_bw: f64) -> Self {
        self.peak_compute = peak_compute;
        self.peak_dram_bw = peak_dram_bw;
        self
    }
}

/// The host's record of one attached device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeviceConfig {
    /// Backend kind driving this device.
    pub backend_name: String,
    /// Human-readable name, used in logs and error messages.
    pub name: String,
    /// Host-assigned id, used for stats and dispatch.
    pub device_id: DeviceId,
    /// Device memory in bytes.
    pub device_memory: u64,
}

impl DeviceConfig {
    pub fn new(
        backend_name: impl Into<String>,
        name: impl Into<String>,
        device_id: DeviceId,
        device_memory: u64,
    ) -> Self {
        Self {
            backend_name: backend_name.into(),
            name: name.into(),
            device_id,
            device_memory,
        }
    }
}
