// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Validation passes over a planned mapping.

use crate::backend::BackendMap;
use crate::error::PartitionError;
use crate::mapping::NodeToPartitionMap;
use runtime_types::DeviceId;
use std::collections::BTreeSet;

/// Every partition's working set must fit its backend's device memory.
pub(crate) fn memory_usage_validation(
    map: &NodeToPartitionMap,
    backend_map: &BackendMap,
) -> Result<(), PartitionError> {
    for meta in map.partitions() {
        let info = backend_map
            .get(&meta.backend_name)
            .ok_or_else(|| PartitionError::NoDeviceForBackend(meta.backend_name.clone()))?;
        if meta.mem_info.total() > info.mem_size {
            return Err(PartitionError::MemoryCapacityExceeded {
                partition: meta.name.clone(),
                backend: meta.backend_name.clone(),
                needed: meta.mem_info.total(),
                available: info.mem_size,
            });
        }
    }
    Ok(())
}

/// Compares the logical devices a plan uses against the physical devices
/// present, per backend.
///
/// Needing more logical devices than physical ones is not fatal: the
/// provisioner time-shares a physical device between logical ids by
/// wrapping. It is worth a warning, since it usually signals an
/// under-provisioned host.
pub(crate) fn logical_devices_validation(
    map: &NodeToPartitionMap,
    backend_map: &BackendMap,
) -> Result<(), PartitionError> {
    for (backend, info) in backend_map {
        let used: BTreeSet<DeviceId> = map
            .partitions()
            .iter()
            .filter(|m| &m.backend_name == backend)
            .flat_map(|m| m.logical_devices.iter().copied())
            .collect();
        if used.len() > info.num_devices {
            tracing::warn!(
                "backend '{backend}' plans {} logical device(s) over {} physical; \
                 partitions will time-share devices",
                used.len(),
                info.num_devices
            );
        }
    }

    for meta in map.partitions() {
        if !backend_map.contains_key(&meta.backend_name) {
            return Err(PartitionError::NoDeviceForBackend(meta.backend_name.clone()));
        }
    }
    Ok(())
}
