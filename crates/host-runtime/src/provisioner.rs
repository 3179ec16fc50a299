// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Provisioning: assigning each DAG node's logical devices to physical
//! ones and reserving device memory for it.
//!
//! Backend code generation and artefact upload live behind the device
//! drivers; what the host tracks is the placement and the memory
//! reservation, which is what [`MemoryProvisioner`] implements. A custom
//! [`Provisioner`] can wrap real compilation around the same contract.

use crate::devices::DeviceTable;
use crate::error::HostError;
use runtime_types::{CompilationContext, Dag, DeviceId};

/// Loads partitioned networks onto devices and evicts them again.
pub trait Provisioner: Send + Sync {
    /// Assigns physical devices to every node of every DAG and reserves
    /// the memory the sub-functions need. Must be atomic: on error, no
    /// reservation may remain.
    fn provision(
        &self,
        dags: &mut [Dag],
        devices: &DeviceTable,
        cctx: &CompilationContext,
    ) -> Result<(), HostError>;

    /// Releases everything `provision` reserved for `dag`.
    fn evict(&self, network_name: &str, dag: &Dag, devices: &DeviceTable) -> Result<(), HostError>;
}

/// The reference provisioner: placement plus memory accounting.
///
/// Logical device `l` of backend `b` maps to the `l mod n`-th of the
/// `n` physical devices carrying `b`, so replicas land on distinct
/// devices while an over-subscribed plan time-shares them.
#[derive(Debug, Default)]
pub struct MemoryProvisioner;

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self
    }
}

impl Provisioner for MemoryProvisioner {
    fn provision(
        &self,
        dags: &mut [Dag],
        devices: &DeviceTable,
        _cctx: &CompilationContext,
    ) -> Result<(), HostError> {
        // Tracked so a mid-flight failure can roll everything back.
        let mut reserved: Vec<(DeviceId, u64)> = Vec::new();

        let result = (|| {
            for dag in dags.iter_mut() {
                let ids: Vec<_> = dag.partition_ids().collect();
                for id in ids {
                    let node = dag.node(id);
                    let backend_devices = devices.ids_for_backend(&node.backend_name);
                    if backend_devices.is_empty() {
                        return Err(HostError::NoDeviceForBackend(node.backend_name.clone()));
                    }
                    let bytes = node.mem_info.total();

                    let mut physical = Vec::with_capacity(node.logical_devices.len());
                    for &logical in &node.logical_devices {
                        let device_id = backend_devices[logical % backend_devices.len()];
                        devices.get(device_id)?.try_reserve(bytes)?;
                        reserved.push((device_id, bytes));
                        physical.push(device_id);
                    }

                    tracing::debug!(
                        "provisioned '{}' ({} bytes) onto device(s) {:?}",
                        node.name,
                        bytes,
                        physical
                    );
                    dag.node_mut(id).physical_devices = physical;
                }
            }
            Ok(())
        })();

        if result.is_err() {
            for (device_id, bytes) in reserved {
                if let Ok(device) = devices.get(device_id) {
                    device.release(bytes);
                }
            }
            for dag in dags.iter_mut() {
                let ids: Vec<_> = dag.partition_ids().collect();
                for id in ids {
                    dag.node_mut(id).physical_devices.clear();
                }
            }
        }
        result
    }

    fn evict(&self, network_name: &str, dag: &Dag, devices: &DeviceTable) -> Result<(), HostError> {
        for node in dag.partitions() {
            let bytes = node.mem_info.total();
            for &device_id in &node.physical_devices {
                devices.get(device_id)?.release(bytes);
            }
        }
        tracing::debug!("evicted network '{network_name}' from its devices");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_types::{DagNode, DeviceConfig, GraphMemInfo};

    fn dag_with(nodes: &[(&str, &str, Vec<usize>, u64)]) -> Dag {
        let mut dag = Dag::new("net");
        let root = dag.root();
        let mut prev = None;
        for &(name, backend, ref logical, bytes) in nodes {
            let mut n = DagNode::new(name, backend);
            n.logical_devices = logical.clone();
            n.mem_info = GraphMemInfo::new(bytes, 0, 0);
            let id = dag.add_node(n);
            match prev {
                None => dag.add_edge(root, id),
                Some(p) => dag.add_edge(p, id),
            }
            prev = Some(id);
        }
        dag
    }

    fn cpu_table(count: usize, memory: u64) -> DeviceTable {
        DeviceTable::new(
            (0..count)
                .map(|i| DeviceConfig::new("CPU", format!("cpu:{i}"), i, memory))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_provision_assigns_and_reserves() {
        let mut dags = vec![dag_with(&[
            ("p1", "CPU", vec![0], 400),
            ("p2", "CPU", vec![1], 300),
        ])];
        let table = cpu_table(2, 1000);
        MemoryProvisioner::new()
            .provision(&mut dags, &table, &CompilationContext::new())
            .unwrap();

        let ids: Vec<_> = dags[0].partition_ids().collect();
        assert_eq!(dags[0].node(ids[0]).physical_devices, vec![0]);
        assert_eq!(dags[0].node(ids[1]).physical_devices, vec![1]);
        assert_eq!(table.get(0).unwrap().used(), 400);
        assert_eq!(table.get(1).unwrap().used(), 300);
    }

    #[test]
    fn test_replicas_land_on_distinct_devices() {
        let mut dags = vec![dag_with(&[("p1", "CPU", vec![0, 1, 2, 3], 100)])];
        let table = cpu_table(4, 1000);
        MemoryProvisioner::new()
            .provision(&mut dags, &table, &CompilationContext::new())
            .unwrap();

        let id = dags[0].partition_ids().next().unwrap();
        assert_eq!(dags[0].node(id).physical_devices, vec![0, 1, 2, 3]);
        for i in 0..4 {
            assert_eq!(table.get(i).unwrap().used(), 100);
        }
    }

    #[test]
    fn test_oversubscription_wraps() {
        // Five logical devices over two physical ones.
        let mut dags = vec![dag_with(&[
            ("p1", "CPU", vec![0], 10),
            ("p2", "CPU", vec![1], 10),
            ("p3", "CPU", vec![2], 10),
            ("p4", "CPU", vec![3], 10),
            ("p5", "CPU", vec![4], 10),
        ])];
        let table = cpu_table(2, 1000);
        MemoryProvisioner::new()
            .provision(&mut dags, &table, &CompilationContext::new())
            .unwrap();
        assert_eq!(table.get(0).unwrap().used(), 30); // logical 0, 2, 4
        assert_eq!(table.get(1).unwrap().used(), 20); // logical 1, 3
    }

    #[test]
    fn test_failure_rolls_back() {
        let mut dags = vec![dag_with(&[
            ("p1", "CPU", vec![0], 800),
            ("p2", "CPU", vec![0], 800), // same device, does not fit
        ])];
        let table = cpu_table(1, 1000);
        let err = MemoryProvisioner::new()
            .provision(&mut dags, &table, &CompilationContext::new())
            .unwrap_err();
        assert!(matches!(err, HostError::DeviceOutOfMemory { .. }));
        // Nothing stays reserved or assigned.
        assert_eq!(table.get(0).unwrap().used(), 0);
        for id in dags[0].partition_ids().collect::<Vec<_>>() {
            assert!(dags[0].node(id).physical_devices.is_empty());
        }
    }

    #[test]
    fn test_missing_backend() {
        let mut dags = vec![dag_with(&[("p1", "NPU", vec![0], 1)])];
        let table = cpu_table(1, 1000);
        let err = MemoryProvisioner::new()
            .provision(&mut dags, &table, &CompilationContext::new())
            .unwrap_err();
        assert!(matches!(err, HostError::NoDeviceForBackend(_)));
    }

    #[test]
    fn test_evict_releases() {
        let mut dags = vec![dag_with(&[("p1", "CPU", vec![0], 250)])];
        let table = cpu_table(1, 1000);
        let p = MemoryProvisioner::new();
        p.provision(&mut dags, &table, &CompilationContext::new()).unwrap();
        assert_eq!(table.get(0).unwrap().used(), 250);
        p.evict("net", &dags[0], &table).unwrap();
        assert_eq!(table.get(0).unwrap().used(), 0);
    }
}
