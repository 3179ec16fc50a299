// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Load-balanced partitioning over a single backend kind.
//!
//! Targets one partition per device and places nodes so each partition's
//! summed roofline time stays near `total / num_devices`. A node is
//! never placed below the highest partition holding one of its inputs,
//! so every cross-partition edge points from a lower partition id to a
//! higher one and the coarse DAG is acyclic by construction.

use crate::backend::gen_backend_map;
use crate::error::PartitionError;
use crate::mapping::{assign_logical_device_ids, NodeToPartitionMap};
use crate::materialize::do_partitioning;
use crate::mem::{node_compute_time, node_mem_usage, partition_mem_info};
use crate::select::select_partitions;
use crate::validation::{logical_devices_validation, memory_usage_validation};
use crate::{saturate_host, Partitioner};
use graph_ir::{Module, Origin};
use runtime_types::{CompilationContext, DagList};
use std::collections::HashSet;

/// Fraction of a node's cost by which a partition may overshoot its
/// time share before the node spills to the next partition. Keeps a
/// placement from migrating over a marginal violation.
const ALLOWED_LOAD_IMBALANCE_FRACTION: f64 = 0.5;

impl Partitioner {
    pub(crate) fn load_balanced_partition(
        &self,
        module: &mut Module,
        cctx: &CompilationContext,
        mut num_devices: usize,
    ) -> Result<DagList, PartitionError> {
        if self.multi_backend_names {
            tracing::debug!("multiple backend kinds; falling back to heterogeneous partitioning");
            return self.heterogeneous_partition(module, cctx);
        }
        super::heterogeneous::require_single_function(module, "load-balanced")?;

        let (backend_map, backend_order) = gen_backend_map(&self.device_info, &self.registry)?;
        let backend_name = backend_order[0].clone();
        let info = &backend_map[&backend_name];
        let available_memory = info.mem_size;

        let (rep_name, _) = self.select_rep_func(module)?;
        let orig_name = rep_name.clone();

        // Step 1: the memory-bounded cut gives a lower bound on the
        // partition count; it overrides a smaller device count.
        let lower_bound = {
            let f = module
                .function(&rep_name)
                .ok_or_else(|| PartitionError::UnknownFunction(rep_name.clone()))?;
            select_partitions(f, module, available_memory, &backend_name)?.num_partitions()
        };
        if lower_bound > num_devices {
            tracing::warn!(
                "memory requires {lower_bound} partition(s), more than the {num_devices} device(s) given"
            );
            num_devices = lower_bound;
        }

        let f = module
            .function(&rep_name)
            .ok_or_else(|| PartitionError::UnknownFunction(rep_name.clone()))?;

        // Step 2: roofline total and the per-partition time share.
        let total_roofline: f64 = f
            .nodes()
            .map(|n| node_compute_time(n, f, module, info))
            .sum();
        let time_per_partition = total_roofline / num_devices as f64;
        tracing::debug!(
            "load balance: total roofline {total_roofline:.3}s over {num_devices} device(s), \
             {time_per_partition:.3}s per partition"
        );

        // Step 3: pre-create one partition per device.
        let mut mapping = NodeToPartitionMap::new();
        for device in 0..num_devices {
            let index = mapping.create_partition(
                format!("{}_part{}", rep_name, device + 1),
                backend_name.as_str(),
            );
            mapping.append_logical_device(index, device);
        }

        let mut device_time = vec![0.0f64; num_devices];
        let mut memory_available = vec![available_memory; num_devices];
        let mut partition_sets: Vec<HashSet<String>> = vec![HashSet::new(); num_devices];

        // Step 4: place nodes level by level.
        let bfs = crate::bfs::bfs_levels(f);
        for level in (0..bfs.len()).rev() {
            for node in &bfs[level] {
                // Lowest candidate: the highest partition among inputs.
                let mut candidate = 0;
                for input in &node.inputs {
                    if let Origin::Node(producer) = input {
                        if let Some(p) = mapping.partition_of(producer) {
                            candidate = candidate.max(p);
                        }
                    }
                }

                let op_time = node_compute_time(node, f, module, info);
                let op_mem = node_mem_usage(node, module);

                let mut placed = false;
                while candidate < num_devices {
                    let load_ok = device_time[candidate]
                        + op_time * ALLOWED_LOAD_IMBALANCE_FRACTION
                        < time_per_partition;
                    let mem_ok = memory_available[candidate] >= op_mem;

                    if mem_ok && (load_ok || candidate == num_devices - 1) {
                        mapping.assign(node.name.clone(), candidate);
                        device_time[candidate] += op_time;
                        memory_available[candidate] -= op_mem;
                        partition_sets[candidate].insert(node.name.clone());
                        placed = true;
                        break;
                    }
                    candidate += 1;
                }
                if !placed {
                    return Err(PartitionError::LoadBalanceFailed {
                        node: node.name.clone(),
                    });
                }
            }
        }

        for (device, time) in device_time.iter().enumerate() {
            tracing::debug!("partition #{device} estimated runtime {time:.3}s");
        }

        // Working sets from the final placement.
        for (index, set) in partition_sets.iter().enumerate() {
            if !set.is_empty() {
                mapping.set_mem_info(index, partition_mem_info(set, f, module)?);
            }
        }
        // Trailing devices may have received nothing; drop them rather
        // than emit empty sub-functions.
        mapping.retain_non_empty();

        memory_usage_validation(&mapping, &backend_map)?;
        let logical_count = assign_logical_device_ids(&mut mapping);
        logical_devices_validation(&mapping, &backend_map)?;

        let dag = do_partitioning(&orig_name, &[rep_name.clone()], module, &mapping, true)?
            .expect("save_dag was requested");
        module.erase_function(&rep_name)?;
        let mut dags = vec![dag];

        if self.saturate_host && mapping.num_partitions() < self.device_info.len() {
            saturate_host(logical_count, &mut dags, self.device_info.len());
        }

        self.finalize(&dags, &mapping, module)?;
        Ok(dags)
    }
}
