// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Heterogeneous partitioning: split by backend support, then by memory.
//!
//! The default flow. A module that fits a single device of the only
//! backend kind skips partitioning entirely and becomes a trivial DAG.
//! Otherwise the representative function is first cut wherever the
//! chosen backend changes ([`Partitioner::backend_based_partition`]),
//! and each backend-homogeneous piece is then cut again to respect
//! device memory (`select_partitions`).

use crate::backend::{gen_backend_map, BackendMap};
use crate::error::PartitionError;
use crate::mapping::{assign_logical_device_ids, NodeToPartitionMap};
use crate::materialize::do_partitioning;
use crate::mem::partition_mem_info;
use crate::select::select_partitions;
use crate::validation::{logical_devices_validation, memory_usage_validation};
use crate::{saturate_host, Partitioner, PROFILING_BACKEND};
use graph_ir::Module;
use runtime_types::{CompilationContext, Dag, DagList, DagNode, QuantizationMode};
use std::collections::HashSet;

impl Partitioner {
    pub(crate) fn heterogeneous_partition(
        &self,
        module: &mut Module,
        cctx: &CompilationContext,
    ) -> Result<DagList, PartitionError> {
        let (backend_map, backend_order) = gen_backend_map(&self.device_info, &self.registry)?;

        // Step 0: the representative function and its working set.
        let (rep_name, working_set) = self.select_rep_func(module)?;
        let orig_name = rep_name.clone();

        // Step 1: cut by backend kind, or skip when one kind suffices.
        let func_backends: Vec<(String, String)>;
        if backend_order.len() == 1 {
            let backend_name = backend_order[0].clone();
            if working_set < backend_map[&backend_name].mem_size {
                tracing::info!(
                    "model fits one '{}' device ({} < {} bytes); skipping partitioning",
                    backend_name,
                    working_set,
                    backend_map[&backend_name].mem_size
                );
                return self.create_dag_without_partition(module, &backend_name);
            }
            require_single_function(module, "heterogeneous")?;
            func_backends = vec![(rep_name, backend_name)];
        } else {
            require_single_function(module, "heterogeneous")?;
            let mapping = self.backend_based_partition(module, &rep_name, &backend_map, &backend_order, cctx)?;
            do_partitioning(&orig_name, &[rep_name.clone()], module, &mapping, false)?;
            module.erase_function(&rep_name)?;
            func_backends = mapping
                .partitions()
                .iter()
                .map(|meta| (meta.name.clone(), meta.backend_name.clone()))
                .collect();
        }

        // Step 2: cut each backend-homogeneous function by memory.
        let mut mapping = NodeToPartitionMap::new();
        let mut funcs = Vec::with_capacity(func_backends.len());
        for (fname, backend_name) in &func_backends {
            let available = backend_map[backend_name].mem_size;
            let f = module
                .function(fname)
                .ok_or_else(|| PartitionError::UnknownFunction(fname.clone()))?;
            let piece = select_partitions(f, module, available, backend_name)?;
            mapping.merge_from(piece);
            funcs.push(fname.clone());
        }

        memory_usage_validation(&mapping, &backend_map)?;

        // Step 3: logical device ids, one per partition.
        let logical_count = assign_logical_device_ids(&mut mapping);
        logical_devices_validation(&mapping, &backend_map)?;

        // Step 4: materialise.
        let dag = do_partitioning(&orig_name, &funcs, module, &mapping, true)?
            .expect("save_dag was requested");
        let mut dags = vec![dag];

        // Step 5: replicate across idle devices when homogeneous.
        if self.saturate_host
            && backend_order.len() == 1
            && mapping.num_partitions() < self.device_info.len()
        {
            saturate_host(logical_count, &mut dags, self.device_info.len());
        }

        // Step 6: drop the intermediate functions and check the result.
        for fname in &funcs {
            module.erase_function(fname)?;
        }
        self.finalize(&dags, &mapping, module)?;
        Ok(dags)
    }

    /// Assigns every node the first backend (in `backend_order`) that
    /// accepts it, then opens a new partition wherever the chosen
    /// backend changes along the BFS walk.
    ///
    /// In profiling mode every partition is tagged with the profiling
    /// backend instead; the split boundaries still follow the real
    /// backend choice.
    pub(crate) fn backend_based_partition(
        &self,
        module: &Module,
        fname: &str,
        backend_map: &BackendMap,
        backend_order: &[String],
        cctx: &CompilationContext,
    ) -> Result<NodeToPartitionMap, PartitionError> {
        let f = module
            .function(fname)
            .ok_or_else(|| PartitionError::UnknownFunction(fname.to_string()))?;
        let profiling = cctx.quant_mode == QuantizationMode::Profile;

        // Per-node backend choice, in caller priority order.
        let mut chosen: std::collections::HashMap<&str, &str> = Default::default();
        for node in f.nodes() {
            let backend = backend_order
                .iter()
                .find(|name| backend_map[name.as_str()].accepts(node))
                .ok_or_else(|| PartitionError::UnsupportedNode {
                    node: node.name.clone(),
                    kind: node.kind.to_string(),
                })?;
            chosen.insert(node.name.as_str(), backend);
        }

        // Split along the BFS walk wherever the chosen backend changes.
        let bfs = crate::bfs::bfs_levels(f);
        let mut mapping = NodeToPartitionMap::new();
        let mut color = 0;
        let mut current_backend: Option<&str> = None;
        let mut current_index = 0;

        for level in (0..bfs.len()).rev() {
            for node in &bfs[level] {
                let backend = chosen[node.name.as_str()];
                if current_backend != Some(backend) {
                    current_backend = Some(backend);
                    color += 1;
                    let tag = if profiling { PROFILING_BACKEND } else { backend };
                    current_index =
                        mapping.create_partition(format!("{fname}_part{color}"), tag);
                }
                mapping.assign(node.name.clone(), current_index);
            }
        }

        // Attach working sets so later passes can validate memory.
        for index in 0..mapping.num_partitions() {
            let set: HashSet<String> = mapping.nodes_of(index).map(str::to_string).collect();
            let info = partition_mem_info(&set, f, module)?;
            mapping.set_mem_info(index, info);
        }

        tracing::debug!(
            "backend_based_partition('{fname}'): {} segment(s)",
            mapping.num_partitions()
        );
        Ok(mapping)
    }

    /// Emits one trivial DAG (root → whole function) per module function.
    pub(crate) fn create_dag_without_partition(
        &self,
        module: &Module,
        backend_name: &str,
    ) -> Result<DagList, PartitionError> {
        let mut dags = Vec::new();
        for f in module.functions() {
            let set: HashSet<String> = f.nodes().map(|n| n.name.clone()).collect();
            let mem_info = partition_mem_info(&set, f, module)?;

            let mut dag = Dag::new(f.name());
            let mut node = DagNode::new(f.name(), backend_name);
            node.logical_devices = vec![0];
            node.mem_info = mem_info;
            let id = dag.add_node(node);
            let root = dag.root();
            dag.add_edge(root, id);
            dags.push(dag);
        }

        if self.saturate_host {
            saturate_host(1, &mut dags, self.device_info.len());
        }

        self.finalize(&dags, &NodeToPartitionMap::new(), module)?;
        Ok(dags)
    }
}

pub(crate) fn require_single_function(
    module: &Module,
    flow: &'static str,
) -> Result<(), PartitionError> {
    let count = module.num_functions();
    if count != 1 {
        return Err(PartitionError::MultipleFunctions { count, flow });
    }
    Ok(())
}
