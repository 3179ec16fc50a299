// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! User-defined partitioning from a [`PartitionConfig`].
//!
//! The user names every partition, its backend, and which nodes it gets.
//! Nodes absent from the map form the unmapped set; they all go to the
//! single partition that received no mapped nodes, and it is an error
//! for zero or several such partitions to exist while unmapped nodes do.

use crate::backend::gen_backend_map;
use crate::error::PartitionError;
use crate::mapping::{assign_logical_device_ids, NodeToPartitionMap};
use crate::materialize::do_partitioning;
use crate::mem::partition_mem_info;
use crate::validation::{logical_devices_validation, memory_usage_validation};
use crate::Partitioner;
use graph_ir::Module;
use runtime_types::{DagList, PartitionConfig};
use std::collections::{BTreeSet, HashSet};

impl Partitioner {
    pub(crate) fn partition_from_config(
        &self,
        module: &mut Module,
        config: &PartitionConfig,
    ) -> Result<DagList, PartitionError> {
        let (backend_map, _) = gen_backend_map(&self.device_info, &self.registry)?;

        if config.num_of_partitions != config.backend_names.len()
            || config.num_of_partitions != config.partition_names.len()
        {
            return Err(PartitionError::MalformedConfig(format!(
                "{} partitions, {} backend names, {} partition names",
                config.num_of_partitions,
                config.backend_names.len(),
                config.partition_names.len()
            )));
        }

        let func_name = config.func_name.clone();
        if module.function(&func_name).is_none() {
            return Err(PartitionError::UnknownFunction(func_name));
        }

        // Create the named partitions.
        let mut mapping = NodeToPartitionMap::new();
        let mut unused: BTreeSet<usize> = BTreeSet::new();
        for i in 0..config.num_of_partitions {
            mapping.create_partition(
                config.partition_names[i].as_str(),
                config.backend_names[i].as_str(),
            );
            unused.insert(i);
        }

        // Map nodes; collect the leftovers.
        let mut unmapped: Vec<String> = Vec::new();
        {
            let f = module
                .function(&func_name)
                .ok_or_else(|| PartitionError::UnknownFunction(func_name.clone()))?;
            for node in f.nodes() {
                match config.node_to_partition.get(&node.name) {
                    Some(&index) => {
                        if index >= config.num_of_partitions {
                            return Err(PartitionError::MalformedConfig(format!(
                                "node '{}' maps to partition {index}, but only {} exist",
                                node.name, config.num_of_partitions
                            )));
                        }
                        mapping.assign(node.name.clone(), index);
                        unused.remove(&index);
                    }
                    None => unmapped.push(node.name.clone()),
                }
            }
        }

        if !unmapped.is_empty() {
            if unused.len() != 1 {
                return Err(PartitionError::MalformedConfig(format!(
                    "{} unmapped node(s) but {} unused partition(s); exactly one is required",
                    unmapped.len(),
                    unused.len()
                )));
            }
            let index = *unused.iter().next().expect("checked non-empty");
            for node in unmapped {
                mapping.assign(node, index);
            }
        }

        // Working sets per partition, then the usual validations.
        {
            let f = module
                .function(&func_name)
                .ok_or_else(|| PartitionError::UnknownFunction(func_name.clone()))?;
            for index in 0..mapping.num_partitions() {
                let set: HashSet<String> = mapping.nodes_of(index).map(str::to_string).collect();
                let info = partition_mem_info(&set, f, module)?;
                mapping.set_mem_info(index, info);
            }
        }
        memory_usage_validation(&mapping, &backend_map)?;

        let _logical_count = assign_logical_device_ids(&mut mapping);
        logical_devices_validation(&mapping, &backend_map)?;

        let dag = do_partitioning(&func_name, &[func_name.clone()], module, &mapping, true)?
            .expect("save_dag was requested");
        module.erase_function(&func_name)?;

        dag.validate()?;
        let dags = vec![dag];
        self.finalize(&dags, &mapping, module)?;
        Ok(dags)
    }
}
