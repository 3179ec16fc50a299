// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory-bounded partition selection.
//!
//! Walks the BFS levels from the inputs down to the sinks, packing nodes
//! into the current partition until the working set would exceed the
//! device memory, then opens a fresh one. Because the walk follows
//! levelisation order, cross-partition edges always point from an
//! earlier partition to a later one.

use crate::adjust::partitions_adjust;
use crate::bfs::bfs_levels;
use crate::error::PartitionError;
use crate::mapping::NodeToPartitionMap;
use crate::mem::partition_mem_info;
use graph_ir::{Function, Module};
use std::collections::HashSet;

/// Assigns every node of `f` to a memory-bounded partition on
/// `backend_name` devices with `available_memory` bytes each.
///
/// A node whose working set alone exceeds the budget still receives its
/// own partition; the later memory validation pass reports it.
pub(crate) fn select_partitions(
    f: &Function,
    module: &Module,
    available_memory: u64,
    backend_name: &str,
) -> Result<NodeToPartitionMap, PartitionError> {
    let bfs = bfs_levels(f);
    let mut map = NodeToPartitionMap::new();

    let mut color = 1;
    let mut current_index = map.create_partition(format!("{}_part{color}", f.name()), backend_name);
    let mut current_set: HashSet<String> = HashSet::new();

    for level in (0..bfs.len()).rev() {
        for node in &bfs[level] {
            current_set.insert(node.name.clone());
            let mem = partition_mem_info(&current_set, f, module)?;

            if mem.total() > available_memory && current_set.len() > 1 {
                // Close the current partition and restart from this node.
                color += 1;
                current_index =
                    map.create_partition(format!("{}_part{color}", f.name()), backend_name);
                current_set.clear();
                current_set.insert(node.name.clone());
                let solo = partition_mem_info(&current_set, f, module)?;
                map.assign(node.name.clone(), current_index);
                map.set_mem_info(current_index, solo);
            } else {
                map.assign(node.name.clone(), current_index);
                map.set_mem_info(current_index, mem);
            }
        }
    }

    tracing::debug!(
        "select_partitions('{}'): {} partition(s) under {} bytes",
        f.name(),
        map.num_partitions(),
        available_memory
    );

    partitions_adjust(&mut map, f, module, available_memory)?;
    Ok(map)
}
