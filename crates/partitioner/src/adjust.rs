// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Post-selection partition adjustment.
//!
//! Two passes over a freshly selected mapping:
//!
//! 1. [`optimize_communication_cost`] — moves single nodes between
//!    adjacent partitions when that strictly reduces the number of
//!    cross-partition edges, memory budgets still hold, and every edge
//!    keeps pointing from a lower partition index to a higher one.
//! 2. [`partitions_combine`] — greedily merges adjacent partition pairs
//!    whose combined working set fits the budget, smallest combined
//!    size first.
//!
//! After both passes every partition fits its budget and no adjacent
//! pair can be merged without violating it. Only adjacent pairs are
//! candidates: merging across an intermediate partition would fold a
//! path `p → q → r` into a two-node cycle.

use crate::error::PartitionError;
use crate::mapping::NodeToPartitionMap;
use crate::mem::partition_mem_info;
use graph_ir::{Function, Module, Origin};
use std::collections::HashSet;

/// Maximum sweeps of the communication pass; each sweep only applies
/// strictly improving moves, so this bounds work without changing the
/// result for typical graphs.
const MAX_COMM_SWEEPS: usize = 3;

pub(crate) fn partitions_adjust(
    map: &mut NodeToPartitionMap,
    f: &Function,
    module: &Module,
    available_memory: u64,
) -> Result<(), PartitionError> {
    if map.num_partitions() < 2 {
        return Ok(());
    }
    optimize_communication_cost(map, f, module, available_memory)?;
    partitions_combine(map, f, module, available_memory)?;
    Ok(())
}

/// Number of node-to-node edges crossing partition boundaries.
fn cut_edges(map: &NodeToPartitionMap, f: &Function) -> usize {
    let mut cut = 0;
    for node in f.nodes() {
        let Some(p) = map.partition_of(&node.name) else {
            continue;
        };
        for input in &node.inputs {
            if let Origin::Node(producer) = input {
                if map.partition_of(producer) != Some(p) {
                    cut += 1;
                }
            }
        }
    }
    cut
}

fn nodes_set(map: &NodeToPartitionMap, index: usize) -> HashSet<String> {
    map.nodes_of(index).map(str::to_string).collect()
}

/// Checks that moving `node` from partition `from` to `to` keeps every
/// edge pointing from a lower to a higher partition index.
fn move_is_legal(map: &NodeToPartitionMap, f: &Function, node: &str, to: usize) -> bool {
    let Some(n) = f.node(node) else { return false };
    for input in &n.inputs {
        if let Origin::Node(producer) = input {
            match map.partition_of(producer) {
                Some(p) if p <= to => {}
                _ => return false,
            }
        }
    }
    for consumer in f.consumers(node) {
        match map.partition_of(&consumer.name) {
            Some(c) if c >= to => {}
            _ => return false,
        }
    }
    true
}

fn optimize_communication_cost(
    map: &mut NodeToPartitionMap,
    f: &Function,
    module: &Module,
    available_memory: u64,
) -> Result<(), PartitionError> {
    for _sweep in 0..MAX_COMM_SWEEPS {
        let mut moved = false;

        for node in f.nodes() {
            let Some(from) = map.partition_of(&node.name) else {
                continue;
            };
            // Do not drain a partition; emptying one shifts indices under
            // the walk and combine handles tiny partitions anyway.
            if map.nodes_of(from).count() == 1 {
                continue;
            }

            let mut candidates = Vec::new();
            if from > 0 {
                candidates.push(from - 1);
            }
            if from + 1 < map.num_partitions() {
                candidates.push(from + 1);
            }

            for to in candidates {
                if map.meta(to).backend_name != map.meta(from).backend_name {
                    continue;
                }
                if !move_is_legal(map, f, &node.name, to) {
                    continue;
                }

                let before = cut_edges(map, f);
                map.assign(node.name.clone(), to);
                let after = cut_edges(map, f);

                let mut from_set = nodes_set(map, from);
                from_set.remove(&node.name);
                let to_set = nodes_set(map, to);
                let from_mem = partition_mem_info(&from_set, f, module)?;
                let to_mem = partition_mem_info(&to_set, f, module)?;

                if after < before
                    && from_mem.total() <= available_memory
                    && to_mem.total() <= available_memory
                {
                    map.set_mem_info(from, from_mem);
                    map.set_mem_info(to, to_mem);
                    moved = true;
                    tracing::debug!(
                        "comm pass: moved '{}' from partition {from} to {to} ({before} → {after} cut edges)",
                        node.name
                    );
                    break;
                }
                // Revert the probe.
                map.assign(node.name.clone(), from);
            }
        }

        if !moved {
            break;
        }
    }
    Ok(())
}

fn partitions_combine(
    map: &mut NodeToPartitionMap,
    f: &Function,
    module: &Module,
    available_memory: u64,
) -> Result<(), PartitionError> {
    loop {
        let mut best: Option<(usize, u64)> = None;

        for i in 0..map.num_partitions().saturating_sub(1) {
            if map.meta(i).backend_name != map.meta(i + 1).backend_name {
                continue;
            }
            let mut union = nodes_set(map, i);
            union.extend(nodes_set(map, i + 1));
            let combined = partition_mem_info(&union, f, module)?;
            if combined.total() <= available_memory {
                match best {
                    Some((_, size)) if size <= combined.total() => {}
                    _ => best = Some((i, combined.total())),
                }
            }
        }

        let Some((i, _)) = best else {
            return Ok(());
        };
        tracing::debug!(
            "combine pass: merging partition '{}' into '{}'",
            map.meta(i + 1).name,
            map.meta(i).name
        );
        map.merge_partitions(i, i + 1);
        let merged = partition_mem_info(&nodes_set(map, i), f, module)?;
        map.set_mem_info(i, merged);
    }
}
