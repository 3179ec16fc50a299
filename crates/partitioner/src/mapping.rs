// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The node → partition assignment that strategies produce.
//!
//! Strategies stay pure: they assign node names to partition indices and
//! attach metadata, without touching the module. Materialisation
//! ([`crate::materialize`]) later turns the mapping into real
//! sub-functions and a DAG.

use runtime_types::{DeviceId, GraphMemInfo};
use std::collections::HashMap;

/// Metadata for one planned partition.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PartitionMeta {
    /// Sub-function name this partition will materialise as.
    pub name: String,
    /// Backend that will compile and run it.
    pub backend_name: String,
    /// Logical devices assigned to it. More than one means replication.
    pub logical_devices: Vec<DeviceId>,
    /// Working-set accounting.
    pub mem_info: GraphMemInfo,
}

/// The relation node → partition plus per-partition metadata.
#[derive(Debug, Clone, Default)]
pub struct NodeToPartitionMap {
    partitions: Vec<PartitionMeta>,
    assignment: HashMap<String, usize>,
}

impl NodeToPartitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new partition and returns its index.
    pub fn create_partition(
        &mut self,
        name: impl Into<String>,
        backend_name: impl Into<String>,
    ) -> usize {
        self.partitions.push(PartitionMeta {
            name: name.into(),
            backend_name: backend_name.into(),
            logical_devices: Vec::new(),
            mem_info: GraphMemInfo::default(),
        });
        self.partitions.len() - 1
    }

    /// Assigns `node` to the partition at `index`.
    pub fn assign(&mut self, node: impl Into<String>, index: usize) {
        debug_assert!(index < self.partitions.len());
        self.assignment.insert(node.into(), index);
    }

    pub fn partition_of(&self, node: &str) -> Option<usize> {
        self.assignment.get(node).copied()
    }

    pub fn meta(&self, index: usize) -> &PartitionMeta {
        &self.partitions[index]
    }

    pub fn set_mem_info(&mut self, index: usize, info: GraphMemInfo) {
        self.partitions[index].mem_info = info;
    }

    pub fn append_logical_device(&mut self, index: usize, id: DeviceId) {
        self.partitions[index].logical_devices.push(id);
    }

    pub fn partitions(&self) -> &[PartitionMeta] {
        &self.partitions
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Node names assigned to partition `index`, unordered.
    pub fn nodes_of(&self, index: usize) -> impl Iterator<Item = &str> {
        self.assignment
            .iter()
            .filter(move |(_, &i)| i == index)
            .map(|(name, _)| name.as_str())
    }

    pub fn assigned(&self) -> impl Iterator<Item = (&str, usize)> {
        self.assignment.iter().map(|(n, &i)| (n.as_str(), i))
    }

    /// Absorbs `other`, shifting its partition indices past ours.
    pub fn merge_from(&mut self, other: NodeToPartitionMap) {
        let offset = self.partitions.len();
        self.partitions.extend(other.partitions);
        for (node, index) in other.assignment {
            self.assignment.insert(node, index + offset);
        }
    }

    /// Drops partitions with no assigned nodes, remapping indices.
    pub fn retain_non_empty(&mut self) {
        let mut used = vec![false; self.partitions.len()];
        for &i in self.assignment.values() {
            used[i] = true;
        }
        let mut remap = vec![usize::MAX; self.partitions.len()];
        let mut kept = Vec::with_capacity(self.partitions.len());
        for (i, meta) in self.partitions.drain(..).enumerate() {
            if used[i] {
                remap[i] = kept.len();
                kept.push(meta);
            }
        }
        self.partitions = kept;
        for index in self.assignment.values_mut() {
            *index = remap[*index];
        }
    }

    /// Moves every node of partition `from` into partition `into` and
    /// removes `from`. `into` keeps its name, backend, and logical
    /// devices; the caller refreshes the memory info.
    pub fn merge_partitions(&mut self, into: usize, from: usize) {
        debug_assert_ne!(into, from);
        for index in self.assignment.values_mut() {
            if *index == from {
                *index = into;
            } else if *index > from {
                *index -= 1;
            }
        }
        self.partitions.remove(from);
    }
}

/// Assigns a distinct logical device id to every partition that has none
/// yet, continuing after the highest id already present. Returns the
/// total number of logical devices in use.
pub(crate) fn assign_logical_device_ids(map: &mut NodeToPartitionMap) -> usize {
    let mut next: DeviceId = map
        .partitions()
        .iter()
        .flat_map(|m| m.logical_devices.iter())
        .max()
        .map_or(0, |&m| m + 1);

    for index in 0..map.num_partitions() {
        if map.meta(index).logical_devices.is_empty() {
            map.append_logical_device(index, next);
            next += 1;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_assign() {
        let mut map = NodeToPartitionMap::new();
        let p0 = map.create_partition("f_part1", "CPU");
        let p1 = map.create_partition("f_part2", "CPU");
        map.assign("a", p0);
        map.assign("b", p1);
        map.assign("c", p1);

        assert_eq!(map.partition_of("a"), Some(0));
        assert_eq!(map.partition_of("c"), Some(1));
        assert_eq!(map.partition_of("ghost"), None);
        assert_eq!(map.num_partitions(), 2);

        let mut of1: Vec<&str> = map.nodes_of(p1).collect();
        of1.sort_unstable();
        assert_eq!(of1, vec!["b", "c"]);
    }

    #[test]
    fn test_merge_from_offsets() {
        let mut a = NodeToPartitionMap::new();
        let pa = a.create_partition("a_part1", "CPU");
        a.assign("n1", pa);

        let mut b = NodeToPartitionMap::new();
        let pb = b.create_partition("b_part1", "GPU");
        b.assign("n2", pb);

        a.merge_from(b);
        assert_eq!(a.num_partitions(), 2);
        assert_eq!(a.partition_of("n2"), Some(1));
        assert_eq!(a.meta(1).backend_name, "GPU");
    }

    #[test]
    fn test_retain_non_empty() {
        let mut map = NodeToPartitionMap::new();
        let p0 = map.create_partition("p0", "CPU");
        let _p1 = map.create_partition("p1", "CPU");
        let p2 = map.create_partition("p2", "CPU");
        map.assign("a", p0);
        map.assign("b", p2);

        map.retain_non_empty();
        assert_eq!(map.num_partitions(), 2);
        assert_eq!(map.partition_of("a"), Some(0));
        assert_eq!(map.partition_of("b"), Some(1));
        assert_eq!(map.meta(1).name, "p2");
    }

    #[test]
    fn test_merge_partitions() {
        let mut map = NodeToPartitionMap::new();
        let p0 = map.create_partition("p0", "CPU");
        let p1 = map.create_partition("p1", "CPU");
        let p2 = map.create_partition("p2", "CPU");
        map.assign("a", p0);
        map.assign("b", p1);
        map.assign("c", p2);

        map.merge_partitions(0, 1);
        assert_eq!(map.num_partitions(), 2);
        assert_eq!(map.partition_of("a"), Some(0));
        assert_eq!(map.partition_of("b"), Some(0));
        assert_eq!(map.partition_of("c"), Some(1));
        assert_eq!(map.meta(0).name, "p0");
        assert_eq!(map.meta(1).name, "p2");
    }

    #[test]
    fn test_assign_logical_ids_skips_preassigned() {
        let mut map = NodeToPartitionMap::new();
        let p0 = map.create_partition("p0", "CPU");
        let p1 = map.create_partition("p1", "CPU");
        map.append_logical_device(p0, 5);
        map.assign("a", p0);
        map.assign("b", p1);

        let total = assign_logical_device_ids(&mut map);
        assert_eq!(map.meta(p0).logical_devices, vec![5]);
        assert_eq!(map.meta(p1).logical_devices, vec![6]);
        assert_eq!(total, 7);
    }

    #[test]
    fn test_assign_logical_ids_fresh() {
        let mut map = NodeToPartitionMap::new();
        map.create_partition("p0", "CPU");
        map.create_partition("p1", "CPU");
        let total = assign_logical_device_ids(&mut map);
        assert_eq!(total, 2);
        assert_eq!(map.meta(0).logical_devices, vec![0]);
        assert_eq!(map.meta(1).logical_devices, vec![1]);
    }
}
