// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The post-partition DAG of sub-functions.
//!
//! # Arena representation
//!
//! Parent/child links are inherently cyclic as pointers, so the DAG is
//! stored as an arena: a flat `Vec<DagNode>` indexed by [`DagNodeId`],
//! with `parents`/`children` holding ids rather than references. Slot 0
//! is always the synthetic root, whose only role is to fan out to the
//! entry sub-functions.
//!
//! A `Dag` is immutable once the partitioner hands it over, except for
//! the per-node round-robin cursor, which is atomic so executors can
//! share the DAG behind an `Arc`.

use crate::device::DeviceId;
use crate::error::DagError;
use crate::mem::GraphMemInfo;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Index of a node within a [`Dag`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DagNodeId(usize);

impl DagNodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DagNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One sub-function in the partitioned network, plus everything the
/// provisioner and executor need to run it.
#[derive(Debug)]
pub struct DagNode {
    /// Sub-function name; also the id handed to device managers.
    pub name: String,
    /// Backend that compiles and runs this sub-function.
    pub backend_name: String,
    /// Nodes this one depends on.
    pub parents: Vec<DagNodeId>,
    /// Nodes depending on this one.
    pub children: Vec<DagNodeId>,
    /// Partitioner-assigned virtual devices. More than one means the
    /// sub-function is replicated (`saturate_host`).
    pub logical_devices: Vec<DeviceId>,
    /// Physical devices the provisioner loaded this sub-function onto.
    pub physical_devices: Vec<DeviceId>,
    /// Working-set accounting for this sub-function.
    pub mem_info: GraphMemInfo,
    /// Round-robin cursor over `physical_devices`.
    current_device_index: AtomicUsize,
}

impl DagNode {
    pub fn new(name: impl Into<String>, backend_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend_name: backend_name.into(),
            parents: Vec::new(),
            children: Vec::new(),
            logical_devices: Vec::new(),
            physical_devices: Vec::new(),
            mem_info: GraphMemInfo::default(),
            current_device_index: AtomicUsize::new(0),
        }
    }

    /// Picks the next physical device for a run, rotating through the
    /// provisioned replicas. `None` until the node is provisioned.
    pub fn next_device(&self) -> Option<DeviceId> {
        if self.physical_devices.is_empty() {
            return None;
        }
        let idx = self.current_device_index.fetch_add(1, Ordering::Relaxed);
        Some(self.physical_devices[idx % self.physical_devices.len()])
    }
}

/// A partitioned network: one synthetic root plus the sub-function nodes.
#[derive(Debug)]
pub struct Dag {
    nodes: Vec<DagNode>,
}

/// The partitioner's output: one `Dag` per source function.
pub type DagList = Vec<Dag>;

impl Dag {
    /// Creates a DAG containing only the synthetic root.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            nodes: vec![DagNode::new(name, "")],
        }
    }

    /// The synthetic root's id (always slot 0).
    pub fn root(&self) -> DagNodeId {
        DagNodeId(0)
    }

    /// The network name: the synthetic root's name.
    pub fn name(&self) -> &str {
        &self.nodes[0].name
    }

    pub fn node(&self, id: DagNodeId) -> &DagNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: DagNodeId) -> &mut DagNode {
        &mut self.nodes[id.0]
    }

    /// Appends a node and returns its id.
    pub fn add_node(&mut self, node: DagNode) -> DagNodeId {
        self.nodes.push(node);
        DagNodeId(self.nodes.len() - 1)
    }

    /// Links `parent → child`, ignoring a duplicate edge.
    pub fn add_edge(&mut self, parent: DagNodeId, child: DagNodeId) {
        if !self.nodes[parent.0].children.contains(&child) {
            self.nodes[parent.0].children.push(child);
        }
        if !self.nodes[child.0].parents.contains(&parent) {
            self.nodes[child.0].parents.push(parent);
        }
    }

    /// All node ids including the root.
    pub fn ids(&self) -> impl Iterator<Item = DagNodeId> {
        (0..self.nodes.len()).map(DagNodeId)
    }

    /// Ids of the sub-function nodes (everything but the root).
    pub fn partition_ids(&self) -> impl Iterator<Item = DagNodeId> {
        (1..self.nodes.len()).map(DagNodeId)
    }

    /// Sub-function nodes in arena order.
    pub fn partitions(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.iter().skip(1)
    }

    pub fn num_partitions(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Kahn's algorithm from the root. Fails on a cycle; a node left
    /// unvisited with pending parents indicates one.
    pub fn topo_order(&self) -> Result<Vec<DagNodeId>, DagError> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.parents.len()).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut ready: VecDeque<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parents.is_empty())
            .map(|(i, _)| i)
            .collect();

        while let Some(i) = ready.pop_front() {
            order.push(DagNodeId(i));
            for &child in &self.nodes[i].children {
                if child.0 >= self.nodes.len() {
                    return Err(DagError::BadNodeId {
                        dag: self.name().to_string(),
                        id: child.0,
                        len: self.nodes.len(),
                    });
                }
                pending[child.0] -= 1;
                if pending[child.0] == 0 {
                    ready.push_back(child.0);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = pending
                .iter()
                .enumerate()
                .find(|(_, &p)| p > 0)
                .map(|(i, _)| self.nodes[i].name.clone())
                .unwrap_or_default();
            return Err(DagError::Cycle {
                dag: self.name().to_string(),
                node: stuck,
            });
        }
        Ok(order)
    }

    /// Validates the structure: the synthetic root is the only parentless
    /// node, there are no cycles, and every node is reachable from the
    /// root.
    pub fn validate(&self) -> Result<(), DagError> {
        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            if node.parents.is_empty() {
                return Err(DagError::ExtraRoot {
                    dag: self.name().to_string(),
                    node: self.nodes[i].name.clone(),
                });
            }
        }

        self.topo_order()?;

        // Reachability from the root.
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![0usize];
        seen[0] = true;
        while let Some(i) = stack.pop() {
            for &child in &self.nodes[i].children {
                if !seen[child.0] {
                    seen[child.0] = true;
                    stack.push(child.0);
                }
            }
        }
        if let Some((i, _)) = seen.iter().enumerate().find(|(_, &s)| !s) {
            return Err(DagError::Unreachable {
                dag: self.name().to_string(),
                node: self.nodes[i].name.clone(),
            });
        }
        Ok(())
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let backends: Vec<&str> = self
            .partitions()
            .map(|n| n.backend_name.as_str())
            .collect();
        format!(
            "DAG '{}': {} partition(s), backends {:?}",
            self.name(),
            self.num_partitions(),
            backends
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root → a → b, root → c, c → b
    fn diamondish() -> (Dag, DagNodeId, DagNodeId, DagNodeId) {
        let mut dag = Dag::new("net");
        let a = dag.add_node(DagNode::new("a", "CPU"));
        let b = dag.add_node(DagNode::new("b", "CPU"));
        let c = dag.add_node(DagNode::new("c", "CPU"));
        let root = dag.root();
        dag.add_edge(root, a);
        dag.add_edge(root, c);
        dag.add_edge(a, b);
        dag.add_edge(c, b);
        (dag, a, b, c)
    }

    #[test]
    fn test_build_and_validate() {
        let (dag, a, b, _c) = diamondish();
        assert_eq!(dag.name(), "net");
        assert_eq!(dag.num_partitions(), 3);
        assert_eq!(dag.node(b).parents.len(), 2);
        assert_eq!(dag.node(a).children, vec![b]);
        dag.validate().unwrap();
    }

    #[test]
    fn test_duplicate_edge_ignored() {
        let mut dag = Dag::new("net");
        let a = dag.add_node(DagNode::new("a", "CPU"));
        dag.add_edge(dag.root(), a);
        dag.add_edge(dag.root(), a);
        assert_eq!(dag.node(dag.root()).children.len(), 1);
        assert_eq!(dag.node(a).parents.len(), 1);
    }

    #[test]
    fn test_topo_order_is_parent_first() {
        let (dag, a, b, c) = diamondish();
        let order = dag.topo_order().unwrap();
        let pos = |id: DagNodeId| order.iter().position(|&x| x == id).unwrap();
        assert_eq!(pos(dag.root()), 0);
        assert!(pos(a) < pos(b));
        assert!(pos(c) < pos(b));
    }

    #[test]
    fn test_cycle_detected() {
        let mut dag = Dag::new("net");
        let a = dag.add_node(DagNode::new("a", "CPU"));
        let b = dag.add_node(DagNode::new("b", "CPU"));
        dag.add_edge(dag.root(), a);
        dag.add_edge(a, b);
        dag.add_edge(b, a);
        assert!(matches!(dag.topo_order(), Err(DagError::Cycle { .. })));
    }

    #[test]
    fn test_extra_root_detected() {
        let mut dag = Dag::new("net");
        let a = dag.add_node(DagNode::new("a", "CPU"));
        dag.add_edge(dag.root(), a);
        dag.add_node(DagNode::new("floating", "CPU"));
        assert!(matches!(dag.validate(), Err(DagError::ExtraRoot { .. })));
    }

    #[test]
    fn test_round_robin_devices() {
        let mut node = DagNode::new("a", "CPU");
        assert_eq!(node.next_device(), None);
        node.physical_devices = vec![3, 5];
        assert_eq!(node.next_device(), Some(3));
        assert_eq!(node.next_device(), Some(5));
        assert_eq!(node.next_device(), Some(3));
    }

    #[test]
    fn test_summary() {
        let (dag, ..) = diamondish();
        let s = dag.summary();
        assert!(s.contains("'net'"));
        assert!(s.contains("3 partition(s)"));
    }
}
