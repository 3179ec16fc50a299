// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sink-up BFS levelisation.
//!
//! Level 0 holds the sink (`Save`) nodes; level `i + 1` holds the
//! predecessors of level `i`. A node appears exactly once, at the
//! maximum depth from any sink at which it is discovered — equivalently,
//! its level is the longest consumer-chain distance to a sink.
//!
//! Strategies walk the levels from deepest (the inputs) down to level 0
//! (the sinks); assigning partition ids in that walk order keeps every
//! cross-partition edge pointing from a lower id to a higher one, which
//! is what makes the coarse DAG acyclic by construction.

use graph_ir::{Function, Node, Origin};
use std::collections::HashMap;

/// Levelises `f` sink-up. The returned levels index borrowed nodes;
/// `levels[0]` are the sinks.
pub(crate) fn bfs_levels(f: &Function) -> Vec<Vec<&Node>> {
    // Nodes are stored producer-before-consumer, so one reverse sweep
    // sees every consumer before its producers.
    let mut level_of: HashMap<&str, usize> = HashMap::new();
    let mut consumers_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in f.nodes() {
        for input in &node.inputs {
            if let Origin::Node(producer) = input {
                consumers_of
                    .entry(producer.as_str())
                    .or_default()
                    .push(node.name.as_str());
            }
        }
    }

    let nodes: Vec<&Node> = f.nodes().collect();
    let mut max_level = 0;
    for node in nodes.iter().rev() {
        let level = consumers_of
            .get(node.name.as_str())
            .map(|consumers| {
                consumers
                    .iter()
                    .map(|c| level_of[c] + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        level_of.insert(node.name.as_str(), level);
        max_level = max_level.max(level);
    }

    let mut levels: Vec<Vec<&Node>> = vec![Vec::new(); max_level + 1];
    for node in &nodes {
        levels[level_of[node.name.as_str()]].push(*node);
    }
    if nodes.is_empty() {
        levels.clear();
    }
    levels
}
