// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Turns a node → partition mapping into real sub-functions and a DAG.
//!
//! Every value edge that crosses a partition boundary is materialised as
//! a module placeholder: the producing partition gains a `Save` node
//! writing it, and every consuming partition reads it as an input. One
//! placeholder serves all external consumers of a producer's output.
//!
//! Parent/child edges between `DagNode`s are then derived from who
//! writes and who reads each placeholder, which also covers placeholders
//! cut in an earlier partitioning round. The synthetic root fans out to
//! the partitions with no cross-partition inputs.

use crate::error::PartitionError;
use crate::mapping::NodeToPartitionMap;
use graph_ir::{Function, GraphError, Module, Node, Origin, Placeholder, PlaceholderRole, TypeDesc};
use runtime_types::{Dag, DagNode};
use std::collections::{HashMap, HashSet};

/// Materialises `mapping` over the source functions `funcs`.
///
/// Creates one sub-function per partition in `module` (the sources are
/// left for the caller to erase) and, when `save_dag` is set, builds the
/// DAG named `name` over them.
pub(crate) fn do_partitioning(
    name: &str,
    funcs: &[String],
    module: &mut Module,
    mapping: &NodeToPartitionMap,
    save_dag: bool,
) -> Result<Option<Dag>, PartitionError> {
    // Pass 1: find every producer whose output crosses a partition cut.
    let mut cuts: Vec<(String, usize, TypeDesc)> = Vec::new();
    {
        let mut seen: HashSet<String> = HashSet::new();
        for fname in funcs {
            let f = module
                .function(fname)
                .ok_or_else(|| PartitionError::UnknownFunction(fname.clone()))?;
            for node in f.nodes() {
                let p = partition_of(mapping, &node.name)?;
                for input in &node.inputs {
                    let Origin::Node(producer) = input else {
                        continue;
                    };
                    let pp = partition_of(mapping, producer)?;
                    if pp == p || !seen.insert(producer.clone()) {
                        continue;
                    }
                    let ty = f.node(producer).and_then(|n| n.output.clone()).ok_or_else(|| {
                        GraphError::InvalidFunction {
                            function: fname.clone(),
                            detail: format!("cut producer '{producer}' has no output type"),
                        }
                    })?;
                    cuts.push((producer.clone(), pp, ty));
                }
            }
        }
    }

    // Register one placeholder per cut producer.
    let mut cut_placeholder: HashMap<String, String> = HashMap::new();
    for (producer, _, ty) in &cuts {
        let ph_name = module.fresh_placeholder_name(&format!("{producer}_cut"));
        module.add_placeholder(Placeholder::new(
            &ph_name,
            ty.dtype,
            ty.shape.clone(),
            PlaceholderRole::Output,
        ))?;
        cut_placeholder.insert(producer.clone(), ph_name);
    }

    // Pass 2: clone every node into its partition, rewriting cut inputs.
    let mut new_funcs: Vec<Function> = mapping
        .partitions()
        .iter()
        .map(|meta| Function::new(&meta.name))
        .collect();
    for fname in funcs {
        let f = module
            .function(fname)
            .ok_or_else(|| PartitionError::UnknownFunction(fname.clone()))?;
        for node in f.nodes() {
            let p = partition_of(mapping, &node.name)?;
            let mut cloned = node.clone();
            for input in &mut cloned.inputs {
                let replacement = if let Origin::Node(producer) = &*input {
                    if partition_of(mapping, producer)? != p {
                        Some(cut_placeholder[producer.as_str()].clone())
                    } else {
                        None
                    }
                } else {
                    None
                };
                if let Some(ph_name) = replacement {
                    *input = Origin::Placeholder(ph_name);
                }
            }
            new_funcs[p].add_node(cloned)?;
        }
    }

    // Producing partitions save their cut values.
    for (producer, pp, _) in &cuts {
        let ph_name = &cut_placeholder[producer.as_str()];
        let mut save_name = format!("save_{ph_name}");
        let mut k = 1;
        while new_funcs[*pp].has_node(&save_name) {
            save_name = format!("save_{ph_name}_{k}");
            k += 1;
        }
        new_funcs[*pp].add_node(Node::save(save_name, Origin::node(producer.clone()), ph_name.clone()))?;
    }

    for f in new_funcs {
        module.add_function(f)?;
    }

    if !save_dag {
        return Ok(None);
    }

    // Pass 3: build the DAG over the installed sub-functions.
    let mut dag = Dag::new(name);
    let ids: Vec<_> = mapping
        .partitions()
        .iter()
        .map(|meta| {
            let mut node = DagNode::new(&meta.name, &meta.backend_name);
            node.logical_devices = meta.logical_devices.clone();
            node.mem_info = meta.mem_info;
            dag.add_node(node)
        })
        .collect();

    // Who writes each placeholder (covers cuts from any round).
    let mut writer: HashMap<String, usize> = HashMap::new();
    for (i, meta) in mapping.partitions().iter().enumerate() {
        let f = module
            .function(&meta.name)
            .ok_or_else(|| PartitionError::UnknownFunction(meta.name.clone()))?;
        for node in f.save_nodes() {
            if let Some(target) = &node.saved_to {
                writer.insert(target.clone(), i);
            }
        }
    }

    for (reader, meta) in mapping.partitions().iter().enumerate() {
        let f = module
            .function(&meta.name)
            .ok_or_else(|| PartitionError::UnknownFunction(meta.name.clone()))?;
        for node in f.nodes() {
            for input in &node.inputs {
                if let Origin::Placeholder(ph) = input {
                    if let Some(&producer) = writer.get(ph.as_str()) {
                        if producer != reader {
                            dag.add_edge(ids[producer], ids[reader]);
                        }
                    }
                }
            }
        }
    }

    let root = dag.root();
    for &id in &ids {
        if dag.node(id).parents.is_empty() {
            dag.add_edge(root, id);
        }
    }

    Ok(Some(dag))
}

fn partition_of(mapping: &NodeToPartitionMap, node: &str) -> Result<usize, PartitionError> {
    mapping
        .partition_of(node)
        .ok_or_else(|| PartitionError::UnassignedNode(node.to_string()))
}
