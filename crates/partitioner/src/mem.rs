// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Working-set accounting and roofline cost estimates.
//!
//! # Accounting rules
//!
//! For a candidate node set `S` within function `F`:
//!
//! - `in_bytes` — distinct non-weight placeholders read by `S`, plus the
//!   outputs of nodes outside `S` that `S` consumes. Edges internal to
//!   `S` cost nothing.
//! - `out_bytes` — outputs of nodes in `S` consumed outside `S`, plus
//!   the placeholders written by `Save` nodes in `S`. A `Save` target is
//!   never double-counted as an input.
//! - `const_bytes` — distinct weight placeholders read by `S`, counted
//!   once no matter how many nodes share them.

use crate::backend::BackendInfo;
use crate::error::PartitionError;
use graph_ir::{Function, Module, Node, NodeKind, Origin, TypeDesc};
use runtime_types::GraphMemInfo;
use std::collections::HashSet;

/// Computes the working set of the node set `set` within `f`.
///
/// Recomputed from scratch on each call; the strategies' sets grow one
/// node at a time but stay small enough that clarity wins over an
/// incremental update.
pub(crate) fn partition_mem_info(
    set: &HashSet<String>,
    f: &Function,
    module: &Module,
) -> Result<GraphMemInfo, PartitionError> {
    let mut info = GraphMemInfo::default();
    let mut counted_in: HashSet<&str> = HashSet::new();
    let mut counted_const: HashSet<&str> = HashSet::new();
    let mut counted_cross: HashSet<&str> = HashSet::new();
    let mut counted_out: HashSet<&str> = HashSet::new();

    for node in f.nodes().filter(|n| set.contains(&n.name)) {
        for input in &node.inputs {
            match input {
                Origin::Placeholder(name) => {
                    let ph = module.placeholder(name).ok_or_else(|| {
                        PartitionError::Graph(graph_ir::GraphError::UnknownPlaceholder {
                            node: node.name.clone(),
                            placeholder: name.clone(),
                        })
                    })?;
                    if ph.is_weight() {
                        if counted_const.insert(name) {
                            info.const_bytes += ph.size_in_bytes();
                        }
                    } else if counted_in.insert(name) {
                        info.in_bytes += ph.size_in_bytes();
                    }
                }
                Origin::Node(producer) => {
                    if !set.contains(producer) && counted_cross.insert(producer) {
                        let bytes = f.node(producer).map_or(0, Node::output_bytes);
                        info.in_bytes += bytes;
                    }
                }
            }
        }

        if node.is_save() {
            if let Some(target) = &node.saved_to {
                let ph = module.placeholder(target).ok_or_else(|| {
                    PartitionError::Graph(graph_ir::GraphError::UnknownPlaceholder {
                        node: node.name.clone(),
                        placeholder: target.clone(),
                    })
                })?;
                if counted_out.insert(target) {
                    info.out_bytes += ph.size_in_bytes();
                }
            }
        } else if f.consumers(&node.name).any(|c| !set.contains(&c.name)) {
            info.out_bytes += node.output_bytes();
        }
    }
    Ok(info)
}

/// Memory a single node pins on its device: its distinct weight inputs
/// plus its output buffer.
pub(crate) fn node_mem_usage(node: &Node, module: &Module) -> u64 {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut bytes = node.output_bytes();
    for input in &node.inputs {
        if let Origin::Placeholder(name) = input {
            if let Some(ph) = module.placeholder(name) {
                if ph.is_weight() && seen.insert(name) {
                    bytes += ph.size_in_bytes();
                }
            }
        }
    }
    bytes
}

/// Resolves the type of one input edge.
fn input_type<'a>(input: &'a Origin, f: &'a Function, module: &'a Module) -> Option<TypeDesc> {
    match input {
        Origin::Node(producer) => f.node(producer).and_then(|n| n.output.clone()),
        Origin::Placeholder(name) => module.placeholder(name).map(|p| p.type_desc()),
    }
}

/// Estimated FLOPs for a node, from its kind and shapes.
fn node_flops(node: &Node, f: &Function, module: &Module) -> f64 {
    let out_elems = node
        .output
        .as_ref()
        .map_or(0.0, |t| t.shape.num_elements() as f64);

    match node.kind {
        // 2·M·K·N: two FLOPs per multiply-accumulate over the inner dim.
        NodeKind::MatMul | NodeKind::FullyConnected => {
            let inner = node
                .inputs
                .first()
                .and_then(|i| input_type(i, f, module))
                .and_then(|t| t.shape.dims().last().copied())
                .unwrap_or(1) as f64;
            2.0 * out_elems * inner
        }
        // Output volume times the per-output kernel work.
        NodeKind::Conv => {
            let kernel = node
                .inputs
                .get(1)
                .and_then(|i| input_type(i, f, module))
                .map(|t| {
                    let elems = t.shape.num_elements() as f64;
                    let out_channels = t.shape.dim(0).unwrap_or(1).max(1) as f64;
                    elems / out_channels
                })
                .unwrap_or(1.0);
            2.0 * out_elems * kernel
        }
        NodeKind::Softmax => 4.0 * out_elems,
        NodeKind::MaxPool | NodeKind::AvgPool => out_elems,
        NodeKind::Add
        | NodeKind::Sub
        | NodeKind::Mul
        | NodeKind::Div
        | NodeKind::Relu
        | NodeKind::Sigmoid
        | NodeKind::Tanh => out_elems,
        // Pure data movement.
        NodeKind::Transpose
        | NodeKind::Reshape
        | NodeKind::Concat
        | NodeKind::Gather
        | NodeKind::SparseGather
        | NodeKind::Save => 0.0,
    }
}

/// Roofline runtime estimate for one node on one backend:
/// `max(flops / peak_compute, moved_bytes / peak_dram_bw)`.
/// A zero peak disables the corresponding term.
pub(crate) fn node_compute_time(
    node: &Node,
    f: &Function,
    module: &Module,
    info: &BackendInfo,
) -> f64 {
    let flops = node_flops(node, f, module);
    let compute_time = if info.peak_compute > 0.0 {
        flops / info.peak_compute
    } else {
        0.0
    };

    let moved_bytes: u64 = node
        .inputs
        .iter()
        .filter_map(|i| input_type(i, f, module))
        .map(|t| t.size_in_bytes())
        .sum::<u64>()
        + node.output_bytes();
    let mem_time = if info.peak_dram_bw > 0.0 {
        moved_bytes as f64 / info.peak_dram_bw
    } else {
        0.0
    };

    compute_time.max(mem_time)
}
