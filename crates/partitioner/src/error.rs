// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the partitioner.

use graph_ir::GraphError;
use runtime_types::{ContextError, DagError};

/// Errors that can occur while partitioning a module.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// The module has no functions to partition.
    #[error("module contains no functions")]
    NoFunctions,

    /// A flow that supports a single source function was given more.
    #[error("invalid: {count} functions in a module; the {flow} partition flow supports exactly one")]
    MultipleFunctions { count: usize, flow: &'static str },

    /// No backend passed the three-step acceptance rule for a node.
    #[error("node '{node}' ({kind}) is not supported by any of the provided backends")]
    UnsupportedNode { node: String, kind: String },

    /// Load-balanced placement ran out of partitions for a node.
    #[error("load balance partition error: node '{node}' fits no partition")]
    LoadBalanceFailed { node: String },

    /// A partition's working set exceeds its backend's device memory.
    #[error(
        "partition '{partition}' needs {needed} bytes but '{backend}' devices hold {available}"
    )]
    MemoryCapacityExceeded {
        partition: String,
        backend: String,
        needed: u64,
        available: u64,
    },

    /// No device with the required backend is present.
    #[error("no device with backend '{0}' was provided")]
    NoDeviceForBackend(String),

    /// A backend named by a device has no registered oracle.
    #[error("no backend named '{0}' is registered")]
    UnknownBackend(String),

    /// The user-supplied partition config is inconsistent.
    #[error("malformed partition config: {0}")]
    MalformedConfig(String),

    /// The named function does not exist in the module.
    #[error("cannot find function '{0}' in the module")]
    UnknownFunction(String),

    /// A node was left without a partition assignment.
    #[error("node '{0}' was not assigned to any partition")]
    UnassignedNode(String),

    /// A graph operation failed while materialising partitions.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The produced DAG failed validation.
    #[error(transparent)]
    Dag(#[from] DagError),

    /// The compilation context is malformed.
    #[error(transparent)]
    Context(#[from] ContextError),
}
