// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the host runtime.

use partitioner::PartitionError;
use runtime_types::{ContextError, DagError, DeviceId};

/// Errors surfaced by the host manager, provisioner, and executor.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A function with this name is installed or being installed.
    #[error("network '{0}' is already added or being added")]
    DuplicateNetwork(String),

    /// No network with this name is installed.
    #[error("network '{0}' not found")]
    NetworkNotFound(String),

    /// The network still has requests in flight.
    #[error("network '{name}' is busy: {inflight} request(s) in flight")]
    NetworkBusy { name: String, inflight: usize },

    /// The request was dropped by `clear_host` before dispatch.
    #[error("request cancelled: the host is clearing")]
    RequestCancelled,

    /// A blocking run was rejected at admission (unknown network or
    /// admission limit reached).
    #[error("run request for network '{0}' was rejected")]
    RunRejected(String),

    /// No attached device carries the required backend.
    #[error("no device with backend '{0}' is attached to the host")]
    NoDeviceForBackend(String),

    /// A device cannot hold another sub-function.
    #[error("device {device} cannot hold {needed} more bytes ({available} available)")]
    DeviceOutOfMemory {
        device: DeviceId,
        needed: u64,
        available: u64,
    },

    /// Two device configs claim the same id.
    #[error("duplicate device id {0}")]
    DuplicateDevice(DeviceId),

    /// The referenced device id is not in the table.
    #[error("unknown device id {0}")]
    UnknownDevice(DeviceId),

    /// A DAG node reached the executor without provisioned devices.
    #[error("DAG node '{0}' has no provisioned device")]
    NotProvisioned(String),

    /// The partitioner rejected the network.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// The compilation context is malformed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The network DAG failed validation.
    #[error(transparent)]
    Dag(#[from] DagError),

    /// A failure while executing a request.
    #[error("execution failed: {0}")]
    Execution(String),
}
