// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime-types
//!
//! The vocabulary shared between the partitioner and the host runtime:
//!
//! - [`DeviceInfo`] / [`DeviceConfig`] — what the partitioner and the
//!   host know about each accelerator.
//! - [`GraphMemInfo`] — the working-set accounting record attached to
//!   every partition.
//! - [`Dag`] / [`DagNode`] — the post-partition graph of sub-functions,
//!   stored as an arena indexed by [`DagNodeId`] so parent/child links
//!   never form ownership cycles.
//! - [`CompilationContext`] / [`QuantizationMode`] — the slice of the
//!   compilation pipeline the partitioner observes.
//! - [`ExecutionContext`] — the per-request state handed to the executor.
//! - [`HostConfig`] / [`PartitionConfig`] — host limits and the
//!   user-defined partition description.

mod config;
mod context;
mod dag;
mod device;
mod error;
mod mem;

pub use config::{HostConfig, PartitionConfig};
pub use context::{CompilationContext, ExecutionContext, PlaceholderBindings, QuantizationMode};
pub use dag::{Dag, DagList, DagNode, DagNodeId};
pub use device::{DeviceConfig, DeviceId, DeviceInfo};
pub use error::{ContextError, DagError};
pub use mem::GraphMemInfo;

/// Identifier returned by `run_network`; strictly monotone per host.
pub type RunIdentifier = i64;

/// Sentinel returned when a run request is rejected at admission.
pub const INVALID_REQUEST_ID: RunIdentifier = -1;
