// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # host-runtime
//!
//! The runtime host for partitioned networks: admission control, a
//! priority queue of inference requests, per-device memory accounting,
//! and dispatch to an executor.
//!
//! The flow mirrors the crate boundaries:
//!
//! 1. [`HostManager::add_network`] hands a module to the `partitioner`
//!    crate, then to a [`Provisioner`] that places sub-functions on
//!    devices.
//! 2. [`HostManager::run_network`] queues a request; when an executor
//!    slot frees up the host pops the lowest `(priority, request id)`
//!    pair and the [`Executor`] walks the network's DAG.
//! 3. The request callback fires with the result and the caller's
//!    [`runtime_types::ExecutionContext`].
//!
//! # Example
//! ```no_run
//! use host_runtime::HostManager;
//! use partitioner::BackendRegistry;
//! use runtime_types::{CompilationContext, DeviceInfo, ExecutionContext, HostConfig};
//! # let module = graph_ir::Module::new("m");
//!
//! let host = HostManager::init(
//!     BackendRegistry::accept_all(&["CPU"]),
//!     vec![DeviceInfo::new("CPU", 1 << 30)],
//!     HostConfig::default(),
//! )
//! .unwrap();
//!
//! host.add_network(module, &CompilationContext::new(), false).unwrap();
//! let ctx = host.run_network_blocking("main", ExecutionContext::new()).unwrap();
//! # let _ = ctx;
//! ```

mod devices;
mod error;
mod executor;
mod manager;
mod provisioner;

pub use devices::{Device, DeviceTable};
pub use error::HostError;
pub use executor::{Executor, ResultCallback, ThreadPoolExecutor};
pub use manager::{
    HostManager, DEVICE_MEMORY_AVAILABLE, DEVICE_MEMORY_MAX, DEVICE_MEMORY_USED,
};
pub use provisioner::{MemoryProvisioner, Provisioner};
