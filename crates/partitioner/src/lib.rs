// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # partitioner
//!
//! Splits one operator graph into a cycle-free DAG of sub-functions,
//! each placed on a backend that supports its operators and sized to fit
//! its device's memory.
//!
//! # Strategies
//!
//! | Strategy | Selected when | Splits by |
//! |---|---|---|
//! | config | a `PartitionConfig` is enabled | user-given node map |
//! | profiling | `QuantizationMode::Profile` | backend boundaries, tagged `"Interpreter"` |
//! | load-balanced | one backend kind + `enable_load_balance` | roofline cost and memory |
//! | heterogeneous | everything else | backend support, then memory |
//!
//! Selection is evaluated in that order; the first match wins.
//!
//! # Example
//! ```no_run
//! use partitioner::{BackendRegistry, Partitioner, PartitionerOptions};
//! use runtime_types::{CompilationContext, DeviceInfo};
//! # let mut module = graph_ir::Module::new("m");
//!
//! let registry = BackendRegistry::accept_all(&["CPU"]);
//! let devices = vec![DeviceInfo::new("CPU", 1 << 30)];
//! let partitioner = Partitioner::new(devices, registry, false, true, PartitionerOptions::default());
//! let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();
//! for dag in &dags {
//!     println!("{}", dag.summary());
//! }
//! ```

mod adjust;
mod backend;
mod bfs;
mod error;
mod mapping;
mod materialize;
mod mem;
mod select;
mod strategy;
mod validation;

pub use backend::{Backend, BackendInfo, BackendRegistry, StaticBackend};
pub use error::PartitionError;
pub use mapping::{NodeToPartitionMap, PartitionMeta};

use graph_ir::{Module, Origin};
use runtime_types::{CompilationContext, DagList, DeviceInfo, PartitionConfig, QuantizationMode};
use std::collections::HashSet;

/// Backend name stamped on every partition in profiling mode.
pub const PROFILING_BACKEND: &str = "Interpreter";

/// The flags that steer partitioning, lifted into an explicit value so
/// callers construct them instead of poking process globals.
#[derive(Debug, Clone, Default)]
pub struct PartitionerOptions {
    /// Balance roofline cost across devices when a single backend kind
    /// is present.
    pub enable_load_balance: bool,
    /// Log the partition table after a successful run.
    pub log_partition: bool,
    /// Dump each sub-function's structure at debug level.
    pub dump_partition: bool,
}

/// Compile-time graph partitioner.
///
/// One instance is configured per `add_network` call and consulted once;
/// it holds no cross-call state.
pub struct Partitioner {
    pub(crate) device_info: Vec<DeviceInfo>,
    pub(crate) registry: BackendRegistry,
    pub(crate) saturate_host: bool,
    pub(crate) optimized: bool,
    pub(crate) partition_config: Option<PartitionConfig>,
    pub(crate) options: PartitionerOptions,
    pub(crate) multi_backend_names: bool,
}

impl Partitioner {
    /// Creates a partitioner over `device_info`, resolving backend
    /// oracles through `registry`.
    ///
    /// `saturate_host` replicates small networks across idle devices;
    /// `optimized` records that the graph already went through the
    /// rewrite pipeline (the pipeline itself runs outside this crate).
    pub fn new(
        device_info: Vec<DeviceInfo>,
        registry: BackendRegistry,
        saturate_host: bool,
        optimized: bool,
        options: PartitionerOptions,
    ) -> Self {
        let multi_backend_names = device_info
            .windows(2)
            .any(|w| w[0].backend_name != w[1].backend_name);
        Self {
            device_info,
            registry,
            saturate_host,
            optimized,
            partition_config: None,
            options,
            multi_backend_names,
        }
    }

    /// Like [`Partitioner::new`], with a user-defined partition config
    /// that takes precedence over every automatic strategy.
    pub fn with_config(
        device_info: Vec<DeviceInfo>,
        registry: BackendRegistry,
        saturate_host: bool,
        optimized: bool,
        options: PartitionerOptions,
        config: PartitionConfig,
    ) -> Self {
        let mut p = Self::new(device_info, registry, saturate_host, optimized, options);
        p.partition_config = Some(config);
        p
    }

    /// Partitions `module` and returns one DAG per resulting network.
    ///
    /// On success the source function(s) have been replaced by
    /// sub-functions (except in the trivial single-device case, where the
    /// source function itself becomes the only partition).
    pub fn partition(
        &self,
        module: &mut Module,
        cctx: &CompilationContext,
    ) -> Result<DagList, PartitionError> {
        cctx.verify()?;
        if !self.optimized {
            tracing::debug!(
                "module '{}' enters partitioning unoptimized; the rewrite pipeline runs upstream",
                module.name()
            );
        }

        if let Some(config) = &self.partition_config {
            if config.enabled() {
                tracing::info!("partitioning '{}' from user config", module.name());
                return self.partition_from_config(module, config);
            }
        }

        if cctx.quant_mode == QuantizationMode::Profile {
            tracing::info!("partitioning '{}' for quantisation profiling", module.name());
            return self.quantization_profiling_partition(module, cctx);
        }

        if !self.multi_backend_names && self.options.enable_load_balance {
            tracing::info!("partitioning '{}' for load balance", module.name());
            return self.load_balanced_partition(module, cctx, self.device_info.len());
        }

        tracing::info!("partitioning '{}' heterogeneously", module.name());
        self.heterogeneous_partition(module, cctx)
    }

    /// Picks the function with the largest input-placeholder working set
    /// as the representative for partitioning; ties keep the first one.
    ///
    /// Each candidate's accounting starts at the module constants size.
    /// The baseline cancels when comparing candidates and keeps the
    /// small-fit check conservative about weights.
    pub(crate) fn select_rep_func(&self, module: &Module) -> Result<(String, u64), PartitionError> {
        let baseline = module.constants_size();
        let mut best: Option<(String, u64)> = None;

        for f in module.functions() {
            let mut size = baseline;
            let mut seen: HashSet<&str> = HashSet::new();
            for node in f.nodes() {
                if node.is_save() {
                    continue;
                }
                for input in &node.inputs {
                    let Origin::Placeholder(name) = input else {
                        continue;
                    };
                    if let Some(ph) = module.placeholder(name) {
                        if !ph.is_weight() && seen.insert(name) {
                            size += ph.size_in_bytes();
                        }
                    }
                }
            }
            match &best {
                Some((_, max)) if *max >= size => {}
                _ => best = Some((f.name().to_string(), size)),
            }
        }

        best.ok_or(PartitionError::NoFunctions)
    }

    /// Verifies every sub-function and reports the partition outcome.
    pub(crate) fn finalize(
        &self,
        dags: &DagList,
        mapping: &NodeToPartitionMap,
        module: &Module,
    ) -> Result<(), PartitionError> {
        module.verify()?;

        if self.options.log_partition {
            tracing::info!(
                "module '{}' partitioned into {} function(s)",
                module.name(),
                module.num_functions()
            );
            for meta in mapping.partitions() {
                tracing::info!(
                    "  '{}' on {} (logical {:?}): {}",
                    meta.name,
                    meta.backend_name,
                    meta.logical_devices,
                    meta.mem_info
                );
            }
            for dag in dags {
                tracing::info!("{}", dag.summary());
            }
        }

        if self.options.dump_partition {
            for dag in dags {
                for node in dag.partitions() {
                    if let Some(f) = module.function(&node.name) {
                        tracing::debug!("partition dump:\n{f}");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Replicates every DAG node across otherwise idle devices.
///
/// With `d = num_physical / logical_device_count` duplications, each
/// node gains the ids `original + i × logical_device_count` for
/// `i ∈ 1..d`, so replica ids never collide across nodes. The extra ids
/// make the provisioner load duplicate copies; the executor's
/// round-robin cursor spreads runs across them.
pub(crate) fn saturate_host(logical_device_count: usize, dags: &mut DagList, num_physical: usize) {
    if logical_device_count == 0 {
        return;
    }
    let duplications = num_physical / logical_device_count;
    if duplications < 2 {
        return;
    }
    tracing::debug!(
        "saturating host: {duplications} replica(s) over {logical_device_count} logical device(s)"
    );
    for dag in dags.iter_mut() {
        let ids: Vec<_> = dag.partition_ids().collect();
        for id in ids {
            let node = dag.node_mut(id);
            let mut extra = Vec::new();
            for &logical in &node.logical_devices {
                for i in 1..duplications {
                    extra.push(logical + i * logical_device_count);
                }
            }
            node.logical_devices.extend(extra);
        }
    }
}
