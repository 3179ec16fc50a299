// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The host manager: the entry point into the runtime.
//!
//! Owns the installed networks, admits and queues inference requests,
//! and drives the executor. Designed for concurrent callers:
//!
//! - `state_lock` guards the network map and the set of names currently
//!   being added. It is never held across partitioning, provisioning,
//!   or execution.
//! - `queue_lock` guards the priority heap, held only to push or pop.
//! - Request and reference counts are atomics.
//!
//! Queueing is a min-heap over `(priority, request id)`: lower priority
//! values dispatch first, and equal priorities dispatch in submission
//! order because request ids are handed out monotonically.
//!
//! Callbacks fire from executor threads. A callback must not call
//! `remove_network` for its own network before returning, since its
//! request still holds a reference at that point.

use crate::devices::DeviceTable;
use crate::error::HostError;
use crate::executor::{Executor, ResultCallback, ThreadPoolExecutor};
use crate::provisioner::{MemoryProvisioner, Provisioner};
use graph_ir::Module;
use parking_lot::Mutex;
use partitioner::{BackendRegistry, Partitioner, PartitionerOptions};
use runtime_types::{
    CompilationContext, Dag, DeviceConfig, DeviceInfo, ExecutionContext, HostConfig,
    RunIdentifier, INVALID_REQUEST_ID,
};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Counter key: total bytes in use across all devices.
pub const DEVICE_MEMORY_USED: &str = "glow.devices.used_memory.total";
/// Counter key: total bytes still free across all devices.
pub const DEVICE_MEMORY_AVAILABLE: &str = "glow.devices.available_memory.total";
/// Counter key: total bytes of device memory on the host.
pub const DEVICE_MEMORY_MAX: &str = "glow.devices.maximum_memory.total";

/// One installed network.
struct NetworkData {
    dag: Arc<Dag>,
    /// The module the network came from; sub-functions and placeholders
    /// stay alive exactly as long as the network.
    #[allow(dead_code)]
    module: Arc<Module>,
    /// In-flight requests against this network. An atomic rather than a
    /// lock so `run_network` stays lock-free on the hot path.
    refcount: Arc<AtomicUsize>,
}

/// A queued inference request.
struct InferRequest {
    network_name: String,
    context: ExecutionContext,
    callback: ResultCallback,
    priority: u64,
    request_id: u64,
}

impl PartialEq for InferRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.request_id == other.request_id
    }
}

impl Eq for InferRequest {}

impl PartialOrd for InferRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for InferRequest {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Natural order; the heap wraps requests in `Reverse` to pop the
        // lowest (priority, request id) first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.request_id.cmp(&other.request_id))
    }
}

/// Everything `state_lock` protects.
#[derive(Default)]
struct HostState {
    networks: HashMap<String, Arc<NetworkData>>,
    /// Names in the middle of `add_network`; blocks duplicate adds
    /// without holding the lock through compilation.
    processing: HashSet<String>,
}

/// The entry point into the runtime environment: add, run, and evict
/// networks.
///
/// Construct it behind an [`Arc`]; dispatch needs to hand completion
/// hooks to executor threads.
pub struct HostManager {
    config: HostConfig,
    device_info: Vec<DeviceInfo>,
    registry: BackendRegistry,
    partitioner_options: PartitionerOptions,

    state: Mutex<HostState>,
    infer_queue: Mutex<BinaryHeap<Reverse<InferRequest>>>,

    /// Dispatched-but-incomplete runs; bounds executor concurrency.
    active_request_count: AtomicUsize,
    /// Monotonic request id source.
    total_request_count: AtomicU64,

    devices: DeviceTable,
    executor: Box<dyn Executor>,
    provisioner: Box<dyn Provisioner>,
}

impl HostManager {
    /// Creates a host over `device_info`, with one bookkeeping device
    /// entry per descriptor and the reference executor/provisioner.
    pub fn new(
        registry: BackendRegistry,
        device_info: Vec<DeviceInfo>,
        config: HostConfig,
    ) -> Result<Self, HostError> {
        let executor = Box::new(ThreadPoolExecutor::new(config.executor_threads));
        Self::with_parts(registry, device_info, config, executor, Box::new(MemoryProvisioner::new()))
    }

    /// Like [`HostManager::new`], with caller-supplied executor and
    /// provisioner. Tests use this to inject deterministic stubs.
    pub fn with_parts(
        registry: BackendRegistry,
        device_info: Vec<DeviceInfo>,
        config: HostConfig,
        executor: Box<dyn Executor>,
        provisioner: Box<dyn Provisioner>,
    ) -> Result<Self, HostError> {
        let configs: Vec<DeviceConfig> = device_info
            .iter()
            .enumerate()
            .map(|(i, d)| {
                DeviceConfig::new(&d.backend_name, format!("{}:{i}", d.backend_name), i, d.available_memory)
            })
            .collect();
        let devices = DeviceTable::new(configs)?;

        Ok(Self {
            config,
            device_info,
            registry,
            partitioner_options: PartitionerOptions::default(),
            state: Mutex::new(HostState::default()),
            infer_queue: Mutex::new(BinaryHeap::new()),
            active_request_count: AtomicUsize::new(0),
            total_request_count: AtomicU64::new(0),
            devices,
            executor,
            provisioner,
        })
    }

    /// Convenience constructor returning the host ready for sharing.
    pub fn init(
        registry: BackendRegistry,
        device_info: Vec<DeviceInfo>,
        config: HostConfig,
    ) -> Result<Arc<Self>, HostError> {
        Ok(Arc::new(Self::new(registry, device_info, config)?))
    }

    /// Sets the options forwarded to the partitioner on `add_network`.
    pub fn set_partitioner_options(&mut self, options: PartitionerOptions) {
        self.partitioner_options = options;
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    // ── Network lifecycle ──────────────────────────────────────────

    /// Partitions, provisions, and installs every function of `module`
    /// as a network. Consumes the module; on success only sub-functions
    /// remain inside it, owned by the installed networks.
    ///
    /// Partitioning and provisioning run without the state lock held,
    /// so concurrent `run_network` calls against other networks proceed
    /// undisturbed.
    pub fn add_network(
        &self,
        module: Module,
        cctx: &CompilationContext,
        saturate_host: bool,
    ) -> Result<(), HostError> {
        cctx.verify()?;
        let names = module.function_names();

        {
            let mut state = self.state.lock();
            for name in &names {
                if state.networks.contains_key(name) || state.processing.contains(name) {
                    return Err(HostError::DuplicateNetwork(name.clone()));
                }
            }
            for name in &names {
                state.processing.insert(name.clone());
            }
        }

        let built = self.build_network(module, cctx, saturate_host);

        let mut state = self.state.lock();
        match built {
            Err(e) => {
                self.cleanup_add_network(&mut state, &names);
                Err(e)
            }
            Ok((module, dags)) => {
                let module = Arc::new(module);
                for dag in dags {
                    let name = dag.name().to_string();
                    state.networks.insert(
                        name,
                        Arc::new(NetworkData {
                            dag: Arc::new(dag),
                            module: Arc::clone(&module),
                            refcount: Arc::new(AtomicUsize::new(0)),
                        }),
                    );
                }
                for name in &names {
                    state.processing.remove(name);
                }
                drop(state);
                self.export_memory_counters();
                Ok(())
            }
        }
    }

    /// The slow half of `add_network`: partition then provision.
    fn build_network(
        &self,
        mut module: Module,
        cctx: &CompilationContext,
        saturate_host: bool,
    ) -> Result<(Module, Vec<Dag>), HostError> {
        let partitioner = Partitioner::new(
            self.device_info.clone(),
            self.registry.clone(),
            saturate_host,
            false,
            self.partitioner_options.clone(),
        );
        let mut dags = partitioner.partition(&mut module, cctx)?;
        self.provisioner.provision(&mut dags, &self.devices, cctx)?;
        Ok((module, dags))
    }

    /// Rolls a failed `add_network` back. Must run under `state_lock`.
    fn cleanup_add_network(&self, state: &mut HostState, names: &[String]) {
        for name in names {
            if let Some(network) = state.networks.remove(name) {
                // A partially installed entry still holds device memory.
                let _ = self.provisioner.evict(name, &network.dag, &self.devices);
            }
            state.processing.remove(name);
        }
        tracing::warn!("add_network rolled back for {names:?}");
    }

    /// Removes a network; fails while requests against it are in flight.
    pub fn remove_network(&self, network_name: &str) -> Result<(), HostError> {
        let network = {
            let mut state = self.state.lock();
            let network = state
                .networks
                .get(network_name)
                .ok_or_else(|| HostError::NetworkNotFound(network_name.to_string()))?;
            let inflight = network.refcount.load(Ordering::Acquire);
            if inflight > 0 {
                return Err(HostError::NetworkBusy {
                    name: network_name.to_string(),
                    inflight,
                });
            }
            state
                .networks
                .remove(network_name)
                .expect("entry was just found")
        };

        self.provisioner.evict(network_name, &network.dag, &self.devices)?;
        self.export_memory_counters();
        Ok(())
    }

    /// Whether `network_name` is installed.
    pub fn network_added(&self, network_name: &str) -> bool {
        self.state.lock().networks.contains_key(network_name)
    }

    /// The DAG of an installed network.
    pub fn get_network_dag(&self, network_name: &str) -> Result<Arc<Dag>, HostError> {
        let state = self.state.lock();
        state
            .networks
            .get(network_name)
            .map(|n| Arc::clone(&n.dag))
            .ok_or_else(|| HostError::NetworkNotFound(network_name.to_string()))
    }

    /// Drops every network and cancels everything still queued.
    ///
    /// Queued requests get their callbacks fired with a cancellation
    /// error; in-flight requests complete normally before devices are
    /// cleared.
    pub fn clear_host(self: &Arc<Self>) -> Result<(), HostError> {
        // Cancel the queue first so nothing new dispatches.
        let drained: Vec<InferRequest> = {
            let mut queue = self.infer_queue.lock();
            std::mem::take(&mut *queue).into_sorted_vec().into_iter().map(|r| r.0).collect()
        };
        for request in drained {
            let state = self.state.lock();
            if let Some(network) = state.networks.get(&request.network_name) {
                network.refcount.fetch_sub(1, Ordering::AcqRel);
            }
            drop(state);
            (request.callback)(
                request.request_id as RunIdentifier,
                Err(HostError::RequestCancelled),
                request.context,
            );
        }

        // Let in-flight requests finish.
        while self.active_request_count.load(Ordering::Acquire) > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let networks: Vec<(String, Arc<NetworkData>)> = {
            let mut state = self.state.lock();
            state.networks.drain().collect()
        };
        for (name, network) in networks {
            self.provisioner.evict(&name, &network.dag, &self.devices)?;
        }
        self.export_memory_counters();
        Ok(())
    }

    // ── Request path ───────────────────────────────────────────────

    /// Submits an inference request. Lower `priority` values run first;
    /// ties run in submission order.
    ///
    /// Returns the request id, or [`INVALID_REQUEST_ID`] without
    /// invoking `callback` when the network is unknown or the host is
    /// at its admission limit (`max_active_requests + max_queue_size`).
    pub fn run_network(
        self: &Arc<Self>,
        network_name: &str,
        context: ExecutionContext,
        callback: ResultCallback,
        priority: u64,
    ) -> RunIdentifier {
        let refcount = {
            let state = self.state.lock();
            match state.networks.get(network_name) {
                Some(network) => Arc::clone(&network.refcount),
                None => return INVALID_REQUEST_ID,
            }
        };

        let request_id = {
            let mut queue = self.infer_queue.lock();
            let admitted = self.active_request_count.load(Ordering::Acquire) + queue.len();
            if admitted >= self.config.admission_limit() {
                tracing::debug!(
                    "rejecting request for '{network_name}': {admitted} admitted, limit {}",
                    self.config.admission_limit()
                );
                return INVALID_REQUEST_ID;
            }

            let request_id = self.total_request_count.fetch_add(1, Ordering::AcqRel);
            refcount.fetch_add(1, Ordering::AcqRel);
            queue.push(Reverse(InferRequest {
                network_name: network_name.to_string(),
                context,
                callback,
                priority,
                request_id,
            }));
            request_id
        };

        self.dispatch_next_run();
        request_id as RunIdentifier
    }

    /// Blocking wrapper around [`HostManager::run_network`] at default
    /// priority.
    pub fn run_network_blocking(
        self: &Arc<Self>,
        network_name: &str,
        context: ExecutionContext,
    ) -> Result<ExecutionContext, HostError> {
        let (sender, receiver) = mpsc::channel();
        let id = self.run_network(
            network_name,
            context,
            Box::new(move |_, result, ctx| {
                let _ = sender.send((result, ctx));
            }),
            0,
        );
        if id == INVALID_REQUEST_ID {
            return Err(HostError::RunRejected(network_name.to_string()));
        }
        let (result, ctx) = receiver
            .recv()
            .map_err(|_| HostError::Execution("executor dropped the request".into()))?;
        result.map(|()| ctx)
    }

    /// Pops ready requests while executor slots are free and hands them
    /// to the executor. Re-entered from every completion hook.
    fn dispatch_next_run(self: &Arc<Self>) {
        loop {
            // Claim a slot first; give it back if the queue is empty.
            let claimed = self
                .active_request_count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                    (active < self.config.max_active_requests).then_some(active + 1)
                })
                .is_ok();
            if !claimed {
                return;
            }

            let request = { self.infer_queue.lock().pop() };
            let Some(Reverse(request)) = request else {
                self.active_request_count.fetch_sub(1, Ordering::AcqRel);
                return;
            };

            let network = {
                let state = self.state.lock();
                state.networks.get(&request.network_name).cloned()
            };
            let Some(network) = network else {
                // The network vanished while queued (host clearing).
                self.active_request_count.fetch_sub(1, Ordering::AcqRel);
                (request.callback)(
                    request.request_id as RunIdentifier,
                    Err(HostError::NetworkNotFound(request.network_name.clone())),
                    request.context,
                );
                continue;
            };

            tracing::debug!(
                "dispatching request {} for '{}' (priority {})",
                request.request_id,
                request.network_name,
                request.priority
            );

            let host = Arc::clone(self);
            let refcount = Arc::clone(&network.refcount);
            let user_callback = request.callback;
            let completion: ResultCallback = Box::new(move |id, result, ctx| {
                user_callback(id, result, ctx);
                refcount.fetch_sub(1, Ordering::AcqRel);
                host.active_request_count.fetch_sub(1, Ordering::AcqRel);
                host.dispatch_next_run();
            });

            self.executor.run(
                request.request_id as RunIdentifier,
                Arc::clone(&network.dag),
                request.context,
                completion,
            );
        }
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Current aggregate device-memory counters.
    pub fn memory_counters(&self) -> HashMap<&'static str, u64> {
        HashMap::from([
            (DEVICE_MEMORY_USED, self.devices.used_total()),
            (DEVICE_MEMORY_AVAILABLE, self.devices.available_total()),
            (DEVICE_MEMORY_MAX, self.devices.capacity_total()),
        ])
    }

    /// Publishes the aggregate memory counters.
    fn export_memory_counters(&self) {
        tracing::info!(
            "{DEVICE_MEMORY_USED}={} {DEVICE_MEMORY_AVAILABLE}={} {DEVICE_MEMORY_MAX}={}",
            self.devices.used_total(),
            self.devices.available_total(),
            self.devices.capacity_total()
        );
    }
}
