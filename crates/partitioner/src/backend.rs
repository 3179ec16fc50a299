// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend oracles and the per-partition-call backend map.
//!
//! A [`Backend`] answers support questions for one backend kind; the
//! caller registers one per kind in a [`BackendRegistry`] and hands the
//! registry to the partitioner — there is no process-global factory.
//! [`gen_backend_map`] folds the device list into one [`BackendInfo`]
//! per backend kind, assuming devices of the same kind share memory and
//! roofline figures.

use crate::error::PartitionError;
use graph_ir::{Node, NodeKind};
use runtime_types::DeviceInfo;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Support oracle for one backend kind.
pub trait Backend: Send + Sync {
    /// The backend kind this oracle answers for.
    fn backend_name(&self) -> &str;

    /// Whether this backend can execute `node` directly.
    fn is_op_supported(&self, node: &Node) -> bool;

    /// Whether this backend wants `node` lowered into simpler operators
    /// it does support. Lowered nodes are accepted during partitioning.
    fn should_lower(&self, _node: &Node) -> bool {
        false
    }
}

/// A concrete [`Backend`] driven by a static kind set.
///
/// With no kind set it accepts every operator, which is what most
/// general-purpose backends report; tests and single-backend hosts use
/// it directly.
pub struct StaticBackend {
    name: String,
    supported: Option<BTreeSet<NodeKind>>,
}

impl StaticBackend {
    /// An oracle accepting every operator kind.
    pub fn accept_all(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported: None,
        }
    }

    /// An oracle accepting only the listed kinds.
    pub fn with_supported(name: impl Into<String>, kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        Self {
            name: name.into(),
            supported: Some(kinds.into_iter().collect()),
        }
    }
}

impl Backend for StaticBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn is_op_supported(&self, node: &Node) -> bool {
        match &self.supported {
            None => true,
            Some(kinds) => kinds.contains(&node.kind),
        }
    }
}

/// Explicit mapping backend-name → oracle, passed into the partitioner.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `backend` under its own name, replacing any previous
    /// oracle for that name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends
            .insert(backend.backend_name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Convenience: a registry of accept-all oracles for `names`.
    pub fn accept_all(names: &[&str]) -> Self {
        let mut registry = Self::new();
        for name in names {
            registry.register(Arc::new(StaticBackend::accept_all(*name)));
        }
        registry
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Everything the partitioner knows about one backend kind: the oracle,
/// how many devices carry it, and the per-device capacity and roofline
/// figures.
#[derive(Clone)]
pub struct BackendInfo {
    pub backend: Arc<dyn Backend>,
    /// Physical devices of this backend kind.
    pub num_devices: usize,
    /// Per-device memory in bytes.
    pub mem_size: u64,
    pub sram_capacity: u64,
    pub peak_compute: f64,
    pub peak_dram_bw: f64,
    pub peak_sram_bw: f64,
    /// Kinds this backend supports. Empty accepts everything not in
    /// `non_supported_kinds`.
    pub supported_kinds: BTreeSet<NodeKind>,
    /// Kinds this backend never supports.
    pub non_supported_kinds: BTreeSet<NodeKind>,
}

impl BackendInfo {
    /// The three-step acceptance rule:
    ///
    /// 1. the kind must not be in the non-supported set;
    /// 2. the supported set, when non-empty, must contain the kind;
    /// 3. the oracle must want the node lowered or support it directly.
    pub fn accepts(&self, node: &Node) -> bool {
        if self.non_supported_kinds.contains(&node.kind) {
            return false;
        }
        if !self.supported_kinds.is_empty() && !self.supported_kinds.contains(&node.kind) {
            return false;
        }
        self.backend.should_lower(node) || self.backend.is_op_supported(node)
    }
}

impl std::fmt::Debug for BackendInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendInfo")
            .field("backend", &self.backend.backend_name())
            .field("num_devices", &self.num_devices)
            .field("mem_size", &self.mem_size)
            .finish()
    }
}

/// The per-call backend map plus the backend priority order (order of
/// first appearance in the device list).
pub(crate) type BackendMap = BTreeMap<String, BackendInfo>;

/// Folds the device list into one [`BackendInfo`] per backend kind.
///
/// The first device of each kind supplies the capacity and roofline
/// figures; devices of the same kind are assumed identical, so later
/// entries only bump the device count.
pub(crate) fn gen_backend_map(
    device_info: &[DeviceInfo],
    registry: &BackendRegistry,
) -> Result<(BackendMap, Vec<String>), PartitionError> {
    let mut map = BackendMap::new();
    let mut order = Vec::new();

    for device in device_info {
        match map.get_mut(&device.backend_name) {
            Some(info) => info.num_devices += 1,
            None => {
                let backend = registry
                    .get(&device.backend_name)
                    .ok_or_else(|| PartitionError::UnknownBackend(device.backend_name.clone()))?;
                map.insert(
                    device.backend_name.clone(),
                    BackendInfo {
                        backend,
                        num_devices: 1,
                        mem_size: device.available_memory,
                        sram_capacity: device.sram_capacity,
                        peak_compute: device.peak_compute,
                        peak_dram_bw: device.peak_dram_bw,
                        peak_sram_bw: device.peak_sram_bw,
                        supported_kinds: device.supported_nodes.iter().copied().collect(),
                        non_supported_kinds: device.non_supported_nodes.iter().copied().collect(),
                    },
                );
                order.push(device.backend_name.clone());
            }
        }
    }
    Ok((map, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{DType, Node, Origin, Shape, TypeDesc};

    fn node(kind: NodeKind) -> Node {
        Node::new(
            "n",
            kind,
            vec![Origin::placeholder("x")],
            TypeDesc::new(DType::F32, Shape::vector(4)),
        )
    }

    fn info(backend: Arc<dyn Backend>, supported: &[NodeKind], non: &[NodeKind]) -> BackendInfo {
        BackendInfo {
            backend,
            num_devices: 1,
            mem_size: 1 << 20,
            sram_capacity: 0,
            peak_compute: 0.0,
            peak_dram_bw: 0.0,
            peak_sram_bw: 0.0,
            supported_kinds: supported.iter().copied().collect(),
            non_supported_kinds: non.iter().copied().collect(),
        }
    }

    #[test]
    fn test_static_backend() {
        let all = StaticBackend::accept_all("CPU");
        assert!(all.is_op_supported(&node(NodeKind::Conv)));

        let only = StaticBackend::with_supported("GPU", [NodeKind::MatMul]);
        assert!(only.is_op_supported(&node(NodeKind::MatMul)));
        assert!(!only.is_op_supported(&node(NodeKind::Conv)));
    }

    #[test]
    fn test_three_step_rule() {
        let backend: Arc<dyn Backend> = Arc::new(StaticBackend::accept_all("CPU"));

        // Step 1: explicit non-support wins.
        let i = info(backend.clone(), &[], &[NodeKind::Div]);
        assert!(!i.accepts(&node(NodeKind::Div)));
        assert!(i.accepts(&node(NodeKind::Add)));

        // Step 2: a non-empty supported set is a whitelist.
        let i = info(backend.clone(), &[NodeKind::Add], &[]);
        assert!(i.accepts(&node(NodeKind::Add)));
        assert!(!i.accepts(&node(NodeKind::Mul)));

        // Step 3: the oracle gets the final word.
        let gpu: Arc<dyn Backend> = Arc::new(StaticBackend::with_supported("GPU", [NodeKind::MatMul]));
        let i = info(gpu, &[], &[]);
        assert!(i.accepts(&node(NodeKind::MatMul)));
        assert!(!i.accepts(&node(NodeKind::Relu)));
    }

    #[test]
    fn test_registry() {
        let registry = BackendRegistry::accept_all(&["CPU", "GPU"]);
        assert!(registry.contains("CPU"));
        assert!(registry.get("GPU").is_some());
        assert!(registry.get("NPU").is_none());
        assert_eq!(registry.names().count(), 2);
    }

    #[test]
    fn test_gen_backend_map_counts_devices() {
        let registry = BackendRegistry::accept_all(&["CPU", "GPU"]);
        let devices = vec![
            DeviceInfo::new("GPU", 100),
            DeviceInfo::new("CPU", 50),
            DeviceInfo::new("GPU", 100),
        ];
        let (map, order) = gen_backend_map(&devices, &registry).unwrap();
        assert_eq!(order, vec!["GPU".to_string(), "CPU".to_string()]);
        assert_eq!(map["GPU"].num_devices, 2);
        assert_eq!(map["CPU"].num_devices, 1);
        assert_eq!(map["GPU"].mem_size, 100);
    }

    #[test]
    fn test_gen_backend_map_unknown_backend() {
        let registry = BackendRegistry::accept_all(&["CPU"]);
        let devices = vec![DeviceInfo::new("TPU", 100)];
        assert!(matches!(
            gen_backend_map(&devices, &registry),
            Err(PartitionError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_device_kind_filters_reach_info() {
        let registry = BackendRegistry::accept_all(&["NPU"]);
        let devices = vec![DeviceInfo::new("NPU", 100)
            .with_supported(vec![NodeKind::Conv])
            .with_non_supported(vec![NodeKind::Softmax])];
        let (map, _) = gen_backend_map(&devices, &registry).unwrap();
        assert!(map["NPU"].accepts(&node(NodeKind::Conv)));
        assert!(!map["NPU"].accepts(&node(NodeKind::Softmax)));
        assert!(!map["NPU"].accepts(&node(NodeKind::Add)));
    }
}
