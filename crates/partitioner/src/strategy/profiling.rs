// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantisation-profiling partitioning.
//!
//! Profiling runs every sub-function on the profiling backend, so no
//! memory-bounded cut is needed; the graph is still split along real
//! backend boundaries to preserve the mapping between profiled tensors
//! and their eventual placement. The DAG is materialised immediately,
//! with logical device ids handed out in partition order.

use crate::backend::gen_backend_map;
use crate::error::PartitionError;
use crate::materialize::do_partitioning;
use crate::Partitioner;
use graph_ir::Module;
use runtime_types::{CompilationContext, DagList};

impl Partitioner {
    pub(crate) fn quantization_profiling_partition(
        &self,
        module: &mut Module,
        cctx: &CompilationContext,
    ) -> Result<DagList, PartitionError> {
        super::heterogeneous::require_single_function(module, "quantisation profiling")?;

        let (backend_map, backend_order) = gen_backend_map(&self.device_info, &self.registry)?;
        let (rep_name, _) = self.select_rep_func(module)?;

        let mut mapping =
            self.backend_based_partition(module, &rep_name, &backend_map, &backend_order, cctx)?;

        // Profiling stops after the backend split, so the DAG is built
        // here: one logical device per partition, in order.
        for index in 0..mapping.num_partitions() {
            mapping.append_logical_device(index, index);
        }

        let dag = do_partitioning(&rep_name, &[rep_name.clone()], module, &mapping, true)?
            .expect("save_dag was requested");
        module.erase_function(&rep_name)?;

        tracing::info!(
            "profiling partition: {} sub-function(s), all running on the {} backend",
            mapping.num_partitions(),
            crate::PROFILING_BACKEND
        );

        let dags = vec![dag];
        self.finalize(&dags, &mapping, module)?;
        Ok(dags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendRegistry, PartitionerOptions, StaticBackend, PROFILING_BACKEND};
    use graph_ir::{DType, Function, Node, NodeKind, Origin, Placeholder, PlaceholderRole, Shape, TypeDesc};
    use runtime_types::{DeviceInfo, PlaceholderBindings, QuantizationMode};
    use std::sync::Arc;

    fn ty() -> TypeDesc {
        TypeDesc::new(DType::F32, Shape::vector(8))
    }

    fn mixed_module() -> Module {
        let mut m = Module::new("m");
        m.add_placeholder(Placeholder::new("x", DType::F32, Shape::vector(8), PlaceholderRole::Input))
            .unwrap();
        m.add_placeholder(Placeholder::new("y", DType::F32, Shape::vector(8), PlaceholderRole::Output))
            .unwrap();
        let mut f = Function::new("net");
        f.add_node(Node::new("mm", NodeKind::MatMul, vec![Origin::placeholder("x")], ty()))
            .unwrap();
        f.add_node(Node::new("sg", NodeKind::SparseGather, vec![Origin::node("mm")], ty()))
            .unwrap();
        f.add_node(Node::save("s", Origin::node("sg"), "y")).unwrap();
        m.add_function(f).unwrap();
        m
    }

    fn profiling_cctx() -> CompilationContext {
        CompilationContext::profiling(PlaceholderBindings::new())
    }

    #[test]
    fn test_partitions_tagged_with_profiling_backend() {
        let mut module = mixed_module();
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(StaticBackend::with_supported("GPU", [NodeKind::MatMul])));
        registry.register(Arc::new(StaticBackend::with_supported(
            "CPU",
            [NodeKind::SparseGather, NodeKind::Save],
        )));
        let devices = vec![DeviceInfo::new("GPU", 1 << 30), DeviceInfo::new("CPU", 1 << 30)];
        let p = Partitioner::new(devices, registry, false, true, PartitionerOptions::default());

        let dags = p.partition(&mut module, &profiling_cctx()).unwrap();
        assert_eq!(dags.len(), 1);
        let dag = &dags[0];
        dag.validate().unwrap();
        // Split at the backend boundary, but tagged for the profiler.
        assert_eq!(dag.num_partitions(), 2);
        for node in dag.partitions() {
            assert_eq!(node.backend_name, PROFILING_BACKEND);
        }
    }

    #[test]
    fn test_logical_ids_increment_in_order() {
        let mut module = mixed_module();
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(StaticBackend::with_supported("GPU", [NodeKind::MatMul])));
        registry.register(Arc::new(StaticBackend::with_supported(
            "CPU",
            [NodeKind::SparseGather, NodeKind::Save],
        )));
        let devices = vec![DeviceInfo::new("GPU", 1 << 30), DeviceInfo::new("CPU", 1 << 30)];
        let p = Partitioner::new(devices, registry, false, true, PartitionerOptions::default());

        let dags = p.partition(&mut module, &profiling_cctx()).unwrap();
        let ids: Vec<Vec<usize>> = dags[0]
            .partitions()
            .map(|n| n.logical_devices.clone())
            .collect();
        assert_eq!(ids, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_profile_without_bindings_rejected() {
        let mut module = mixed_module();
        let registry = BackendRegistry::accept_all(&["CPU"]);
        let devices = vec![DeviceInfo::new("CPU", 1 << 30)];
        let p = Partitioner::new(devices, registry, false, true, PartitionerOptions::default());

        let cctx = CompilationContext {
            quant_mode: QuantizationMode::Profile,
            bindings: None,
        };
        let err = p.partition(&mut module, &cctx).unwrap_err();
        assert!(matches!(err, PartitionError::Context(_)));
    }

    #[test]
    fn test_multiple_functions_rejected() {
        let mut module = mixed_module();
        module.add_function(Function::new("second")).unwrap();
        let registry = BackendRegistry::accept_all(&["CPU"]);
        let devices = vec![DeviceInfo::new("CPU", 1 << 30)];
        let p = Partitioner::new(devices, registry, false, true, PartitionerOptions::default());

        let err = p.partition(&mut module, &profiling_cctx()).unwrap_err();
        assert!(matches!(err, PartitionError::MultipleFunctions { .. }));
    }
}
