// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: complete partition flows over realistic modules,
//! checking the structural invariants every strategy must uphold —
//! coverage, acyclicity, memory budgets, and backend placement.

use graph_ir::{DType, Function, Module, Node, NodeKind, Origin, Placeholder, PlaceholderRole, Shape, TypeDesc};
use partitioner::{BackendRegistry, Partitioner, PartitionerOptions, StaticBackend};
use runtime_types::{CompilationContext, Dag, DeviceInfo};
use std::sync::Arc;

const MB: u64 = 1024 * 1024;

fn ty(elems: usize) -> TypeDesc {
    TypeDesc::new(DType::F32, Shape::vector(elems))
}

fn io_placeholders(module: &mut Module, elems: usize) {
    module
        .add_placeholder(Placeholder::new("x", DType::F32, Shape::vector(elems), PlaceholderRole::Input))
        .unwrap();
    module
        .add_placeholder(Placeholder::new("y", DType::F32, Shape::vector(elems), PlaceholderRole::Output))
        .unwrap();
}

/// Names of the operator nodes of `source`, for coverage checks.
fn source_node_names(source: &Function) -> Vec<String> {
    let mut names: Vec<String> = source.nodes().map(|n| n.name.clone()).collect();
    names.sort();
    names
}

/// Collects the original nodes now spread across sub-functions,
/// ignoring the saves the materialiser added for cut edges.
fn partitioned_node_names(module: &Module, dag: &Dag) -> Vec<String> {
    let mut names: Vec<String> = dag
        .partitions()
        .filter_map(|p| module.function(&p.name))
        .flat_map(|f| f.nodes())
        .filter(|n| !(n.is_save() && n.name.starts_with("save_")))
        .map(|n| n.name.clone())
        .collect();
    names.sort();
    names
}

// ── S1: trivial fit ────────────────────────────────────────────────

#[test]
fn trivial_fit_produces_single_partition() {
    let mut module = Module::new("m");
    io_placeholders(&mut module, 256 * 1024); // 1 MB in f32

    let mut f = Function::new("net");
    f.add_node(Node::new("add", NodeKind::Add, vec![Origin::placeholder("x")], ty(256 * 1024)))
        .unwrap();
    f.add_node(Node::new("relu", NodeKind::Relu, vec![Origin::node("add")], ty(256 * 1024)))
        .unwrap();
    f.add_node(Node::save("save", Origin::node("relu"), "y")).unwrap();
    module.add_function(f).unwrap();

    let partitioner = Partitioner::new(
        vec![DeviceInfo::new("CPU", 1024 * MB)],
        BackendRegistry::accept_all(&["CPU"]),
        false,
        true,
        PartitionerOptions::default(),
    );
    let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();

    assert_eq!(dags.len(), 1);
    let dag = &dags[0];
    dag.validate().unwrap();
    assert_eq!(dag.num_partitions(), 1);

    let only = dag.partitions().next().unwrap();
    assert_eq!(only.name, "net");
    assert_eq!(only.backend_name, "CPU");
    assert_eq!(only.logical_devices, vec![0]);
    // Root fans out to exactly the one sub-function.
    assert_eq!(dag.node(dag.root()).children.len(), 1);
    // All three nodes still live in the (untouched) source function.
    assert_eq!(module.function("net").unwrap().num_nodes(), 3);
}

// ── S2: memory-forced split ────────────────────────────────────────

/// Ten convs, each pinning a ~120 MB weight.
fn heavy_conv_module() -> Module {
    let mut module = Module::new("m");
    io_placeholders(&mut module, 1024);

    let mut f = Function::new("net");
    let mut prev: Option<String> = None;
    for i in 0..10 {
        let w = format!("w{i}");
        module
            .add_placeholder(Placeholder::new(
                w.as_str(),
                DType::F32,
                Shape::vector(30 * 1024 * 1024), // 120 MB
                PlaceholderRole::Weight,
            ))
            .unwrap();
        let input = match &prev {
            Some(p) => Origin::node(p.clone()),
            None => Origin::placeholder("x"),
        };
        let name = format!("conv{i}");
        f.add_node(Node::new(name.as_str(), NodeKind::Conv, vec![input, Origin::placeholder(w)], ty(1024)))
            .unwrap();
        prev = Some(name);
    }
    f.add_node(Node::save("save", Origin::node(prev.unwrap()), "y")).unwrap();
    module.add_function(f).unwrap();
    module
}

#[test]
fn memory_pressure_forces_split() {
    let mut module = heavy_conv_module();
    let source_names = source_node_names(module.function("net").unwrap());

    let partitioner = Partitioner::new(
        vec![DeviceInfo::new("CPU", 256 * MB), DeviceInfo::new("CPU", 256 * MB)],
        BackendRegistry::accept_all(&["CPU"]),
        false,
        true,
        PartitionerOptions::default(),
    );
    let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();
    let dag = &dags[0];
    dag.validate().unwrap();

    // Two 120 MB convs fit a 256 MB device; three never do.
    assert!(dag.num_partitions() >= 5, "got {}", dag.num_partitions());
    for partition in dag.partitions() {
        assert!(
            partition.mem_info.total() <= 256 * MB,
            "partition '{}' holds {}",
            partition.name,
            partition.mem_info
        );
    }

    // The DAG is a chain along the conv chain: every partition has at
    // most one parent and one child.
    for partition in dag.partitions() {
        assert!(partition.children.len() <= 1);
    }

    // Invariant 1: sub-functions verify and cover the source exactly once.
    module.verify().unwrap();
    assert!(!module.has_function("net"));
    assert_eq!(partitioned_node_names(&module, dag), source_names);
}

// ── S3: heterogeneous backends ─────────────────────────────────────

#[test]
fn heterogeneous_backends_split_by_support() {
    let mut module = Module::new("m");
    io_placeholders(&mut module, 1024);

    let mut f = Function::new("net");
    f.add_node(Node::new("mm1", NodeKind::MatMul, vec![Origin::placeholder("x")], ty(1024)))
        .unwrap();
    f.add_node(Node::new("gather1", NodeKind::SparseGather, vec![Origin::node("mm1")], ty(1024)))
        .unwrap();
    f.add_node(Node::new("mm2", NodeKind::MatMul, vec![Origin::node("gather1")], ty(1024)))
        .unwrap();
    f.add_node(Node::new("gather2", NodeKind::SparseGather, vec![Origin::node("mm2")], ty(1024)))
        .unwrap();
    f.add_node(Node::save("save", Origin::node("gather2"), "y")).unwrap();
    module.add_function(f).unwrap();
    let source_names = source_node_names(module.function("net").unwrap());

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(StaticBackend::with_supported("GPU", [NodeKind::MatMul])));
    registry.register(Arc::new(StaticBackend::with_supported(
        "CPU",
        [NodeKind::SparseGather, NodeKind::Save],
    )));

    let partitioner = Partitioner::new(
        vec![DeviceInfo::new("GPU", 1024 * MB), DeviceInfo::new("CPU", 1024 * MB)],
        registry,
        false,
        true,
        PartitionerOptions::default(),
    );
    let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();
    let dag = &dags[0];
    dag.validate().unwrap();
    assert!(dag.num_partitions() >= 2);

    // Invariant 5: placement respects the three-step acceptance rule.
    for partition in dag.partitions() {
        let f = module.function(&partition.name).unwrap();
        for node in f.nodes() {
            match node.kind {
                NodeKind::MatMul => assert_eq!(partition.backend_name, "GPU"),
                NodeKind::SparseGather => assert_eq!(partition.backend_name, "CPU"),
                _ => {}
            }
        }
    }

    // Edges respect data flow: a toposort of the DAG visits mm1's
    // partition before gather1's, and so on.
    let order = dag.topo_order().unwrap();
    let position = |node_name: &str| {
        order
            .iter()
            .position(|&id| {
                module
                    .function(&dag.node(id).name)
                    .is_some_and(|f| f.has_node(node_name))
            })
            .unwrap()
    };
    assert!(position("mm1") < position("gather1"));
    assert!(position("gather1") < position("mm2"));
    assert!(position("mm2") < position("gather2"));

    assert_eq!(partitioned_node_names(&module, dag), source_names);
}

// ── S4: load balance ───────────────────────────────────────────────

#[test]
fn load_balance_spreads_uniform_chain() {
    let mut module = Module::new("m");
    io_placeholders(&mut module, 1024);

    let mut f = Function::new("net");
    let mut prev: Option<String> = None;
    for i in 0..8 {
        let input = match &prev {
            Some(p) => Origin::node(p.clone()),
            None => Origin::placeholder("x"),
        };
        let name = format!("add{i}");
        f.add_node(Node::new(name.as_str(), NodeKind::Add, vec![input], ty(1024)))
            .unwrap();
        prev = Some(name);
    }
    f.add_node(Node::save("save", Origin::node(prev.unwrap()), "y")).unwrap();
    module.add_function(f).unwrap();

    // peak_compute = 1024 ops/s makes every Add cost exactly 1.0.
    let devices: Vec<DeviceInfo> = (0..4)
        .map(|_| DeviceInfo::new("CPU", 1024 * MB).with_rooflines(1024.0, 0.0))
        .collect();
    let options = PartitionerOptions {
        enable_load_balance: true,
        ..Default::default()
    };
    let partitioner = Partitioner::new(
        devices,
        BackendRegistry::accept_all(&["CPU"]),
        false,
        true,
        options,
    );
    let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();
    let dag = &dags[0];
    dag.validate().unwrap();
    assert_eq!(dag.num_partitions(), 4);

    // Each partition carries two Adds, give or take the imbalance slack.
    for partition in dag.partitions() {
        let f = module.function(&partition.name).unwrap();
        let adds = f.nodes().filter(|n| n.kind == NodeKind::Add).count();
        assert!((1..=3).contains(&adds), "'{}' has {adds} adds", partition.name);
    }

    // Invariant 4: edges only flow towards higher partition indices.
    let ids: Vec<_> = dag.partition_ids().collect();
    for (index, &id) in ids.iter().enumerate() {
        for &child in &dag.node(id).children {
            let child_index = ids.iter().position(|&x| x == child).unwrap();
            assert!(index <= child_index);
        }
    }
}

// ── S5: saturate host ──────────────────────────────────────────────

#[test]
fn saturate_host_replicates_over_idle_devices() {
    let mut module = Module::new("m");
    io_placeholders(&mut module, 1024);
    let mut f = Function::new("net");
    f.add_node(Node::new("relu", NodeKind::Relu, vec![Origin::placeholder("x")], ty(1024)))
        .unwrap();
    f.add_node(Node::save("save", Origin::node("relu"), "y")).unwrap();
    module.add_function(f).unwrap();

    let devices: Vec<DeviceInfo> = (0..4).map(|_| DeviceInfo::new("CPU", 1024 * MB)).collect();
    let partitioner = Partitioner::new(
        devices,
        BackendRegistry::accept_all(&["CPU"]),
        true, // saturate_host
        true,
        PartitionerOptions::default(),
    );
    let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();
    let dag = &dags[0];
    assert_eq!(dag.num_partitions(), 1);

    let only = dag.partitions().next().unwrap();
    assert_eq!(only.logical_devices, vec![0, 1, 2, 3]);
}

// ── Cross-strategy invariants ──────────────────────────────────────

#[test]
fn every_strategy_produces_a_valid_dag() {
    // The same weighted chain through the memory strategy at several
    // budgets; the DAG must stay valid and covered at each.
    for budget_mb in [256, 384, 512, 2048] {
        let mut module = heavy_conv_module();
        let source_names = source_node_names(module.function("net").unwrap());
        let partitioner = Partitioner::new(
            vec![DeviceInfo::new("CPU", budget_mb * MB)],
            BackendRegistry::accept_all(&["CPU"]),
            false,
            true,
            PartitionerOptions::default(),
        );
        let dags = partitioner.partition(&mut module, &CompilationContext::new()).unwrap();
        let dag = &dags[0];
        dag.validate().unwrap();

        if dag.num_partitions() > 1 {
            assert_eq!(partitioned_node_names(&module, dag), source_names);
            for partition in dag.partitions() {
                assert!(partition.mem_info.total() <= budget_mb * MB);
            }
        }
    }
}

#[test]
fn partition_too_large_for_any_device_is_rejected() {
    // A single 120 MB conv cannot fit a 64 MB device.
    let mut module = heavy_conv_module();
    let partitioner = Partitioner::new(
        vec![DeviceInfo::new("CPU", 64 * MB)],
        BackendRegistry::accept_all(&["CPU"]),
        false,
        true,
        PartitionerOptions::default(),
    );
    let err = partitioner
        .partition(&mut module, &CompilationContext::new())
        .unwrap_err();
    assert!(matches!(
        err,
        partitioner::PartitionError::MemoryCapacityExceeded { .. }
    ));
}
