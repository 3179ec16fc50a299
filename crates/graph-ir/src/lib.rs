// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! A lightweight intermediate representation for dataflow computation
//! graphs built from typed tensor operators.
//!
//! Rather than depending on a full compiler framework, this crate defines
//! the minimum the partitioner and host runtime need:
//!
//! - [`DType`] / [`Shape`] / [`TypeDesc`] — element types and tensor shapes.
//! - [`NodeKind`] — the finite set of operator kinds.
//! - [`Node`] — one typed operation with ordered input edges.
//! - [`Function`] — a dataflow graph of nodes, append-only and verified.
//! - [`Module`] — the owner of placeholders and functions.
//!
//! A [`Placeholder`] is a named, typed, shaped tensor slot external to a
//! function body: a model input, a model output, or a constant weight.
//! Functions reference placeholders owned by their parent module, so a
//! module can be re-partitioned without copying weight metadata.
//!
//! # Example
//! ```
//! use graph_ir::{DType, Function, Module, Node, NodeKind, Origin, Placeholder,
//!                PlaceholderRole, Shape, TypeDesc};
//!
//! let mut module = Module::new("demo");
//! module
//!     .add_placeholder(Placeholder::new("x", DType::F32, Shape::vector(64), PlaceholderRole::Input))
//!     .unwrap();
//! module
//!     .add_placeholder(Placeholder::new("y", DType::F32, Shape::vector(64), PlaceholderRole::Output))
//!     .unwrap();
//!
//! let mut f = Function::new("main");
//! f.add_node(Node::new(
//!     "relu",
//!     NodeKind::Relu,
//!     vec![Origin::placeholder("x")],
//!     TypeDesc::new(DType::F32, Shape::vector(64)),
//! ))
//! .unwrap();
//! f.add_node(Node::save("save_y", Origin::node("relu"), "y")).unwrap();
//! f.verify(&module).unwrap();
//! module.add_function(f).unwrap();
//! ```

mod error;
mod function;
mod module;
mod node;
mod types;

pub use error::GraphError;
pub use function::Function;
pub use module::{Module, Placeholder, PlaceholderRole};
pub use node::{Node, NodeKind, Origin};
pub use types::{DType, Shape, TypeDesc};
