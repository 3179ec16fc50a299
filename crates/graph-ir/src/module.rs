// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The module: owner of placeholders and functions.
//!
//! Placeholders outlive partitioning — sub-functions produced by the
//! partitioner keep referencing the same module-owned slots, and new
//! cut placeholders are registered here. Functions are kept in insertion
//! order, which callers rely on for deterministic iteration.

use crate::error::GraphError;
use crate::function::Function;
use crate::types::{DType, Shape, TypeDesc};
use std::collections::BTreeMap;
use std::fmt;

/// What a placeholder stands for, outside any function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlaceholderRole {
    /// A model input bound per inference request.
    Input,
    /// A model output written by a `Save` node.
    Output,
    /// A constant weight resident for the lifetime of the network.
    Weight,
}

/// A named, typed, shaped tensor slot external to function bodies.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub dtype: DType,
    pub shape: Shape,
    pub role: PlaceholderRole,
}

impl Placeholder {
    pub fn new(
        name: impl Into<String>,
        dtype: DType,
        shape: Shape,
        role: PlaceholderRole,
    ) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
            role,
        }
    }

    /// Memory footprint: `elements × dtype width`.
    pub fn size_in_bytes(&self) -> u64 {
        self.shape.num_elements() * self.dtype.size_bytes()
    }

    pub fn type_desc(&self) -> TypeDesc {
        TypeDesc::new(self.dtype, self.shape.clone())
    }

    pub fn is_weight(&self) -> bool {
        self.role == PlaceholderRole::Weight
    }
}

/// Owner of a set of functions and the placeholders they reference.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    placeholders: BTreeMap<String, Placeholder>,
    /// Insertion-ordered; "first encountered" tie-breaks depend on it.
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placeholders: BTreeMap::new(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Placeholders ───────────────────────────────────────────────

    pub fn add_placeholder(&mut self, ph: Placeholder) -> Result<(), GraphError> {
        if self.placeholders.contains_key(&ph.name) {
            return Err(GraphError::DuplicatePlaceholder(ph.name));
        }
        self.placeholders.insert(ph.name.clone(), ph);
        Ok(())
    }

    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.placeholders.get(name)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.placeholders.values()
    }

    /// Total bytes of all `Weight` placeholders. This is the constant
    /// baseline used when sizing a function's working set.
    pub fn constants_size(&self) -> u64 {
        self.placeholders
            .values()
            .filter(|p| p.is_weight())
            .map(Placeholder::size_in_bytes)
            .sum()
    }

    /// Returns a placeholder name based on `base` that is not yet taken.
    pub fn fresh_placeholder_name(&self, base: &str) -> String {
        if !self.placeholders.contains_key(base) {
            return base.to_string();
        }
        let mut i = 1;
        loop {
            let candidate = format!("{base}_{i}");
            if !self.placeholders.contains_key(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    // ── Functions ──────────────────────────────────────────────────

    /// Registers a pre-built function.
    pub fn add_function(&mut self, function: Function) -> Result<(), GraphError> {
        if self.has_function(function.name()) {
            return Err(GraphError::DuplicateFunction(function.name().to_string()));
        }
        self.functions.push(function);
        Ok(())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name() == name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name() == name)
    }

    /// Functions in insertion order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// Removes and returns the named function.
    pub fn erase_function(&mut self, name: &str) -> Result<Function, GraphError> {
        let pos = self
            .functions
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| GraphError::UnknownFunction(name.to_string()))?;
        Ok(self.functions.remove(pos))
    }

    /// Verifies every function against this module.
    pub fn verify(&self) -> Result<(), GraphError> {
        for f in &self.functions {
            f.verify(self)?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "module '{}': {} placeholders, {} functions",
            self.name,
            self.placeholders.len(),
            self.functions.len()
        )?;
        for func in &self.functions {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeKind, Origin};

    fn ph(name: &str, elems: usize, role: PlaceholderRole) -> Placeholder {
        Placeholder::new(name, DType::F32, Shape::vector(elems), role)
    }

    #[test]
    fn test_placeholder_sizes() {
        let p = ph("w", 256, PlaceholderRole::Weight);
        assert_eq!(p.size_in_bytes(), 1024);
        assert!(p.is_weight());
    }

    #[test]
    fn test_constants_size() {
        let mut m = Module::new("m");
        m.add_placeholder(ph("x", 10, PlaceholderRole::Input)).unwrap();
        m.add_placeholder(ph("w1", 100, PlaceholderRole::Weight)).unwrap();
        m.add_placeholder(ph("w2", 50, PlaceholderRole::Weight)).unwrap();
        assert_eq!(m.constants_size(), (100 + 50) * 4);
    }

    #[test]
    fn test_duplicate_placeholder() {
        let mut m = Module::new("m");
        m.add_placeholder(ph("x", 1, PlaceholderRole::Input)).unwrap();
        assert!(m.add_placeholder(ph("x", 1, PlaceholderRole::Input)).is_err());
    }

    #[test]
    fn test_fresh_placeholder_name() {
        let mut m = Module::new("m");
        assert_eq!(m.fresh_placeholder_name("a"), "a");
        m.add_placeholder(ph("a", 1, PlaceholderRole::Input)).unwrap();
        assert_eq!(m.fresh_placeholder_name("a"), "a_1");
        m.add_placeholder(ph("a_1", 1, PlaceholderRole::Input)).unwrap();
        assert_eq!(m.fresh_placeholder_name("a"), "a_2");
    }

    #[test]
    fn test_function_lifecycle() {
        let mut m = Module::new("m");
        m.add_function(Function::new("f")).unwrap();
        assert!(m.has_function("f"));
        assert!(m.add_function(Function::new("f")).is_err());
        assert_eq!(m.function_names(), vec!["f".to_string()]);

        let erased = m.erase_function("f").unwrap();
        assert_eq!(erased.name(), "f");
        assert!(!m.has_function("f"));
        assert!(m.erase_function("f").is_err());
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut m = Module::new("m");
        m.add_function(Function::new("zeta")).unwrap();
        m.add_function(Function::new("alpha")).unwrap();
        assert_eq!(m.function_names(), vec!["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn test_module_verify() {
        let mut m = Module::new("m");
        m.add_placeholder(ph("x", 8, PlaceholderRole::Input)).unwrap();
        m.add_placeholder(ph("y", 8, PlaceholderRole::Output)).unwrap();
        let mut f = Function::new("f");
        f.add_node(Node::new(
            "r",
            NodeKind::Relu,
            vec![Origin::placeholder("x")],
            TypeDesc::new(DType::F32, Shape::vector(8)),
        ))
        .unwrap();
        f.add_node(Node::save("s", Origin::node("r"), "y")).unwrap();
        m.add_function(f).unwrap();
        m.verify().unwrap();
    }
}
