// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A function: one dataflow graph of operator nodes.
//!
//! Functions are append-only. `add_node` enforces definition-before-use
//! for node-to-node edges, which makes the stored node order a valid
//! topological order and rules out cycles by construction. Placeholder
//! references are resolved against the parent [`crate::Module`] only in
//! [`Function::verify`], since a function under construction may refer
//! to placeholders registered later.

use crate::error::GraphError;
use crate::module::Module;
use crate::node::{Node, Origin};
use std::collections::HashMap;
use std::fmt;

/// A dataflow graph of operator nodes plus placeholder references.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Function {
    name: String,
    nodes: Vec<Node>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Function {
    /// Creates an empty function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a node.
    ///
    /// Fails when the name is taken or a node-origin input is not yet
    /// defined. Placeholder origins are not checked here.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.index.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode {
                function: self.name.clone(),
                node: node.name.clone(),
            });
        }
        for input in &node.inputs {
            if let Origin::Node(producer) = input {
                if !self.index.contains_key(producer) {
                    return Err(GraphError::UnknownInputNode {
                        node: node.name.clone(),
                        input: producer.clone(),
                    });
                }
            }
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Looks a node up by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Nodes in definition (topological) order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that consume `name`'s output, in definition order.
    pub fn consumers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| {
            n.inputs
                .iter()
                .any(|i| matches!(i, Origin::Node(p) if p == name))
        })
    }

    /// Returns `true` if no node consumes `name`'s output.
    pub fn is_sink(&self, name: &str) -> bool {
        self.consumers(name).next().is_none()
    }

    /// The `Save` nodes marking this function's outputs.
    pub fn save_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_save())
    }

    /// Checks the structural invariants of this function against its
    /// parent module:
    ///
    /// - every node-origin input resolves within the function,
    /// - every placeholder origin and `Save` target resolves in `module`,
    /// - non-`Save` nodes carry an output type, `Save` nodes carry a
    ///   target and exactly one input.
    ///
    /// Cycles cannot occur: `add_node` enforces definition-before-use.
    pub fn verify(&self, module: &Module) -> Result<(), GraphError> {
        for node in &self.nodes {
            for input in &node.inputs {
                match input {
                    Origin::Node(producer) => {
                        let found = self.node(producer).ok_or_else(|| {
                            GraphError::UnknownInputNode {
                                node: node.name.clone(),
                                input: producer.clone(),
                            }
                        })?;
                        if found.output.is_none() {
                            return Err(GraphError::InvalidFunction {
                                function: self.name.clone(),
                                detail: format!(
                                    "node '{}' consumes '{}', which produces no value",
                                    node.name, producer
                                ),
                            });
                        }
                    }
                    Origin::Placeholder(ph) => {
                        if module.placeholder(ph).is_none() {
                            return Err(GraphError::UnknownPlaceholder {
                                node: node.name.clone(),
                                placeholder: ph.clone(),
                            });
                        }
                    }
                }
            }
            if node.is_save() {
                let target = node.saved_to.as_ref().ok_or_else(|| {
                    GraphError::InvalidFunction {
                        function: self.name.clone(),
                        detail: format!("save node '{}' has no target placeholder", node.name),
                    }
                })?;
                if module.placeholder(target).is_none() {
                    return Err(GraphError::UnknownPlaceholder {
                        node: node.name.clone(),
                        placeholder: target.clone(),
                    });
                }
                if node.inputs.len() != 1 {
                    return Err(GraphError::InvalidFunction {
                        function: self.name.clone(),
                        detail: format!(
                            "save node '{}' has {} inputs, expected 1",
                            node.name,
                            node.inputs.len()
                        ),
                    });
                }
            } else if node.output.is_none() {
                return Err(GraphError::InvalidFunction {
                    function: self.name.clone(),
                    detail: format!("node '{}' ({}) has no output type", node.name, node.kind),
                });
            }
        }

        if self.nodes.iter().any(|n| !n.is_save()) && self.save_nodes().next().is_none() {
            tracing::warn!(
                "function '{}' has nodes but no save node; its results are unobservable",
                self.name
            );
        }
        Ok(())
    }

    /// Rebuilds the name index after deserialisation.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function '{}' ({} nodes):", self.name, self.nodes.len())?;
        for node in &self.nodes {
            write!(f, "  {} = {}(", node.name, node.kind)?;
            for (i, input) in node.inputs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match input {
                    Origin::Node(n) => write!(f, "%{n}")?,
                    Origin::Placeholder(p) => write!(f, "@{p}")?,
                }
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}
