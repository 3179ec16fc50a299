// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator nodes: kinds, input origins, and the node record itself.

use crate::error::GraphError;
use crate::types::TypeDesc;
use std::fmt;

/// The finite set of operator kinds the runtime understands.
///
/// Backends advertise supported and unsupported kinds through device
/// descriptors; the kind is what the three-step acceptance rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    Add,
    Sub,
    Mul,
    Div,
    Relu,
    Sigmoid,
    Tanh,
    Conv,
    MaxPool,
    AvgPool,
    MatMul,
    FullyConnected,
    Softmax,
    Transpose,
    Reshape,
    Concat,
    Gather,
    SparseGather,
    /// Marks a function output: stores its single input into a placeholder.
    Save,
}

impl NodeKind {
    /// Parses a kind from its canonical name. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "add" => Some(Self::Add),
            "sub" => Some(Self::Sub),
            "mul" => Some(Self::Mul),
            "div" => Some(Self::Div),
            "relu" => Some(Self::Relu),
            "sigmoid" => Some(Self::Sigmoid),
            "tanh" => Some(Self::Tanh),
            "conv" => Some(Self::Conv),
            "maxpool" => Some(Self::MaxPool),
            "avgpool" => Some(Self::AvgPool),
            "matmul" => Some(Self::MatMul),
            "fullyconnected" => Some(Self::FullyConnected),
            "softmax" => Some(Self::Softmax),
            "transpose" => Some(Self::Transpose),
            "reshape" => Some(Self::Reshape),
            "concat" => Some(Self::Concat),
            "gather" => Some(Self::Gather),
            "sparsegather" => Some(Self::SparseGather),
            "save" => Some(Self::Save),
            _ => None,
        }
    }

    /// Parses a comma-separated kind list such as `"Div,Add"`.
    ///
    /// An empty or whitespace-only string yields an empty list. Unknown
    /// names are an error, not silently dropped.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, GraphError> {
        let mut kinds = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let kind = Self::parse(part)
                .ok_or_else(|| GraphError::UnknownKind(part.to_string()))?;
            kinds.push(kind);
        }
        Ok(kinds)
    }

    /// Returns the canonical name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
            Self::Relu => "Relu",
            Self::Sigmoid => "Sigmoid",
            Self::Tanh => "Tanh",
            Self::Conv => "Conv",
            Self::MaxPool => "MaxPool",
            Self::AvgPool => "AvgPool",
            Self::MatMul => "MatMul",
            Self::FullyConnected => "FullyConnected",
            Self::Softmax => "Softmax",
            Self::Transpose => "Transpose",
            Self::Reshape => "Reshape",
            Self::Concat => "Concat",
            Self::Gather => "Gather",
            Self::SparseGather => "SparseGather",
            Self::Save => "Save",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one input edge of a node comes from: another node's output in
/// the same function, or a placeholder owned by the parent module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Origin {
    Node(String),
    Placeholder(String),
}

impl Origin {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::Placeholder(name.into())
    }

    /// The referenced name, regardless of origin kind.
    pub fn name(&self) -> &str {
        match self {
            Self::Node(n) | Self::Placeholder(n) => n,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }
}

/// One typed tensor operation.
///
/// Every node except `Save` produces exactly one output value; `Save`
/// consumes one input and writes it into the placeholder named by
/// `saved_to`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Name, unique within the owning function.
    pub name: String,
    /// Operator kind.
    pub kind: NodeKind,
    /// Ordered input edges.
    pub inputs: Vec<Origin>,
    /// Output type. `None` for `Save` nodes.
    pub output: Option<TypeDesc>,
    /// For `Save` nodes, the output placeholder written to.
    pub saved_to: Option<String>,
}

impl Node {
    /// Creates a value-producing node.
    pub fn new(
        name: impl Into<String>,
        kind: NodeKind,
        inputs: Vec<Origin>,
        output: TypeDesc,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs,
            output: Some(output),
            saved_to: None,
        }
    }

    /// Creates a `Save` node storing `input` into placeholder `saved_to`.
    pub fn save(name: impl Into<String>, input: Origin, saved_to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Save,
            inputs: vec![input],
            output: None,
            saved_to: Some(saved_to.into()),
        }
    }

    pub fn is_save(&self) -> bool {
        self.kind == NodeKind::Save
    }

    /// Bytes of this node's output value, zero for `Save`.
    pub fn output_bytes(&self) -> u64 {
        self.output.as_ref().map_or(0, TypeDesc::size_in_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DType, Shape};

    #[test]
    fn test_parse_kind() {
        assert_eq!(NodeKind::parse("Add"), Some(NodeKind::Add));
        assert_eq!(NodeKind::parse("matmul"), Some(NodeKind::MatMul));
        assert_eq!(NodeKind::parse(" SparseGather "), Some(NodeKind::SparseGather));
        assert_eq!(NodeKind::parse("Quux"), None);
    }

    #[test]
    fn test_parse_list() {
        let kinds = NodeKind::parse_list("Div,Add").unwrap();
        assert_eq!(kinds, vec![NodeKind::Div, NodeKind::Add]);
        assert!(NodeKind::parse_list("").unwrap().is_empty());
        assert!(NodeKind::parse_list("Add,Bogus").is_err());
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [NodeKind::Conv, NodeKind::Save, NodeKind::FullyConnected] {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_save_node() {
        let n = Node::save("save_out", Origin::node("relu"), "out");
        assert!(n.is_save());
        assert_eq!(n.output_bytes(), 0);
        assert_eq!(n.saved_to.as_deref(), Some("out"));
        assert_eq!(n.inputs.len(), 1);
    }

    #[test]
    fn test_value_node() {
        let n = Node::new(
            "add",
            NodeKind::Add,
            vec![Origin::placeholder("a"), Origin::placeholder("b")],
            TypeDesc::new(DType::F32, Shape::vector(10)),
        );
        assert!(!n.is_save());
        assert_eq!(n.output_bytes(), 40);
        assert_eq!(n.inputs[0].name(), "a");
        assert!(n.inputs[0].is_placeholder());
    }
}
