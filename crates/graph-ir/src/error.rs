// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the graph IR.

/// Errors raised while building or verifying graphs.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A node name is already taken within the function.
    #[error("duplicate node '{node}' in function '{function}'")]
    DuplicateNode { function: String, node: String },

    /// A node input references a node that does not exist (yet).
    /// Functions are built in definition order, so a forward reference
    /// is always an error.
    #[error("node '{node}' references unknown input node '{input}'")]
    UnknownInputNode { node: String, input: String },

    /// A node input or `Save` target references a placeholder the parent
    /// module does not own.
    #[error("node '{node}' references unknown placeholder '{placeholder}'")]
    UnknownPlaceholder { node: String, placeholder: String },

    /// A placeholder name is already taken within the module.
    #[error("duplicate placeholder '{0}'")]
    DuplicatePlaceholder(String),

    /// A function name is already taken within the module.
    #[error("duplicate function '{0}'")]
    DuplicateFunction(String),

    /// The named function does not exist in the module.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A structural invariant of a function is violated.
    #[error("function '{function}' failed verification: {detail}")]
    InvalidFunction { function: String, detail: String },

    /// An operator-kind name could not be parsed.
    #[error("unknown node kind '{0}'")]
    UnknownKind(String),
}
