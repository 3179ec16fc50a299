// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compilation and execution contexts.
//!
//! The partitioner observes only a narrow slice of the compilation
//! pipeline: the quantisation mode and, in profiling mode, whether
//! bindings were supplied. Precision transforms themselves happen
//! outside this crate.

use crate::error::ContextError;
use std::collections::HashMap;

/// What kind of quantisation transformation the pipeline is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QuantizationMode {
    /// No quantisation transformation.
    #[default]
    None,
    /// Quantise using previously gathered statistics.
    Quantize,
    /// Insert profiling instrumentation to gather statistics.
    Profile,
}

/// Named tensor buffers bound to placeholders.
///
/// The runtime does not interpret the bytes; it only moves them between
/// the caller and the devices.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderBindings {
    buffers: HashMap<String, Vec<u8>>,
}

impl PlaceholderBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `buffer` to the placeholder `name`, replacing any previous
    /// binding.
    pub fn bind(&mut self, name: impl Into<String>, buffer: Vec<u8>) {
        self.buffers.insert(name.into(), buffer);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.buffers.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }
}

/// The per-request state handed to the executor: exclusive owner of the
/// request's placeholder bindings.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub bindings: PlaceholderBindings,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings(bindings: PlaceholderBindings) -> Self {
        Self { bindings }
    }
}

/// The compilation state the partitioner observes.
#[derive(Debug, Clone, Default)]
pub struct CompilationContext {
    /// Quantisation mode; `Profile` selects the profiling partition flow.
    pub quant_mode: QuantizationMode,
    /// Bindings to instrument during profiling.
    pub bindings: Option<PlaceholderBindings>,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a profiling context with the given bindings.
    pub fn profiling(bindings: PlaceholderBindings) -> Self {
        Self {
            quant_mode: QuantizationMode::Profile,
            bindings: Some(bindings),
        }
    }

    /// Checks that this context is well-formed for its configuration.
    pub fn verify(&self) -> Result<(), ContextError> {
        if self.quant_mode == QuantizationMode::Profile && self.bindings.is_none() {
            return Err(ContextError::ProfileWithoutBindings);
        }
        Ok(())
    }
}
