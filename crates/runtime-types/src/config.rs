// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host limits and the user-defined partition description.
//!
//! # TOML Format
//! ```toml
//! max_active_requests = 10
//! max_queue_size = 100
//! executor_threads = 3
//! ```

use std::collections::HashMap;

/// Limits for the host runtime: admission, queueing, and executor sizing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HostConfig {
    /// Number of concurrently executing requests before queueing.
    #[serde(default = "default_max_active_requests")]
    pub max_active_requests: usize,
    /// Number of queued requests before refusing further submissions.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Number of OS threads allocated to the executor.
    #[serde(default = "default_executor_threads")]
    pub executor_threads: usize,
}

fn default_max_active_requests() -> usize {
    10
}

fn default_max_queue_size() -> usize {
    100
}

fn default_executor_threads() -> usize {
    3
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_active_requests: default_max_active_requests(),
            max_queue_size: default_max_queue_size(),
            executor_threads: default_executor_threads(),
        }
    }
}

impl HostConfig {
    /// Parses a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialises this configuration to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Maximum requests admitted at once: executing plus queued.
    pub fn admission_limit(&self) -> usize {
        self.max_active_requests + self.max_queue_size
    }
}

/// A user-defined partition: explicit sub-function names, backends, and a
/// node-to-partition assignment.
///
/// Two assignment forms are valid: every node mapped, or all nodes of
/// exactly one partition left out of the map (they become the unmapped
/// set and land in the single partition that received no mapped nodes).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PartitionConfig {
    /// The function to partition.
    pub func_name: String,
    /// Number of partitions; zero disables the config flow.
    pub num_of_partitions: usize,
    /// Backend per partition; length must equal `num_of_partitions`.
    pub backend_names: Vec<String>,
    /// Name per partition; length must equal `num_of_partitions`.
    pub partition_names: Vec<String>,
    /// Node name → partition index, `0 .. num_of_partitions`.
    pub node_to_partition: HashMap<String, usize>,
}

impl PartitionConfig {
    /// Returns `true` when the user asked for config-driven partitioning.
    pub fn enabled(&self) -> bool {
        self.num_of_partitions > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = HostConfig::default();
        assert_eq!(c.max_active_requests, 10);
        assert_eq!(c.max_queue_size, 100);
        assert_eq!(c.executor_threads, 3);
        assert_eq!(c.admission_limit(), 110);
    }

    #[test]
    fn test_from_toml() {
        let c = HostConfig::from_toml(
            r#"
max_active_requests = 2
max_queue_size = 5
"#,
        )
        .unwrap();
        assert_eq!(c.max_active_requests, 2);
        assert_eq!(c.max_queue_size, 5);
        assert_eq!(c.executor_threads, 3); // default fills in
    }

    #[test]
    fn test_toml_roundtrip() {
        let c = HostConfig {
            max_active_requests: 7,
            max_queue_size: 9,
            executor_threads: 1,
        };
        let back = HostConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back.max_active_requests, 7);
        assert_eq!(back.max_queue_size, 9);
        assert_eq!(back.executor_threads, 1);
    }

    #[test]
    fn test_partition_config_enabled() {
        let mut pc = PartitionConfig::default();
        assert!(!pc.enabled());
        pc.num_of_partitions = 2;
        assert!(pc.enabled());
    }
}
