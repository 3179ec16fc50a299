// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Request execution: walking a network's DAG and dispatching each
//! sub-function to one of its provisioned devices.
//!
//! The host submits a run and gets the result through the callback; the
//! callback may fire from a worker thread, so it must be `Send`, and it
//! receives the [`ExecutionContext`] back so the caller can read the
//! output bindings.

use crate::error::HostError;
use parking_lot::Mutex;
use runtime_types::{Dag, ExecutionContext, RunIdentifier};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Completion callback: `(request id, result, context back to caller)`.
pub type ResultCallback = Box<dyn FnOnce(RunIdentifier, Result<(), HostError>, ExecutionContext) + Send>;

/// Runs one inference request against a provisioned DAG.
pub trait Executor: Send + Sync {
    /// Starts the run and returns immediately; `callback` fires when the
    /// walk completes or fails.
    fn run(
        &self,
        request_id: RunIdentifier,
        dag: Arc<Dag>,
        context: ExecutionContext,
        callback: ResultCallback,
    );
}

type Job = Box<dyn FnOnce() + Send>;

/// The reference executor: a fixed pool of OS worker threads.
///
/// Each run walks the DAG in parent-satisfied order and picks a device
/// per node through the node's round-robin cursor. Device drivers are
/// external; the walk records the dispatch and moves on, which is
/// exactly the contract stub and test executors also implement.
pub struct ThreadPoolExecutor {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Spawns `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..threads.max(1))
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("executor-{i}"))
                    .spawn(move || Self::worker_loop(&receiver))
                    .expect("spawning an executor thread")
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers,
        }
    }

    fn worker_loop(receiver: &Mutex<Receiver<Job>>) {
        loop {
            let job = {
                let guard = receiver.lock();
                guard.recv()
            };
            match job {
                Ok(job) => job(),
                Err(_) => return, // channel closed: shutting down
            }
        }
    }

    /// One DAG traversal; every node dispatches to its next device.
    fn execute(dag: &Dag) -> Result<(), HostError> {
        let order = dag.topo_order()?;
        for id in order {
            if id == dag.root() {
                continue;
            }
            let node = dag.node(id);
            let device = node
                .next_device()
                .ok_or_else(|| HostError::NotProvisioned(node.name.clone()))?;
            tracing::trace!("dispatching '{}' to device {device}", node.name);
        }
        Ok(())
    }
}

impl Executor for ThreadPoolExecutor {
    fn run(
        &self,
        request_id: RunIdentifier,
        dag: Arc<Dag>,
        context: ExecutionContext,
        callback: ResultCallback,
    ) {
        let job: Job = Box::new(move || {
            let result = Self::execute(&dag);
            callback(request_id, result, context);
        });

        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(sender) => sender.send(job).expect("executor workers are running"),
            None => drop(job),
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Closing the channel stops the workers.
        *self.sender.lock() = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
