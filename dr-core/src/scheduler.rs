//! Dependency Scheduler: walks a prepared graph, dispatching ready
//! services concurrently through a caller-supplied worker, cascade-skipping
//! descendants of a failed service, and classifying every terminal result.
//!
//! The worker-pool-with-completion-channel pattern replaces the Python
//! original's `process_ts_services` (`examples/original_source/sm_client/processing.py`),
//! which used a thread pool and a blocking `Queue`; here a
//! `tokio::sync::mpsc` channel plays the same role, per the Design Notes'
//! instruction not to reproduce the source's process-global queue.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::buckets::ResultBuckets;
use crate::graph::DependencyGraph;
use crate::model::ServiceDrStatus;

/// Runs `process` over every node in `graph` in dependency order. All
/// nodes ready at once are dispatched concurrently; the coordinator
/// processes completions one at a time before refreshing the ready
/// frontier, per the Concurrency & Resource Model's ordering guarantee.
///
/// `graph` is consumed by value: callers deep-copy (`Clone`) before each
/// flow phase so concurrent phases don't share scheduler state.
pub async fn run<F, Fut>(mut graph: DependencyGraph, buckets: &mut ResultBuckets, process: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServiceDrStatus> + Send + 'static,
{
    let process = Arc::new(process);
    let mut failed_successors: HashSet<String> = HashSet::new();
    let mut dispatched: HashSet<String> = HashSet::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServiceDrStatus>();
    let mut in_flight = 0usize;

    loop {
        for node in graph.ready() {
            if dispatched.contains(&node) {
                continue;
            }
            dispatched.insert(node.clone());

            if failed_successors.contains(&node) {
                buckets.skip_due_deps(&node);
                graph.done(&node);
                continue;
            }

            let tx = tx.clone();
            let process = Arc::clone(&process);
            in_flight += 1;
            tokio::spawn(async move {
                let status = process(node).await;
                let _ = tx.send(status);
            });
        }

        if in_flight == 0 {
            break;
        }

        if let Some(status) = rx.recv().await {
            in_flight -= 1;
            if !status.is_ok() {
                for succ in graph.transitive_successors(&status.service) {
                    failed_successors.insert(succ);
                }
            }
            graph.done(&status.service);
            if !buckets.skipped_due_deps.contains(&status.service) {
                buckets.sortout_service_results(&status);
            }
        }
    }
}
