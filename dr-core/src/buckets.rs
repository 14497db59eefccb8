//! Result buckets: the four disjoint outcome lists rebuilt per procedure
//! run, plus the classification rule (`sortout_service_results`) that
//! keeps them disjoint as results arrive out of order.

use std::collections::BTreeSet;

use crate::model::ServiceDrStatus;

/// Membership in exactly one of `done`/`failed`/`warned`/`skipped_due_deps`
/// at procedure end (see Data Model §3 invariant).
#[derive(Debug, Clone, Default)]
pub struct ResultBuckets {
    pub done: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub warned: BTreeSet<String>,
    pub skipped_due_deps: BTreeSet<String>,
}

impl ResultBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `service` as never attempted because an ancestor already
    /// failed. Idempotent, and takes priority over any later classification
    /// the scheduler would otherwise attempt for the same node.
    pub fn skip_due_deps(&mut self, service: &str) {
        self.done.remove(service);
        self.failed.remove(service);
        self.warned.remove(service);
        self.skipped_due_deps.insert(service.to_string());
    }

    /// Applies the classification rule from the Dependency Scheduler design:
    ///
    /// - `is_ok && !in(failed,warned,done)` -> add to done.
    /// - `!is_ok && allow_failure` -> add to warned if not in failed; remove
    ///   from done if present.
    /// - `!is_ok && !allow_failure` -> add to failed; remove from warned and
    ///   done.
    ///
    /// No-op for services already in `skipped_due_deps` — callers must
    /// check that first, per the scheduler's "do NOT call process_func"
    /// rule for cascade-skipped nodes.
    pub fn sortout_service_results(&mut self, status: &ServiceDrStatus) {
        let name = status.service.as_str();
        if self.skipped_due_deps.contains(name) {
            return;
        }
        if status.is_ok() {
            if !self.failed.contains(name) && !self.warned.contains(name) && !self.done.contains(name) {
                self.done.insert(name.to_string());
            }
        } else if status.allow_failure {
            if !self.failed.contains(name) {
                self.warned.insert(name.to_string());
            }
            self.done.remove(name);
        } else {
            self.failed.insert(name.to_string());
            self.warned.remove(name);
            self.done.remove(name);
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn total_considered(&self) -> usize {
        self.done.len() + self.failed.len() + self.warned.len() + self.skipped_due_deps.len()
    }
}
