//! Planner: merges per-site service catalogs for one module into a single
//! dependency graph, detects cycles and dangling dependencies, and emits a
//! topological order plus the prepared graph for the scheduler.
//!
//! Grounded in `examples/original_source/sm_client/prepare.py::make_ordered_services_to_process`
//! (`build_after_before_graph` + `TopologicalSorter2`, cycle -> integrity
//! error, dangling dep -> warning) and in the graph shape from
//! `examples/edgeandnode-graph-network-harness/crates/service-orchestration/src/orchestrator.rs`.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::DependencyGraph;
use crate::model::{ClusterState, ServiceRecord};

/// Result of planning one module: the topological order, whether any
/// minor issue (dangling dependency) was observed, and the prepared graph
/// — `None` only on a cycle (a major integrity error).
pub struct PlanResult {
    pub ordered: Vec<String>,
    pub minor_issues_ok: bool,
    pub graph: Option<DependencyGraph>,
}

/// Builds the merged `before`/`after` record set for `module` across the
/// sites named in `site_scope` (or every reachable site when `None`),
/// applying the `services_to_process` allow-list and `ignored_services`
/// deny-list.
fn merge_module_records<'a>(
    state: &'a ClusterState,
    module: &str,
    site_scope: Option<&str>,
    services_to_process: Option<&[String]>,
    ignored_services: &[String],
) -> BTreeMap<String, &'a ServiceRecord> {
    let sites: Vec<&str> = match site_scope {
        Some(s) => vec![s],
        None => state.available_sites(),
    };

    let mut merged: BTreeMap<String, &ServiceRecord> = BTreeMap::new();
    for site in sites {
        let Some(catalog) = state.services.get(site) else { continue };
        for (name, record) in catalog {
            if record.module != module {
                continue;
            }
            if ignored_services.iter().any(|i| i == name) {
                continue;
            }
            if let Some(allow) = services_to_process {
                if !allow.iter().any(|s| s == name) {
                    continue;
                }
            }
            // First site wins for display purposes; edges are unioned below
            // regardless of which site's record is kept here.
            merged.entry(name.clone()).or_insert(record);
        }
    }
    merged
}

pub fn plan(
    state: &ClusterState,
    module: &str,
    site_scope: Option<&str>,
    services_to_process: Option<&[String]>,
    ignored_services: &[String],
) -> PlanResult {
    let merged = merge_module_records(state, module, site_scope, services_to_process, ignored_services);

    let sites: Vec<&str> = match site_scope {
        Some(s) => vec![s],
        None => state.available_sites(),
    };

    // Union `after`/`before` edges for each name across every site where the
    // service appears, per the Merging invariant (Testable Properties #4).
    let mut after_union: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut before_union: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for site in &sites {
        let Some(catalog) = state.services.get(*site) else { continue };
        for name in merged.keys() {
            if let Some(record) = catalog.get(name) {
                after_union.entry(name.clone()).or_default().extend(record.after.iter().cloned());
                before_union.entry(name.clone()).or_default().extend(record.before.iter().cloned());
            }
        }
    }

    let mut graph = DependencyGraph::new();
    for name in merged.keys() {
        graph.add_node(name);
    }

    let mut minor_issues_ok = true;
    for name in merged.keys() {
        if let Some(afters) = after_union.get(name) {
            for dep in afters {
                if merged.contains_key(dep) {
                    graph.add_edge(dep, name);
                } else {
                    tracing::warn!(service = %name, dependency = %dep, "nonexistent 'after' dependency dropped");
                    minor_issues_ok = false;
                }
            }
        }
        if let Some(befores) = before_union.get(name) {
            for dep in befores {
                if merged.contains_key(dep) {
                    graph.add_edge(name, dep);
                } else {
                    tracing::warn!(service = %name, dependency = %dep, "nonexistent 'before' dependency dropped");
                    minor_issues_ok = false;
                }
            }
        }
    }

    match graph.topological_sort() {
        None => PlanResult {
            ordered: Vec::new(),
            minor_issues_ok: false,
            graph: None,
        },
        Some(ordered) => PlanResult {
            ordered,
            minor_issues_ok,
            graph: Some(graph),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, ServiceRecord};

    fn record(name: &str, after: &[&str], before: &[&str]) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            module: "stateful".to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
            before: before.iter().map(|s| s.to_string()).collect(),
            sequence: vec![Mode::Standby],
            allowed_standby_state_list: vec![crate::model::Healthz::Up],
            timeout_secs: 200,
            service_endpoint: String::new(),
            healthz_endpoint: None,
        }
    }

    fn two_site_state() -> ClusterState {
        let mut state = ClusterState::new(["site-1".into(), "site-2".into()]).unwrap();
        for s in state.sites.values_mut() {
            s.reachable = Some(true);
        }
        state
    }

    #[test]
    fn merges_dependency_across_sites() {
        let mut state = two_site_state();
        state.services.get_mut("site-1").unwrap().insert("A".into(), record("A", &[], &[]));
        state.services.get_mut("site-1").unwrap().insert("B".into(), record("B", &["A"], &[]));
        state.services.get_mut("site-2").unwrap().insert("A".into(), record("A", &[], &[]));
        state.services.get_mut("site-2").unwrap().insert("B".into(), record("B", &[], &[]));

        let result = plan(&state, "stateful", None, None, &[]);
        assert!(result.minor_issues_ok);
        assert_eq!(result.ordered, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn dangling_dependency_is_dropped_and_flagged() {
        let mut state = two_site_state();
        state.services.get_mut("site-1").unwrap().insert("X".into(), record("X", &["missing"], &[]));

        let result = plan(&state, "stateful", None, None, &[]);
        assert!(!result.minor_issues_ok);
        assert_eq!(result.ordered, vec!["X".to_string()]);
    }

    #[test]
    fn cycle_is_a_major_integrity_error() {
        let mut state = two_site_state();
        state.services.get_mut("site-1").unwrap().insert("A".into(), record("A", &["B"], &[]));
        state.services.get_mut("site-1").unwrap().insert("B".into(), record("B", &["A"], &[]));

        let result = plan(&state, "stateful", None, None, &[]);
        assert!(result.graph.is_none());
        assert!(result.ordered.is_empty());
    }
}
