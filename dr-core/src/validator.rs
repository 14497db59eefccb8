//! Validator: command-specific preconditions that must pass before any
//! executor call is made. A hard failure raises `DrError::Validation`;
//! minor issues are logged as warnings and returned alongside the result.
//!
//! Ported from `examples/original_source/sm_client/validation.py`
//! (`validate_stop_operation`, `validate_move_operation`,
//! `validate_readonly_operation`, `validate_sites_operation`, and the
//! `check_state_restrictions` state-prediction walk).

use std::collections::BTreeMap;

use crate::error::{DrError, Result};
use crate::executor::ServiceExecutor;
use crate::model::{ClusterState, Command, Mode};

/// Forbidden final per-site mode tuples, keyed by service name or `"*"`.
/// Values are dash-joined mode strings in config site order, e.g.
/// `"active-active"` for a two-site config.
pub type Restrictions = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default, Clone)]
pub struct ValidationOutcome {
    pub warnings: Vec<String>,
}

/// Per-command preconditions from spec.md §4.8's table, run before any
/// executor call.
pub fn validate_reachability(
    state: &ClusterState,
    command: Command,
    site: Option<&str>,
) -> Result<ValidationOutcome> {
    let mut out = ValidationOutcome::default();

    let site_reachable = |name: &str| -> bool {
        state.sites.get(name).and_then(|s| s.reachable).unwrap_or(false)
    };

    match command {
        Command::Active | Command::Standby | Command::Disable | Command::Return => {
            let site = site.ok_or_else(|| DrError::Validation("site required".into()))?;
            if !site_reachable(site) {
                return Err(DrError::Validation(format!("target site '{site}' is unreachable")));
            }
        }
        Command::Move => {
            let site = site.ok_or_else(|| DrError::Validation("site required".into()))?;
            let opposite = state
                .opposite_site(site)
                .ok_or_else(|| DrError::Validation("no opposite site configured".into()))?;
            if !site_reachable(site) {
                return Err(DrError::Validation(format!("target site '{site}' is unreachable")));
            }
            if !site_reachable(opposite) {
                return Err(DrError::Validation(format!("opposite site '{opposite}' is unreachable")));
            }
        }
        Command::Stop => {
            let site = site.ok_or_else(|| DrError::Validation("site required".into()))?;
            let opposite = state
                .opposite_site(site)
                .ok_or_else(|| DrError::Validation("no opposite site configured".into()))?;
            if !site_reachable(opposite) {
                return Err(DrError::Validation(format!(
                    "opposite site '{opposite}' must be reachable to fail over"
                )));
            }
            if !site_reachable(site) {
                out.warnings
                    .push(format!("failing site '{site}' is unreachable; its passivation step will be tolerated"));
            }
        }
        Command::Status | Command::List => {
            if state.available_sites().is_empty() {
                return Err(DrError::Validation("no reachable site available".into()));
            }
        }
    }

    Ok(out)
}

/// Checks the planner's `minor_issues_ok`/graph outcome against the
/// command's dependency-issue tolerance: `move` fails hard on any major
/// or minor issue; the site commands fail hard only on a major issue
/// (cycle, i.e. no graph); `stop`/`status`/`list` tolerate a minor issue
/// as long as a graph was produced.
pub fn validate_deps_issue(
    command: Command,
    minor_issues_ok: bool,
    has_graph: bool,
) -> Result<ValidationOutcome> {
    let mut out = ValidationOutcome::default();
    if !has_graph {
        return Err(DrError::PlannerCycle { module: "<module>".into() });
    }
    if !minor_issues_ok {
        match command {
            Command::Move => return Err(DrError::Validation("dangling dependency present; refusing to plan move".into())),
            Command::Active | Command::Standby | Command::Disable | Command::Return => {
                return Err(DrError::Validation("dangling dependency present".into()))
            }
            Command::Stop | Command::Status | Command::List => {
                out.warnings.push("dangling dependency present; tolerated for this command".into());
            }
        }
    }
    Ok(out)
}

/// Services must exist on the sites the command actually touches.
/// `move` requires both sites to carry every in-scope service; `stop`
/// only warns about a mismatch on the target (failing) site; the site
/// commands require existence on the target site; `status`/`list` warn.
pub fn validate_service_existence(
    state: &ClusterState,
    command: Command,
    site: Option<&str>,
    services: &[String],
) -> Result<ValidationOutcome> {
    let mut out = ValidationOutcome::default();
    match command {
        Command::Active | Command::Standby | Command::Disable | Command::Return => {
            let site = site.unwrap();
            for s in services {
                if !state.service_exists(site, s) {
                    return Err(DrError::Validation(format!("service '{s}' does not exist on site '{site}'")));
                }
            }
        }
        Command::Move => {
            let site = site.unwrap();
            let opposite = state.opposite_site(site).unwrap();
            for s in services {
                if !state.service_exists(site, s) || !state.service_exists(opposite, s) {
                    return Err(DrError::Validation(format!(
                        "service '{s}' must exist on both sites for move"
                    )));
                }
            }
        }
        Command::Stop => {
            let site = site.unwrap();
            for s in services {
                if !state.service_exists(site, s) {
                    out.warnings.push(format!("service '{s}' missing on failing site '{site}'"));
                }
            }
        }
        Command::Status | Command::List => {
            for s in services {
                if state.available_sites().iter().all(|site| !state.service_exists(site, s)) {
                    out.warnings.push(format!("service '{s}' not found on any reachable site"));
                }
            }
        }
    }
    Ok(out)
}

/// Cross-site consistency of `before`/`after`/`sequence`: a mismatch is a
/// warning for read-only commands and `stop`, a hard fail for `move`.
pub fn validate_cross_site_consistency(
    state: &ClusterState,
    command: Command,
    services: &[String],
) -> Result<ValidationOutcome> {
    let mut out = ValidationOutcome::default();
    let sites: Vec<&String> = state.sites.keys().collect();
    if sites.len() < 2 {
        return Ok(out);
    }
    for service in services {
        let records: Vec<&crate::model::ServiceRecord> = sites
            .iter()
            .filter_map(|site| state.services.get(*site).and_then(|m| m.get(service)))
            .collect();
        if records.len() < 2 {
            continue;
        }
        let first = records[0];
        let mismatched = records.iter().any(|r| {
            sorted(&r.after) != sorted(&first.after)
                || sorted(&r.before) != sorted(&first.before)
                || r.sequence != first.sequence
        });
        if mismatched {
            let msg = format!("service '{service}' has inconsistent before/after/sequence across sites");
            if command == Command::Move {
                return Err(DrError::Validation(msg));
            }
            out.warnings.push(msg);
        }
    }
    Ok(out)
}

fn sorted(v: &[String]) -> Vec<String> {
    let mut v = v.to_vec();
    v.sort();
    v
}

/// Predicts each service's post-run `(mode_on_requested, mode_on_opposite)`
/// pair and rejects the run if it lies in the forbidden set for that
/// service (or the `*` wildcard). Queries the opposite site's current
/// mode live, since the requested site's mode is about to change to
/// `target_mode` by construction.
pub async fn validate_state_restrictions(
    executor: &ServiceExecutor<'_>,
    state: &ClusterState,
    site: &str,
    target_mode: Mode,
    services: &[String],
    restrictions: &Restrictions,
    site_order: &[String],
) -> Result<()> {
    if restrictions.is_empty() {
        return Ok(());
    }
    let opposite = state
        .opposite_site(site)
        .ok_or_else(|| DrError::Validation("no opposite site configured".into()))?;
    let opposite_token = state.sites.get(opposite).and_then(|s| s.token.as_deref());
    let Some(opposite_url) = state.site_manager_url(opposite) else {
        return Err(DrError::Validation(format!("site '{opposite}' has no configured endpoint")));
    };

    for service in services {
        let forbidden = restrictions
            .get(service)
            .or_else(|| restrictions.get("*"))
            .cloned()
            .unwrap_or_default();
        if forbidden.is_empty() {
            continue;
        }

        if state.services.get(opposite).and_then(|m| m.get(service)).is_none() {
            continue;
        }
        let opposite_status = executor.query_status(&opposite_url, service, opposite_token).await;
        let Some(opposite_mode) = opposite_status.mode else { continue };

        let mut per_site_modes: Vec<&str> = Vec::with_capacity(site_order.len());
        for s in site_order {
            if s == site {
                per_site_modes.push(target_mode.as_str());
            } else if s == opposite {
                per_site_modes.push(opposite_mode.as_str());
            } else {
                per_site_modes.push("--");
            }
        }
        let predicted = per_site_modes.join("-");
        if forbidden.iter().any(|f| f == &predicted) {
            return Err(DrError::Validation(format!(
                "state restriction violated for '{service}': predicted final state '{predicted}' is forbidden"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClusterState;

    fn reachable_state() -> ClusterState {
        let mut state = ClusterState::new(["site-1".into(), "site-2".into()]).unwrap();
        for s in state.sites.values_mut() {
            s.reachable = Some(true);
        }
        state
    }

    #[test]
    fn site_command_rejects_unreachable_target() {
        let mut state = reachable_state();
        state.sites.get_mut("site-1").unwrap().reachable = Some(false);
        let err = validate_reachability(&state, Command::Active, Some("site-1")).unwrap_err();
        assert!(matches!(err, DrError::Validation(_)));
    }

    #[test]
    fn stop_tolerates_unreachable_failing_site() {
        let mut state = reachable_state();
        state.sites.get_mut("site-1").unwrap().reachable = Some(false);
        let out = validate_reachability(&state, Command::Stop, Some("site-1")).unwrap();
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn move_requires_both_sites_reachable() {
        let mut state = reachable_state();
        state.sites.get_mut("site-2").unwrap().reachable = Some(false);
        let err = validate_reachability(&state, Command::Move, Some("site-1")).unwrap_err();
        assert!(matches!(err, DrError::Validation(_)));
    }

    #[test]
    fn cycle_without_graph_is_hard_fail() {
        let err = validate_deps_issue(Command::Status, false, false).unwrap_err();
        assert!(matches!(err, DrError::PlannerCycle { .. }));
    }

    #[test]
    fn move_does_not_tolerate_minor_issue() {
        let err = validate_deps_issue(Command::Move, false, true).unwrap_err();
        assert!(matches!(err, DrError::Validation(_)));
    }

    #[test]
    fn stop_tolerates_minor_issue_when_graph_exists() {
        let out = validate_deps_issue(Command::Stop, false, true).unwrap();
        assert_eq!(out.warnings.len(), 1);
    }
}
