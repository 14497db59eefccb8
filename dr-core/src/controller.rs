//! Procedure Controller: composes the planner, validator, DR sequence
//! planner, and scheduler into the user-facing commands (`list`, `status`,
//! the site commands, `move`, `stop`).
//!
//! Grounded in `examples/original_source/sm_client/processing.py`
//! (`process_module_services`, `sm_process_service_with_polling`) for the
//! module-flow iteration rules, and in the teacher's
//! `ClusterManager::execute_action` (`examples/phkaiser13-Peitch/.../cluster_manager.rs`)
//! for the overall "plan stages, then run the scheduler per stage" shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::buckets::ResultBuckets;
use crate::dr_sequence::{self, Procedure};
use crate::error::{DrError, Result};
use crate::executor::{ExecutorConfig, ServiceExecutor};
use crate::model::{ClusterState, Command, FlowEntry, Mode, ServiceDrStatus};
use crate::planner;
use crate::scheduler;
use crate::transport::Transport;
use crate::validator::{self, Restrictions};

pub struct RunOptions {
    pub force: bool,
    pub ignore_restrictions: bool,
    pub no_wait: bool,
    pub run_services: Option<Vec<String>>,
    pub skip_services: Vec<String>,
    pub dry_run: bool,
    pub restrictions: Restrictions,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            force: false,
            ignore_restrictions: false,
            no_wait: true,
            run_services: None,
            skip_services: Vec::new(),
            dry_run: false,
            restrictions: Restrictions::new(),
        }
    }
}

/// Composes planner, validator, DR sequence planner, and scheduler.
/// Holds the transport behind an `Arc` — matching spec.md's "transport
/// session pool is process-global and safe for concurrent use" — so
/// scheduler worker closures can each hold a cheap, owned handle to it
/// without the controller itself needing to outlive the scheduler run.
pub struct Controller {
    transport: Arc<Transport>,
    executor_config: ExecutorConfig,
}

/// A planned step, surfaced for `--dry-run` without ever reaching the
/// executor.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub service: String,
    pub site: String,
    pub mode: Mode,
}

/// Outcome of a site command or DR procedure. `list` and `status` bypass
/// this type entirely — they return their tables directly since they never
/// touch the scheduler or the `--dry-run` short-circuit.
pub enum RunOutcome {
    Buckets(ResultBuckets),
    Planned(Vec<PlannedStep>),
}

impl Controller {
    pub fn new(transport: Arc<Transport>, executor_config: ExecutorConfig) -> Self {
        Controller { transport, executor_config }
    }

    fn executor(&self) -> ServiceExecutor<'_> {
        ServiceExecutor::new(&self.transport, self.executor_config.clone())
    }

    pub fn list(&self, state: &ClusterState) -> Vec<String> {
        state.services_for_ok_sites()
    }

    pub async fn status(&self, state: &ClusterState, flow: &[FlowEntry]) -> BTreeMap<(String, String), ServiceDrStatus> {
        let executor = self.executor();
        let mut table = BTreeMap::new();
        let module = flow.first().map(|f| f.module.as_str()).unwrap_or(crate::model::DEFAULT_MODULE);
        let plan = planner::plan(state, module, None, None, &[]);
        for site in state.available_sites() {
            let Some(catalog) = state.services.get(site) else { continue };
            let Some(site_manager_url) = state.site_manager_url(site) else { continue };
            let token = state.sites.get(site).and_then(|s| s.token.as_deref());
            for service in &plan.ordered {
                if catalog.get(service).is_none() {
                    continue;
                }
                let status = executor.query_status(&site_manager_url, service, token).await;
                table.insert((site.to_string(), service.clone()), status);
            }
        }
        table
    }

    /// Runs `active | standby | disable | return` against `site`, honoring
    /// flow-entry filtering and per-module cascade-skip.
    pub async fn run_site_command(
        &self,
        state: &ClusterState,
        command: Command,
        site: &str,
        flow: &[FlowEntry],
        opts: &RunOptions,
    ) -> Result<RunOutcome> {
        let target_mode = command
            .as_mode()
            .ok_or_else(|| DrError::InvalidCommand(format!("{command:?} is not a site command")))?;

        validator::validate_reachability(state, command, Some(site))?;

        let mut buckets = ResultBuckets::new();
        let mut planned = Vec::new();
        let mut halted = false;

        for entry in flow {
            if halted {
                for s in state.module_services(site, &entry.module) {
                    buckets.skip_due_deps(&s);
                }
                continue;
            }

            match site_command_flow_decision(entry, command) {
                FlowDecision::Skip => continue,
                FlowDecision::Stop => {
                    halted = true;
                    for s in state.module_services(site, &entry.module) {
                        buckets.skip_due_deps(&s);
                    }
                    continue;
                }
                FlowDecision::Run => {}
            }

            let filter = effective_service_filter(opts);
            let plan = planner::plan(state, &entry.module, Some(site), filter.as_deref(), &opts.skip_services);
            validator::validate_deps_issue(command, plan.minor_issues_ok, plan.graph.is_some())?;
            let Some(graph) = plan.graph else {
                return Err(DrError::PlannerCycle { module: entry.module.clone() });
            };

            validator::validate_service_existence(state, command, Some(site), &plan.ordered)?;
            validator::validate_cross_site_consistency(state, command, &plan.ordered)?;

            if !opts.ignore_restrictions && !opts.restrictions.is_empty() {
                let executor = self.executor();
                let site_order: Vec<String> = state.sites.keys().cloned().collect();
                validator::validate_state_restrictions(
                    &executor, state, site, target_mode, &plan.ordered, &opts.restrictions, &site_order,
                )
                .await?;
            }

            if opts.dry_run {
                for service in &plan.ordered {
                    planned.push(PlannedStep { service: service.clone(), site: site.to_string(), mode: target_mode });
                }
                continue;
            }

            let catalog = state.services.get(site).cloned().unwrap_or_default();
            let Some(site_manager_url) = state.site_manager_url(site) else {
                return Err(DrError::Validation(format!("site '{site}' has no configured endpoint")));
            };
            let executor_config = self.executor_config.clone();
            let transport = Arc::clone(&self.transport);
            let force = opts.force;
            let no_wait = opts.no_wait;
            let token = state.sites.get(site).and_then(|s| s.token.clone());

            scheduler::run(graph, &mut buckets, move |service_name| {
                let catalog = catalog.clone();
                let transport = Arc::clone(&transport);
                let executor_config = executor_config.clone();
                let token = token.clone();
                let site_manager_url = site_manager_url.clone();
                async move {
                    let Some(record) = catalog.get(&service_name) else {
                        return ServiceDrStatus::empty(&service_name);
                    };
                    let executor = ServiceExecutor::new(&transport, executor_config);
                    executor
                        .execute(&site_manager_url, record, target_mode, no_wait, force, false, token.as_deref())
                        .await
                }
            })
            .await;

            if buckets.has_failures() {
                halted = true;
            }
        }

        if opts.dry_run {
            Ok(RunOutcome::Planned(planned))
        } else {
            Ok(RunOutcome::Buckets(buckets))
        }
    }

    /// Runs `move` (switchover) or `stop` (failover) against `site`.
    ///
    /// Per spec.md §4.7, a flow entry's `states` selects which phase this
    /// procedure runs for that module: `states: None` (the default,
    /// `stateful`-shaped module) runs the module's full two-step, two-site
    /// transition (`dr_sequence::operation_sequence`) as one scheduler unit,
    /// so dependency ordering (`after`/`before`) delays a dependent service
    /// until its ancestor has completed *both* steps. An entry with
    /// `states` set instead runs a single step at a site computed from
    /// `states[0]` and the procedure, ported from `get_cmd()`/`get_site()`
    /// in `processing.py::process_module_services`
    /// (see [`dr_flow_entry_phase`]).
    pub async fn run_dr_procedure(
        &self,
        state: &ClusterState,
        command: Command,
        site: &str,
        flow: &[FlowEntry],
        opts: &RunOptions,
    ) -> Result<RunOutcome> {
        let procedure = match command {
            Command::Move => Procedure::Move,
            Command::Stop => Procedure::Stop,
            _ => return Err(DrError::InvalidCommand(format!("{command:?} is not a DR procedure"))),
        };

        validator::validate_reachability(state, command, Some(site))?;
        let opposite = state
            .opposite_site(site)
            .ok_or_else(|| DrError::Validation("no opposite site configured".into()))?
            .to_string();

        let mut buckets = ResultBuckets::new();
        let mut planned = Vec::new();
        let mut halted = false;

        for entry in flow {
            if halted {
                for s in state.module_services(site, &entry.module) {
                    buckets.skip_due_deps(&s);
                }
                continue;
            }

            let phase = dr_flow_entry_phase(procedure, site, &opposite, &entry.states);

            let filter = effective_service_filter(opts);
            let plan = planner::plan(state, &entry.module, None, filter.as_deref(), &opts.skip_services);
            validator::validate_deps_issue(command, plan.minor_issues_ok, plan.graph.is_some())?;
            let Some(graph) = plan.graph else {
                return Err(DrError::PlannerCycle { module: entry.module.clone() });
            };

            if command == Command::Move {
                validator::validate_service_existence(state, command, Some(site), &plan.ordered)?;
            }
            validator::validate_cross_site_consistency(state, command, &plan.ordered)?;

            let site_catalog = state.services.get(site).cloned().unwrap_or_default();
            let opposite_catalog = state.services.get(&opposite).cloned().unwrap_or_default();

            if opts.dry_run {
                for service in &plan.ordered {
                    let Some(reference) = site_catalog.get(service).or_else(|| opposite_catalog.get(service)) else {
                        continue;
                    };
                    match &phase {
                        FlowPhase::FullSequence => {
                            let mode = reference.primary_sequence_mode();
                            for step in dr_sequence::operation_sequence(procedure, site, &opposite, mode) {
                                planned.push(PlannedStep { service: service.clone(), site: step.site, mode: step.mode });
                            }
                        }
                        FlowPhase::SingleStep { mode, site: phase_site } => {
                            planned.push(PlannedStep { service: service.clone(), site: phase_site.clone(), mode: *mode });
                        }
                    }
                }
                continue;
            }

            let transport = Arc::clone(&self.transport);
            let executor_config = self.executor_config.clone();
            let requested = site.to_string();
            let opposite_name = opposite.clone();
            let no_wait = opts.no_wait;
            let global_force = opts.force;
            let requested_token = state.sites.get(site).and_then(|s| s.token.clone());
            let opposite_token = state.sites.get(&opposite).and_then(|s| s.token.clone());
            let Some(requested_url) = state.site_manager_url(site) else {
                return Err(DrError::Validation(format!("site '{site}' has no configured endpoint")));
            };
            let Some(opposite_url) = state.site_manager_url(&opposite) else {
                return Err(DrError::Validation(format!("site '{opposite}' has no configured endpoint")));
            };
            let phase = phase.clone();

            scheduler::run(graph, &mut buckets, move |service_name| {
                let site_catalog = site_catalog.clone();
                let opposite_catalog = opposite_catalog.clone();
                let transport = Arc::clone(&transport);
                let executor_config = executor_config.clone();
                let requested = requested.clone();
                let opposite_name = opposite_name.clone();
                let requested_token = requested_token.clone();
                let opposite_token = opposite_token.clone();
                let requested_url = requested_url.clone();
                let opposite_url = opposite_url.clone();
                let phase = phase.clone();
                async move {
                    let record_on_requested = site_catalog.get(&service_name);
                    let record_on_opposite = opposite_catalog.get(&service_name);
                    let Some(reference_record) = record_on_requested.or(record_on_opposite) else {
                        return ServiceDrStatus::empty(&service_name);
                    };

                    let executor = ServiceExecutor::new(&transport, executor_config);

                    match phase {
                        FlowPhase::FullSequence => {
                            let mode = reference_record.primary_sequence_mode();
                            let steps = dr_sequence::operation_sequence(procedure, &requested, &opposite_name, mode);
                            let mut last = ServiceDrStatus::empty(&service_name);
                            for step in &steps {
                                let (record, token, url) = if step.site == requested {
                                    (record_on_requested, requested_token.as_deref(), &requested_url)
                                } else {
                                    (record_on_opposite, opposite_token.as_deref(), &opposite_url)
                                };
                                let Some(record) = record else { continue };
                                let status = executor
                                    .execute(
                                        url,
                                        record,
                                        step.mode,
                                        no_wait,
                                        step.force || global_force,
                                        step.allow_failure,
                                        token,
                                    )
                                    .await;
                                let step_failed = !status.is_ok();
                                last = status;
                                if step_failed && !step.allow_failure {
                                    break;
                                }
                            }
                            last
                        }
                        FlowPhase::SingleStep { mode, site: phase_site } => {
                            let (record, token, url) = if phase_site == requested {
                                (record_on_requested, requested_token.as_deref(), &requested_url)
                            } else {
                                (record_on_opposite, opposite_token.as_deref(), &opposite_url)
                            };
                            let Some(record) = record else {
                                return ServiceDrStatus::empty(&service_name);
                            };
                            executor.execute(url, record, mode, no_wait, global_force, false, token).await
                        }
                    }
                }
            })
            .await;

            if buckets.has_failures() {
                halted = true;
            }
        }

        if opts.dry_run {
            Ok(RunOutcome::Planned(planned))
        } else {
            Ok(RunOutcome::Buckets(buckets))
        }
    }
}

/// Which phase a `move`/`stop` flow entry runs: the module's full two-step,
/// two-site sequence, or a single step at one computed site.
#[derive(Debug, Clone)]
enum FlowPhase {
    FullSequence,
    SingleStep { mode: Mode, site: String },
}

/// Ports `get_cmd()`/`get_site()` from
/// `examples/original_source/sm_client/processing.py::process_module_services`.
/// `states: None` runs the module's full sequence; `states: Some([..])`
/// derives a single mode (`states[0]`) and targets whichever site plays
/// that role: `stop` passivates the requested site, so an `active` phase
/// moves to the opposite site and anything else stays on the requested
/// site; `move` activates the requested site, so it's the other way
/// around.
fn dr_flow_entry_phase(procedure: Procedure, requested_site: &str, opposite_site: &str, states: &Option<Vec<Mode>>) -> FlowPhase {
    let Some(states) = states else {
        return FlowPhase::FullSequence;
    };
    let mode = states.first().copied().unwrap_or(Mode::Standby);
    let runs_on_opposite = match procedure {
        Procedure::Stop => mode == Mode::Active,
        Procedure::Move => mode != Mode::Active,
    };
    let site = if runs_on_opposite { opposite_site.to_string() } else { requested_site.to_string() };
    FlowPhase::SingleStep { mode, site }
}

enum FlowDecision {
    Run,
    Skip,
    Stop,
}

/// Filters flow entries for a site command per spec.md §4.7: `active`
/// skips entries whose `states` excludes `active`; the passivating
/// commands (`standby`, `disable`, `return`) stop iterating entirely once
/// an entry restricted to `states = [active]` is reached.
fn site_command_flow_decision(entry: &FlowEntry, command: Command) -> FlowDecision {
    match command {
        Command::Active => match &entry.states {
            Some(states) if !states.contains(&Mode::Active) => FlowDecision::Skip,
            _ => FlowDecision::Run,
        },
        Command::Standby | Command::Disable | Command::Return => match &entry.states {
            Some(states) if states.len() == 1 && states[0] == Mode::Active => FlowDecision::Stop,
            _ => FlowDecision::Run,
        },
        _ => FlowDecision::Run,
    }
}

fn effective_service_filter(opts: &RunOptions) -> Option<Vec<String>> {
    opts.run_services.clone()
}
