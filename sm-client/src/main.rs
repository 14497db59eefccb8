//! `sm-client` binary: CLI (§6.3) + YAML config (§6.4) + logging, wired into
//! `dr-core`'s orchestration engine. Exit codes follow spec.md §6.3: `0` on
//! a procedure with no failed services, `1` on validation error, transport
//! unavailability that prevents planning, or a non-empty `failed` bucket.

mod cli;
mod config;
mod logging;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use dr_core::controller::{Controller, RunOptions, RunOutcome};
use dr_core::executor::ExecutorConfig;
use dr_core::model::{ClusterState, Site};
use dr_core::transport::{Transport, TransportConfig};
use dr_core::{discovery, validator};

use cli::{Cli, Command};
use config::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command, Command::Version) {
        println!("sm-client {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if let Err(err) = logging::init(cli.verbose, cli.output.as_deref()) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "sm-client aborted");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` on a clean run (no failed services), `Ok(false)` on a
/// validation/execution failure that should exit `1` without a Rust-level
/// error banner, `Err` on a configuration or transport setup problem.
async fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(&cli.config, cli.insecure).context("loading configuration")?;

    let ca_certs: Vec<std::path::PathBuf> = config
        .sites
        .iter()
        .filter_map(|s| match &s.verify {
            dr_core::model::Verify::Ca(path) => Some(path.clone()),
            _ => None,
        })
        .collect();
    let verify = !config.sites.iter().any(|s| matches!(s.verify, dr_core::model::Verify::Skip));

    let transport_config = TransportConfig {
        verify,
        ca_certs,
        token: None,
        use_auth: config.http_auth,
        retries: 3,
        get_timeout: std::time::Duration::from_secs(config.get_request_timeout),
        post_timeout: std::time::Duration::from_secs(config.post_request_timeout),
    };
    let transport = Arc::new(Transport::new(transport_config).context("building HTTP transport")?);

    let site_names = config.sites_for_cluster_state();
    let mut state = ClusterState::new(site_names).context("initializing cluster state")?;
    for resolved in &config.sites {
        state.sites.insert(resolved.name.clone(), Site::from(resolved));
    }

    let flow_modules: Vec<String> = config.flow.iter().map(|f| f.module.clone()).collect();
    discovery::discover(&transport, &mut state, config.service_default_timeout, &flow_modules).await;

    let restrictions = if cli.ignore_restrictions { Default::default() } else { config.restrictions.clone() };
    let opts = RunOptions {
        force: cli.force,
        ignore_restrictions: cli.ignore_restrictions,
        no_wait: true,
        run_services: if cli.run_services.is_empty() { None } else { Some(cli.run_services.clone()) },
        skip_services: cli.skip_services.clone(),
        dry_run: cli.dry_run,
        restrictions,
    };

    let executor_config = ExecutorConfig {
        poll_interval: std::time::Duration::from_secs(5),
        default_timeout: std::time::Duration::from_secs(config.service_default_timeout),
    };
    let controller = Controller::new(Arc::clone(&transport), executor_config);

    match cli.command {
        Command::Version => unreachable!("handled before logging init"),
        Command::List => {
            let services = controller.list(&state);
            output::print_list(&services);
            Ok(true)
        }
        Command::Status => {
            let table = controller.status(&state, &config.flow).await;
            output::print_status_table(&table);
            Ok(true)
        }
        other => {
            let core_command = other.as_core().expect("site-scoped command maps to a core command");
            let site = other.site().expect("site-scoped command carries a site").to_string();

            if !state.sites.contains_key(&site) {
                anyhow::bail!("unknown site '{site}'; configured sites are {:?}", state.sites.keys().collect::<Vec<_>>());
            }
            let reachability = validator::validate_reachability(&state, core_command, Some(&site)).context("validation failed")?;
            for warning in &reachability.warnings {
                tracing::warn!(%warning, "validation warning");
            }

            let outcome = if matches!(core_command, dr_core::model::Command::Move | dr_core::model::Command::Stop) {
                controller.run_dr_procedure(&state, core_command, &site, &config.flow, &opts).await
            } else {
                controller.run_site_command(&state, core_command, &site, &config.flow, &opts).await
            };

            match outcome {
                Ok(RunOutcome::Planned(steps)) => {
                    output::print_planned_steps(&steps);
                    Ok(true)
                }
                Ok(RunOutcome::Buckets(buckets)) => {
                    output::print_buckets(&buckets);
                    Ok(!buckets.has_failures())
                }
                Err(dr_core::DrError::Validation(msg)) => {
                    eprintln!("validation error: {msg}");
                    Ok(false)
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}
