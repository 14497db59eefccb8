//! Logging setup (spec.md §10.4 in SPEC_FULL.md): an `EnvFilter` layer plus
//! a compact `fmt` layer, the non-OpenTelemetry half of the teacher's
//! `k8s/operators/ph_operator/src/main.rs` subscriber-init pattern. Unlike
//! the operator, `sm-client` never exports to Jaeger — that surface belongs
//! to the excluded metrics/tracing plane (spec.md §1 Non-goals).
//!
//! `--output <file>` mirrors `initialization.py`'s `logging.FileHandler`:
//! a second `fmt` layer writes the same events to a file without
//! disabling the stdout layer.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global subscriber. `verbose` raises the default filter
/// from `info` to `debug` for the `dr_core`/`sm_client` targets only,
/// matching the original's `-v` -> `DEBUG` bump without silencing other
/// crates' chatter. `output`, if set, duplicates events to that file.
pub fn init(verbose: bool, output: Option<&Path>) -> Result<()> {
    let default_directive = if verbose { "info,dr_core=debug,sm_client=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true).with_level(true);

    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    match output {
        None => registry.try_init().context("failed to install tracing subscriber")?,
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening --output log file {}", path.display()))?;
            let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file));
            registry.with(file_layer).try_init().context("failed to install tracing subscriber")?;
        }
    }

    Ok(())
}
