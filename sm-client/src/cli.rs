//! CLI surface (spec.md §6.3), in the style of the `clap`
//! `#[derive(Parser)]` trees used across the retrieval pack (e.g.
//! `examples/abiolaogu-SASE-SDWAN/cli`).

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sm-client", about = "Cross-site disaster-recovery orchestration client", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the YAML configuration file.
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: std::path::PathBuf,

    /// Raise log verbosity to debug for dr_core/sm_client targets.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip TLS certificate verification for every site.
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// Restrict the run to this comma-separated list of service names.
    #[arg(long, global = true, value_delimiter = ',')]
    pub run_services: Vec<String>,

    /// Exclude this comma-separated list of service names from the run.
    #[arg(long, global = true, value_delimiter = ',')]
    pub skip_services: Vec<String>,

    /// Ignore healthz when deciding whether a transition succeeded.
    #[arg(long, global = true)]
    pub force: bool,

    /// Skip the state-restriction validation gate.
    #[arg(long, global = true)]
    pub ignore_restrictions: bool,

    /// Also write structured logs to this file, in addition to stdout.
    #[arg(long, global = true)]
    pub output: Option<std::path::PathBuf>,

    /// Plan and validate only; print the planned steps without mutating
    /// any service.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the client version and exit.
    Version,
    /// List every known service across reachable sites.
    List,
    /// Print a per-site, per-service status table.
    Status,
    /// Activate every managed service at `site`.
    Active { site: String },
    /// Put every managed service at `site` into standby.
    Standby { site: String },
    /// Disable every managed service at `site`.
    Disable { site: String },
    /// Return `site` to standby (alias for `standby` at the mode level).
    Return { site: String },
    /// Switchover: move the active role to `site`.
    Move { site: String },
    /// Failover: treat `site` as failing and activate its peer.
    Stop { site: String },
}

impl Command {
    pub fn site(&self) -> Option<&str> {
        match self {
            Command::Active { site }
            | Command::Standby { site }
            | Command::Disable { site }
            | Command::Return { site }
            | Command::Move { site }
            | Command::Stop { site } => Some(site),
            Command::Version | Command::List | Command::Status => None,
        }
    }

    pub fn as_core(&self) -> Option<dr_core::model::Command> {
        match self {
            Command::Version => None,
            Command::List => Some(dr_core::model::Command::List),
            Command::Status => Some(dr_core::model::Command::Status),
            Command::Active { .. } => Some(dr_core::model::Command::Active),
            Command::Standby { .. } => Some(dr_core::model::Command::Standby),
            Command::Disable { .. } => Some(dr_core::model::Command::Disable),
            Command::Return { .. } => Some(dr_core::model::Command::Return),
            Command::Move { .. } => Some(dr_core::model::Command::Move),
            Command::Stop { .. } => Some(dr_core::model::Command::Stop),
        }
    }
}
