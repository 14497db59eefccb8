//! Cross-site disaster-recovery orchestration engine.
//!
//! Plans and executes DR role transitions (`active`/`standby`/`disable`)
//! for microservices spread across exactly two Kubernetes sites, each
//! fronted by a Site Manager HTTP endpoint. See the component modules for
//! the pieces: [`transport`] issues the HTTP calls, [`discovery`] probes
//! both sites and populates the cluster catalog, [`planner`] builds the
//! per-module dependency graph, [`dr_sequence`] derives switchover/
//! failover step order, [`executor`] drives one service through its state
//! machine, [`scheduler`] walks the graph with cascade-skip, and
//! [`controller`] composes all of the above into the user-facing commands.

pub mod buckets;
pub mod controller;
pub mod discovery;
pub mod dr_sequence;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod planner;
pub mod scheduler;
pub mod transport;
pub mod validator;

pub use buckets::ResultBuckets;
pub use controller::{Controller, PlannedStep, RunOptions, RunOutcome};
pub use error::{DrError, Result, TransportError};
pub use model::{ClusterState, Command, FlowEntry, Mode, ServiceDrStatus, ServiceRecord, Site};
pub use transport::{Transport, TransportConfig};
