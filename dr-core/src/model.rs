//! Data model: sites, service records, DR status, and cluster state.
//!
//! Types here are plain data — no I/O, no graph algorithms. Keeping them
//! free of behavior beyond small derivations (`ServiceDrStatus::is_ok`,
//! `ClusterState::available_sites`, ...) makes the planner/validator/
//! scheduler, which all consume this model, independently testable.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// The DR role of a service at a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Active,
    Standby,
    Disable,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Active => "active",
            Mode::Standby => "standby",
            Mode::Disable => "disable",
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "active" => Some(Mode::Active),
            "standby" => Some(Mode::Standby),
            "disable" => Some(Mode::Disable),
            _ => None,
        }
    }
}

/// A service's liveness self-report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Healthz {
    Up,
    Down,
    Degraded,
}

impl Healthz {
    pub fn as_str(&self) -> &'static str {
        match self {
            Healthz::Up => "up",
            Healthz::Down => "down",
            Healthz::Degraded => "degraded",
        }
    }

    pub fn parse(s: &str) -> Option<Healthz> {
        match s {
            "up" => Some(Healthz::Up),
            "down" => Some(Healthz::Down),
            "degraded" => Some(Healthz::Degraded),
            _ => None,
        }
    }
}

/// The outcome of a single status poll against a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecStatus {
    Running,
    Done,
    Failed,
    Queue,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Running => "running",
            ExecStatus::Done => "done",
            ExecStatus::Failed => "failed",
            ExecStatus::Queue => "queue",
        }
    }

    pub fn parse(s: &str) -> Option<ExecStatus> {
        match s {
            "running" => Some(ExecStatus::Running),
            "done" => Some(ExecStatus::Done),
            "failed" => Some(ExecStatus::Failed),
            "queue" => Some(ExecStatus::Queue),
            _ => None,
        }
    }
}

/// A managed microservice's declared configuration on one site, as
/// discovered from that site's Site Manager catalog (`GET /sitemanager`).
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    pub name: String,
    pub module: String,
    pub after: Vec<String>,
    pub before: Vec<String>,
    pub sequence: Vec<Mode>,
    pub allowed_standby_state_list: Vec<Healthz>,
    pub timeout_secs: u64,
    pub service_endpoint: String,
    pub healthz_endpoint: Option<String>,
}

impl ServiceRecord {
    /// `sequence[0]`, or the documented default of `standby` when empty.
    pub fn primary_sequence_mode(&self) -> Mode {
        self.sequence.first().copied().unwrap_or(Mode::Standby)
    }
}

/// CA verification policy for a site's Site Manager endpoint.
#[derive(Debug, Clone)]
pub enum Verify {
    Ca(PathBuf),
    SystemDefault,
    Skip,
}

/// One of the exactly-two Kubernetes sites coordinated by this run.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    pub endpoint: String,
    pub token: Option<String>,
    pub verify: Verify,
    /// Set by discovery; `None` until the first probe runs.
    pub reachable: Option<bool>,
    /// HTTP status on success, SSL error number (1 or 8) on SSL failure,
    /// `None` on decode/network failure (the "false-sentinel" in spec terms).
    pub return_code: Option<i64>,
}

impl Site {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Site {
            name: name.into(),
            endpoint: endpoint.into(),
            token: None,
            verify: Verify::SystemDefault,
            reachable: None,
            return_code: None,
        }
    }
}

/// The result of a status query or transition attempt for one service.
#[derive(Debug, Clone)]
pub struct ServiceDrStatus {
    pub service: String,
    pub mode: Option<Mode>,
    pub status: Option<ExecStatus>,
    pub healthz: Option<Healthz>,
    pub message: String,
    /// Mode-aware success, computed by the Service Executor.
    pub service_status: bool,
    /// True for failover's tolerated passivation step.
    pub allow_failure: bool,
}

impl ServiceDrStatus {
    /// A synthetic "never attempted" status, used for cascade-skipped
    /// services that are reported back through the scheduler without a
    /// real HTTP round trip.
    pub fn empty(service: impl Into<String>) -> Self {
        ServiceDrStatus {
            service: service.into(),
            mode: None,
            status: None,
            healthz: None,
            message: String::new(),
            service_status: false,
            allow_failure: false,
        }
    }

    /// `is_ok ↔ service_status ∨ allow_failure` (Data Model invariant).
    pub fn is_ok(&self) -> bool {
        self.service_status || self.allow_failure
    }
}

/// Per-module planning output, rebuilt by the planner on every call.
#[derive(Debug, Clone, Default)]
pub struct ModuleGlobals {
    pub ordered_list: Vec<String>,
    pub deps_issue: bool,
    /// `None` only on a cycle (major integrity error); see planner.
    pub has_graph: bool,
}

/// The two-site in-memory structure the planner, validator, and
/// scheduler all read from and write into during one procedure run.
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub sites: BTreeMap<String, Site>,
    pub services: BTreeMap<String, BTreeMap<String, ServiceRecord>>,
    pub globals: BTreeMap<String, ModuleGlobals>,
}

impl ClusterState {
    /// Constructs cluster state over exactly two site names. Mirrors the
    /// Python original's `SMClusterState.__init__`, which raises
    /// `ValueError("Only two sites in clusters are supported")` on a
    /// third site.
    pub fn new(site_names: [String; 2]) -> crate::error::Result<Self> {
        if site_names[0] == site_names[1] {
            return Err(crate::error::DrError::Configuration(
                "site names must be distinct".into(),
            ));
        }
        let mut sites = BTreeMap::new();
        let mut services = BTreeMap::new();
        for name in site_names {
            services.insert(name.clone(), BTreeMap::new());
            sites.insert(name.clone(), Site::new(name, ""));
        }
        Ok(ClusterState {
            sites,
            services,
            globals: BTreeMap::new(),
        })
    }

    pub fn available_sites(&self) -> Vec<&str> {
        self.sites
            .values()
            .filter(|s| s.reachable == Some(true))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn opposite_site(&self, site: &str) -> Option<&str> {
        self.sites
            .keys()
            .map(|s| s.as_str())
            .find(|s| *s != site)
    }

    /// The single HTTP surface every `sm_client` <-> Site Manager exchange
    /// goes through (spec.md §6.1: `POST/GET {endpoint}/sitemanager`,
    /// service selected via the `run-service` field). A `ServiceRecord`'s
    /// own `service_endpoint`/`healthz_endpoint` belong to the managed
    /// service and are consumed transitively by the Site Manager, never
    /// dialed directly by this client.
    pub fn site_manager_url(&self, site: &str) -> Option<String> {
        self.sites
            .get(site)
            .map(|s| format!("{}/sitemanager", s.endpoint.trim_end_matches('/')))
    }

    /// Union of service names across every reachable site.
    pub fn services_for_ok_sites(&self) -> Vec<String> {
        let mut set = std::collections::BTreeSet::new();
        for site in self.available_sites() {
            if let Some(map) = self.services.get(site) {
                set.extend(map.keys().cloned());
            }
        }
        set.into_iter().collect()
    }

    pub fn module_services(&self, site: &str, module: &str) -> Vec<String> {
        self.services
            .get(site)
            .map(|m| {
                m.values()
                    .filter(|s| s.module == module)
                    .map(|s| s.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn service_exists(&self, site: &str, service: &str) -> bool {
        self.services
            .get(site)
            .map(|m| m.contains_key(service))
            .unwrap_or(false)
    }
}

/// One entry of the ordered module flow from config: a module name plus
/// an optional restriction on which DR-mode phases it participates in.
#[derive(Debug, Clone)]
pub struct FlowEntry {
    pub module: String,
    pub states: Option<Vec<Mode>>,
}

pub const DEFAULT_MODULE: &str = "stateful";

/// The user-facing procedure, as dispatched by the Procedure Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    List,
    Status,
    Active,
    Standby,
    Disable,
    Return,
    Move,
    Stop,
}

impl Command {
    pub fn parse(s: &str) -> Option<Command> {
        match s {
            "list" => Some(Command::List),
            "status" => Some(Command::Status),
            "active" => Some(Command::Active),
            "standby" => Some(Command::Standby),
            "disable" => Some(Command::Disable),
            "return" => Some(Command::Return),
            "move" => Some(Command::Move),
            "stop" => Some(Command::Stop),
            _ => None,
        }
    }

    /// `return` maps to `standby` as a DR mode; the other site commands
    /// are themselves valid modes.
    pub fn as_mode(&self) -> Option<Mode> {
        match self {
            Command::Active => Some(Mode::Active),
            Command::Standby => Some(Mode::Standby),
            Command::Disable => Some(Mode::Disable),
            Command::Return => Some(Mode::Standby),
            _ => None,
        }
    }

    pub fn is_site_scoped(&self) -> bool {
        matches!(
            self,
            Command::Active | Command::Standby | Command::Disable | Command::Return | Command::Move | Command::Stop
        )
    }
}
