//! DR Sequence Planner: derives the ordered `(site, mode)` steps for
//! `move` (switchover) and `stop` (failover), one service at a time.
//!
//! Ported from `examples/original_source/sm_client/data/structures.py::SMClusterState.get_dr_operation_sequence`.

use crate::model::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    Move,
    Stop,
}

/// One step of a DR sequence: the site to act on, the mode to request, and
/// whether a failure at this step is tolerated (`allow_failure`/`force`,
/// only ever set on `stop`'s passivation-of-the-failing-side step).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrStep {
    pub site: String,
    pub mode: Mode,
    pub allow_failure: bool,
    pub force: bool,
}

/// `mode` is the `sequence[0]` value the caller looked up (on the
/// requested site for `move`, or on whichever site the service still
/// exists for `stop` — the opposite site if present there, else the
/// requested site, per spec.md §4.4).
pub fn operation_sequence(
    procedure: Procedure,
    requested_site: &str,
    opposite_site: &str,
    mode: Mode,
) -> Vec<DrStep> {
    match procedure {
        Procedure::Move => match mode {
            Mode::Standby => vec![
                DrStep { site: opposite_site.to_string(), mode: Mode::Standby, allow_failure: false, force: false },
                DrStep { site: requested_site.to_string(), mode: Mode::Active, allow_failure: false, force: false },
            ],
            _ => vec![
                DrStep { site: requested_site.to_string(), mode: Mode::Active, allow_failure: false, force: false },
                DrStep { site: opposite_site.to_string(), mode: Mode::Standby, allow_failure: false, force: false },
            ],
        },
        Procedure::Stop => match mode {
            Mode::Standby => vec![
                DrStep { site: requested_site.to_string(), mode: Mode::Standby, allow_failure: true, force: true },
                DrStep { site: opposite_site.to_string(), mode: Mode::Active, allow_failure: false, force: false },
            ],
            _ => vec![
                DrStep { site: opposite_site.to_string(), mode: Mode::Active, allow_failure: false, force: false },
                DrStep { site: requested_site.to_string(), mode: Mode::Standby, allow_failure: true, force: true },
            ],
        },
    }
}
