#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::ops::{BitOr, BitOrAssign};

use franz_protocol::ErrorKind;

/// Corrective actions derived from an error. Several bits may be set at
/// once, e.g. `REFRESH | RETRY` for a stale generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Actions(u8);

impl Actions {
    pub const NONE: Actions = Actions(0);
    /// Surface the error to the caller; no recovery is attempted.
    pub const PERMANENT: Actions = Actions(1);
    pub const IGNORE: Actions = Actions(1 << 1);
    /// Metadata or coordinator state is stale; invalidate and re-discover.
    pub const REFRESH: Actions = Actions(1 << 2);
    /// Re-enqueue the same request on the same broker.
    pub const RETRY: Actions = Actions(1 << 3);
    /// Log-only advisory.
    pub const INFORM: Actions = Actions(1 << 4);
    /// Escalates REFRESH from coordinator re-query to coordinator-dead.
    pub const SPECIAL: Actions = Actions(1 << 5);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Actions) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: Actions) -> Actions {
        Actions(self.0 & !other.0)
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        Actions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Actions {
    fn bitor_assign(&mut self, rhs: Actions) {
        self.0 |= rhs.0;
    }
}

impl Display for Actions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names = [
            (Self::PERMANENT, "Permanent"),
            (Self::IGNORE, "Ignore"),
            (Self::REFRESH, "Refresh"),
            (Self::RETRY, "Retry"),
            (Self::INFORM, "Inform"),
            (Self::SPECIAL, "Special"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Decide the corrective actions for `err`.
///
/// `overrides` is an ordered `(actions, error)` list consulted first; if any
/// pair matches, the OR of the matching pairs is the result and the default
/// table is skipped. `has_request` must be false on error-fabrication paths
/// where no request buffer exists; retrying without a buffer is impossible,
/// so the RETRY bit is masked out.
pub fn err_action(
    err: ErrorKind,
    overrides: &[(Actions, ErrorKind)],
    has_request: bool,
) -> Actions {
    if !err.is_error() {
        return Actions::NONE;
    }

    let mut actions = Actions::NONE;
    for (bits, code) in overrides {
        if *code == err {
            actions |= *bits;
        }
    }

    if actions.is_empty() {
        actions = match err {
            ErrorKind::LeaderNotAvailable
            | ErrorKind::NotLeaderForPartition
            | ErrorKind::BrokerNotAvailable
            | ErrorKind::ReplicaNotAvailable
            | ErrorKind::GroupCoordinatorNotAvailable
            | ErrorKind::NotCoordinatorForGroup
            | ErrorKind::WaitCoord => Actions::REFRESH,
            ErrorKind::TimedOut
            | ErrorKind::TimedOutQueue
            | ErrorKind::RequestTimedOut
            | ErrorKind::NotEnoughReplicas
            | ErrorKind::NotEnoughReplicasAfterAppend
            | ErrorKind::Transport => Actions::RETRY,
            _ => Actions::PERMANENT,
        };
    }

    if !has_request {
        actions = actions.without(Actions::RETRY);
    }

    actions
}
