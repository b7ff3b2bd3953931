#![forbid(unsafe_code)]

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use franz_protocol::ErrorKind;

/// Which flavour of full metadata request is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullKind {
    /// All topics in the cluster.
    Topics,
    /// Brokers only (null topic list).
    Brokers,
}

impl FullKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Topics => "topics",
            Self::Brokers => "brokers",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    topics: u32,
    brokers: u32,
}

/// Client-wide gate that keeps at most one unforced full metadata request
/// in transit per kind. Full requests are redundant and side-effect-free,
/// so a second one adds load without adding information.
#[derive(Debug, Default)]
pub struct FullRequestGate {
    counters: Mutex<Counters>,
    reply_seen: Condvar,
}

impl FullRequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outgoing full request. Fails with `PrevInProgress` when an
    /// identical unforced request is already in transit; forced requests
    /// pass the gate but are still counted.
    pub fn try_begin(&self, kind: FullKind, forced: bool) -> Result<(), ErrorKind> {
        let mut counters = self.lock();
        let counter = match kind {
            FullKind::Topics => &mut counters.topics,
            FullKind::Brokers => &mut counters.brokers,
        };
        if *counter > 0 && !forced {
            return Err(ErrorKind::PrevInProgress);
        }
        *counter += 1;
        Ok(())
    }

    /// Register the reply (success or failure) for a counted request and
    /// wake any waiters so they may retry.
    pub fn finish(&self, kind: FullKind) {
        let mut counters = self.lock();
        let counter = match kind {
            FullKind::Topics => &mut counters.topics,
            FullKind::Brokers => &mut counters.brokers,
        };
        *counter = counter.saturating_sub(1);
        self.reply_seen.notify_all();
    }

    pub fn in_flight(&self, kind: FullKind) -> u32 {
        let counters = self.lock();
        match kind {
            FullKind::Topics => counters.topics,
            FullKind::Brokers => counters.brokers,
        }
    }

    /// Block until no request of `kind` is in transit, or until `timeout`
    /// elapses. Returns whether the gate is clear.
    pub fn wait_clear(&self, kind: FullKind, timeout: Duration) -> bool {
        let counters = self.lock();
        let select = |c: &Counters| match kind {
            FullKind::Topics => c.topics,
            FullKind::Brokers => c.brokers,
        };
        let (counters, _timed_out) = self
            .reply_seen
            .wait_timeout_while(counters, timeout, |c| select(c) > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        select(&counters) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
