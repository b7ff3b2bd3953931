#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use franz_protocol::ErrorKind;

use crate::envelope::RequestBuf;
use crate::toppar::Toppar;

/// Transmission side of a broker connection. The engine finalizes a request
/// and hands it over; ordering, in-flight accounting and backoff live here.
pub trait BrokerLink: Send + Sync {
    /// Hand a finalized request over for transmission.
    fn enqueue(&self, request: RequestBuf);

    /// Re-enqueue a request for another attempt. The implementation applies
    /// the retry backoff before putting it back on the wire.
    fn retry(&self, request: RequestBuf);
}

/// Invalidation hooks into the metadata cache.
pub trait MetadataHook: Send + Sync {
    fn refresh_known_topics(&self, reason: &str, force: bool);
    fn leader_unavailable(&self, toppar: &Toppar, reason: &str, err: ErrorKind);
}

/// Where the consumer group sits in its join cycle. Only `WaitSync` admits
/// SyncGroup replies; everything else marks them outdated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Init,
    WaitJoin,
    WaitMetadata,
    WaitSync,
    Assigned,
    Started,
}

/// Hooks into the consumer-group subsystem.
pub trait GroupHook: Send + Sync {
    fn join_state(&self) -> JoinState;

    /// Ask for a (re-)query of the group coordinator.
    fn coord_query(&self, reason: &str);

    /// Mark the current coordinator dead; schedules a rediscovery on its own.
    fn coord_dead(&self, err: ErrorKind, reason: &str);

    /// Deliver a decoded SyncGroup member-state blob.
    fn handle_sync_group(&self, err: ErrorKind, member_state: &[u8]);
}

/// Per-partition bookkeeping owned by the consumer.
pub trait PartitionHook: Send + Sync {
    /// Update the partition's committed offset; the implementation takes the
    /// partition's own lock.
    fn set_committed_offset(&self, toppar: &Toppar, offset: i64);
}

pub trait ThrottleHook: Send + Sync {
    fn observe(&self, broker_id: i32, throttle_ms: i32);
}

/// Monotonic time source, milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Default `Clock` backed by `Instant`.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// The collaborators the engine calls out to. Every field has a null
/// implementation so tests and partial deployments can wire only what they
/// observe.
#[derive(Clone)]
pub struct Hooks {
    pub broker: Arc<dyn BrokerLink>,
    pub metadata: Arc<dyn MetadataHook>,
    pub group: Arc<dyn GroupHook>,
    pub partitions: Arc<dyn PartitionHook>,
    pub throttle: Arc<dyn ThrottleHook>,
    pub clock: Arc<dyn Clock>,
}

impl Hooks {
    /// All-null hooks with a real monotonic clock.
    pub fn null() -> Self {
        Self {
            broker: Arc::new(NullBroker),
            metadata: Arc::new(NullMetadataHook),
            group: Arc::new(NullGroupHook),
            partitions: Arc::new(NullPartitionHook),
            throttle: Arc::new(NullThrottleHook),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn with_broker(broker: Arc<dyn BrokerLink>) -> Self {
        Self {
            broker,
            ..Self::null()
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::null()
    }
}

/// Drops every request. Stand-in until a connection exists.
pub struct NullBroker;

impl BrokerLink for NullBroker {
    fn enqueue(&self, _request: RequestBuf) {}
    fn retry(&self, _request: RequestBuf) {}
}

pub struct NullMetadataHook;

impl MetadataHook for NullMetadataHook {
    fn refresh_known_topics(&self, _reason: &str, _force: bool) {}
    fn leader_unavailable(&self, _toppar: &Toppar, _reason: &str, _err: ErrorKind) {}
}

pub struct NullGroupHook;

impl GroupHook for NullGroupHook {
    fn join_state(&self) -> JoinState {
        JoinState::Init
    }
    fn coord_query(&self, _reason: &str) {}
    fn coord_dead(&self, _err: ErrorKind, _reason: &str) {}
    fn handle_sync_group(&self, _err: ErrorKind, _member_state: &[u8]) {}
}

pub struct NullPartitionHook;

impl PartitionHook for NullPartitionHook {
    fn set_committed_offset(&self, _toppar: &Toppar, _offset: i64) {}
}

pub struct NullThrottleHook;

impl ThrottleHook for NullThrottleHook {
    fn observe(&self, _broker_id: i32, _throttle_ms: i32) {}
}
