#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use franz_protocol::{ApiKey, ApiVersionTable, ErrorKind};

use crate::batch::MessageBatch;
use crate::suppress::FullKind;
use crate::toppar::{OffsetList, Toppar};

/// Retry cap sentinel for requests that must never be retried (legacy
/// brokers tear down the connection on unknown API keys).
pub const NO_RETRIES: u32 = 0;

/// Request scheduling flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFlags(u8);

impl RequestFlags {
    pub const NONE: RequestFlags = RequestFlags(0);
    /// Control-plane request; may overtake queued data-plane traffic but
    /// never reorders against other flash requests.
    pub const FLASH: RequestFlags = RequestFlags(1);
    /// Fire-and-forget (acks=0): no reply is expected and the request must
    /// never enter the in-flight map.
    pub const NO_RESPONSE: RequestFlags = RequestFlags(1 << 1);
    /// Group-coordination request with a session-length deadline.
    pub const BLOCKING: RequestFlags = RequestFlags(1 << 2);

    pub fn contains(self, other: RequestFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RequestFlags {
    type Output = RequestFlags;

    fn bitor(self, rhs: RequestFlags) -> RequestFlags {
        RequestFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RequestFlags {
    fn bitor_assign(&mut self, rhs: RequestFlags) {
        self.0 |= rhs.0;
    }
}

/// Envelope life cycle. Terminal states release the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufState {
    Built,
    Enqueued,
    InFlight,
    Retried,
    Completed,
    TimedOut,
}

/// Typed completion events delivered on reply queues.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Offsets {
        err: ErrorKind,
        partitions: OffsetList,
    },
    OffsetFetch {
        err: ErrorKind,
        partitions: OffsetList,
    },
    OffsetCommit {
        err: ErrorKind,
        partitions: OffsetList,
    },
    Produce {
        err: ErrorKind,
        toppar: Toppar,
        batch: MessageBatch,
    },
    /// Metadata reply body, unparsed; the metadata cache consumes it.
    Metadata {
        err: ErrorKind,
        body: Vec<u8>,
    },
    ApiVersions {
        err: ErrorKind,
        table: ApiVersionTable,
    },
    /// Unparsed reply body for APIs whose responses this engine does not
    /// interpret (coordinator lookup, group listing, admin).
    Raw {
        api_key: ApiKey,
        err: ErrorKind,
        body: Vec<u8>,
    },
    /// Completion of a request with a bare error-code body.
    Done {
        api_key: ApiKey,
        err: ErrorKind,
    },
}

impl Reply {
    pub fn err(&self) -> ErrorKind {
        match self {
            Reply::Offsets { err, .. }
            | Reply::OffsetFetch { err, .. }
            | Reply::OffsetCommit { err, .. }
            | Reply::Produce { err, .. }
            | Reply::Metadata { err, .. }
            | Reply::ApiVersions { err, .. }
            | Reply::Raw { err, .. }
            | Reply::Done { err, .. } => *err,
        }
    }
}

/// Shared cancellation epoch for a reply queue. Advancing it invalidates
/// every route snapshotted before the advance.
#[derive(Debug, Default)]
pub struct ReplyEpoch(AtomicU32);

impl ReplyEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate outstanding routes; returns the new version.
    pub fn advance(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[derive(Debug, Clone)]
struct RouteInner {
    tx: Sender<Reply>,
    epoch: Arc<ReplyEpoch>,
    version: u32,
}

/// Reply destination: a mailbox plus the epoch version captured when the
/// route was created. A late reply whose version no longer matches the
/// epoch is dropped silently; the request itself is never canceled on the
/// wire.
#[derive(Debug, Clone, Default)]
pub struct ReplyRoute {
    inner: Option<RouteInner>,
}

impl ReplyRoute {
    pub fn new(tx: Sender<Reply>, epoch: Arc<ReplyEpoch>) -> Self {
        let version = epoch.version();
        Self {
            inner: Some(RouteInner { tx, epoch, version }),
        }
    }

    /// Null sink.
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn is_none(&self) -> bool {
        self.inner.is_none()
    }

    /// Deliver a reply. Returns false when it was dropped: null route,
    /// stale epoch, or a hung-up receiver.
    pub fn deliver(&self, reply: Reply) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };
        if inner.epoch.version() != inner.version {
            return false;
        }
        inner.tx.send(reply).is_ok()
    }
}

/// Context retained on a Metadata envelope for logging and for releasing
/// the full-request gate when the reply arrives.
#[derive(Debug, Clone)]
pub struct MetadataContext {
    pub reason: String,
    pub all_topics: bool,
    pub counted: Option<FullKind>,
}

/// Typed reply-handling descriptor. Dispatch is a single match over this
/// variant; each variant carries the caller state its handler needs.
#[derive(Debug)]
pub enum ResponseHandler {
    Offsets {
        partitions: OffsetList,
    },
    OffsetFetch {
        partitions: OffsetList,
        update_partitions: bool,
    },
    OffsetCommit {
        partitions: OffsetList,
    },
    Produce {
        toppar: Toppar,
    },
    Metadata,
    ApiVersions,
    SyncGroup,
    /// Bare error-code replies (Heartbeat, LeaveGroup).
    Simple,
    /// Replies handed to the caller unparsed.
    Raw,
}

/// A fully built request: header and body bytes, routing and scheduling
/// state. Owned by the caller until enqueued, by the broker until the
/// reply, and by the handler while completing.
#[derive(Debug)]
pub struct RequestBuf {
    pub(crate) api_key: ApiKey,
    pub(crate) api_version: i16,
    pub(crate) correlation_id: i32,
    pub(crate) features: u32,
    pub(crate) flags: RequestFlags,
    pub(crate) retries: u32,
    pub(crate) retry_cap: u32,
    pub(crate) deadline_ms: u64,
    pub(crate) state: BufState,
    pub(crate) reply: ReplyRoute,
    pub(crate) handler: ResponseHandler,
    pub(crate) payload: Vec<u8>,
    pub(crate) batch: MessageBatch,
    pub(crate) metadata_ctx: Option<MetadataContext>,
}

impl RequestBuf {
    pub fn api_key(&self) -> ApiKey {
        self.api_key
    }

    pub fn api_version(&self) -> i16 {
        self.api_version
    }

    pub fn correlation_id(&self) -> i32 {
        self.correlation_id
    }

    pub fn features(&self) -> u32 {
        self.features
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_cap(&self) -> u32 {
        self.retry_cap
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn state(&self) -> BufState {
        self.state
    }

    /// The finished wire frame: length prefix, header, body.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn batch(&self) -> &MessageBatch {
        &self.batch
    }

    pub fn handler(&self) -> &ResponseHandler {
        &self.handler
    }

    pub fn metadata_context(&self) -> Option<&MetadataContext> {
        self.metadata_ctx.as_ref()
    }

    /// Mark the hand-off into the broker transmit queue.
    pub fn mark_enqueued(&mut self) {
        self.state = BufState::Enqueued;
    }

    /// Mark transmission on the wire.
    pub fn mark_sent(&mut self) {
        self.state = BufState::InFlight;
    }

    /// Whether the request made it onto the wire at least once.
    pub fn was_sent(&self) -> bool {
        matches!(self.state, BufState::InFlight | BufState::Retried)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }

    /// The timeout error appropriate for the current state: still queued
    /// maps to `TimedOut`, sent-without-reply to `TimedOutQueue`.
    pub fn expiry_error(&self) -> ErrorKind {
        if self.was_sent() {
            ErrorKind::TimedOutQueue
        } else {
            ErrorKind::TimedOut
        }
    }

    /// Enter the terminal state matching the final error.
    pub(crate) fn mark_terminal(&mut self, err: ErrorKind) {
        self.state = match err {
            ErrorKind::TimedOut | ErrorKind::TimedOutQueue | ErrorKind::MsgTimedOut => {
                BufState::TimedOut
            }
            _ => BufState::Completed,
        };
    }

    pub(crate) fn can_retry(&self) -> bool {
        self.retries < self.retry_cap
    }
}

impl Display for RequestBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Request(v{}, corr {})",
            self.api_key, self.api_version, self.correlation_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn stale_epoch_drops_replies_silently() {
        let (tx, rx) = mpsc::channel();
        let epoch = Arc::new(ReplyEpoch::new());
        let route = ReplyRoute::new(tx, Arc::clone(&epoch));

        assert!(route.deliver(Reply::Done {
            api_key: ApiKey::Heartbeat,
            err: ErrorKind::NoError,
        }));
        epoch.advance();
        assert!(!route.deliver(Reply::Done {
            api_key: ApiKey::Heartbeat,
            err: ErrorKind::NoError,
        }));

        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn route_created_after_advance_is_live() {
        let (tx, rx) = mpsc::channel();
        let epoch = Arc::new(ReplyEpoch::new());
        epoch.advance();
        let route = ReplyRoute::new(tx, Arc::clone(&epoch));
        assert!(route.deliver(Reply::Done {
            api_key: ApiKey::LeaveGroup,
            err: ErrorKind::NoError,
        }));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn null_route_swallows_replies() {
        let route = ReplyRoute::none();
        assert!(route.is_none());
        assert!(!route.deliver(Reply::Done {
            api_key: ApiKey::Heartbeat,
            err: ErrorKind::NoError,
        }));
    }

    #[test]
    fn flags_compose() {
        let mut flags = RequestFlags::FLASH;
        flags |= RequestFlags::BLOCKING;
        assert!(flags.contains(RequestFlags::FLASH));
        assert!(flags.contains(RequestFlags::BLOCKING));
        assert!(!flags.contains(RequestFlags::NO_RESPONSE));
    }
}
