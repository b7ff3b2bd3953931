#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use franz_protocol::{
    features_for, ApiKey, ApiVersionTable, ErrorKind, Reservation, VersionRange, WireWriter,
};

use crate::envelope::{BufState, MetadataContext, ReplyRoute, RequestBuf, RequestFlags, ResponseHandler};
use crate::hooks::Hooks;
use crate::metrics::EngineMetrics;
use crate::suppress::FullRequestGate;

/// Per-engine configuration, passed by value at construction. There is no
/// config loading; the embedding client owns that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub client_id: Option<String>,
    /// Default request deadline; also the reference point for the admin
    /// operation-timeout extension.
    pub socket_timeout_ms: u64,
    /// Broker-side timeout written into the Produce body.
    pub request_timeout_ms: i32,
    pub session_timeout_ms: u64,
    pub api_version_request_timeout_ms: u64,
    /// Whether ApiVersions discovery runs on connection setup. When off,
    /// SaslHandshake deadlines are clamped for pre-0.10 broker safety.
    pub api_version_request: bool,
    /// Default retry cap for retryable requests.
    pub max_retries: u32,
    pub required_acks: i16,
    /// Report the broker-assigned offset on every produced message rather
    /// than only the batch tail.
    pub produce_offset_report: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_id: Some("franz".to_string()),
            socket_timeout_ms: 60_000,
            request_timeout_ms: 30_000,
            session_timeout_ms: 30_000,
            api_version_request_timeout_ms: 10_000,
            api_version_request: true,
            max_retries: 2,
            required_acks: -1,
            produce_offset_report: false,
        }
    }
}

/// What a reply handler did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// A terminal result (success or error) reached the caller's queue.
    Completed(ErrorKind),
    /// The request was re-enqueued on the broker; no terminal result yet.
    Retrying,
    /// The reply was dropped without effect (teardown or an outdated
    /// group-cycle reply).
    Discarded,
}

/// A request under construction: header already written, frame length
/// reserved, body being appended by a per-API builder.
pub(crate) struct RequestDraft {
    pub(crate) writer: WireWriter,
    frame: Reservation,
    api_key: ApiKey,
    api_version: i16,
    features: u32,
    correlation_id: i32,
}

/// The request/response engine for one broker connection.
///
/// All request building and reply handling for the broker runs on that
/// broker's serial executor; the engine itself holds only the two pieces of
/// state that are shared across executors, each behind its own lock: the
/// negotiated ApiVersion table and (via [`FullRequestGate`]) the client-wide
/// full-metadata suppression counters.
pub struct RequestEngine {
    broker_id: i32,
    config: EngineConfig,
    hooks: Hooks,
    api_versions: Mutex<ApiVersionTable>,
    next_correlation_id: AtomicI32,
    full_gate: Arc<FullRequestGate>,
    metrics: EngineMetrics,
}

impl RequestEngine {
    pub fn new(
        broker_id: i32,
        config: EngineConfig,
        hooks: Hooks,
        full_gate: Arc<FullRequestGate>,
    ) -> Result<Self, String> {
        let metrics = EngineMetrics::new()?;
        Ok(Self {
            broker_id,
            config,
            hooks,
            api_versions: Mutex::new(ApiVersionTable::default()),
            next_correlation_id: AtomicI32::new(1),
            full_gate,
            metrics,
        })
    }

    pub fn broker_id(&self) -> i32 {
        self.broker_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn full_gate(&self) -> &Arc<FullRequestGate> {
        &self.full_gate
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.hooks.clock.now_ms()
    }

    pub(crate) fn deadline_in(&self, timeout_ms: u64) -> u64 {
        self.now_ms().saturating_add(timeout_ms)
    }

    /// Replace the negotiated ApiVersion table (done by the ApiVersions
    /// reply handler once discovery completes).
    pub fn install_api_versions(&self, table: ApiVersionTable) {
        *self.lock_api_versions() = table;
    }

    pub fn api_versions(&self) -> ApiVersionTable {
        self.lock_api_versions().clone()
    }

    /// Negotiate the version to use for `key` within the caller's range.
    ///
    /// Before ApiVersions discovery has populated the table, the APIs that
    /// predate version discovery fall back to the caller's minimum; APIs
    /// introduced later are reported unsupported.
    pub fn api_version_supported(
        &self,
        key: ApiKey,
        requested: VersionRange,
    ) -> Option<(i16, u32)> {
        let table = self.lock_api_versions();
        if table.is_empty() {
            if predates_version_discovery(key) {
                return Some((requested.min, features_for(key, requested.min)));
            }
            return None;
        }
        table.pick(key, requested)
    }

    fn lock_api_versions(&self) -> std::sync::MutexGuard<'_, ApiVersionTable> {
        self.api_versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_correlation_id(&self) -> i32 {
        self.next_correlation_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Start a request frame: length reservation, then the standard header
    /// (ApiKey, ApiVersion, CorrelationId, ClientId).
    pub(crate) fn begin_request(
        &self,
        api_key: ApiKey,
        api_version: i16,
        features: u32,
        body_estimate: usize,
    ) -> Result<RequestDraft, ErrorKind> {
        let client_id = self.config.client_id.as_deref();
        let mut writer = WireWriter::with_capacity(
            4 + franz_protocol::REQUEST_HEADER_FIXED_LEN
                + 2
                + client_id.map_or(0, str::len)
                + body_estimate,
        );
        let frame = writer.reserve_i32();
        writer.write_i16(api_key.code());
        writer.write_i16(api_version);
        let correlation_id = self.next_correlation_id();
        writer.write_i32(correlation_id);
        writer.write_str(client_id)?;
        Ok(RequestDraft {
            writer,
            frame,
            api_key,
            api_version,
            features,
            correlation_id,
        })
    }

    /// Seal the frame and wrap it in an envelope with engine defaults:
    /// the configured retry cap and a socket-timeout deadline. Builders
    /// override fields before submitting.
    pub(crate) fn finish_request(
        &self,
        draft: RequestDraft,
        handler: ResponseHandler,
        reply: ReplyRoute,
    ) -> RequestBuf {
        let RequestDraft {
            mut writer,
            frame,
            api_key,
            api_version,
            features,
            correlation_id,
        } = draft;
        let frame_len = (writer.len() - 4) as i32;
        writer.patch_i32(frame, frame_len);
        RequestBuf {
            api_key,
            api_version,
            correlation_id,
            features,
            flags: RequestFlags::NONE,
            retries: 0,
            retry_cap: self.config.max_retries,
            deadline_ms: self.deadline_in(self.config.socket_timeout_ms),
            state: BufState::Built,
            reply,
            handler,
            payload: writer.finish(),
            batch: crate::batch::MessageBatch::new(),
            metadata_ctx: None,
        }
    }

    /// Hand a built request to the broker transmit queue.
    pub(crate) fn submit(&self, mut request: RequestBuf) {
        request.mark_enqueued();
        self.metrics
            .record_request(request.api_key().name(), request.api_version());
        debug!(
            api = request.api_key().name(),
            version = request.api_version(),
            correlation_id = request.correlation_id(),
            flags = ?request.flags(),
            "enqueue request"
        );
        self.hooks.broker.enqueue(request);
    }

    /// Re-enqueue `request` on the broker if its retry budget allows,
    /// giving it back otherwise. `count_retry` is false on paths where the
    /// attempt provably cannot have reached the broker (refresh-triggered
    /// produce retries, unsent requests), so the budget is not charged.
    pub(crate) fn try_retry(
        &self,
        mut request: RequestBuf,
        count_retry: bool,
    ) -> Result<(), RequestBuf> {
        if !request.can_retry() {
            return Err(request);
        }
        if count_retry {
            request.retries += 1;
        }
        request.state = BufState::Retried;
        self.metrics.record_retry(request.api_key().name());
        debug!(
            api = request.api_key().name(),
            correlation_id = request.correlation_id(),
            retries = request.retries(),
            retry_cap = request.retry_cap(),
            "retrying request"
        );
        self.hooks.broker.retry(request);
        Ok(())
    }

    /// Fail a request that outlived its deadline: `TimedOut` while still in
    /// the transmit queue, `TimedOutQueue` once on the wire. Invoked by the
    /// broker's expiry scanner; the normal reply pipeline (including retry
    /// accounting) applies.
    pub fn fail_expired(&self, request: RequestBuf) -> ReplyDisposition {
        let err = request.expiry_error();
        self.handle_reply(err, None, request)
    }

    pub(crate) fn record_error_action(&self, err: ErrorKind, actions: crate::actions::Actions) {
        self.metrics
            .record_error_action(err.name(), &actions.to_string());
    }

    pub(crate) fn attach_metadata_context(&self, request: &mut RequestBuf, ctx: MetadataContext) {
        request.metadata_ctx = Some(ctx);
    }
}

/// APIs that existed before ApiVersions discovery (KIP-35) and may be used
/// at their minimum version against a broker that never advertised a table.
fn predates_version_discovery(key: ApiKey) -> bool {
    matches!(
        key,
        ApiKey::Produce
            | ApiKey::Offsets
            | ApiKey::Metadata
            | ApiKey::OffsetCommit
            | ApiKey::OffsetFetch
            | ApiKey::GroupCoordinator
            | ApiKey::JoinGroup
            | ApiKey::Heartbeat
            | ApiKey::LeaveGroup
            | ApiKey::SyncGroup
            | ApiKey::DescribeGroups
            | ApiKey::ListGroups
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use franz_protocol::ApiSupport;

    fn engine() -> RequestEngine {
        RequestEngine::new(
            1,
            EngineConfig::default(),
            Hooks::null(),
            Arc::new(FullRequestGate::new()),
        )
        .expect("engine")
    }

    #[test]
    fn empty_table_falls_back_for_legacy_apis_only() {
        let engine = engine();
        let (version, _) = engine
            .api_version_supported(ApiKey::Produce, VersionRange::new(0, 2))
            .expect("legacy produce");
        assert_eq!(version, 0);
        assert!(engine
            .api_version_supported(ApiKey::CreateTopics, VersionRange::new(0, 2))
            .is_none());
    }

    #[test]
    fn installed_table_drives_negotiation() {
        let engine = engine();
        engine.install_api_versions(ApiVersionTable::from_entries(vec![ApiSupport {
            api_key: ApiKey::Metadata.code(),
            min: 0,
            max: 1,
        }]));
        let (version, _) = engine
            .api_version_supported(ApiKey::Metadata, VersionRange::new(0, 2))
            .expect("metadata");
        assert_eq!(version, 1);
        assert!(engine
            .api_version_supported(ApiKey::Produce, VersionRange::new(0, 2))
            .is_none());
    }

    #[test]
    fn correlation_ids_are_monotonic() {
        let engine = engine();
        let a = engine
            .begin_request(ApiKey::Heartbeat, 0, 0, 16)
            .expect("draft");
        let b = engine
            .begin_request(ApiKey::Heartbeat, 0, 0, 16)
            .expect("draft");
        assert!(b.correlation_id > a.correlation_id);
    }
}
