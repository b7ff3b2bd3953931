#![forbid(unsafe_code)]

use tracing::{debug, warn};

use franz_protocol::{ApiSupport, ApiVersionTable, ErrorKind, WireReader};

use crate::actions::{err_action, Actions};
use crate::engine::{ReplyDisposition, RequestEngine};
use crate::envelope::{Reply, RequestBuf, ResponseHandler};
use crate::toppar::{OffsetList, Toppar, OFFSET_INVALID};

/// An ApiVersions reply advertising more entries than this is not a Kafka
/// broker talking.
const MAX_API_VERSION_ENTRIES: i32 = 1000;

impl RequestEngine {
    /// Entry point for the broker dispatcher: the reply (or fabricated
    /// error) for `request`. `body` is the response payload after the
    /// correlation id; it is `None` on local failures and on the
    /// OffsetFetch short-circuit path.
    pub fn handle_reply(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        request: RequestBuf,
    ) -> ReplyDisposition {
        if err == ErrorKind::Destroy {
            // Teardown: release everything silently. The full-request gate
            // still has to be released or later requests would be
            // suppressed forever.
            if let Some(kind) = request.metadata_context().and_then(|ctx| ctx.counted) {
                self.full_gate().finish(kind);
            }
            return ReplyDisposition::Discarded;
        }

        let handler: fn(&Self, ErrorKind, Option<&[u8]>, RequestBuf) -> ReplyDisposition =
            match request.handler() {
                ResponseHandler::Offsets { .. } => Self::handle_offsets,
                ResponseHandler::OffsetFetch { .. } => Self::handle_offset_fetch,
                ResponseHandler::OffsetCommit { .. } => Self::handle_offset_commit,
                ResponseHandler::Produce { .. } => Self::handle_produce,
                ResponseHandler::Metadata => Self::handle_metadata,
                ResponseHandler::ApiVersions => Self::handle_api_versions,
                ResponseHandler::SyncGroup => Self::handle_sync_group,
                ResponseHandler::Simple => Self::handle_simple,
                ResponseHandler::Raw => Self::handle_raw,
            };
        handler(self, err, body, request)
    }

    fn handle_offsets(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let requested = match request.handler() {
            ResponseHandler::Offsets { partitions } => partitions.clone(),
            _ => return ReplyDisposition::Discarded,
        };

        let mut final_err = err;
        let mut decoded = None;
        let mut last_entry_err = ErrorKind::NoError;
        if !final_err.is_error() {
            if let Some(buf) = body {
                match parse_offsets(buf, request.api_version(), &requested) {
                    Ok((list, last_err)) => {
                        decoded = Some(list);
                        last_entry_err = last_err;
                    }
                    Err(parse_err) => final_err = parse_err,
                }
            }
        }

        if final_err.is_error() {
            let actions = err_action(
                final_err,
                &[
                    (Actions::PERMANENT, ErrorKind::UnknownTopicOrPart),
                    (
                        Actions::REFRESH | Actions::RETRY,
                        ErrorKind::NotLeaderForPartition,
                    ),
                ],
                true,
            );
            self.record_error_action(final_err, actions);
            if actions.contains(Actions::REFRESH) {
                // The leader moved; our metadata is stale.
                let reason = format!("offsets request failed: {final_err}");
                self.hooks().metadata.refresh_known_topics(&reason, true);
            }
            if actions.contains(Actions::RETRY) {
                match self.try_retry(request, true) {
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }
        }

        // A cleanly parsed reply surfaces the last per-partition error as
        // the overall status; per-element errors stay on the entries.
        let surface_err = if final_err.is_error() {
            final_err
        } else {
            last_entry_err
        };

        request.mark_terminal(surface_err);
        request.reply.deliver(Reply::Offsets {
            err: surface_err,
            partitions: decoded.unwrap_or(requested),
        });
        ReplyDisposition::Completed(surface_err)
    }

    fn handle_offset_fetch(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let (requested, update_partitions) = match request.handler() {
            ResponseHandler::OffsetFetch {
                partitions,
                update_partitions,
            } => (partitions.clone(), *update_partitions),
            _ => return ReplyDisposition::Discarded,
        };

        let mut final_err = err;
        let mut decoded = None;
        if !final_err.is_error() {
            if let Some(buf) = body {
                match self.parse_offset_fetch(buf, &requested, update_partitions) {
                    Ok(list) => decoded = Some(list),
                    Err(parse_err) => final_err = parse_err,
                }
            }
            // A missing body with no error is the short-circuit path: every
            // partition already had a usable offset and the list is good as
            // it stands.
        }

        debug!(
            fetched = decoded.as_ref().map_or(0, OffsetList::len),
            requested = requested.len(),
            err = %final_err,
            "offset fetch reply"
        );

        if final_err.is_error() {
            let actions = err_action(final_err, &[], true);
            self.record_error_action(final_err, actions);
            if actions.contains(Actions::REFRESH) {
                self.hooks()
                    .group
                    .coord_query(&format!("offset fetch failed: {final_err}"));
            }
            if actions.contains(Actions::RETRY) {
                match self.try_retry(request, true) {
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }
        }

        request.mark_terminal(final_err);
        request.reply.deliver(Reply::OffsetFetch {
            err: final_err,
            partitions: decoded.unwrap_or(requested),
        });
        ReplyDisposition::Completed(final_err)
    }

    fn handle_offset_commit(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let requested = match request.handler() {
            ResponseHandler::OffsetCommit { partitions } => partitions.clone(),
            _ => return ReplyDisposition::Discarded,
        };

        let mut final_err = err;
        let mut decoded = None;
        if !final_err.is_error() {
            if let Some(buf) = body {
                match parse_offset_commit(buf, &requested) {
                    Ok((list, all_failed)) => {
                        if let Some(last_err) = all_failed {
                            // Every partition failed: surface the last
                            // per-partition error as the global one so
                            // callers that never inspect elements still see
                            // the batch failure.
                            final_err = last_err;
                        }
                        decoded = Some(list);
                    }
                    Err(parse_err) => final_err = parse_err,
                }
            }
        }

        if final_err.is_error() {
            let actions = err_action(
                final_err,
                &[
                    (Actions::PERMANENT, ErrorKind::OffsetMetadataTooLarge),
                    (Actions::RETRY, ErrorKind::GroupLoadInProgress),
                    (
                        Actions::REFRESH | Actions::SPECIAL,
                        ErrorKind::GroupCoordinatorNotAvailable,
                    ),
                    (
                        Actions::REFRESH | Actions::SPECIAL,
                        ErrorKind::NotCoordinatorForGroup,
                    ),
                    (
                        Actions::REFRESH | Actions::RETRY,
                        ErrorKind::IllegalGeneration,
                    ),
                    (
                        Actions::REFRESH | Actions::RETRY,
                        ErrorKind::UnknownMemberId,
                    ),
                    (Actions::RETRY, ErrorKind::RebalanceInProgress),
                    (Actions::PERMANENT, ErrorKind::InvalidCommitOffsetSize),
                    (Actions::PERMANENT, ErrorKind::TopicAuthorizationFailed),
                    (Actions::PERMANENT, ErrorKind::GroupAuthorizationFailed),
                ],
                true,
            );
            self.record_error_action(final_err, actions);
            if actions.contains(Actions::REFRESH) {
                // SPECIAL escalates: the coordinator is gone, not merely
                // unknown.
                if actions.contains(Actions::SPECIAL) {
                    self.hooks()
                        .group
                        .coord_dead(final_err, "offset commit failed");
                } else {
                    self.hooks().group.coord_query("offset commit failed");
                }
            }
            if actions.contains(Actions::RETRY) {
                match self.try_retry(request, true) {
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }
        }

        request.mark_terminal(final_err);
        request.reply.deliver(Reply::OffsetCommit {
            err: final_err,
            partitions: decoded.unwrap_or(requested),
        });
        ReplyDisposition::Completed(final_err)
    }

    fn handle_produce(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let toppar = match request.handler() {
            ResponseHandler::Produce { toppar } => toppar.clone(),
            _ => return ReplyDisposition::Discarded,
        };

        let mut final_err = err;
        let mut offset = OFFSET_INVALID;
        let mut timestamp = -1;
        if !final_err.is_error() {
            if let Some(buf) = body {
                match parse_produce(buf, request.api_version()) {
                    Ok(parsed) => {
                        if let Some(throttle_ms) = parsed.throttle_ms {
                            self.hooks().throttle.observe(self.broker_id(), throttle_ms);
                        }
                        offset = parsed.offset;
                        timestamp = parsed.timestamp;
                        final_err = parsed.err;
                    }
                    Err(parse_err) => final_err = parse_err,
                }
            }
        }

        if final_err.is_error() {
            let actions = err_action(
                final_err,
                &[
                    (Actions::REFRESH, ErrorKind::Transport),
                    (Actions::REFRESH, ErrorKind::UnknownTopicOrPart),
                    (Actions::RETRY, ErrorKind::NotEnoughReplicas),
                    (Actions::RETRY, ErrorKind::NotEnoughReplicasAfterAppend),
                    (Actions::RETRY, ErrorKind::TimedOutQueue),
                    (Actions::RETRY, ErrorKind::TimedOut),
                    (Actions::PERMANENT, ErrorKind::MsgTimedOut),
                ],
                true,
            );
            self.record_error_action(final_err, actions);
            debug!(
                toppar = %toppar,
                messages = request.batch().len(),
                err = %final_err,
                %actions,
                "produce batch failed"
            );

            if actions.intersects(Actions::REFRESH | Actions::RETRY) {
                let mut count_retry = true;
                if actions.contains(Actions::REFRESH) {
                    // Stale leadership: the request was rejected or never
                    // accepted, so retrying cannot create duplicates and
                    // the retry budget is not charged. A transport failure
                    // may have delivered the request, so that one still
                    // counts.
                    self.hooks()
                        .metadata
                        .leader_unavailable(&toppar, "produce", final_err);
                    if final_err != ErrorKind::Transport {
                        count_retry = false;
                    }
                }
                if !request.was_sent() {
                    count_retry = false;
                }
                match self.try_retry(request, count_retry) {
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }

            // Request-level timeouts surface as message-level timeouts.
            if final_err == ErrorKind::TimedOut || final_err == ErrorKind::TimedOutQueue {
                final_err = ErrorKind::MsgTimedOut;
            }
        }

        let mut batch = std::mem::take(&mut request.batch);
        if !final_err.is_error() && offset != OFFSET_INVALID {
            batch.assign_offsets(offset, self.config().produce_offset_report, timestamp);
        }

        request.mark_terminal(final_err);
        request.reply.deliver(Reply::Produce {
            err: final_err,
            toppar,
            batch,
        });
        ReplyDisposition::Completed(final_err)
    }

    fn handle_metadata(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let (reason, counted) = match request.metadata_context() {
            Some(ctx) => (ctx.reason.clone(), ctx.counted),
            None => (String::new(), None),
        };

        let mut final_err = err;
        if final_err.is_error() {
            let actions = err_action(final_err, &[(Actions::RETRY, ErrorKind::Partial)], true);
            self.record_error_action(final_err, actions);
            if actions.contains(Actions::RETRY) {
                match self.try_retry(request, true) {
                    // The gate stays held across the retry; the counter
                    // tracks the envelope, not the attempt.
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }
            warn!(reason = %reason, err = %final_err, "metadata request failed");
        } else if body.is_none() {
            final_err = ErrorKind::BadMsg;
        }

        if let Some(kind) = counted {
            self.full_gate().finish(kind);
        }

        request.mark_terminal(final_err);
        request.reply.deliver(Reply::Metadata {
            err: final_err,
            body: body.map(<[u8]>::to_vec).unwrap_or_default(),
        });
        ReplyDisposition::Completed(final_err)
    }

    fn handle_api_versions(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let mut final_err = err;
        let mut table = ApiVersionTable::default();
        if !final_err.is_error() {
            match body.ok_or(ErrorKind::BadMsg).and_then(parse_api_versions) {
                Ok(parsed) => table = parsed,
                Err(parse_err) => final_err = parse_err,
            }
        }

        if !final_err.is_error() {
            debug!(apis = table.len(), "broker API support discovered");
            self.install_api_versions(table.clone());
        }

        request.mark_terminal(final_err);
        request.reply.deliver(Reply::ApiVersions {
            err: final_err,
            table,
        });
        ReplyDisposition::Completed(final_err)
    }

    fn handle_sync_group(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let join_state = self.hooks().group.join_state();
        if join_state != crate::hooks::JoinState::WaitSync {
            debug!(
                ?join_state,
                "discarding outdated SyncGroup response"
            );
            return ReplyDisposition::Discarded;
        }

        let mut final_err = err;
        let mut member_state = Vec::new();
        if !final_err.is_error() {
            if let Some(buf) = body {
                match parse_sync_group(buf) {
                    Ok((reply_err, state)) => {
                        final_err = reply_err;
                        member_state = state;
                    }
                    Err(parse_err) => final_err = parse_err,
                }
            }
        }

        if final_err.is_error() {
            let actions = err_action(final_err, &[], true);
            self.record_error_action(final_err, actions);
            if actions.contains(Actions::REFRESH) {
                self.hooks()
                    .group
                    .coord_query(&format!("sync group failed: {final_err}"));
            }
            if actions.contains(Actions::RETRY) {
                match self.try_retry(request, true) {
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }
        }

        debug!(
            err = %final_err,
            member_state_len = member_state.len(),
            "sync group reply"
        );
        self.hooks()
            .group
            .handle_sync_group(final_err, &member_state);
        request.mark_terminal(final_err);
        ReplyDisposition::Completed(final_err)
    }

    /// Replies whose body is a bare error code (Heartbeat, LeaveGroup).
    fn handle_simple(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        let mut final_err = err;
        if !final_err.is_error() {
            if let Some(buf) = body {
                let mut reader = WireReader::new(buf);
                match reader.read_i16() {
                    Ok(code) => final_err = ErrorKind::from_wire(code),
                    Err(parse_err) => final_err = parse_err,
                }
            }
        }

        if final_err.is_error() {
            let actions = err_action(final_err, &[], true);
            self.record_error_action(final_err, actions);
            if actions.contains(Actions::REFRESH) {
                self.hooks().group.coord_query(&format!(
                    "{} failed: {final_err}",
                    request.api_key()
                ));
            }
            if actions.contains(Actions::RETRY) {
                match self.try_retry(request, true) {
                    Ok(()) => return ReplyDisposition::Retrying,
                    Err(returned) => request = returned,
                }
            }
            debug!(api = request.api_key().name(), err = %final_err, "request failed");
        }

        request.mark_terminal(final_err);
        request.reply.deliver(Reply::Done {
            api_key: request.api_key(),
            err: final_err,
        });
        ReplyDisposition::Completed(final_err)
    }

    /// Replies this engine does not interpret: the raw body goes to the
    /// caller together with the transport-level error, if any.
    fn handle_raw(
        &self,
        err: ErrorKind,
        body: Option<&[u8]>,
        mut request: RequestBuf,
    ) -> ReplyDisposition {
        request.mark_terminal(err);
        request.reply.deliver(Reply::Raw {
            api_key: request.api_key(),
            err,
            body: body.map(<[u8]>::to_vec).unwrap_or_default(),
        });
        ReplyDisposition::Completed(err)
    }

    fn parse_offset_fetch(
        &self,
        buf: &[u8],
        requested: &OffsetList,
        update_partitions: bool,
    ) -> Result<OffsetList, ErrorKind> {
        let mut reader = WireReader::new(buf);
        let mut result = requested.clone();
        // Entries the broker does not mention stay unknown.
        result.set_all_offsets(OFFSET_INVALID);

        let topic_count = reader.read_i32()?;
        for _ in 0..topic_count {
            let topic = reader.read_str()?.unwrap_or_default().to_string();
            let partition_count = reader.read_i32()?;
            for _ in 0..partition_count {
                let partition = reader.read_i32()?;
                let offset = reader.read_i64()?;
                let metadata = reader.read_str()?.map(str::to_string);
                let entry_err = ErrorKind::from_wire(reader.read_i16()?);

                let Some(entry) = result.find_mut(&topic, partition) else {
                    debug!(
                        topic = %topic,
                        partition,
                        "offset fetch reply entry not in local list: ignoring"
                    );
                    continue;
                };
                // The broker reports "no committed offset" as -1.
                entry.offset = if offset == -1 { OFFSET_INVALID } else { offset };
                entry.err = entry_err;
                entry.metadata = metadata;
                let committed = entry.offset;

                if update_partitions && !entry_err.is_error() {
                    self.hooks()
                        .partitions
                        .set_committed_offset(&Toppar::new(topic.clone(), partition), committed);
                }
            }
        }
        Ok(result)
    }
}

fn parse_offsets(
    buf: &[u8],
    api_version: i16,
    requested: &OffsetList,
) -> Result<(OffsetList, ErrorKind), ErrorKind> {
    let mut reader = WireReader::new(buf);
    let mut result = requested.clone();
    let mut last_err = ErrorKind::NoError;

    // The broker may group and order the reply differently than the
    // request; every entry is re-associated by lookup.
    let topic_count = reader.read_i32()?;
    for _ in 0..topic_count {
        let topic = reader.read_str()?.unwrap_or_default().to_string();
        let partition_count = reader.read_i32()?;
        for _ in 0..partition_count {
            let partition = reader.read_i32()?;
            let entry_err = ErrorKind::from_wire(reader.read_i16()?);
            last_err = entry_err;
            let offset = if api_version >= 1 {
                let _timestamp = reader.read_i64()?;
                reader.read_i64()?
            } else {
                let offset_count = reader.read_i32()?;
                let mut first = None;
                for _ in 0..offset_count {
                    let value = reader.read_i64()?;
                    if first.is_none() {
                        first = Some(value);
                    }
                }
                first.unwrap_or(-1)
            };

            match result.find_mut(&topic, partition) {
                Some(entry) => {
                    entry.offset = offset;
                    entry.err = entry_err;
                }
                None => {
                    let mut entry = crate::toppar::OffsetEntry::new(topic.clone(), partition, offset);
                    entry.err = entry_err;
                    result.push(entry);
                }
            }
        }
    }
    Ok((result, last_err))
}

fn parse_offset_commit(
    buf: &[u8],
    requested: &OffsetList,
) -> Result<(OffsetList, Option<ErrorKind>), ErrorKind> {
    let mut reader = WireReader::new(buf);
    let mut result = requested.clone();
    let mut error_count = 0;
    let mut last_error = ErrorKind::NoError;

    let topic_count = reader.read_i32()?;
    for _ in 0..topic_count {
        let topic = reader.read_str()?.unwrap_or_default().to_string();
        let partition_count = reader.read_i32()?;
        for _ in 0..partition_count {
            let partition = reader.read_i32()?;
            let entry_err = ErrorKind::from_wire(reader.read_i16()?);

            let Some(entry) = result.find_mut(&topic, partition) else {
                // An answer for a partition we never asked about.
                continue;
            };
            entry.err = entry_err;
            if entry_err.is_error() {
                last_error = entry_err;
                error_count += 1;
            }
        }
    }

    let all_failed = (!result.is_empty() && error_count == result.len()).then_some(last_error);
    Ok((result, all_failed))
}

#[derive(Debug)]
struct ProduceReply {
    err: ErrorKind,
    offset: i64,
    timestamp: i64,
    throttle_ms: Option<i32>,
}

fn parse_produce(buf: &[u8], api_version: i16) -> Result<ProduceReply, ErrorKind> {
    let mut reader = WireReader::new(buf);

    // One request targets exactly one topic-partition; a reply shaped any
    // other way comes from a buggy broker.
    let topic_count = reader.read_i32()?;
    if topic_count != 1 {
        return Err(ErrorKind::BadMsg);
    }
    reader.skip_str()?;
    let partition_count = reader.read_i32()?;
    if partition_count != 1 {
        return Err(ErrorKind::BadMsg);
    }

    let _partition = reader.read_i32()?;
    let err = ErrorKind::from_wire(reader.read_i16()?);
    let offset = reader.read_i64()?;
    let timestamp = if api_version >= 2 {
        reader.read_i64()?
    } else {
        -1
    };
    let throttle_ms = if api_version >= 1 {
        Some(reader.read_i32()?)
    } else {
        None
    };

    Ok(ProduceReply {
        err,
        offset,
        timestamp,
        throttle_ms,
    })
}

fn parse_sync_group(buf: &[u8]) -> Result<(ErrorKind, Vec<u8>), ErrorKind> {
    let mut reader = WireReader::new(buf);
    let err = ErrorKind::from_wire(reader.read_i16()?);
    let member_state = reader.read_bytes()?.unwrap_or_default().to_vec();
    Ok((err, member_state))
}

fn parse_api_versions(buf: &[u8]) -> Result<ApiVersionTable, ErrorKind> {
    let mut reader = WireReader::new(buf);
    let err = ErrorKind::from_wire(reader.read_i16()?);
    if err.is_error() {
        return Err(err);
    }
    let count = reader.read_i32()?;
    if !(0..=MAX_API_VERSION_ENTRIES).contains(&count) {
        return Err(ErrorKind::BadMsg);
    }
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(ApiSupport {
            api_key: reader.read_i16()?,
            min: reader.read_i16()?,
            max: reader.read_i16()?,
        });
    }
    Ok(ApiVersionTable::from_entries(entries))
}
