#![forbid(unsafe_code)]

use tracing::debug;

use franz_protocol::{ApiKey, ErrorKind, Reservation, VersionRange, WireWriter};

use crate::admin::{AdminOptions, AlterOp, ConfigResource, NewPartitions, NewTopic};
use crate::batch::MessageBatch;
use crate::envelope::{
    MetadataContext, ReplyRoute, RequestBuf, RequestFlags, ResponseHandler, NO_RETRIES,
};
use crate::engine::RequestEngine;
use crate::suppress::FullKind;
use crate::toppar::{OffsetList, Toppar, OFFSET_INVALID, OFFSET_STORED};

/// Grace period appended to the session timeout on blocking group requests.
const BLOCKING_GRACE_MS: u64 = 3_000;

/// Window granted to a Produce request whose first message already expired,
/// so the batch still gets one attempt on the wire.
const EXPIRED_BATCH_GRACE_MS: u64 = 100;

/// Deadline clamp for SaslHandshake against brokers that silently ignore
/// unknown API keys instead of closing the connection.
const HANDSHAKE_CLAMP_MS: u64 = 10_000;

/// An assignment strategy advertised in JoinGroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinProtocol {
    pub name: String,
    pub metadata: Vec<u8>,
}

/// One member's assignment carried in SyncGroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAssignment {
    pub member_id: String,
    pub partitions: Vec<Toppar>,
    pub user_data: Option<Vec<u8>>,
}

/// Emits the `i32 TopicCnt` header plus per-topic `string name,
/// i32 PartitionCnt` headers for a topic-sorted sequence, back-patching
/// both counts as runs close.
struct TopicRuns {
    topic_cnt: Option<Reservation>,
    part_cnt: Option<Reservation>,
    topics: i32,
    parts_in_run: i32,
    total_parts: i32,
    last_topic: Option<String>,
}

impl TopicRuns {
    fn begin(writer: &mut WireWriter) -> Self {
        Self {
            topic_cnt: Some(writer.reserve_i32()),
            part_cnt: None,
            topics: 0,
            parts_in_run: 0,
            total_parts: 0,
            last_topic: None,
        }
    }

    /// Account one partition under `topic`, opening a new topic run when the
    /// topic changes. The caller writes the partition fields afterwards.
    fn enter(&mut self, writer: &mut WireWriter, topic: &str) -> Result<(), ErrorKind> {
        if self.last_topic.as_deref() != Some(topic) {
            if let Some(slot) = self.part_cnt.take() {
                writer.patch_i32(slot, self.parts_in_run);
            }
            writer.write_str(Some(topic))?;
            self.part_cnt = Some(writer.reserve_i32());
            self.parts_in_run = 0;
            self.topics += 1;
            self.last_topic = Some(topic.to_string());
        }
        self.parts_in_run += 1;
        self.total_parts += 1;
        Ok(())
    }

    /// Close the final run and the topic count; returns the total number of
    /// partitions written.
    fn finish(mut self, writer: &mut WireWriter) -> i32 {
        if let Some(slot) = self.part_cnt.take() {
            writer.patch_i32(slot, self.parts_in_run);
        }
        if let Some(slot) = self.topic_cnt.take() {
            writer.patch_i32(slot, self.topics);
        }
        self.total_parts
    }
}

impl RequestEngine {
    fn negotiate(&self, key: ApiKey, requested: VersionRange) -> Result<(i16, u32), ErrorKind> {
        self.api_version_supported(key, requested)
            .ok_or(ErrorKind::UnsupportedFeature)
    }

    /// Coordinator lookup for `group_id`. The reply is not parsed here; the
    /// raw body goes to the caller's queue.
    pub fn group_coordinator_request(
        &self,
        group_id: &str,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) =
            self.negotiate(ApiKey::GroupCoordinator, VersionRange::single(0))?;
        let mut draft =
            self.begin_request(ApiKey::GroupCoordinator, version, features, 2 + group_id.len())?;
        draft.writer.write_str(Some(group_id))?;
        let request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.submit(request);
        Ok(())
    }

    /// ListOffsets for `partitions`, whose `offset` fields carry the query
    /// timestamp (or logical offset on v0).
    pub fn offsets_request(
        &self,
        mut partitions: OffsetList,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::Offsets, VersionRange::new(0, 1))?;

        partitions.sort_by_topic();

        let mut draft = self.begin_request(
            ApiKey::Offsets,
            version,
            features,
            8 + partitions.len() * 24,
        )?;
        // ReplicaId: always -1 from a client.
        draft.writer.write_i32(-1);
        let mut runs = TopicRuns::begin(&mut draft.writer);
        for entry in partitions.iter() {
            runs.enter(&mut draft.writer, &entry.topic)?;
            draft.writer.write_i32(entry.partition);
            draft.writer.write_i64(entry.offset);
            if version == 0 {
                // MaxNumberOfOffsets: one is all we use.
                draft.writer.write_i32(1);
            }
        }
        let topics = runs.topics;
        let total = runs.finish(&mut draft.writer);

        debug!(
            version,
            topics,
            partitions = total,
            "offsets request"
        );

        let request = self.finish_request(draft, ResponseHandler::Offsets { partitions }, reply);
        self.submit(request);
        Ok(())
    }

    /// OffsetFetch for the partitions of `partitions` that still need a
    /// committed offset. Partitions whose offset is already usable are
    /// skipped; when nothing remains, no request is sent and the caller's
    /// queue receives an empty reply synchronously.
    ///
    /// Returns whether a request actually went out.
    pub fn offset_fetch_request(
        &self,
        group_id: &str,
        mut partitions: OffsetList,
        update_partitions: bool,
        reply: ReplyRoute,
    ) -> Result<bool, ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::OffsetFetch, VersionRange::new(0, 1))?;

        partitions.sort_by_topic();

        let mut draft = self.begin_request(
            ApiKey::OffsetFetch,
            version,
            features,
            2 + group_id.len() + 4 + partitions.len() * 32,
        )?;
        draft.writer.write_str(Some(group_id))?;
        let mut runs = TopicRuns::begin(&mut draft.writer);
        for entry in partitions.iter() {
            // A usable offset needs no fetch.
            if entry.offset != OFFSET_INVALID && entry.offset != OFFSET_STORED {
                debug!(
                    topic = %entry.topic,
                    partition = entry.partition,
                    offset = entry.offset,
                    "offset fetch: skipping partition with valid offset"
                );
                continue;
            }
            runs.enter(&mut draft.writer, &entry.topic)?;
            draft.writer.write_i32(entry.partition);
        }
        let total = runs.finish(&mut draft.writer);

        debug!(
            version,
            fetching = total,
            of = partitions.len(),
            group = group_id,
            "offset fetch request"
        );

        let request = self.finish_request(
            draft,
            ResponseHandler::OffsetFetch {
                partitions,
                update_partitions,
            },
            reply,
        );

        if total == 0 {
            // Nothing to fetch: complete the caller immediately with an
            // empty reply instead of bothering the broker.
            self.handle_reply(ErrorKind::NoError, None, request);
            return Ok(false);
        }

        self.submit(request);
        Ok(true)
    }

    /// OffsetCommit for the partitions of `offsets` with a valid (>= 0)
    /// offset. Returns whether a request was sent; an all-filtered list
    /// sends nothing.
    pub fn offset_commit_request(
        &self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        mut offsets: OffsetList,
        reply: ReplyRoute,
        reason: &str,
    ) -> Result<bool, ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::OffsetCommit, VersionRange::new(0, 2))?;

        offsets.sort_by_topic();

        let mut draft = self.begin_request(
            ApiKey::OffsetCommit,
            version,
            features,
            2 + group_id.len() + offsets.len() * 64,
        )?;
        draft.writer.write_str(Some(group_id))?;
        if version >= 1 {
            draft.writer.write_i32(generation_id);
            draft.writer.write_str(Some(member_id))?;
            if version == 2 {
                // RetentionTime: use the broker default.
                draft.writer.write_i64(-1);
            }
        }

        let mut runs = TopicRuns::begin(&mut draft.writer);
        for entry in offsets.iter() {
            // Nothing to commit for this partition.
            if entry.offset < 0 {
                continue;
            }
            runs.enter(&mut draft.writer, &entry.topic)?;
            draft.writer.write_i32(entry.partition);
            draft.writer.write_i64(entry.offset);
            if version == 1 {
                // Timestamp: let the broker assign it.
                draft.writer.write_i64(-1);
            }
            // Old consumers and brokers cannot parse a null metadata field;
            // send an empty string instead.
            draft
                .writer
                .write_str(Some(entry.metadata.as_deref().unwrap_or("")))?;
        }

        if runs.total_parts == 0 {
            debug!(group = group_id, reason, "offset commit: no valid offsets");
            return Ok(false);
        }
        let total = runs.finish(&mut draft.writer);

        debug!(
            version,
            committing = total,
            of = offsets.len(),
            group = group_id,
            reason,
            "offset commit request"
        );

        let request = self.finish_request(
            draft,
            ResponseHandler::OffsetCommit { partitions: offsets },
            reply,
        );
        self.submit(request);
        Ok(true)
    }

    /// JoinGroup advertising the enabled assignment strategies. Blocking:
    /// the broker parks the request for up to the rebalance cycle.
    pub fn join_group_request(
        &self,
        group_id: &str,
        member_id: &str,
        protocol_type: &str,
        protocols: &[JoinProtocol],
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::JoinGroup, VersionRange::single(0))?;
        let mut draft = self.begin_request(
            ApiKey::JoinGroup,
            version,
            features,
            2 + group_id.len() + 4 + 2 + member_id.len() + protocols.len() * 100,
        )?;
        let session_timeout_ms = self.config().session_timeout_ms;
        draft.writer.write_str(Some(group_id))?;
        draft.writer.write_i32(session_timeout_ms as i32);
        draft.writer.write_str(Some(member_id))?;
        draft.writer.write_str(Some(protocol_type))?;
        draft.writer.write_i32(protocols.len() as i32);
        for protocol in protocols {
            draft.writer.write_str(Some(&protocol.name))?;
            draft.writer.write_bytes(Some(&protocol.metadata))?;
        }

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        request.flags |= RequestFlags::BLOCKING;
        request.deadline_ms = self.deadline_in(session_timeout_ms + BLOCKING_GRACE_MS);
        self.submit(request);
        Ok(())
    }

    /// SyncGroup distributing `assignments` (leader) or an empty list
    /// (followers). Blocking, like JoinGroup.
    pub fn sync_group_request(
        &self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        assignments: &[MemberAssignment],
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::SyncGroup, VersionRange::single(0))?;
        let mut draft = self.begin_request(
            ApiKey::SyncGroup,
            version,
            features,
            2 + group_id.len() + 4 + 2 + member_id.len() + 4 + assignments.len() * 100,
        )?;
        draft.writer.write_str(Some(group_id))?;
        draft.writer.write_i32(generation_id);
        draft.writer.write_str(Some(member_id))?;
        draft.writer.write_i32(assignments.len() as i32);
        for assignment in assignments {
            draft.writer.write_str(Some(&assignment.member_id))?;
            let state = encode_member_state(assignment)?;
            draft.writer.write_bytes(Some(&state))?;
        }

        let session_timeout_ms = self.config().session_timeout_ms;
        let mut request = self.finish_request(draft, ResponseHandler::SyncGroup, reply);
        request.flags |= RequestFlags::BLOCKING;
        request.deadline_ms = self.deadline_in(session_timeout_ms + BLOCKING_GRACE_MS);
        self.submit(request);
        Ok(())
    }

    pub fn heartbeat_request(
        &self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::Heartbeat, VersionRange::single(0))?;
        debug!(group = group_id, generation_id, "heartbeat");
        let mut draft = self.begin_request(
            ApiKey::Heartbeat,
            version,
            features,
            2 + group_id.len() + 4 + 2 + member_id.len(),
        )?;
        draft.writer.write_str(Some(group_id))?;
        draft.writer.write_i32(generation_id);
        draft.writer.write_str(Some(member_id))?;

        let mut request = self.finish_request(draft, ResponseHandler::Simple, reply);
        request.deadline_ms = self.deadline_in(self.config().session_timeout_ms);
        self.submit(request);
        Ok(())
    }

    pub fn leave_group_request(
        &self,
        group_id: &str,
        member_id: &str,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::LeaveGroup, VersionRange::single(0))?;
        let mut draft = self.begin_request(
            ApiKey::LeaveGroup,
            version,
            features,
            2 + group_id.len() + 2 + member_id.len(),
        )?;
        draft.writer.write_str(Some(group_id))?;
        draft.writer.write_str(Some(member_id))?;
        let request = self.finish_request(draft, ResponseHandler::Simple, reply);
        self.submit(request);
        Ok(())
    }

    pub fn list_groups_request(&self, reply: ReplyRoute) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::ListGroups, VersionRange::single(0))?;
        let draft = self.begin_request(ApiKey::ListGroups, version, features, 0)?;
        let request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.submit(request);
        Ok(())
    }

    pub fn describe_groups_request(
        &self,
        groups: &[String],
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::DescribeGroups, VersionRange::single(0))?;
        let mut draft = self.begin_request(
            ApiKey::DescribeGroups,
            version,
            features,
            4 + groups.len() * 32,
        )?;
        draft.writer.write_i32(groups.len() as i32);
        for group in groups {
            draft.writer.write_str(Some(group))?;
        }
        let request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.submit(request);
        Ok(())
    }

    /// Metadata request.
    ///
    /// `topics`: `None` asks for brokers only (all topics on v0 brokers),
    /// an empty list for all topics, a non-empty list for those topics.
    ///
    /// Unforced full requests (no reply route) are suppressed with
    /// `PrevInProgress` while an identical one is in transit; requests with
    /// a caller reply queue always go out.
    pub fn metadata_request(
        &self,
        topics: Option<&[String]>,
        reason: &str,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        let (version, features) = self.negotiate(ApiKey::Metadata, VersionRange::new(0, 2))?;
        let forced = !reply.is_none();
        let topic_count = topics.map_or(0, <[String]>::len);

        let mut draft = self.begin_request(
            ApiKey::Metadata,
            version,
            features,
            4 + 50 * topic_count,
        )?;

        let mut counted = None;
        let mut all_topics = false;
        match topics {
            None => {
                // An empty array: brokers only on v1+, all topics on v0.
                draft.writer.write_i32(0);
                counted = Some(FullKind::Brokers);
                debug!(reason, "metadata request: brokers only");
            }
            Some([]) => {
                if version >= 1 {
                    // Null array: all topics.
                    draft.writer.write_i32(-1);
                } else {
                    draft.writer.write_i32(0);
                }
                if !forced {
                    counted = Some(FullKind::Topics);
                }
                all_topics = true;
                debug!(reason, "metadata request: all topics");
            }
            Some(list) => {
                draft.writer.write_i32(list.len() as i32);
                for topic in list {
                    draft.writer.write_str(Some(topic))?;
                }
                debug!(reason, topics = list.len(), "metadata request");
            }
        }

        if let Some(kind) = counted {
            if let Err(err) = self.full_gate().try_begin(kind, forced) {
                self.metrics().record_suppressed(kind.name());
                debug!(
                    reason,
                    kind = kind.name(),
                    "skipping metadata request: full request already in-transit"
                );
                return Err(err);
            }
        }

        let mut request = self.finish_request(draft, ResponseHandler::Metadata, reply);
        // Metadata is control plane: it goes ahead of data-plane traffic.
        request.flags |= RequestFlags::FLASH;
        self.attach_metadata_context(
            &mut request,
            MetadataContext {
                reason: reason.to_string(),
                all_topics,
                counted,
            },
        );
        self.submit(request);
        Ok(())
    }

    /// ApiVersions discovery. Never retried: brokers that predate the API
    /// close the connection on unknown keys, so a failure means "legacy".
    pub fn api_versions_request(&self, reply: ReplyRoute, flash: bool) -> Result<(), ErrorKind> {
        let mut draft = self.begin_request(ApiKey::ApiVersions, 0, 0, 4)?;
        // Empty array: request all APIs.
        draft.writer.write_i32(0);

        let mut request = self.finish_request(draft, ResponseHandler::ApiVersions, reply);
        request.retry_cap = NO_RETRIES;
        request.deadline_ms = self.deadline_in(self.config().api_version_request_timeout_ms);
        if flash {
            request.flags |= RequestFlags::FLASH;
        }
        self.submit(request);
        Ok(())
    }

    /// SaslHandshake advertising `mechanism`. Never retried, for the same
    /// legacy-broker reason as ApiVersions.
    pub fn sasl_handshake_request(
        &self,
        mechanism: &str,
        reply: ReplyRoute,
        flash: bool,
    ) -> Result<(), ErrorKind> {
        let mut draft =
            self.begin_request(ApiKey::SaslHandshake, 0, 0, 2 + mechanism.len())?;
        draft.writer.write_str(Some(mechanism))?;

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        request.retry_cap = NO_RETRIES;
        // Without version discovery a pre-0.10 broker will simply never
        // answer this request; keep the wait short.
        if !self.config().api_version_request
            && self.config().socket_timeout_ms > HANDSHAKE_CLAMP_MS
        {
            request.deadline_ms = self.deadline_in(HANDSHAKE_CLAMP_MS);
        }
        if flash {
            request.flags |= RequestFlags::FLASH;
        }
        self.submit(request);
        Ok(())
    }

    /// Produce `records` (an externally built record set) to one
    /// topic-partition, carrying `batch` as the per-message delivery
    /// bookkeeping. Returns the number of messages riding on the request.
    pub fn produce_request(
        &self,
        toppar: &Toppar,
        batch: MessageBatch,
        records: &[u8],
        reply: ReplyRoute,
    ) -> Result<usize, ErrorKind> {
        if batch.is_empty() {
            return Ok(0);
        }
        let (version, features) = self.negotiate(ApiKey::Produce, VersionRange::new(0, 2))?;

        let mut draft = self.begin_request(
            ApiKey::Produce,
            version,
            features,
            2 + 4 + 4 + 2 + toppar.topic.len() + 4 + 4 + 4 + records.len(),
        )?;
        let acks = self.config().required_acks;
        draft.writer.write_i16(acks);
        draft.writer.write_i32(self.config().request_timeout_ms);
        // One topic, one partition per request; the reply handler relies on
        // this shape.
        draft.writer.write_i32(1);
        draft.writer.write_str(Some(&toppar.topic))?;
        draft.writer.write_i32(1);
        draft.writer.write_i32(toppar.partition);
        draft.writer.write_bytes(Some(records))?;

        let count = batch.len();
        let now = self.now_ms();
        let deadline = match batch.first_timeout_at_ms() {
            Some(expiry) if expiry <= now => now + EXPIRED_BATCH_GRACE_MS,
            Some(expiry) => now + (expiry - now).min(i32::MAX as u64),
            None => self.deadline_in(self.config().socket_timeout_ms),
        };

        let mut request = self.finish_request(
            draft,
            ResponseHandler::Produce {
                toppar: toppar.clone(),
            },
            reply,
        );
        request.batch = batch;
        request.deadline_ms = deadline;
        if acks == 0 {
            request.flags |= RequestFlags::NO_RESPONSE;
        }

        debug!(
            toppar = %toppar,
            version,
            messages = count,
            bytes = records.len(),
            "produce request"
        );
        self.submit(request);
        Ok(count)
    }

    /// CreateTopics. The reply is handed to the caller unparsed.
    pub fn create_topics_request(
        &self,
        new_topics: &[NewTopic],
        options: &AdminOptions,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        if new_topics.is_empty() {
            return Err(ErrorKind::InvalidArg);
        }
        let (version, features) = self.negotiate(ApiKey::CreateTopics, VersionRange::new(0, 2))?;
        if options.validate_only && version < 1 {
            return Err(ErrorKind::UnsupportedFeature);
        }

        let mut draft = self.begin_request(
            ApiKey::CreateTopics,
            version,
            features,
            4 + new_topics.len() * 200 + 4 + 1,
        )?;
        draft.writer.write_i32(new_topics.len() as i32);
        for topic in new_topics {
            draft.writer.write_str(Some(&topic.topic))?;
            if topic.replica_assignment.is_empty() {
                draft.writer.write_i32(topic.num_partitions);
                draft.writer.write_i16(topic.replication_factor);
            } else {
                // Both counts must be -1 when an explicit assignment is sent.
                draft.writer.write_i32(-1);
                draft.writer.write_i16(-1);
            }

            draft
                .writer
                .write_i32(topic.replica_assignment.len() as i32);
            for (partition, replicas) in topic.replica_assignment.iter().enumerate() {
                draft.writer.write_i32(partition as i32);
                draft.writer.write_i32(replicas.len() as i32);
                for replica in replicas {
                    draft.writer.write_i32(*replica);
                }
            }

            draft.writer.write_i32(topic.config.len() as i32);
            for (name, value) in &topic.config {
                draft.writer.write_str(Some(name))?;
                draft.writer.write_str(value.as_deref())?;
            }
        }

        draft.writer.write_i32(options.operation_timeout_ms);
        if version >= 1 {
            draft.writer.write_i8(options.validate_only as i8);
        }

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.extend_deadline_for_op(&mut request, options);
        self.submit(request);
        Ok(())
    }

    /// DeleteTopics. The reply is handed to the caller unparsed.
    pub fn delete_topics_request(
        &self,
        topics: &[String],
        options: &AdminOptions,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        if topics.is_empty() {
            return Err(ErrorKind::InvalidArg);
        }
        let (version, features) = self.negotiate(ApiKey::DeleteTopics, VersionRange::new(0, 1))?;

        let mut draft = self.begin_request(
            ApiKey::DeleteTopics,
            version,
            features,
            4 + topics.len() * 100 + 4,
        )?;
        draft.writer.write_i32(topics.len() as i32);
        for topic in topics {
            draft.writer.write_str(Some(topic))?;
        }
        draft.writer.write_i32(options.operation_timeout_ms);

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.extend_deadline_for_op(&mut request, options);
        self.submit(request);
        Ok(())
    }

    /// CreatePartitions. The reply is handed to the caller unparsed.
    pub fn create_partitions_request(
        &self,
        new_partitions: &[NewPartitions],
        options: &AdminOptions,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        if new_partitions.is_empty() {
            return Err(ErrorKind::InvalidArg);
        }
        let (version, features) =
            self.negotiate(ApiKey::CreatePartitions, VersionRange::single(0))?;

        let mut draft = self.begin_request(
            ApiKey::CreatePartitions,
            version,
            features,
            4 + new_partitions.len() * 200 + 4 + 1,
        )?;
        draft.writer.write_i32(new_partitions.len() as i32);
        for parts in new_partitions {
            draft.writer.write_str(Some(&parts.topic))?;
            draft.writer.write_i32(parts.total_count);
            if parts.replica_assignment.is_empty() {
                draft.writer.write_i32(-1);
            } else {
                draft
                    .writer
                    .write_i32(parts.replica_assignment.len() as i32);
                for replicas in &parts.replica_assignment {
                    draft.writer.write_i32(replicas.len() as i32);
                    for replica in replicas {
                        draft.writer.write_i32(*replica);
                    }
                }
            }
        }
        draft.writer.write_i32(options.operation_timeout_ms);
        draft.writer.write_i8(options.validate_only as i8);

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.extend_deadline_for_op(&mut request, options);
        self.submit(request);
        Ok(())
    }

    /// AlterConfigs. The reply is handed to the caller unparsed.
    pub fn alter_configs_request(
        &self,
        configs: &[ConfigResource],
        options: &AdminOptions,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        if configs.is_empty() {
            return Err(ErrorKind::InvalidArg);
        }
        let (version, features) = self.negotiate(ApiKey::AlterConfigs, VersionRange::single(0))?;
        if options.incremental && version < 1 {
            return Err(ErrorKind::UnsupportedFeature);
        }

        let mut draft = self.begin_request(
            ApiKey::AlterConfigs,
            version,
            features,
            configs.len() * 200,
        )?;
        draft.writer.write_i32(configs.len() as i32);
        for config in configs {
            draft.writer.write_i8(config.resource_type.code());
            draft.writer.write_str(Some(&config.name))?;
            draft.writer.write_i32(config.entries.len() as i32);
            for entry in &config.entries {
                draft.writer.write_str(Some(&entry.name))?;
                draft.writer.write_str(entry.value.as_deref())?;
                if version == 1 {
                    draft.writer.write_i8(entry.op.code());
                } else if entry.op != AlterOp::Set {
                    // Add/delete entries need a broker that speaks v1.
                    return Err(ErrorKind::UnsupportedFeature);
                }
            }
        }
        draft.writer.write_i8(options.validate_only as i8);

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.extend_deadline_for_op(&mut request, options);
        self.submit(request);
        Ok(())
    }

    /// DescribeConfigs. The reply is handed to the caller unparsed.
    pub fn describe_configs_request(
        &self,
        configs: &[ConfigResource],
        options: &AdminOptions,
        reply: ReplyRoute,
    ) -> Result<(), ErrorKind> {
        if configs.is_empty() {
            return Err(ErrorKind::InvalidArg);
        }
        let (version, features) =
            self.negotiate(ApiKey::DescribeConfigs, VersionRange::new(0, 1))?;

        let mut draft = self.begin_request(
            ApiKey::DescribeConfigs,
            version,
            features,
            configs.len() * 200,
        )?;
        draft.writer.write_i32(configs.len() as i32);
        for config in configs {
            draft.writer.write_i8(config.resource_type.code());
            draft.writer.write_str(Some(&config.name))?;
            if config.entries.is_empty() {
                // Null array: all configs for the resource.
                draft.writer.write_i32(-1);
            } else {
                draft.writer.write_i32(config.entries.len() as i32);
                for entry in &config.entries {
                    draft.writer.write_str(Some(&entry.name))?;
                }
            }
        }
        if version == 1 {
            // include_synonyms
            draft.writer.write_i8(1);
        }

        let mut request = self.finish_request(draft, ResponseHandler::Raw, reply);
        self.extend_deadline_for_op(&mut request, options);
        self.submit(request);
        Ok(())
    }

    /// A broker-side operation timeout longer than the socket timeout would
    /// expire the request client-side first; stretch the deadline past it.
    fn extend_deadline_for_op(&self, request: &mut RequestBuf, options: &AdminOptions) {
        let op_timeout_ms = options.operation_timeout_ms;
        if op_timeout_ms > 0 && op_timeout_ms as u64 > self.config().socket_timeout_ms {
            request.deadline_ms = self.deadline_in(op_timeout_ms as u64 + 1_000);
        }
    }
}

/// Build the nested "consumer" protocol MemberState blob for one SyncGroup
/// assignment: version, topic-grouped partition list, user data.
fn encode_member_state(assignment: &MemberAssignment) -> Result<Vec<u8>, ErrorKind> {
    let mut writer = WireWriter::new();
    writer.write_i16(0); // Version
    let mut partitions = assignment.partitions.clone();
    partitions.sort_by(|a, b| a.topic.cmp(&b.topic).then(a.partition.cmp(&b.partition)));
    let mut runs = TopicRuns::begin(&mut writer);
    for toppar in &partitions {
        runs.enter(&mut writer, &toppar.topic)?;
        writer.write_i32(toppar.partition);
    }
    runs.finish(&mut writer);
    writer.write_bytes(assignment.user_data.as_deref())?;
    Ok(writer.finish())
}
