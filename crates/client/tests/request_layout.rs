use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use franz_client::{
    AdminOptions, AlterOp, BrokerLink, Clock, ConfigEntry, ConfigResource, EngineConfig,
    FullRequestGate, Hooks, JoinProtocol, MemberAssignment, MessageBatch, NewTopic, OffsetEntry,
    OffsetList, PendingMessage, Reply, ReplyEpoch, ReplyRoute, RequestBuf, RequestEngine,
    RequestFlags, ResourceType, Toppar, NO_RETRIES, OFFSET_INVALID,
};
use franz_protocol::{features, ApiKey, ApiSupport, ApiVersionTable, ErrorKind, WireReader};

struct RecordingBroker {
    sent: Mutex<Vec<RequestBuf>>,
}

impl RecordingBroker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn take(&self) -> Vec<RequestBuf> {
        std::mem::take(&mut self.sent.lock().expect("lock"))
    }
}

impl BrokerLink for RecordingBroker {
    fn enqueue(&self, request: RequestBuf) {
        self.sent.lock().expect("lock").push(request);
    }

    fn retry(&self, request: RequestBuf) {
        self.sent.lock().expect("lock").push(request);
    }
}

struct TestClock {
    now: AtomicU64,
}

impl TestClock {
    fn at(now_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(now_ms),
        })
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

fn engine_with(
    broker: Arc<RecordingBroker>,
    clock: Arc<TestClock>,
    config: EngineConfig,
) -> RequestEngine {
    let mut hooks = Hooks::with_broker(broker);
    hooks.clock = clock;
    let engine =
        RequestEngine::new(7, config, hooks, Arc::new(FullRequestGate::new())).expect("engine");
    engine.install_api_versions(broad_table());
    engine
}

fn broad_table() -> ApiVersionTable {
    let support = |key: ApiKey, min: i16, max: i16| ApiSupport {
        api_key: key.code(),
        min,
        max,
    };
    ApiVersionTable::from_entries(vec![
        support(ApiKey::Produce, 0, 2),
        support(ApiKey::Offsets, 0, 1),
        support(ApiKey::Metadata, 0, 2),
        support(ApiKey::OffsetCommit, 0, 2),
        support(ApiKey::OffsetFetch, 0, 1),
        support(ApiKey::GroupCoordinator, 0, 0),
        support(ApiKey::JoinGroup, 0, 0),
        support(ApiKey::Heartbeat, 0, 0),
        support(ApiKey::LeaveGroup, 0, 0),
        support(ApiKey::SyncGroup, 0, 0),
        support(ApiKey::DescribeGroups, 0, 0),
        support(ApiKey::ListGroups, 0, 0),
        support(ApiKey::CreateTopics, 0, 2),
        support(ApiKey::DeleteTopics, 0, 1),
        support(ApiKey::DescribeConfigs, 0, 1),
        support(ApiKey::AlterConfigs, 0, 0),
        support(ApiKey::CreatePartitions, 0, 0),
    ])
}

/// Strip the frame length and request header, returning the body and
/// asserting the header invariants on the way.
fn body_of(request: &RequestBuf, client_id: &str) -> Vec<u8> {
    let payload = request.payload();
    let mut reader = WireReader::new(payload);
    let frame_len = reader.read_i32().expect("frame length");
    assert_eq!(frame_len as usize, payload.len() - 4, "frame length patch");
    assert_eq!(reader.read_i16().expect("api key"), request.api_key().code());
    assert_eq!(reader.read_i16().expect("api version"), request.api_version());
    assert_eq!(
        reader.read_i32().expect("correlation id"),
        request.correlation_id()
    );
    assert_eq!(reader.read_str().expect("client id"), Some(client_id));
    payload[reader.cursor()..].to_vec()
}

fn offsets_list(entries: &[(&str, i32, i64)]) -> OffsetList {
    OffsetList::from_entries(
        entries
            .iter()
            .map(|(t, p, o)| OffsetEntry::new(*t, *p, *o))
            .collect(),
    )
}

#[test]
fn offsets_v1_groups_topics_and_sets_offset_time() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    engine
        .offsets_request(
            offsets_list(&[("t", 0, 1000), ("t", 1, 2000), ("u", 0, 3000)]),
            ReplyRoute::none(),
        )
        .expect("offsets request");

    let sent = broker.take();
    assert_eq!(sent.len(), 1);
    let request = &sent[0];
    assert_eq!(request.api_version(), 1);
    assert_eq!(request.features() & features::OFFSET_TIME, features::OFFSET_TIME);

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("replica id"), -1);
    assert_eq!(reader.read_i32().expect("topic count"), 2);
    assert_eq!(reader.read_str().expect("topic"), Some("t"));
    assert_eq!(reader.read_i32().expect("partition count"), 2);
    assert_eq!(reader.read_i32().expect("partition"), 0);
    assert_eq!(reader.read_i64().expect("timestamp"), 1000);
    assert_eq!(reader.read_i32().expect("partition"), 1);
    assert_eq!(reader.read_i64().expect("timestamp"), 2000);
    assert_eq!(reader.read_str().expect("topic"), Some("u"));
    assert_eq!(reader.read_i32().expect("partition count"), 1);
    assert_eq!(reader.read_i32().expect("partition"), 0);
    assert_eq!(reader.read_i64().expect("timestamp"), 3000);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn offsets_v0_appends_max_offsets_field() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    engine.install_api_versions(ApiVersionTable::from_entries(vec![ApiSupport {
        api_key: ApiKey::Offsets.code(),
        min: 0,
        max: 0,
    }]));

    engine
        .offsets_request(offsets_list(&[("t", 0, -1)]), ReplyRoute::none())
        .expect("offsets request");

    let sent = broker.take();
    let request = &sent[0];
    assert_eq!(request.api_version(), 0);
    assert_eq!(request.features(), 0);

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    reader.read_i32().expect("replica id");
    reader.read_i32().expect("topic count");
    reader.skip_str().expect("topic");
    reader.read_i32().expect("partition count");
    reader.read_i32().expect("partition");
    reader.read_i64().expect("offset");
    assert_eq!(reader.read_i32().expect("max offsets"), 1);
}

#[test]
fn metadata_all_topics_uses_null_array_sentinel() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let (tx, _rx) = mpsc::channel();
    let route = ReplyRoute::new(tx, Arc::new(ReplyEpoch::new()));
    engine
        .metadata_request(Some(&[]), "test", route)
        .expect("metadata request");

    let sent = broker.take();
    let request = &sent[0];
    assert!(request.flags().contains(RequestFlags::FLASH));
    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("topic count"), -1);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn metadata_brokers_only_writes_zero_count() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let (tx, _rx) = mpsc::channel();
    engine
        .metadata_request(None, "test", ReplyRoute::new(tx, Arc::new(ReplyEpoch::new())))
        .expect("metadata request");

    let body = body_of(&broker.take()[0], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("topic count"), 0);
}

#[test]
fn metadata_v0_encodes_all_topics_as_empty_array() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    engine.install_api_versions(ApiVersionTable::from_entries(vec![ApiSupport {
        api_key: ApiKey::Metadata.code(),
        min: 0,
        max: 0,
    }]));

    let (tx, _rx) = mpsc::channel();
    engine
        .metadata_request(
            Some(&[]),
            "test",
            ReplyRoute::new(tx, Arc::new(ReplyEpoch::new())),
        )
        .expect("metadata request");

    let body = body_of(&broker.take()[0], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("topic count"), 0);
}

#[test]
fn metadata_topic_list_is_written_in_order() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let topics = vec!["a".to_string(), "b".to_string()];
    engine
        .metadata_request(Some(&topics), "test", ReplyRoute::none())
        .expect("metadata request");

    let body = body_of(&broker.take()[0], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("topic count"), 2);
    assert_eq!(reader.read_str().expect("topic"), Some("a"));
    assert_eq!(reader.read_str().expect("topic"), Some("b"));
}

#[test]
fn offset_fetch_skips_partitions_with_usable_offsets() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let sent = engine
        .offset_fetch_request(
            "grp",
            offsets_list(&[("t", 0, OFFSET_INVALID), ("t", 1, 12345)]),
            false,
            ReplyRoute::none(),
        )
        .expect("offset fetch");
    assert!(sent);

    let requests = broker.take();
    let body = body_of(&requests[0], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_str().expect("group"), Some("grp"));
    assert_eq!(reader.read_i32().expect("topic count"), 1);
    assert_eq!(reader.read_str().expect("topic"), Some("t"));
    assert_eq!(reader.read_i32().expect("partition count"), 1);
    assert_eq!(reader.read_i32().expect("partition"), 0);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn offset_fetch_with_no_work_sends_nothing_and_replies_empty() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let (tx, rx) = mpsc::channel();
    let sent = engine
        .offset_fetch_request(
            "grp",
            offsets_list(&[("t", 0, 12345), ("t", 1, 67890)]),
            false,
            ReplyRoute::new(tx, Arc::new(ReplyEpoch::new())),
        )
        .expect("offset fetch");
    assert!(!sent);
    assert!(broker.take().is_empty());

    // The caller still gets a completion, synchronously, with its offsets
    // untouched.
    match rx.try_recv().expect("synchronous reply") {
        Reply::OffsetFetch { err, partitions } => {
            assert_eq!(err, ErrorKind::NoError);
            assert_eq!(partitions.find("t", 0).expect("t0").offset, 12345);
            assert_eq!(partitions.find("t", 1).expect("t1").offset, 67890);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn offset_commit_v2_layout_and_null_metadata_workaround() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let mut offsets = offsets_list(&[("t", 0, 42)]);
    offsets.entries_mut()[0].metadata = None;
    let sent = engine
        .offset_commit_request("grp", 9, "member-1", offsets, ReplyRoute::none(), "cgrp commit")
        .expect("offset commit");
    assert!(sent);

    let requests = broker.take();
    let request = &requests[0];
    assert_eq!(request.api_version(), 2);

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_str().expect("group"), Some("grp"));
    assert_eq!(reader.read_i32().expect("generation"), 9);
    assert_eq!(reader.read_str().expect("member"), Some("member-1"));
    assert_eq!(reader.read_i64().expect("retention"), -1);
    assert_eq!(reader.read_i32().expect("topic count"), 1);
    assert_eq!(reader.read_str().expect("topic"), Some("t"));
    assert_eq!(reader.read_i32().expect("partition count"), 1);
    assert_eq!(reader.read_i32().expect("partition"), 0);
    assert_eq!(reader.read_i64().expect("offset"), 42);
    // Null metadata goes out as an empty string, not null.
    assert_eq!(reader.read_str().expect("metadata"), Some(""));
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn offset_commit_v1_inserts_timestamp_field() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    engine.install_api_versions(ApiVersionTable::from_entries(vec![ApiSupport {
        api_key: ApiKey::OffsetCommit.code(),
        min: 0,
        max: 1,
    }]));

    engine
        .offset_commit_request(
            "grp",
            3,
            "m",
            offsets_list(&[("t", 0, 7)]),
            ReplyRoute::none(),
            "test",
        )
        .expect("offset commit");

    let requests = broker.take();
    assert_eq!(requests[0].api_version(), 1);
    let body = body_of(&requests[0], "franz");
    let mut reader = WireReader::new(&body);
    reader.skip_str().expect("group");
    reader.read_i32().expect("generation");
    reader.skip_str().expect("member");
    reader.read_i32().expect("topic count");
    reader.skip_str().expect("topic");
    reader.read_i32().expect("partition count");
    reader.read_i32().expect("partition");
    reader.read_i64().expect("offset");
    assert_eq!(reader.read_i64().expect("timestamp"), -1);
    assert_eq!(reader.read_str().expect("metadata"), Some(""));
}

#[test]
fn offset_commit_with_no_valid_offsets_sends_nothing() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let sent = engine
        .offset_commit_request(
            "grp",
            1,
            "m",
            offsets_list(&[("t", 0, OFFSET_INVALID), ("t", 1, -1)]),
            ReplyRoute::none(),
            "test",
        )
        .expect("offset commit");
    assert!(!sent);
    assert!(broker.take().is_empty());
}

#[test]
fn join_group_is_blocking_with_grace_deadline() {
    let broker = RecordingBroker::new();
    let clock = TestClock::at(50_000);
    let config = EngineConfig {
        session_timeout_ms: 30_000,
        ..EngineConfig::default()
    };
    let engine = engine_with(broker.clone(), clock, config);

    engine
        .join_group_request(
            "grp",
            "",
            "consumer",
            &[
                JoinProtocol {
                    name: "range".to_string(),
                    metadata: vec![1, 2],
                },
                JoinProtocol {
                    name: "roundrobin".to_string(),
                    metadata: Vec::new(),
                },
            ],
            ReplyRoute::none(),
        )
        .expect("join group");

    let requests = broker.take();
    let request = &requests[0];
    assert!(request.flags().contains(RequestFlags::BLOCKING));
    assert_eq!(request.deadline_ms(), 50_000 + 30_000 + 3_000);

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_str().expect("group"), Some("grp"));
    assert_eq!(reader.read_i32().expect("session timeout"), 30_000);
    assert_eq!(reader.read_str().expect("member"), Some(""));
    assert_eq!(reader.read_str().expect("protocol type"), Some("consumer"));
    assert_eq!(reader.read_i32().expect("protocol count"), 2);
    assert_eq!(reader.read_str().expect("name"), Some("range"));
    assert_eq!(reader.read_bytes().expect("metadata"), Some(&[1u8, 2][..]));
    assert_eq!(reader.read_str().expect("name"), Some("roundrobin"));
    assert_eq!(reader.read_bytes().expect("metadata"), Some(&[][..]));
}

#[test]
fn sync_group_nests_member_state_as_bytes() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    engine
        .sync_group_request(
            "grp",
            5,
            "leader",
            &[MemberAssignment {
                member_id: "m1".to_string(),
                partitions: vec![Toppar::new("t", 0), Toppar::new("t", 1)],
                user_data: None,
            }],
            ReplyRoute::none(),
        )
        .expect("sync group");

    let requests = broker.take();
    let request = &requests[0];
    assert!(request.flags().contains(RequestFlags::BLOCKING));

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_str().expect("group"), Some("grp"));
    assert_eq!(reader.read_i32().expect("generation"), 5);
    assert_eq!(reader.read_str().expect("member"), Some("leader"));
    assert_eq!(reader.read_i32().expect("assignment count"), 1);
    assert_eq!(reader.read_str().expect("member id"), Some("m1"));

    let state = reader.read_bytes().expect("member state").expect("non-null");
    // The nested envelope length must cover exactly the rest of the blob.
    let mut inner = WireReader::new(state);
    assert_eq!(inner.read_i16().expect("version"), 0);
    assert_eq!(inner.read_i32().expect("topic count"), 1);
    assert_eq!(inner.read_str().expect("topic"), Some("t"));
    assert_eq!(inner.read_i32().expect("partition count"), 2);
    assert_eq!(inner.read_i32().expect("p"), 0);
    assert_eq!(inner.read_i32().expect("p"), 1);
    assert_eq!(inner.read_bytes().expect("user data"), None);
    assert_eq!(inner.remaining(), 0);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn heartbeat_uses_session_deadline() {
    let broker = RecordingBroker::new();
    let clock = TestClock::at(1_000);
    let config = EngineConfig {
        session_timeout_ms: 6_000,
        ..EngineConfig::default()
    };
    let engine = engine_with(broker.clone(), clock, config);

    engine
        .heartbeat_request("grp", 2, "m", ReplyRoute::none())
        .expect("heartbeat");

    let requests = broker.take();
    assert_eq!(requests[0].deadline_ms(), 7_000);
}

#[test]
fn api_versions_request_is_unretried_with_short_deadline() {
    let broker = RecordingBroker::new();
    let clock = TestClock::at(0);
    let engine = engine_with(broker.clone(), clock, EngineConfig::default());

    engine
        .api_versions_request(ReplyRoute::none(), true)
        .expect("api versions");

    let requests = broker.take();
    let request = &requests[0];
    assert_eq!(request.retry_cap(), NO_RETRIES);
    assert_eq!(request.deadline_ms(), 10_000);
    assert!(request.flags().contains(RequestFlags::FLASH));

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("array count"), 0);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn sasl_handshake_deadline_clamps_without_version_discovery() {
    let broker = RecordingBroker::new();
    let config = EngineConfig {
        api_version_request: false,
        socket_timeout_ms: 60_000,
        ..EngineConfig::default()
    };
    let engine = engine_with(broker.clone(), TestClock::at(0), config);

    engine
        .sasl_handshake_request("SCRAM-SHA-256", ReplyRoute::none(), false)
        .expect("handshake");

    let requests = broker.take();
    let request = &requests[0];
    assert_eq!(request.retry_cap(), NO_RETRIES);
    assert_eq!(request.deadline_ms(), 10_000);

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_str().expect("mechanism"), Some("SCRAM-SHA-256"));
}

#[test]
fn produce_acks_zero_sets_no_response() {
    let broker = RecordingBroker::new();
    let config = EngineConfig {
        required_acks: 0,
        ..EngineConfig::default()
    };
    let engine = engine_with(broker.clone(), TestClock::at(0), config);

    let batch = MessageBatch::from_messages(vec![PendingMessage::new(500_000)]);
    let count = engine
        .produce_request(&Toppar::new("t", 3), batch, b"recordset", ReplyRoute::none())
        .expect("produce");
    assert_eq!(count, 1);

    let requests = broker.take();
    let request = &requests[0];
    assert!(request.flags().contains(RequestFlags::NO_RESPONSE));

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i16().expect("acks"), 0);
    assert_eq!(reader.read_i32().expect("timeout"), 30_000);
    assert_eq!(reader.read_i32().expect("topic count"), 1);
    assert_eq!(reader.read_str().expect("topic"), Some("t"));
    assert_eq!(reader.read_i32().expect("partition count"), 1);
    assert_eq!(reader.read_i32().expect("partition"), 3);
    assert_eq!(
        reader.read_bytes().expect("records"),
        Some(&b"recordset"[..])
    );
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn produce_expired_batch_gets_grace_window() {
    let broker = RecordingBroker::new();
    let clock = TestClock::at(10_000);
    let engine = engine_with(broker.clone(), clock, EngineConfig::default());

    // First message expired 1 s ago.
    let batch = MessageBatch::from_messages(vec![PendingMessage::new(9_000)]);
    engine
        .produce_request(&Toppar::new("t", 0), batch, b"r", ReplyRoute::none())
        .expect("produce");

    let requests = broker.take();
    assert_eq!(requests[0].deadline_ms(), 10_100);
}

#[test]
fn produce_empty_batch_is_a_no_op() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    let count = engine
        .produce_request(&Toppar::new("t", 0), MessageBatch::new(), b"", ReplyRoute::none())
        .expect("produce");
    assert_eq!(count, 0);
    assert!(broker.take().is_empty());
}

#[test]
fn create_topics_layout_with_explicit_assignment() {
    let broker = RecordingBroker::new();
    let clock = TestClock::at(0);
    let engine = engine_with(broker.clone(), clock, EngineConfig::default());

    let mut topic = NewTopic::new("new-t", 4, 2);
    topic.config.push(("retention.ms".to_string(), Some("1000".to_string())));
    let mut assigned = NewTopic::new("assigned-t", 0, 0);
    assigned.replica_assignment = vec![vec![1, 2], vec![2, 3]];

    let options = AdminOptions {
        operation_timeout_ms: 100,
        validate_only: true,
        incremental: false,
    };
    engine
        .create_topics_request(&[topic, assigned], &options, ReplyRoute::none())
        .expect("create topics");

    let requests = broker.take();
    let request = &requests[0];
    assert_eq!(request.api_version(), 2);

    let body = body_of(request, "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("topic count"), 2);

    assert_eq!(reader.read_str().expect("topic"), Some("new-t"));
    assert_eq!(reader.read_i32().expect("partitions"), 4);
    assert_eq!(reader.read_i16().expect("replication"), 2);
    assert_eq!(reader.read_i32().expect("assignment count"), 0);
    assert_eq!(reader.read_i32().expect("config count"), 1);
    assert_eq!(reader.read_str().expect("name"), Some("retention.ms"));
    assert_eq!(reader.read_str().expect("value"), Some("1000"));

    assert_eq!(reader.read_str().expect("topic"), Some("assigned-t"));
    // Counts are -1 when an explicit assignment rides along.
    assert_eq!(reader.read_i32().expect("partitions"), -1);
    assert_eq!(reader.read_i16().expect("replication"), -1);
    assert_eq!(reader.read_i32().expect("assignment count"), 2);
    assert_eq!(reader.read_i32().expect("partition"), 0);
    assert_eq!(reader.read_i32().expect("replica count"), 2);
    assert_eq!(reader.read_i32().expect("replica"), 1);
    assert_eq!(reader.read_i32().expect("replica"), 2);
    assert_eq!(reader.read_i32().expect("partition"), 1);
    assert_eq!(reader.read_i32().expect("replica count"), 2);
    assert_eq!(reader.read_i32().expect("replica"), 2);
    assert_eq!(reader.read_i32().expect("replica"), 3);
    assert_eq!(reader.read_i32().expect("config count"), 0);

    assert_eq!(reader.read_i32().expect("op timeout"), 100);
    assert_eq!(reader.read_i8().expect("validate only"), 1);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn create_topics_validate_only_needs_v1() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    engine.install_api_versions(ApiVersionTable::from_entries(vec![ApiSupport {
        api_key: ApiKey::CreateTopics.code(),
        min: 0,
        max: 0,
    }]));

    let options = AdminOptions {
        validate_only: true,
        ..AdminOptions::default()
    };
    let err = engine
        .create_topics_request(&[NewTopic::new("t", 1, 1)], &options, ReplyRoute::none())
        .expect_err("needs v1");
    assert_eq!(err, ErrorKind::UnsupportedFeature);
}

#[test]
fn admin_requests_reject_empty_entity_lists() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    let options = AdminOptions::default();

    assert_eq!(
        engine
            .create_topics_request(&[], &options, ReplyRoute::none())
            .expect_err("empty"),
        ErrorKind::InvalidArg
    );
    assert_eq!(
        engine
            .delete_topics_request(&[], &options, ReplyRoute::none())
            .expect_err("empty"),
        ErrorKind::InvalidArg
    );
    assert_eq!(
        engine
            .alter_configs_request(&[], &options, ReplyRoute::none())
            .expect_err("empty"),
        ErrorKind::InvalidArg
    );
}

#[test]
fn admin_op_timeout_extends_the_deadline() {
    let broker = RecordingBroker::new();
    let clock = TestClock::at(0);
    let config = EngineConfig {
        socket_timeout_ms: 60_000,
        ..EngineConfig::default()
    };
    let engine = engine_with(broker.clone(), clock, config);

    let options = AdminOptions {
        operation_timeout_ms: 90_000,
        ..AdminOptions::default()
    };
    engine
        .delete_topics_request(&["t".to_string()], &options, ReplyRoute::none())
        .expect("delete topics");

    let requests = broker.take();
    assert_eq!(requests[0].deadline_ms(), 91_000);
}

#[test]
fn alter_configs_rejects_non_set_ops_on_v0() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let mut resource = ConfigResource::new(ResourceType::Topic, "t");
    resource.entries.push(ConfigEntry {
        name: "cleanup.policy".to_string(),
        value: Some("compact".to_string()),
        op: AlterOp::Append,
    });
    let err = engine
        .alter_configs_request(&[resource], &AdminOptions::default(), ReplyRoute::none())
        .expect_err("append needs v1");
    assert_eq!(err, ErrorKind::UnsupportedFeature);

    assert_eq!(
        engine
            .alter_configs_request(
                &[ConfigResource::new(ResourceType::Topic, "t")],
                &AdminOptions {
                    incremental: true,
                    ..AdminOptions::default()
                },
                ReplyRoute::none()
            )
            .expect_err("incremental needs v1"),
        ErrorKind::UnsupportedFeature
    );
}

#[test]
fn describe_configs_v1_requests_synonyms_and_null_array_for_all() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    let mut named = ConfigResource::new(ResourceType::Broker, "1");
    named.entries.push(ConfigEntry::name_only("log.dirs"));
    engine
        .describe_configs_request(
            &[ConfigResource::new(ResourceType::Topic, "t"), named],
            &AdminOptions::default(),
            ReplyRoute::none(),
        )
        .expect("describe configs");

    let requests = broker.take();
    let body = body_of(&requests[0], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("resource count"), 2);
    assert_eq!(reader.read_i8().expect("type"), 2);
    assert_eq!(reader.read_str().expect("name"), Some("t"));
    assert_eq!(reader.read_i32().expect("config count"), -1);
    assert_eq!(reader.read_i8().expect("type"), 4);
    assert_eq!(reader.read_str().expect("name"), Some("1"));
    assert_eq!(reader.read_i32().expect("config count"), 1);
    assert_eq!(reader.read_str().expect("entry"), Some("log.dirs"));
    assert_eq!(reader.read_i8().expect("include synonyms"), 1);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn admin_apis_unsupported_without_discovery() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());
    engine.install_api_versions(ApiVersionTable::default());

    let err = engine
        .create_topics_request(
            &[NewTopic::new("t", 1, 1)],
            &AdminOptions::default(),
            ReplyRoute::none(),
        )
        .expect_err("legacy broker");
    assert_eq!(err, ErrorKind::UnsupportedFeature);
}

#[test]
fn group_coordinator_and_describe_groups_bodies() {
    let broker = RecordingBroker::new();
    let engine = engine_with(broker.clone(), TestClock::at(0), EngineConfig::default());

    engine
        .group_coordinator_request("grp", ReplyRoute::none())
        .expect("coordinator");
    engine.list_groups_request(ReplyRoute::none()).expect("list");
    engine
        .describe_groups_request(&["g1".to_string(), "g2".to_string()], ReplyRoute::none())
        .expect("describe");

    let requests = broker.take();
    let body = body_of(&requests[0], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_str().expect("group"), Some("grp"));
    assert_eq!(reader.remaining(), 0);

    assert!(body_of(&requests[1], "franz").is_empty());

    let body = body_of(&requests[2], "franz");
    let mut reader = WireReader::new(&body);
    assert_eq!(reader.read_i32().expect("count"), 2);
    assert_eq!(reader.read_str().expect("g1"), Some("g1"));
    assert_eq!(reader.read_str().expect("g2"), Some("g2"));
}
