#![forbid(unsafe_code)]

pub mod actions;
pub mod admin;
pub mod batch;
pub mod engine;
pub mod envelope;
pub mod hooks;
pub mod metrics;
pub mod requests;
pub mod responses;
pub mod suppress;
pub mod toppar;

pub use actions::{err_action, Actions};
pub use admin::{
    AdminOptions, AlterOp, ConfigEntry, ConfigResource, NewPartitions, NewTopic, ResourceType,
};
pub use batch::{MessageBatch, PendingMessage, TimestampType};
pub use engine::{EngineConfig, ReplyDisposition, RequestEngine};
pub use envelope::{
    BufState, MetadataContext, Reply, ReplyEpoch, ReplyRoute, RequestBuf, RequestFlags,
    ResponseHandler, NO_RETRIES,
};
pub use hooks::{
    BrokerLink, Clock, GroupHook, Hooks, JoinState, MetadataHook, MonotonicClock, NullBroker,
    NullGroupHook, NullMetadataHook, NullPartitionHook, NullThrottleHook, PartitionHook,
    ThrottleHook,
};
pub use metrics::EngineMetrics;
pub use requests::{JoinProtocol, MemberAssignment};
pub use suppress::{FullKind, FullRequestGate};
pub use toppar::{
    OffsetEntry, OffsetList, Toppar, OFFSET_BEGINNING, OFFSET_END, OFFSET_INVALID, OFFSET_STORED,
};
