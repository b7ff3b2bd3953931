#![forbid(unsafe_code)]

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Client-local error codes occupy the negative range below -100 so they can
/// never collide with codes assigned by the broker.
const CODE_BAD_MSG: i16 = -199;
const CODE_DESTROY: i16 = -197;
const CODE_FAIL: i16 = -196;
const CODE_TRANSPORT: i16 = -195;
const CODE_MSG_TIMED_OUT: i16 = -192;
const CODE_INVALID_ARG: i16 = -186;
const CODE_TIMED_OUT: i16 = -185;
const CODE_WAIT_COORD: i16 = -180;
const CODE_IN_PROGRESS: i16 = -178;
const CODE_PREV_IN_PROGRESS: i16 = -177;
const CODE_OUTDATED: i16 = -167;
const CODE_TIMED_OUT_QUEUE: i16 = -166;
const CODE_UNSUPPORTED_FEATURE: i16 = -165;
const CODE_PARTIAL: i16 = -158;

/// An error condition, either produced locally by the client or reported by
/// the broker as a wire error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Local conditions.
    /// Reply could not be parsed; the broker sent something malformed.
    BadMsg,
    /// The owning handle is being torn down.
    Destroy,
    Fail,
    /// Broker connection went down.
    Transport,
    /// Message-level timeout, surfaced to producers in place of the
    /// request-level timeout codes.
    MsgTimedOut,
    InvalidArg,
    /// Request timed out while still waiting in the transmit queue.
    TimedOut,
    /// Waiting for the group coordinator to become known.
    WaitCoord,
    /// The request was re-enqueued for retry; no terminal result yet.
    InProgress,
    /// An identical request is already in transit.
    PrevInProgress,
    Outdated,
    /// Request was sent but no reply arrived before the deadline.
    TimedOutQueue,
    /// The broker does not support the requested API or API version.
    UnsupportedFeature,
    /// Only part of the reply could be used.
    Partial,

    // Broker-reported conditions.
    NoError,
    UnknownServerError,
    OffsetOutOfRange,
    InvalidMsg,
    UnknownTopicOrPart,
    InvalidMsgSize,
    LeaderNotAvailable,
    NotLeaderForPartition,
    RequestTimedOut,
    BrokerNotAvailable,
    ReplicaNotAvailable,
    MsgSizeTooLarge,
    StaleCtrlEpoch,
    OffsetMetadataTooLarge,
    NetworkException,
    GroupLoadInProgress,
    GroupCoordinatorNotAvailable,
    NotCoordinatorForGroup,
    TopicException,
    RecordListTooLarge,
    NotEnoughReplicas,
    NotEnoughReplicasAfterAppend,
    InvalidRequiredAcks,
    IllegalGeneration,
    InconsistentGroupProtocol,
    InvalidGroupId,
    UnknownMemberId,
    InvalidSessionTimeout,
    RebalanceInProgress,
    InvalidCommitOffsetSize,
    TopicAuthorizationFailed,
    GroupAuthorizationFailed,
    ClusterAuthorizationFailed,
    InvalidTimestamp,
    UnsupportedSaslMechanism,
    IllegalSaslState,
    UnsupportedVersion,
    /// A broker code this client has no mapping for.
    Unknown(i16),
}

impl ErrorKind {
    /// Map a broker wire error code to an `ErrorKind`. Unmapped codes are
    /// preserved in `Unknown` rather than dropped.
    pub fn from_wire(code: i16) -> Self {
        match code {
            0 => Self::NoError,
            -1 => Self::UnknownServerError,
            1 => Self::OffsetOutOfRange,
            2 => Self::InvalidMsg,
            3 => Self::UnknownTopicOrPart,
            4 => Self::InvalidMsgSize,
            5 => Self::LeaderNotAvailable,
            6 => Self::NotLeaderForPartition,
            7 => Self::RequestTimedOut,
            8 => Self::BrokerNotAvailable,
            9 => Self::ReplicaNotAvailable,
            10 => Self::MsgSizeTooLarge,
            11 => Self::StaleCtrlEpoch,
            12 => Self::OffsetMetadataTooLarge,
            13 => Self::NetworkException,
            14 => Self::GroupLoadInProgress,
            15 => Self::GroupCoordinatorNotAvailable,
            16 => Self::NotCoordinatorForGroup,
            17 => Self::TopicException,
            18 => Self::RecordListTooLarge,
            19 => Self::NotEnoughReplicas,
            20 => Self::NotEnoughReplicasAfterAppend,
            21 => Self::InvalidRequiredAcks,
            22 => Self::IllegalGeneration,
            23 => Self::InconsistentGroupProtocol,
            24 => Self::InvalidGroupId,
            25 => Self::UnknownMemberId,
            26 => Self::InvalidSessionTimeout,
            27 => Self::RebalanceInProgress,
            28 => Self::InvalidCommitOffsetSize,
            29 => Self::TopicAuthorizationFailed,
            30 => Self::GroupAuthorizationFailed,
            31 => Self::ClusterAuthorizationFailed,
            32 => Self::InvalidTimestamp,
            33 => Self::UnsupportedSaslMechanism,
            34 => Self::IllegalSaslState,
            35 => Self::UnsupportedVersion,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::BadMsg => CODE_BAD_MSG,
            Self::Destroy => CODE_DESTROY,
            Self::Fail => CODE_FAIL,
            Self::Transport => CODE_TRANSPORT,
            Self::MsgTimedOut => CODE_MSG_TIMED_OUT,
            Self::InvalidArg => CODE_INVALID_ARG,
            Self::TimedOut => CODE_TIMED_OUT,
            Self::WaitCoord => CODE_WAIT_COORD,
            Self::InProgress => CODE_IN_PROGRESS,
            Self::PrevInProgress => CODE_PREV_IN_PROGRESS,
            Self::Outdated => CODE_OUTDATED,
            Self::TimedOutQueue => CODE_TIMED_OUT_QUEUE,
            Self::UnsupportedFeature => CODE_UNSUPPORTED_FEATURE,
            Self::Partial => CODE_PARTIAL,
            Self::NoError => 0,
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::InvalidMsg => 2,
            Self::UnknownTopicOrPart => 3,
            Self::InvalidMsgSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderForPartition => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MsgSizeTooLarge => 10,
            Self::StaleCtrlEpoch => 11,
            Self::OffsetMetadataTooLarge => 12,
            Self::NetworkException => 13,
            Self::GroupLoadInProgress => 14,
            Self::GroupCoordinatorNotAvailable => 15,
            Self::NotCoordinatorForGroup => 16,
            Self::TopicException => 17,
            Self::RecordListTooLarge => 18,
            Self::NotEnoughReplicas => 19,
            Self::NotEnoughReplicasAfterAppend => 20,
            Self::InvalidRequiredAcks => 21,
            Self::IllegalGeneration => 22,
            Self::InconsistentGroupProtocol => 23,
            Self::InvalidGroupId => 24,
            Self::UnknownMemberId => 25,
            Self::InvalidSessionTimeout => 26,
            Self::RebalanceInProgress => 27,
            Self::InvalidCommitOffsetSize => 28,
            Self::TopicAuthorizationFailed => 29,
            Self::GroupAuthorizationFailed => 30,
            Self::ClusterAuthorizationFailed => 31,
            Self::InvalidTimestamp => 32,
            Self::UnsupportedSaslMechanism => 33,
            Self::IllegalSaslState => 34,
            Self::UnsupportedVersion => 35,
            Self::Unknown(code) => code,
        }
    }

    /// True for conditions produced by this client rather than the broker.
    pub fn is_local(self) -> bool {
        self.code() <= -100
    }

    pub fn is_error(self) -> bool {
        self != Self::NoError
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::BadMsg => "BadMsg",
            Self::Destroy => "Destroy",
            Self::Fail => "Fail",
            Self::Transport => "Transport",
            Self::MsgTimedOut => "MsgTimedOut",
            Self::InvalidArg => "InvalidArg",
            Self::TimedOut => "TimedOut",
            Self::WaitCoord => "WaitCoord",
            Self::InProgress => "InProgress",
            Self::PrevInProgress => "PrevInProgress",
            Self::Outdated => "Outdated",
            Self::TimedOutQueue => "TimedOutQueue",
            Self::UnsupportedFeature => "UnsupportedFeature",
            Self::Partial => "Partial",
            Self::NoError => "NoError",
            Self::UnknownServerError => "UnknownServerError",
            Self::OffsetOutOfRange => "OffsetOutOfRange",
            Self::InvalidMsg => "InvalidMsg",
            Self::UnknownTopicOrPart => "UnknownTopicOrPartition",
            Self::InvalidMsgSize => "InvalidMsgSize",
            Self::LeaderNotAvailable => "LeaderNotAvailable",
            Self::NotLeaderForPartition => "NotLeaderForPartition",
            Self::RequestTimedOut => "RequestTimedOut",
            Self::BrokerNotAvailable => "BrokerNotAvailable",
            Self::ReplicaNotAvailable => "ReplicaNotAvailable",
            Self::MsgSizeTooLarge => "MessageSizeTooLarge",
            Self::StaleCtrlEpoch => "StaleControllerEpoch",
            Self::OffsetMetadataTooLarge => "OffsetMetadataTooLarge",
            Self::NetworkException => "NetworkException",
            Self::GroupLoadInProgress => "GroupLoadInProgress",
            Self::GroupCoordinatorNotAvailable => "GroupCoordinatorNotAvailable",
            Self::NotCoordinatorForGroup => "NotCoordinatorForGroup",
            Self::TopicException => "InvalidTopic",
            Self::RecordListTooLarge => "RecordListTooLarge",
            Self::NotEnoughReplicas => "NotEnoughReplicas",
            Self::NotEnoughReplicasAfterAppend => "NotEnoughReplicasAfterAppend",
            Self::InvalidRequiredAcks => "InvalidRequiredAcks",
            Self::IllegalGeneration => "IllegalGeneration",
            Self::InconsistentGroupProtocol => "InconsistentGroupProtocol",
            Self::InvalidGroupId => "InvalidGroupId",
            Self::UnknownMemberId => "UnknownMemberId",
            Self::InvalidSessionTimeout => "InvalidSessionTimeout",
            Self::RebalanceInProgress => "RebalanceInProgress",
            Self::InvalidCommitOffsetSize => "InvalidCommitOffsetSize",
            Self::TopicAuthorizationFailed => "TopicAuthorizationFailed",
            Self::GroupAuthorizationFailed => "GroupAuthorizationFailed",
            Self::ClusterAuthorizationFailed => "ClusterAuthorizationFailed",
            Self::InvalidTimestamp => "InvalidTimestamp",
            Self::UnsupportedSaslMechanism => "UnsupportedSaslMechanism",
            Self::IllegalSaslState => "IllegalSaslState",
            Self::UnsupportedVersion => "UnsupportedVersion",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code})"),
            other => f.write_str(other.name()),
        }
    }
}

impl Error for ErrorKind {}
