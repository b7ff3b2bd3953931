#![forbid(unsafe_code)]

/// Topic creation input for CreateTopics.
///
/// When `replica_assignment` is non-empty, `num_partitions` and
/// `replication_factor` are encoded as -1: the broker derives both from the
/// assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub topic: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    /// Per partition, the broker ids hosting a replica.
    pub replica_assignment: Vec<Vec<i32>>,
    /// `(name, value)` topic config entries; a null value clears the entry.
    pub config: Vec<(String, Option<String>)>,
}

impl NewTopic {
    pub fn new(topic: impl Into<String>, num_partitions: i32, replication_factor: i16) -> Self {
        Self {
            topic: topic.into(),
            num_partitions,
            replication_factor,
            replica_assignment: Vec::new(),
            config: Vec::new(),
        }
    }
}

/// Partition-count increase input for CreatePartitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPartitions {
    pub topic: String,
    /// Desired total partition count, not a delta.
    pub total_count: i32,
    /// Replica assignment for the new partitions only.
    pub replica_assignment: Vec<Vec<i32>>,
}

impl NewPartitions {
    pub fn new(topic: impl Into<String>, total_count: i32) -> Self {
        Self {
            topic: topic.into(),
            total_count,
            replica_assignment: Vec::new(),
        }
    }
}

/// Kafka config resource type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ResourceType {
    Unknown = 0,
    Topic = 2,
    Broker = 4,
}

impl ResourceType {
    pub const fn code(self) -> i8 {
        self as i8
    }
}

/// How an AlterConfigs entry modifies the existing config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlterOp {
    #[default]
    Set,
    Delete,
    Append,
    Subtract,
}

impl AlterOp {
    pub const fn code(self) -> i8 {
        match self {
            Self::Set => 0,
            Self::Delete => 1,
            Self::Append => 2,
            Self::Subtract => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub value: Option<String>,
    pub op: AlterOp,
}

impl ConfigEntry {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            op: AlterOp::Set,
        }
    }

    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            op: AlterOp::Set,
        }
    }
}

/// One config resource for AlterConfigs / DescribeConfigs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigResource {
    pub resource_type: ResourceType,
    pub name: String,
    pub entries: Vec<ConfigEntry>,
}

impl ConfigResource {
    pub fn new(resource_type: ResourceType, name: impl Into<String>) -> Self {
        Self {
            resource_type,
            name: name.into(),
            entries: Vec::new(),
        }
    }
}

/// Options shared by the admin requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminOptions {
    /// Broker-side operation timeout, encoded in the request tail.
    pub operation_timeout_ms: i32,
    pub validate_only: bool,
    /// Incremental AlterConfigs; requires a broker new enough to advertise
    /// AlterConfigs v1.
    pub incremental: bool,
}

impl Default for AdminOptions {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 0,
            validate_only: false,
            incremental: false,
        }
    }
}
