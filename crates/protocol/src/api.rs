#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

/// Kafka API keys for the requests this client builds. Discriminants are the
/// on-wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKey {
    Produce = 0,
    Offsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    DescribeGroups = 15,
    ListGroups = 16,
    SaslHandshake = 17,
    ApiVersions = 18,
    CreateTopics = 19,
    DeleteTopics = 20,
    DescribeConfigs = 32,
    AlterConfigs = 33,
    CreatePartitions = 37,
}

impl ApiKey {
    pub const fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        let key = match code {
            0 => Self::Produce,
            2 => Self::Offsets,
            3 => Self::Metadata,
            8 => Self::OffsetCommit,
            9 => Self::OffsetFetch,
            10 => Self::GroupCoordinator,
            11 => Self::JoinGroup,
            12 => Self::Heartbeat,
            13 => Self::LeaveGroup,
            14 => Self::SyncGroup,
            15 => Self::DescribeGroups,
            16 => Self::ListGroups,
            17 => Self::SaslHandshake,
            18 => Self::ApiVersions,
            19 => Self::CreateTopics,
            20 => Self::DeleteTopics,
            32 => Self::DescribeConfigs,
            33 => Self::AlterConfigs,
            37 => Self::CreatePartitions,
            _ => return None,
        };
        Some(key)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Produce => "Produce",
            Self::Offsets => "Offsets",
            Self::Metadata => "Metadata",
            Self::OffsetCommit => "OffsetCommit",
            Self::OffsetFetch => "OffsetFetch",
            Self::GroupCoordinator => "GroupCoordinator",
            Self::JoinGroup => "JoinGroup",
            Self::Heartbeat => "Heartbeat",
            Self::LeaveGroup => "LeaveGroup",
            Self::SyncGroup => "SyncGroup",
            Self::DescribeGroups => "DescribeGroups",
            Self::ListGroups => "ListGroups",
            Self::SaslHandshake => "SaslHandshake",
            Self::ApiVersions => "ApiVersions",
            Self::CreateTopics => "CreateTopics",
            Self::DeleteTopics => "DeleteTopics",
            Self::DescribeConfigs => "DescribeConfigs",
            Self::AlterConfigs => "AlterConfigs",
            Self::CreatePartitions => "CreatePartitions",
        }
    }
}

impl Display for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive version interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: i16,
    pub max: i16,
}

impl VersionRange {
    pub const fn new(min: i16, max: i16) -> Self {
        Self { min, max }
    }

    pub const fn single(version: i16) -> Self {
        Self {
            min: version,
            max: version,
        }
    }

    pub const fn contains(self, version: i16) -> bool {
        self.min <= version && version <= self.max
    }
}

/// Feature bits derived from the negotiated API version.
pub mod features {
    /// Offsets requests address by timestamp rather than logical position.
    pub const OFFSET_TIME: u32 = 1 << 0;
    /// Produce replies carry a throttle-time field.
    pub const THROTTLE_TIME: u32 = 1 << 1;
    /// Produce replies carry the broker-assigned log-append timestamp.
    pub const LOG_APPEND_TIME: u32 = 1 << 2;
}

/// Feature bits unlocked by using `version` of `key`.
pub fn features_for(key: ApiKey, version: i16) -> u32 {
    let mut bits = 0;
    match key {
        ApiKey::Offsets if version >= 1 => bits |= features::OFFSET_TIME,
        ApiKey::Produce => {
            if version >= 1 {
                bits |= features::THROTTLE_TIME;
            }
            if version >= 2 {
                bits |= features::LOG_APPEND_TIME;
            }
        }
        _ => {}
    }
    bits
}

/// One advertised `(api key, min, max)` row from an ApiVersions reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSupport {
    pub api_key: i16,
    pub min: i16,
    pub max: i16,
}

/// The broker's advertised API support, sorted by api key for binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiVersionTable {
    entries: Vec<ApiSupport>,
}

impl ApiVersionTable {
    pub fn from_entries(mut entries: Vec<ApiSupport>) -> Self {
        entries.sort_by_key(|entry| entry.api_key);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ApiSupport] {
        &self.entries
    }

    pub fn lookup(&self, key: ApiKey) -> Option<VersionRange> {
        self.entries
            .binary_search_by_key(&key.code(), |entry| entry.api_key)
            .ok()
            .map(|idx| VersionRange::new(self.entries[idx].min, self.entries[idx].max))
    }

    /// Select the highest version satisfying both the caller's range and the
    /// broker's advertised range, together with the feature bits that
    /// version unlocks. `None` when the ranges do not overlap or the API is
    /// not advertised at all.
    pub fn pick(&self, key: ApiKey, requested: VersionRange) -> Option<(i16, u32)> {
        let broker = self.lookup(key)?;
        let version = requested.max.min(broker.max);
        if version < requested.min || version < broker.min {
            return None;
        }
        Some((version, features_for(key, version)))
    }
}
