#![forbid(unsafe_code)]

use crate::toppar::OFFSET_INVALID;

/// Where a message's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampType {
    NotAvailable,
    CreateTime,
    LogAppendTime,
}

/// Producer-side bookkeeping for one message riding on a Produce request.
/// The payload itself lives in the externally built record set; the engine
/// only needs the delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Absolute expiry, monotonic milliseconds.
    pub timeout_at_ms: u64,
    pub offset: i64,
    pub timestamp_ms: i64,
    pub timestamp_type: TimestampType,
}

impl PendingMessage {
    pub fn new(timeout_at_ms: u64) -> Self {
        Self {
            timeout_at_ms,
            offset: OFFSET_INVALID,
            timestamp_ms: -1,
            timestamp_type: TimestampType::NotAvailable,
        }
    }
}

/// The message-set tail carried by a Produce envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBatch {
    messages: Vec<PendingMessage>,
}

impl MessageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<PendingMessage>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: PendingMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[PendingMessage] {
        &self.messages
    }

    /// Expiry of the oldest message; requests derive their deadline from it.
    pub fn first_timeout_at_ms(&self) -> Option<u64> {
        self.messages.first().map(|m| m.timeout_at_ms)
    }

    /// Propagate the broker-assigned base offset into the batch.
    ///
    /// With `per_message` every message gets `base_offset + i`; otherwise
    /// only the tail message is stamped, with `base_offset + len - 1`.
    /// A non-negative `log_append_ts` is applied to every stamped message.
    pub fn assign_offsets(&mut self, base_offset: i64, per_message: bool, log_append_ts: i64) {
        if self.messages.is_empty() {
            return;
        }
        if per_message {
            for (i, message) in self.messages.iter_mut().enumerate() {
                message.offset = base_offset + i as i64;
                if log_append_ts != -1 {
                    message.timestamp_ms = log_append_ts;
                    message.timestamp_type = TimestampType::LogAppendTime;
                }
            }
        } else {
            let count = self.messages.len() as i64;
            if let Some(tail) = self.messages.last_mut() {
                tail.offset = base_offset + count - 1;
                if log_append_ts != -1 {
                    tail.timestamp_ms = log_append_ts;
                    tail.timestamp_type = TimestampType::LogAppendTime;
                }
            }
        }
    }
}
