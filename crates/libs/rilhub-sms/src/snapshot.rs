use serde::Serialize;

pub type MessageId = u64;

/// Per-message delivery state as seen from outside the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SmsDeliveryState {
    Queued,
    AwaitingConfirmation,
    Sending,
    RetryScheduled,
    Sent,
    Failed,
}

impl SmsDeliveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// Why a message reached `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureReason {
    /// The radio reported a non-retryable error, or retries ran out.
    Radio(u32),
    RetriesExhausted,
    /// Premium destination denied by policy.
    Denied,
    /// The user answered the confirmation prompt with no.
    UserDeclined,
    /// Too many confirmation prompts already outstanding.
    ConfirmationQueueFull,
    /// An IMS-path retry was pending when voice service dropped.
    ImsRetryAbandoned,
}

/// Point-in-time view of one outbound message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub struct SmsSnapshot {
    pub message_id: MessageId,
    pub state: SmsDeliveryState,
    pub terminal: bool,
    /// Send attempts across all parts.
    pub attempts: u32,
    pub parts: usize,
    pub parts_sent: usize,
    pub parts_failed: usize,
    pub last_updated_ms: u64,
    pub reason: Option<FailureReason>,
}

/// Terminal and prompt events, drained by the host loop.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SmsEvent {
    ConfirmationRequired { message_id: MessageId, destination: String },
    MessageSent { message_id: MessageId },
    MessageFailed { message_id: MessageId, reason: FailureReason },
}
