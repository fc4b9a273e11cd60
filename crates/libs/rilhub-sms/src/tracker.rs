//! The outbound SMS tracker.
//!
//! One tracker per phone channel. A message is N correlated parts
//! sharing success/failure aggregation; every part walks
//! submit → radio send → completion on its own, and the message reports
//! one terminal event once the last part lands. Time flows in through
//! the `_at(now_ms)` entry points; the undated wrappers stamp wall time.

use crate::error::SmsError;
use crate::policy::{ShortCodePolicy, ShortCodeVerdict};
use crate::snapshot::{
    FailureReason, MessageId, SmsDeliveryState, SmsEvent, SmsSnapshot,
};
use rilhub_hal::RadioError;
use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// Retry and confirmation tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmsConfig {
    /// Total send attempts per part, first try included.
    pub max_attempts: u32,
    /// Fixed delay between a retryable failure and the next attempt.
    pub retry_delay_ms: u64,
    /// Cap on simultaneously outstanding confirmation prompts.
    pub max_pending_confirmations: usize,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay_ms: 2000, max_pending_confirmations: 4 }
    }
}

/// Retained terminal snapshots; oldest evicted first.
const TERMINAL_HISTORY: usize = 64;

/// One part handed to the host for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundPart {
    pub message_id: MessageId,
    pub part_index: usize,
    /// 1-based attempt number for this part.
    pub attempt: u32,
}

#[derive(Clone, Debug)]
struct PartTracker {
    state: SmsDeliveryState,
    attempts: u32,
    retry_due_ms: Option<u64>,
    /// The pending retry would go over the IMS path and dies with
    /// voice registration.
    ims_retry_pending: bool,
    reason: Option<FailureReason>,
}

impl PartTracker {
    fn new(state: SmsDeliveryState) -> Self {
        Self { state, attempts: 0, retry_due_ms: None, ims_retry_pending: false, reason: None }
    }

    fn fail(&mut self, reason: FailureReason) {
        self.state = SmsDeliveryState::Failed;
        self.retry_due_ms = None;
        self.ims_retry_pending = false;
        self.reason = Some(reason);
    }
}

#[derive(Clone, Debug)]
struct MessageTracker {
    destination: String,
    parts: Vec<PartTracker>,
    last_updated_ms: u64,
}

impl MessageTracker {
    fn state(&self) -> SmsDeliveryState {
        if self.parts.iter().all(|part| part.state == SmsDeliveryState::Sent) {
            return SmsDeliveryState::Sent;
        }
        if self.parts.iter().all(|part| part.state.is_terminal()) {
            return SmsDeliveryState::Failed;
        }
        for candidate in [
            SmsDeliveryState::AwaitingConfirmation,
            SmsDeliveryState::Sending,
            SmsDeliveryState::RetryScheduled,
        ] {
            if self.parts.iter().any(|part| part.state == candidate) {
                return candidate;
            }
        }
        SmsDeliveryState::Queued
    }

    fn failure_reason(&self) -> Option<FailureReason> {
        self.parts.iter().find_map(|part| part.reason)
    }
}

/// Tracks every in-flight outbound SMS on one phone channel.
///
/// Only live messages stay in the map; a message that reaches its
/// terminal state is retired to a bounded snapshot history so the ready
/// scan and memory stay proportional to in-flight work, not to the
/// channel's lifetime.
pub struct SmsOutboundTracker {
    config: SmsConfig,
    policy: Box<dyn ShortCodePolicy>,
    next_id: MessageId,
    messages: BTreeMap<MessageId, MessageTracker>,
    finished: VecDeque<SmsSnapshot>,
    pending_confirmations: VecDeque<MessageId>,
    events: Vec<SmsEvent>,
}

impl SmsOutboundTracker {
    pub fn new(config: SmsConfig, policy: Box<dyn ShortCodePolicy>) -> Self {
        Self {
            config,
            policy,
            next_id: 1,
            messages: BTreeMap::new(),
            finished: VecDeque::new(),
            pending_confirmations: VecDeque::new(),
            events: Vec::new(),
        }
    }

    /// Registers a message of `part_count` parts bound for `destination`
    /// and runs the short-code policy check before anything touches the
    /// radio. Denials are terminal immediately; `AskUser` parks the
    /// message until [`confirm_at`](Self::confirm_at) answers, bounded by
    /// the pending-confirmation cap.
    pub fn submit(&mut self, destination: &str, part_count: usize) -> Result<MessageId, SmsError> {
        self.submit_at(unix_now_ms(), destination, part_count)
    }

    pub fn submit_at(
        &mut self,
        now_ms: u64,
        destination: &str,
        part_count: usize,
    ) -> Result<MessageId, SmsError> {
        if part_count == 0 {
            return Err(SmsError::EmptyMessage);
        }
        let message_id = self.next_id;
        self.next_id += 1;

        let verdict = self.policy.check(destination);
        let initial = match verdict {
            ShortCodeVerdict::Allow => SmsDeliveryState::Queued,
            ShortCodeVerdict::Deny | ShortCodeVerdict::AskUser => {
                SmsDeliveryState::AwaitingConfirmation
            }
        };
        let mut message = MessageTracker {
            destination: destination.to_string(),
            parts: vec![PartTracker::new(initial); part_count],
            last_updated_ms: now_ms,
        };

        match verdict {
            ShortCodeVerdict::Allow => {}
            ShortCodeVerdict::Deny => {
                log::warn!("sms: message {message_id} to {destination} denied by policy");
                for part in &mut message.parts {
                    part.fail(FailureReason::Denied);
                }
            }
            ShortCodeVerdict::AskUser => {
                if self.pending_confirmations.len() >= self.config.max_pending_confirmations {
                    log::warn!(
                        "sms: message {message_id} dropped, {} confirmation prompts outstanding",
                        self.pending_confirmations.len()
                    );
                    for part in &mut message.parts {
                        part.fail(FailureReason::ConfirmationQueueFull);
                    }
                } else {
                    self.pending_confirmations.push_back(message_id);
                    self.events.push(SmsEvent::ConfirmationRequired {
                        message_id,
                        destination: destination.to_string(),
                    });
                }
            }
        }

        self.messages.insert(message_id, message);
        self.report_if_terminal(message_id);
        Ok(message_id)
    }

    /// Answers an outstanding confirmation prompt.
    pub fn confirm(&mut self, message_id: MessageId, approved: bool) -> Result<(), SmsError> {
        self.confirm_at(unix_now_ms(), message_id, approved)
    }

    pub fn confirm_at(
        &mut self,
        now_ms: u64,
        message_id: MessageId,
        approved: bool,
    ) -> Result<(), SmsError> {
        let message = self
            .messages
            .get_mut(&message_id)
            .ok_or(SmsError::UnknownMessage(message_id))?;
        if message.state() != SmsDeliveryState::AwaitingConfirmation {
            return Err(SmsError::NotAwaitingConfirmation(message_id));
        }
        self.pending_confirmations.retain(|pending| *pending != message_id);
        log::info!(
            "sms: message {message_id} to {} {}",
            message.destination,
            if approved { "approved" } else { "declined" }
        );
        message.last_updated_ms = now_ms;
        for part in &mut message.parts {
            if approved {
                part.state = SmsDeliveryState::Queued;
            } else {
                part.fail(FailureReason::UserDeclined);
            }
        }
        self.report_if_terminal(message_id);
        Ok(())
    }

    /// Hands out every part that is due for transmission, marking it
    /// in-flight. The host sends each part over the radio and feeds the
    /// result back through [`handle_send_result_at`](Self::handle_send_result_at).
    pub fn take_ready(&mut self) -> Vec<OutboundPart> {
        self.take_ready_at(unix_now_ms())
    }

    pub fn take_ready_at(&mut self, now_ms: u64) -> Vec<OutboundPart> {
        let mut ready = Vec::new();
        for (message_id, message) in &mut self.messages {
            for (part_index, part) in message.parts.iter_mut().enumerate() {
                let due = match part.state {
                    SmsDeliveryState::Queued => true,
                    SmsDeliveryState::RetryScheduled => {
                        part.retry_due_ms.is_some_and(|due| due <= now_ms)
                    }
                    _ => false,
                };
                if due {
                    part.state = SmsDeliveryState::Sending;
                    part.retry_due_ms = None;
                    part.attempts += 1;
                    message.last_updated_ms = now_ms;
                    ready.push(OutboundPart {
                        message_id: *message_id,
                        part_index,
                        attempt: part.attempts,
                    });
                }
            }
        }
        ready
    }

    /// Completes one in-flight part with the radio's verdict. `via_ims`
    /// marks a part whose retry would ride the IMS path. Results for
    /// parts not in flight are dropped with a log, never fatal.
    pub fn handle_send_result(
        &mut self,
        message_id: MessageId,
        part_index: usize,
        error: RadioError,
        via_ims: bool,
    ) {
        self.handle_send_result_at(unix_now_ms(), message_id, part_index, error, via_ims);
    }

    pub fn handle_send_result_at(
        &mut self,
        now_ms: u64,
        message_id: MessageId,
        part_index: usize,
        error: RadioError,
        via_ims: bool,
    ) {
        let Some(message) = self.messages.get_mut(&message_id) else {
            log::warn!("sms: send result for unknown message {message_id}, dropped");
            return;
        };
        let Some(part) = message.parts.get_mut(part_index) else {
            log::warn!("sms: send result for message {message_id} part {part_index} out of range");
            return;
        };
        if part.state != SmsDeliveryState::Sending {
            log::warn!(
                "sms: send result for message {message_id} part {part_index} not in flight, dropped"
            );
            return;
        }
        message.last_updated_ms = now_ms;

        if error.is_success() {
            part.state = SmsDeliveryState::Sent;
            part.reason = None;
        } else if error.is_sms_retryable() {
            if part.attempts < self.config.max_attempts {
                part.state = SmsDeliveryState::RetryScheduled;
                part.retry_due_ms = Some(now_ms + self.config.retry_delay_ms);
                part.ims_retry_pending = via_ims;
                log::debug!(
                    "sms: message {message_id} part {part_index} retry {} of {} in {} ms",
                    part.attempts + 1,
                    self.config.max_attempts,
                    self.config.retry_delay_ms
                );
            } else {
                part.fail(FailureReason::RetriesExhausted);
            }
        } else {
            part.fail(FailureReason::Radio(error.as_u32()));
        }
        self.report_if_terminal(message_id);
    }

    /// Voice registration dropped: any pending IMS-path retry can no
    /// longer succeed and converts to terminal failure.
    pub fn voice_service_lost(&mut self) {
        self.voice_service_lost_at(unix_now_ms());
    }

    pub fn voice_service_lost_at(&mut self, now_ms: u64) {
        let affected: Vec<MessageId> = self
            .messages
            .iter_mut()
            .filter_map(|(message_id, message)| {
                let mut hit = false;
                for part in &mut message.parts {
                    if part.state == SmsDeliveryState::RetryScheduled && part.ims_retry_pending {
                        part.fail(FailureReason::ImsRetryAbandoned);
                        hit = true;
                    }
                }
                if hit {
                    message.last_updated_ms = now_ms;
                    Some(*message_id)
                } else {
                    None
                }
            })
            .collect();
        for message_id in affected {
            log::info!("sms: message {message_id} abandoned, voice service lost during IMS retry");
            self.report_if_terminal(message_id);
        }
    }

    /// Live messages first, then the retained terminal history.
    pub fn snapshot(&self, message_id: MessageId) -> Option<SmsSnapshot> {
        if let Some(message) = self.messages.get(&message_id) {
            return Some(snapshot_of(message_id, message));
        }
        self.finished
            .iter()
            .rev()
            .find(|snapshot| snapshot.message_id == message_id)
            .cloned()
    }

    /// Messages still being worked; retired terminal messages excluded.
    pub fn in_flight(&self) -> usize {
        self.messages.len()
    }

    pub fn pending_confirmations(&self) -> usize {
        self.pending_confirmations.len()
    }

    /// Hands accumulated events to the host, clearing the buffer.
    pub fn drain_events(&mut self) -> Vec<SmsEvent> {
        std::mem::take(&mut self.events)
    }

    /// Emits the one terminal event per message, the first time every
    /// part has landed, and retires the tracker to the bounded history.
    fn report_if_terminal(&mut self, message_id: MessageId) {
        let Some(message) = self.messages.get(&message_id) else { return };
        match message.state() {
            SmsDeliveryState::Sent => {
                self.events.push(SmsEvent::MessageSent { message_id });
            }
            SmsDeliveryState::Failed => {
                let reason = message.failure_reason().unwrap_or(FailureReason::RetriesExhausted);
                self.events.push(SmsEvent::MessageFailed { message_id, reason });
            }
            _ => return,
        }
        if let Some(message) = self.messages.remove(&message_id) {
            self.finished.push_back(snapshot_of(message_id, &message));
            if self.finished.len() > TERMINAL_HISTORY {
                self.finished.pop_front();
            }
        }
    }
}

fn snapshot_of(message_id: MessageId, message: &MessageTracker) -> SmsSnapshot {
    let state = message.state();
    SmsSnapshot {
        message_id,
        state,
        terminal: state.is_terminal(),
        attempts: message.parts.iter().map(|part| part.attempts).sum(),
        parts: message.parts.len(),
        parts_sent: message
            .parts
            .iter()
            .filter(|part| part.state == SmsDeliveryState::Sent)
            .count(),
        parts_failed: message
            .parts
            .iter()
            .filter(|part| part.state == SmsDeliveryState::Failed)
            .count(),
        last_updated_ms: message.last_updated_ms,
        reason: message.failure_reason(),
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
