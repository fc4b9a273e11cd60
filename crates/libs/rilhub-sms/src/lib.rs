//! Outbound SMS tracking for rilhub.
//!
//! One [`SmsOutboundTracker`] per phone channel walks every outbound
//! message (multipart messages as correlated per-part trackers) through
//! submit, policy gating, radio send, and retry, and surfaces one
//! terminal event per message. The tracker never touches the radio
//! itself; the host pulls ready parts, transmits them, and feeds radio
//! verdicts back.

pub mod error;
pub mod policy;
pub mod snapshot;
pub mod tracker;

pub use error::SmsError;
pub use policy::{AllowAllPolicy, ShortCodePolicy, ShortCodeVerdict};
pub use snapshot::{FailureReason, MessageId, SmsDeliveryState, SmsEvent, SmsSnapshot};
pub use tracker::{OutboundPart, SmsConfig, SmsOutboundTracker};
