//! Radio HAL boundary for rilhub.
//!
//! This crate adapts vendor radio callback records into typed domain
//! payloads and correlates them against outstanding requests. It provides:
//!
//! - **`RadioError`** — the externally dictated HAL error enumeration
//! - **Raw record types** matching the fixed vendor callback layout
//! - **Domain payloads** (`IccCardStatus`, `Call`, `SignalStrength`, ...)
//! - **`PendingRequestTable`** — serial-keyed request correlation with
//!   at-most-once completion
//! - **`RadioResponseDecoder`** implementing the per-version handler traits
//!
//! # Trait hierarchy
//!
//! The vendor callback ABI is modeled as one trait per HAL version:
//!
//! - [`RadioResponseHandler`] — the v1 callback surface
//! - [`RadioResponseHandlerV11`] — v1.1 extension (radio capability)
//!
//! Version evolution happens through extension traits, never inheritance
//! chains over a single stub object.

pub mod decode;
pub mod envelope;
pub mod error;
pub mod pending;
pub mod raw;
pub mod types;

pub use decode::{RadioResponseDecoder, RadioResponseHandler, RadioResponseHandlerV11};
pub use envelope::{ResponseEnvelope, ResponseKind};
pub use error::{HalError, RadioError};
pub use pending::{DecodedResponse, PendingRequestTable, RequestKind, ResponsePayload};
