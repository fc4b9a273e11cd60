use crate::error::RadioError;
use serde::Serialize;

/// How a response was delivered by the vendor HAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Solicited,
    SolicitedAck,
    SolicitedAckExpected,
    Unsolicited,
}

impl ResponseKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Solicited,
            1 => Self::SolicitedAck,
            2 => Self::SolicitedAckExpected,
            _ => Self::Unsolicited,
        }
    }
}

/// Identifies which outstanding request a response completes.
///
/// At most one outstanding request exists per serial value at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResponseEnvelope {
    pub serial: u32,
    pub error: RadioError,
    pub kind: ResponseKind,
}

impl ResponseEnvelope {
    pub fn solicited(serial: u32, error: RadioError) -> Self {
        Self { serial, error, kind: ResponseKind::Solicited }
    }
}
