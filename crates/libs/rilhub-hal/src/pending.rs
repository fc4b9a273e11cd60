use crate::error::{HalError, RadioError};
use crate::types::{
    Call, CdmaBroadcastConfigEntry, DataCall, IccCardStatus, RadioCapability, SendSmsResult,
    SignalStrength,
};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// What an outstanding request is waiting for. Used to sanity-check that
/// a response payload matches the request it completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    IccCardStatus,
    CurrentCalls,
    SignalStrength,
    SetupDataCall,
    CdmaBroadcastConfig,
    RadioCapability,
    SendSms,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    None,
    IccCardStatus(IccCardStatus),
    Calls(Vec<Call>),
    SignalStrength(SignalStrength),
    DataCall(DataCall),
    CdmaBroadcastConfig(Vec<CdmaBroadcastConfigEntry>),
    RadioCapability(RadioCapability),
    SendSms(SendSmsResult),
}

/// A completed response as delivered to the original caller. The failure
/// path carries `ResponsePayload::None` plus the raw error; callers are
/// always unblocked either way.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedResponse {
    pub serial: u32,
    pub error: RadioError,
    pub payload: ResponsePayload,
}

pub struct PendingRequest {
    kind: RequestKind,
    responder: oneshot::Sender<DecodedResponse>,
}

impl PendingRequest {
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Hands the response to the registered continuation. A caller that
    /// went away is not an error; the response is dropped with a log.
    pub fn deliver(self, response: DecodedResponse) {
        let serial = response.serial;
        if self.responder.send(response).is_err() {
            log::debug!("hal: response for serial {serial} dropped, caller gone");
        }
    }
}

/// Outstanding-request table keyed by serial.
///
/// Completion is at-most-once: completing an unregistered or already
/// completed serial is a protocol anomaly, logged and counted, never
/// fatal.
#[derive(Default)]
pub struct PendingRequestTable {
    entries: HashMap<u32, PendingRequest>,
    anomalies: u64,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        serial: u32,
        kind: RequestKind,
    ) -> Result<oneshot::Receiver<DecodedResponse>, HalError> {
        if self.entries.contains_key(&serial) {
            return Err(HalError::DuplicateSerial(serial));
        }
        let (responder, receiver) = oneshot::channel();
        self.entries.insert(serial, PendingRequest { kind, responder });
        Ok(receiver)
    }

    pub fn complete(&mut self, serial: u32) -> Option<PendingRequest> {
        let pending = self.entries.remove(&serial);
        if pending.is_none() {
            self.anomalies += 1;
            log::warn!("hal: response for serial {serial} matches no outstanding request");
        }
        pending
    }

    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomalies
    }
}
