use crate::envelope::ResponseEnvelope;
use crate::error::{HalError, RadioError};
use crate::pending::{DecodedResponse, PendingRequestTable, RequestKind, ResponsePayload};
use crate::raw::{
    RawCall, RawCdmaBroadcastConfigEntry, RawDataCall, RawIccCardStatus, RawRadioCapability,
    RawSendSmsResult, RawSignalStrength,
};
use crate::types::{
    default_cdma_broadcast_config, Call, CdmaBroadcastConfigEntry, DataCall, IccCardStatus,
    RadioCapability, SendSmsResult, SignalStrength,
};
use tokio::sync::oneshot;

/// The v1 vendor callback surface. One method per response record type;
/// every method signature mirrors the dictated ABI.
pub trait RadioResponseHandler {
    fn icc_card_status_response(&mut self, envelope: ResponseEnvelope, status: RawIccCardStatus);
    fn current_calls_response(&mut self, envelope: ResponseEnvelope, calls: Vec<RawCall>);
    fn signal_strength_response(&mut self, envelope: ResponseEnvelope, strength: RawSignalStrength);
    fn setup_data_call_response(&mut self, envelope: ResponseEnvelope, call: RawDataCall);
    fn cdma_broadcast_config_response(
        &mut self,
        envelope: ResponseEnvelope,
        entries: Vec<RawCdmaBroadcastConfigEntry>,
    );
    fn send_sms_response(&mut self, envelope: ResponseEnvelope, result: RawSendSmsResult);
    fn acknowledge_request(&mut self, serial: u32);
}

/// v1.1 extension surface.
pub trait RadioResponseHandlerV11: RadioResponseHandler {
    fn radio_capability_response(&mut self, envelope: ResponseEnvelope, capability: RawRadioCapability);
}

/// Converts vendor callback records into typed payloads and completes the
/// outstanding request for the envelope's serial. The request slot is
/// always released, error or not; the failure path unblocks the caller
/// with the raw error and an empty payload.
#[derive(Default)]
pub struct RadioResponseDecoder {
    pending: PendingRequestTable,
}

impl RadioResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_request(
        &mut self,
        serial: u32,
        kind: RequestKind,
    ) -> Result<oneshot::Receiver<DecodedResponse>, HalError> {
        self.pending.register(serial, kind)
    }

    pub fn outstanding(&self) -> usize {
        self.pending.outstanding()
    }

    pub fn anomaly_count(&self) -> u64 {
        self.pending.anomaly_count()
    }

    fn finish<F>(&mut self, envelope: ResponseEnvelope, expected: RequestKind, decode: F)
    where
        F: FnOnce() -> ResponsePayload,
    {
        let Some(pending) = self.pending.complete(envelope.serial) else {
            return;
        };
        if pending.kind() != expected {
            log::warn!(
                "hal: serial {} expected {:?} response, got {:?}",
                envelope.serial,
                pending.kind(),
                expected
            );
        }
        let payload = if envelope.error.is_success() {
            decode()
        } else {
            ResponsePayload::None
        };
        pending.deliver(DecodedResponse { serial: envelope.serial, error: envelope.error, payload });
    }
}

impl RadioResponseHandler for RadioResponseDecoder {
    fn icc_card_status_response(&mut self, envelope: ResponseEnvelope, status: RawIccCardStatus) {
        self.finish(envelope, RequestKind::IccCardStatus, || {
            ResponsePayload::IccCardStatus(IccCardStatus::from_raw(&status))
        });
    }

    fn current_calls_response(&mut self, envelope: ResponseEnvelope, calls: Vec<RawCall>) {
        self.finish(envelope, RequestKind::CurrentCalls, || {
            ResponsePayload::Calls(calls.iter().map(Call::from_raw).collect())
        });
    }

    fn signal_strength_response(&mut self, envelope: ResponseEnvelope, strength: RawSignalStrength) {
        self.finish(envelope, RequestKind::SignalStrength, || {
            ResponsePayload::SignalStrength(SignalStrength::from_raw(&strength))
        });
    }

    fn setup_data_call_response(&mut self, envelope: ResponseEnvelope, call: RawDataCall) {
        self.finish(envelope, RequestKind::SetupDataCall, || {
            ResponsePayload::DataCall(DataCall::from_raw(&call))
        });
    }

    fn cdma_broadcast_config_response(
        &mut self,
        envelope: ResponseEnvelope,
        entries: Vec<RawCdmaBroadcastConfigEntry>,
    ) {
        // An empty table is replaced with the synthesized default and the
        // error forced to None; consumers assume a fully populated table.
        let envelope = if entries.is_empty() {
            ResponseEnvelope { error: RadioError::None, ..envelope }
        } else {
            envelope
        };
        self.finish(envelope, RequestKind::CdmaBroadcastConfig, || {
            if entries.is_empty() {
                ResponsePayload::CdmaBroadcastConfig(default_cdma_broadcast_config())
            } else {
                ResponsePayload::CdmaBroadcastConfig(
                    entries.iter().map(CdmaBroadcastConfigEntry::from_raw).collect(),
                )
            }
        });
    }

    fn send_sms_response(&mut self, envelope: ResponseEnvelope, result: RawSendSmsResult) {
        self.finish(envelope, RequestKind::SendSms, || {
            ResponsePayload::SendSms(SendSmsResult::from_raw(&result))
        });
    }

    fn acknowledge_request(&mut self, serial: u32) {
        log::debug!("hal: ack for serial {serial}");
    }
}

impl RadioResponseHandlerV11 for RadioResponseDecoder {
    fn radio_capability_response(&mut self, envelope: ResponseEnvelope, capability: RawRadioCapability) {
        // Modems without capability support get a synthesized static
        // capability and a forced success; consumers never see the
        // unsupported error.
        let unsupported = envelope.error == RadioError::RequestNotSupported;
        let envelope = if unsupported {
            ResponseEnvelope { error: RadioError::None, ..envelope }
        } else {
            envelope
        };
        self.finish(envelope, RequestKind::RadioCapability, || {
            if unsupported {
                ResponsePayload::RadioCapability(RadioCapability::static_fallback())
            } else {
                ResponsePayload::RadioCapability(RadioCapability::from_raw(&capability))
            }
        });
    }
}
