//! The per-phone dispatcher loop.
//!
//! One loop owns every piece of mutable telephony state for one radio
//! channel: the response decoder, the slot reconciler, the subscription
//! store handle, the default arbiter, and the SMS tracker.
//! Cross-component calls are
//! queued [`PhoneCommand`]s consumed in strict arrival order, so nothing
//! here takes a lock. The only blocking work, the eUICC profile fetch,
//! runs on the blocking pool and posts its result back as a command.

use crate::config::DaemonConfig;
use rilhub_hal::raw::RawIccCardStatus;
use rilhub_hal::types::{AppState, CardState as HalCardState, IccCardStatus};
use rilhub_hal::{
    DecodedResponse, RadioError, RadioResponseDecoder, RadioResponseHandler, RequestKind,
    ResponseEnvelope, ResponsePayload,
};
use rilhub_sms::{
    MessageId, OutboundPart, ShortCodePolicy, SmsError, SmsEvent, SmsOutboundTracker,
};
use rilhub_subs::{
    apply_profiles, ActiveSubscription, CarrierConfigNotifier, DefaultSubscriptionArbiter,
    EmbeddedProfile, EuiccBackend, SelectionAxis, SimSlotReconciler, SlotEvent, SubId, SubsError,
    SubscriptionStore, TelephonyBroadcast, TelephonyEvent,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Everything the dispatcher loop consumes, in arrival order.
pub enum PhoneCommand {
    /// A radio-originated slot event, already decoded.
    Slot(SlotEvent),
    /// The radio channel issued a card-status poll for `slot`; the loop
    /// registers the serial and waits for the matching callback.
    CardStatusRequested {
        slot: usize,
        serial: u32,
    },
    /// Raw vendor callback carrying a card-status record.
    CardStatusResponse {
        envelope: ResponseEnvelope,
        status: RawIccCardStatus,
    },
    /// Result of a background eUICC profile fetch.
    EmbeddedProfilesFetched(Result<Vec<EmbeddedProfile>, SubsError>),
    SubmitSms {
        destination: String,
        part_count: usize,
        respond_to: oneshot::Sender<Result<MessageId, SmsError>>,
    },
    ConfirmSms {
        message_id: MessageId,
        approved: bool,
    },
    /// Radio verdict for one in-flight SMS part.
    SmsSendResult {
        message_id: MessageId,
        part_index: usize,
        error: RadioError,
        via_ims: bool,
    },
    VoiceServiceLost,
    /// Explicit user answer to a default-selection prompt.
    ChooseDefault {
        axis: SelectionAxis,
        sub_id: SubId,
    },
    Status {
        respond_to: oneshot::Sender<PhoneStatus>,
    },
    Shutdown,
}

/// Point-in-time view of the loop's state, for status queries.
#[derive(Clone, Debug, Serialize)]
pub struct PhoneStatus {
    pub slots: Vec<rilhub_subs::SlotIccState>,
    pub selection: rilhub_subs::DefaultSelection,
    pub initialized: bool,
    pub pending_sms_confirmations: usize,
}

/// Hands ready SMS parts to the radio channel.
pub trait SmsTransmitter: Send {
    fn transmit(&mut self, part: OutboundPart);
}

/// Drops parts with a log, for hosts without a radio wired up.
#[derive(Default)]
pub struct NullTransmitter;

impl SmsTransmitter for NullTransmitter {
    fn transmit(&mut self, part: OutboundPart) {
        log::debug!(
            "phone: no transmitter, dropping message {} part {}",
            part.message_id,
            part.part_index
        );
    }
}

/// Cloneable entry point into a running loop.
#[derive(Clone)]
pub struct PhoneHandle {
    tx: mpsc::UnboundedSender<PhoneCommand>,
}

impl PhoneHandle {
    pub fn command(&self, command: PhoneCommand) {
        if self.tx.send(command).is_err() {
            log::warn!("phone: command dropped, dispatcher loop is gone");
        }
    }

    pub async fn submit_sms(
        &self,
        destination: impl Into<String>,
        part_count: usize,
    ) -> Option<Result<MessageId, SmsError>> {
        let (respond_to, rx) = oneshot::channel();
        self.command(PhoneCommand::SubmitSms {
            destination: destination.into(),
            part_count,
            respond_to,
        });
        rx.await.ok()
    }

    pub async fn status(&self) -> Option<PhoneStatus> {
        let (respond_to, rx) = oneshot::channel();
        self.command(PhoneCommand::Status { respond_to });
        rx.await.ok()
    }
}

/// The dispatcher loop and the state it owns.
pub struct PhoneLoop {
    store: SubscriptionStore,
    decoder: RadioResponseDecoder,
    /// Outstanding card-status polls, slot per registered serial.
    card_status_waits: Vec<(usize, oneshot::Receiver<DecodedResponse>)>,
    reconciler: SimSlotReconciler,
    arbiter: DefaultSubscriptionArbiter,
    sms: SmsOutboundTracker,
    transmitter: Box<dyn SmsTransmitter>,
    carrier: Box<dyn CarrierConfigNotifier + Send>,
    euicc: Arc<dyn EuiccBackend>,
    euicc_card_id: String,
    broadcast: TelephonyBroadcast,
    tx: mpsc::UnboundedSender<PhoneCommand>,
    rx: mpsc::UnboundedReceiver<PhoneCommand>,
    embedded_fetch_inflight: bool,
    sms_pump_interval_ms: u64,
}

impl PhoneLoop {
    pub fn new(
        config: &DaemonConfig,
        store: SubscriptionStore,
        policy: Box<dyn ShortCodePolicy>,
        transmitter: Box<dyn SmsTransmitter>,
        carrier: Box<dyn CarrierConfigNotifier + Send>,
        euicc: Arc<dyn EuiccBackend>,
    ) -> (Self, PhoneHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PhoneHandle { tx: tx.clone() };
        let phone = Self {
            store,
            decoder: RadioResponseDecoder::new(),
            card_status_waits: Vec::new(),
            reconciler: SimSlotReconciler::new(config.slot_count),
            arbiter: DefaultSubscriptionArbiter::new(),
            sms: SmsOutboundTracker::new(config.sms_config(), policy),
            transmitter,
            carrier,
            euicc,
            euicc_card_id: config.euicc_card_id.clone(),
            broadcast: TelephonyBroadcast::new(),
            tx,
            rx,
            embedded_fetch_inflight: false,
            sms_pump_interval_ms: config.sms_config().retry_delay_ms.max(100),
        };
        (phone, handle)
    }

    /// Subscribe before the loop starts to observe every event.
    pub fn subscribe(&self) -> broadcast::Receiver<TelephonyEvent> {
        self.broadcast.subscribe()
    }

    pub async fn run(mut self) {
        let mut pump = tokio::time::interval(Duration::from_millis(self.sms_pump_interval_ms));
        pump.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("phone: dispatcher loop started");
        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    if matches!(command, PhoneCommand::Shutdown) {
                        break;
                    }
                    if let Err(err) = self.handle_command(command) {
                        log::error!("phone: command failed: {err}");
                    }
                }
                _ = pump.tick() => self.pump_sms(),
            }
        }
        log::info!("phone: dispatcher loop stopped");
    }

    fn handle_command(&mut self, command: PhoneCommand) -> Result<(), SubsError> {
        match command {
            PhoneCommand::Slot(event) => self.handle_slot_event(event),
            PhoneCommand::CardStatusRequested { slot, serial } => {
                match self.decoder.register_request(serial, RequestKind::IccCardStatus) {
                    Ok(rx) => self.card_status_waits.push((slot, rx)),
                    Err(err) => log::warn!("phone: card status poll rejected: {err}"),
                }
                Ok(())
            }
            PhoneCommand::CardStatusResponse { envelope, status } => {
                self.decoder.icc_card_status_response(envelope, status);
                self.drain_card_status()
            }
            PhoneCommand::EmbeddedProfilesFetched(result) => {
                self.embedded_fetch_inflight = false;
                match result {
                    Ok(profiles) => {
                        if apply_profiles(&self.store, &profiles)? {
                            self.broadcast.send(TelephonyEvent::PrimaryListChanged);
                            self.rearbitrate()?;
                        }
                        Ok(())
                    }
                    Err(err) => {
                        log::warn!("phone: embedded profile fetch failed: {err}");
                        Ok(())
                    }
                }
            }
            PhoneCommand::SubmitSms { destination, part_count, respond_to } => {
                let result = self.sms.submit(&destination, part_count);
                if respond_to.send(result).is_err() {
                    log::debug!("phone: sms submitter went away");
                }
                self.pump_sms();
                Ok(())
            }
            PhoneCommand::ConfirmSms { message_id, approved } => {
                if let Err(err) = self.sms.confirm(message_id, approved) {
                    log::warn!("phone: sms confirmation rejected: {err}");
                }
                self.pump_sms();
                Ok(())
            }
            PhoneCommand::SmsSendResult { message_id, part_index, error, via_ims } => {
                self.sms.handle_send_result(message_id, part_index, error, via_ims);
                self.drain_sms_events();
                Ok(())
            }
            PhoneCommand::VoiceServiceLost => {
                self.sms.voice_service_lost();
                self.drain_sms_events();
                Ok(())
            }
            PhoneCommand::ChooseDefault { axis, sub_id } => {
                self.arbiter.choose(axis, sub_id);
                self.broadcast
                    .send(TelephonyEvent::DefaultsChanged { selection: self.arbiter.selection() });
                Ok(())
            }
            PhoneCommand::Status { respond_to } => {
                let status = PhoneStatus {
                    slots: self.reconciler.table().iter().cloned().collect(),
                    selection: self.arbiter.selection(),
                    initialized: self.reconciler.initialized(),
                    pending_sms_confirmations: self.sms.pending_confirmations(),
                };
                if respond_to.send(status).is_err() {
                    log::debug!("phone: status requester went away");
                }
                Ok(())
            }
            PhoneCommand::Shutdown => Ok(()),
        }
    }

    /// Collects completed card-status polls and feeds them to the
    /// reconciler. The decoder has already dropped uncorrelated callbacks
    /// and stripped payloads from errored ones.
    fn drain_card_status(&mut self) -> Result<(), SubsError> {
        let mut completed = Vec::new();
        self.card_status_waits.retain_mut(|(slot, rx)| match rx.try_recv() {
            Ok(response) => {
                completed.push((*slot, response));
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => true,
            Err(oneshot::error::TryRecvError::Closed) => false,
        });
        for (slot, response) in completed {
            if !response.error.is_success() {
                log::warn!("phone: card status poll for slot {slot} failed: {:?}", response.error);
                continue;
            }
            if let ResponsePayload::IccCardStatus(status) = response.payload {
                if let Some(event) = card_status_slot_event(slot, &status) {
                    self.handle_slot_event(event)?;
                }
            }
        }
        Ok(())
    }

    fn handle_slot_event(&mut self, event: SlotEvent) -> Result<(), SubsError> {
        let outcome = self.reconciler.handle_event(&self.store, event)?;
        for event in &outcome.broadcasts {
            self.broadcast.send(event.clone());
        }
        for slot in &outcome.carrier_config_slots {
            if let Some(state) = self.reconciler.table().get(*slot) {
                self.carrier.reload(*slot, state.sim_state);
            }
        }
        if outcome.embedded_sync_due {
            self.start_embedded_fetch();
        }
        if outcome.subscriptions_changed || outcome.initialized {
            self.rearbitrate()?;
        }
        Ok(())
    }

    fn rearbitrate(&mut self) -> Result<(), SubsError> {
        let active: Vec<ActiveSubscription> = self
            .store
            .active_records()?
            .iter()
            .map(ActiveSubscription::from_record)
            .collect();
        let outcome = self.arbiter.recompute(&active);
        if outcome.selection_changed {
            self.broadcast.send(TelephonyEvent::DefaultsChanged { selection: outcome.selection });
        }
        if let Some(axis) = outcome.prompt {
            self.broadcast.send(TelephonyEvent::SelectionPrompt { axis });
        }
        if !outcome.dual_cdma_subs.is_empty() {
            log::warn!("phone: multiple CDMA-capable primaries: {:?}", outcome.dual_cdma_subs);
            self.broadcast
                .send(TelephonyEvent::DualCdmaWarning { sub_ids: outcome.dual_cdma_subs });
        }
        Ok(())
    }

    fn start_embedded_fetch(&mut self) {
        // One fetch at a time; a due sync during an in-flight fetch is
        // picked up by the next reconciliation pass.
        if self.embedded_fetch_inflight {
            return;
        }
        self.embedded_fetch_inflight = true;
        let euicc = Arc::clone(&self.euicc);
        let card_id = self.euicc_card_id.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = euicc.profiles(&card_id);
            if tx.send(PhoneCommand::EmbeddedProfilesFetched(result)).is_err() {
                log::debug!("phone: profile fetch result dropped, loop is gone");
            }
        });
    }

    fn pump_sms(&mut self) {
        for part in self.sms.take_ready() {
            self.transmitter.transmit(part);
        }
        self.drain_sms_events();
    }

    fn drain_sms_events(&mut self) {
        for event in self.sms.drain_events() {
            match event {
                SmsEvent::ConfirmationRequired { message_id, destination } => {
                    log::info!("phone: sms {message_id} to {destination} awaits confirmation");
                }
                SmsEvent::MessageSent { message_id } => {
                    log::info!("phone: sms {message_id} sent");
                }
                SmsEvent::MessageFailed { message_id, reason } => {
                    log::warn!("phone: sms {message_id} failed: {reason:?}");
                }
                // `SmsEvent` is #[non_exhaustive]; every current variant is
                // handled above, so this arm is unreachable today.
                _ => {}
            }
        }
    }
}

/// Maps a decoded card status onto the reconciler's event vocabulary.
/// ICCIDs arrive on the separate record-read path, so a present card
/// surfaces only its app state here.
fn card_status_slot_event(slot: usize, status: &IccCardStatus) -> Option<SlotEvent> {
    match status.card_state {
        HalCardState::Absent => Some(SlotEvent::CardAbsent { slot }),
        HalCardState::Error | HalCardState::Restricted => Some(SlotEvent::CardError { slot }),
        HalCardState::Unknown => None,
        HalCardState::Present => {
            let app = status
                .gsm_umts_app_index
                .or(status.cdma_app_index)
                .and_then(|index| status.apps.get(index));
            match app {
                Some(app) if app.app_state == AppState::Ready => Some(SlotEvent::SimReady { slot }),
                Some(app) if app.app_state.is_locked() => {
                    Some(SlotEvent::SimLocked { slot, iccid: None })
                }
                _ => Some(SlotEvent::SimNotReady { slot }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rilhub_hal::raw::RawIccApp;
    use rilhub_sms::AllowAllPolicy;
    use rilhub_subs::{IccRecords, NullCarrierConfig, SimState, StaticEuiccBackend};
    use std::sync::Mutex;

    struct RecordingTransmitter(Arc<Mutex<Vec<OutboundPart>>>);

    impl SmsTransmitter for RecordingTransmitter {
        fn transmit(&mut self, part: OutboundPart) {
            self.0.lock().expect("lock").push(part);
        }
    }

    fn loaded(slot: usize, iccid: &str) -> PhoneCommand {
        PhoneCommand::Slot(SlotEvent::RecordsLoaded {
            slot,
            records: Some(IccRecords {
                iccid: iccid.to_string(),
                msisdn: String::new(),
                mcc: String::new(),
                mnc: String::new(),
                carrier_id: None,
                cdma: false,
            }),
        })
    }

    fn phone_with_transmitter(
        sent: Arc<Mutex<Vec<OutboundPart>>>,
    ) -> (PhoneLoop, PhoneHandle) {
        let config = DaemonConfig::default();
        let store = SubscriptionStore::in_memory().expect("store");
        PhoneLoop::new(
            &config,
            store,
            Box::new(AllowAllPolicy),
            Box::new(RecordingTransmitter(sent)),
            Box::new(NullCarrierConfig::default()),
            Arc::new(StaticEuiccBackend::default()),
        )
    }

    fn present_card(app_state: u32) -> RawIccCardStatus {
        RawIccCardStatus {
            card_state: 1,
            universal_pin_state: 2,
            gsm_umts_subscription_app_index: 0,
            cdma_subscription_app_index: -1,
            ims_subscription_app_index: -1,
            applications: vec![RawIccApp { app_type: 2, app_state, ..RawIccApp::default() }],
        }
    }

    #[test]
    fn card_status_maps_to_slot_events() {
        let absent = IccCardStatus::from_raw(&RawIccCardStatus::default());
        assert_eq!(card_status_slot_event(1, &absent), Some(SlotEvent::CardAbsent { slot: 1 }));

        let locked = IccCardStatus::from_raw(&present_card(2));
        assert_eq!(
            card_status_slot_event(0, &locked),
            Some(SlotEvent::SimLocked { slot: 0, iccid: None })
        );

        let ready = IccCardStatus::from_raw(&present_card(5));
        assert_eq!(card_status_slot_event(0, &ready), Some(SlotEvent::SimReady { slot: 0 }));

        let detected = IccCardStatus::from_raw(&present_card(1));
        assert_eq!(card_status_slot_event(0, &detected), Some(SlotEvent::SimNotReady { slot: 0 }));
    }

    #[tokio::test]
    async fn raw_card_status_drives_the_reconciler() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (phone, handle) = phone_with_transmitter(sent);
        let loop_task = tokio::spawn(phone.run());

        // Slot 0 reports a ready SIM straight from the vendor callback.
        handle.command(PhoneCommand::CardStatusRequested { slot: 0, serial: 7 });
        handle.command(PhoneCommand::CardStatusResponse {
            envelope: ResponseEnvelope::solicited(7, RadioError::None),
            status: present_card(5),
        });
        // Slot 1 reports no card at all.
        handle.command(PhoneCommand::CardStatusRequested { slot: 1, serial: 8 });
        handle.command(PhoneCommand::CardStatusResponse {
            envelope: ResponseEnvelope::solicited(8, RadioError::None),
            status: RawIccCardStatus::default(),
        });
        let status = handle.status().await.expect("status");
        assert_eq!(status.slots[0].sim_state, SimState::Ready);
        assert_eq!(status.slots[1].sim_state, SimState::Absent);
        assert!(!status.initialized);

        // Record read lands the ICCID; the card-status path already made
        // every slot definite, so this pass finishes initialization.
        handle.command(loaded(0, "111"));
        let status = handle.status().await.expect("status");
        assert!(status.initialized);
        assert_eq!(status.selection.data, Some(1));

        handle.command(PhoneCommand::Shutdown);
        loop_task.await.expect("join");
    }

    #[tokio::test]
    async fn slot_events_flow_through_to_defaults() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (phone, handle) = phone_with_transmitter(Arc::clone(&sent));
        let mut events = phone.subscribe();
        let loop_task = tokio::spawn(phone.run());

        handle.command(loaded(0, "111"));
        handle.command(PhoneCommand::Slot(SlotEvent::CardAbsent { slot: 1 }));
        let status = handle.status().await.expect("status");
        assert!(status.initialized);
        assert_eq!(status.selection.data, status.selection.voice);
        assert!(status.selection.data.is_some());

        handle.command(PhoneCommand::Shutdown);
        loop_task.await.expect("join");

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&TelephonyEvent::SubscriptionsInitialized));
        assert!(seen.iter().any(|event| matches!(event, TelephonyEvent::DefaultsChanged { .. })));
    }

    #[tokio::test]
    async fn physical_swap_prompts_for_data_selection() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (phone, handle) = phone_with_transmitter(sent);
        let mut events = phone.subscribe();
        let loop_task = tokio::spawn(phone.run());

        // Defaults pin to the first SIM; adding the second changes nothing.
        handle.command(loaded(0, "111"));
        handle.command(loaded(1, "222"));
        // Swapping the default SIM for an unrelated one clears the axes
        // and asks the user again.
        handle.command(PhoneCommand::Slot(SlotEvent::HotSwap { slot: 0 }));
        handle.command(loaded(0, "333"));
        let status = handle.status().await.expect("status");
        assert_eq!(status.selection.data, None);

        handle.command(PhoneCommand::ChooseDefault { axis: SelectionAxis::Data, sub_id: 3 });
        let status = handle.status().await.expect("status");
        assert_eq!(status.selection.data, Some(3));

        handle.command(PhoneCommand::Shutdown);
        loop_task.await.expect("join");

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen
            .iter()
            .any(|event| matches!(event, TelephonyEvent::SelectionPrompt { axis: SelectionAxis::Data })));
    }

    #[tokio::test]
    async fn submitted_sms_reaches_the_transmitter() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (phone, handle) = phone_with_transmitter(Arc::clone(&sent));
        let loop_task = tokio::spawn(phone.run());

        let message_id = handle
            .submit_sms("+15551234567", 2)
            .await
            .expect("reply")
            .expect("submit");
        handle.status().await.expect("status");
        {
            let parts = sent.lock().expect("lock");
            assert_eq!(parts.len(), 2);
            assert!(parts.iter().all(|part| part.message_id == message_id));
        }
        handle.command(PhoneCommand::SmsSendResult {
            message_id,
            part_index: 0,
            error: RadioError::None,
            via_ims: false,
        });

        handle.command(PhoneCommand::Shutdown);
        loop_task.await.expect("join");
    }
}
