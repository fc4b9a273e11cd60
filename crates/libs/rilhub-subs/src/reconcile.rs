//! Slot/ICCID reconciliation.
//!
//! Radio-originated events mutate the slot table; whenever a slot's ICCID
//! becomes known or changes, a reconciliation pass classifies every slot
//! against the previously committed assignment and updates the
//! subscription store. The pass emits at most one subscription-change
//! notification regardless of how many slots moved, and fires the
//! one-time "subscriptions initialized" event once every slot reports a
//! definite ICCID.

use crate::error::SubsError;
use crate::events::TelephonyEvent;
use crate::slot::{CardState, IccObservation, SimState, SlotIccState, SlotStateTable};
use crate::store::SubscriptionStore;
use std::collections::HashMap;

/// Fields read from the SIM once records are loaded. A `carrier_id` of
/// `None` means the lookup has not resolved yet, not "no carrier".
#[derive(Clone, Debug, PartialEq)]
pub struct IccRecords {
    pub iccid: String,
    pub msisdn: String,
    pub mcc: String,
    pub mnc: String,
    pub carrier_id: Option<i64>,
    pub cdma: bool,
}

/// Radio-originated slot events, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotEvent {
    CardAbsent { slot: usize },
    CardError { slot: usize },
    SimNotReady { slot: usize },
    /// A locked SIM may already expose its ICCID.
    SimLocked { slot: usize, iccid: Option<String> },
    SimReady { slot: usize },
    /// `records: None` models the transient null-records race with card
    /// removal; the pass is deferred, the next event re-drives it.
    RecordsLoaded { slot: usize, records: Option<IccRecords> },
    /// Hot swap: the slot returns to `NotInserted` with nothing known.
    HotSwap { slot: usize },
}

impl SlotEvent {
    pub fn slot(&self) -> usize {
        match self {
            Self::CardAbsent { slot }
            | Self::CardError { slot }
            | Self::SimNotReady { slot }
            | Self::SimLocked { slot, .. }
            | Self::SimReady { slot }
            | Self::RecordsLoaded { slot, .. }
            | Self::HotSwap { slot } => *slot,
        }
    }
}

/// What one event did, aggregated across the whole pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub broadcasts: Vec<TelephonyEvent>,
    /// True when any subscription record actually changed; drives exactly
    /// one downstream notification per pass.
    pub subscriptions_changed: bool,
    /// Set on the single pass that first sees every slot definite.
    pub initialized: bool,
    /// Embedded-profile sync is due whenever every slot is definite.
    pub embedded_sync_due: bool,
    /// Slots whose SIM state changed, for carrier-config reload.
    pub carrier_config_slots: Vec<usize>,
    /// The pass was skipped because records were transiently unreadable.
    pub deferred: bool,
}

/// The slot/ICCID reconciliation state machine.
pub struct SimSlotReconciler {
    table: SlotStateTable,
    /// Effective ICCID committed to the store per slot, last pass.
    committed: Vec<Option<String>>,
    /// Latest loaded records per slot, for conditional field updates.
    records: Vec<Option<IccRecords>>,
    initialized_fired: bool,
}

impl SimSlotReconciler {
    pub fn new(slot_count: usize) -> Self {
        Self {
            table: SlotStateTable::new(slot_count),
            committed: vec![None; slot_count],
            records: vec![None; slot_count],
            initialized_fired: false,
        }
    }

    pub fn table(&self) -> &SlotStateTable {
        &self.table
    }

    pub fn handle_event(
        &mut self,
        store: &SubscriptionStore,
        event: SlotEvent,
    ) -> Result<ReconcileOutcome, SubsError> {
        let slot = event.slot();
        let mut outcome = ReconcileOutcome::default();

        match event {
            SlotEvent::CardAbsent { slot } => {
                self.apply_state(slot, CardState::Absent, SimState::Absent, &mut outcome)?;
                self.observe(slot, IccObservation::NoSim)?;
                self.records[slot] = None;
            }
            SlotEvent::CardError { slot } => {
                self.apply_state(slot, CardState::Error, SimState::Error, &mut outcome)?;
                // An errored card is definite for initialization purposes:
                // no ICCID will ever come out of it.
                self.observe(slot, IccObservation::NoSim)?;
                self.records[slot] = None;
            }
            SlotEvent::SimNotReady { slot } => {
                self.apply_state(slot, CardState::Present, SimState::NotReady, &mut outcome)?;
            }
            SlotEvent::SimLocked { slot, iccid } => {
                self.apply_state(slot, CardState::Present, SimState::Locked, &mut outcome)?;
                if let Some(iccid) = iccid {
                    self.observe(slot, IccObservation::Iccid(iccid))?;
                }
            }
            SlotEvent::SimReady { slot } => {
                self.apply_state(slot, CardState::Present, SimState::Ready, &mut outcome)?;
            }
            SlotEvent::RecordsLoaded { slot, records } => {
                let Some(records) = records else {
                    log::info!("subs: slot {slot} records unreadable, deferring");
                    outcome.deferred = true;
                    return Ok(outcome);
                };
                self.apply_state(slot, CardState::Present, SimState::Loaded, &mut outcome)?;
                self.observe(slot, IccObservation::Iccid(records.iccid.clone()))?;
                self.records[slot] = Some(records);
            }
            SlotEvent::HotSwap { slot } => {
                self.apply_state(slot, CardState::Absent, SimState::NotInserted, &mut outcome)?;
                self.observe(slot, IccObservation::Unknown)?;
                self.records[slot] = None;
                // The slot is unknown until the next card appears, so the
                // pass below skips it; release the store assignment now or
                // the committed ICCID goes stale and a later pass would
                // clear whichever slot the SIM moved to.
                if let Some(old_iccid) = self.committed[slot].take() {
                    if let Some(old_record) = store.get_by_iccid(&old_iccid)? {
                        outcome.subscriptions_changed |= store.clear_slot(old_record.sub_id)?;
                    }
                }
            }
        }

        self.reconcile_pass(store, &mut outcome)?;

        if outcome.subscriptions_changed {
            outcome.broadcasts.push(TelephonyEvent::PrimaryListChanged);
        }
        if self.table.all_definite() {
            outcome.embedded_sync_due = true;
            if !self.initialized_fired {
                self.initialized_fired = true;
                outcome.initialized = true;
                outcome.broadcasts.push(TelephonyEvent::SubscriptionsInitialized);
            }
        }

        log::debug!(
            "subs: slot {slot} event done, changed={} initialized={} deferred={}",
            outcome.subscriptions_changed,
            outcome.initialized,
            outcome.deferred
        );
        Ok(outcome)
    }

    /// Fired exactly once per reconciler lifetime.
    pub fn initialized(&self) -> bool {
        self.initialized_fired
    }

    fn apply_state(
        &mut self,
        slot: usize,
        card: CardState,
        sim: SimState,
        outcome: &mut ReconcileOutcome,
    ) -> Result<(), SubsError> {
        let entry: &mut SlotIccState = self.table.get_mut(slot)?;
        if !entry.sim_state.can_transition(sim) {
            log::warn!(
                "subs: slot {slot} ignoring {:?} -> {:?} transition",
                entry.sim_state,
                sim
            );
            return Ok(());
        }
        if entry.card_state != card {
            entry.card_state = card;
            outcome.broadcasts.push(TelephonyEvent::CardStateChanged { slot, state: card });
        }
        if entry.sim_state != sim {
            entry.sim_state = sim;
            outcome.broadcasts.push(TelephonyEvent::SimStateChanged { slot, state: sim });
            outcome.carrier_config_slots.push(slot);
        }
        Ok(())
    }

    fn observe(&mut self, slot: usize, observation: IccObservation) -> Result<(), SubsError> {
        self.table.get_mut(slot)?.observation = observation;
        Ok(())
    }

    /// The core pass: classify every definite slot against the committed
    /// assignment, invalidate before assigning, and persist SIM-derived
    /// fields only when they differ.
    fn reconcile_pass(
        &mut self,
        store: &SubscriptionStore,
        outcome: &mut ReconcileOutcome,
    ) -> Result<(), SubsError> {
        let targets = self.effective_iccids();
        let mut changed = false;

        // Phase 1: release slots whose committed ICCID no longer matches.
        // Strictly ordered before any assignment so two records never
        // transiently claim the same slot.
        for (slot, target) in targets.iter().enumerate() {
            let Some(target) = target else { continue };
            let committed = &self.committed[slot];
            if committed.as_deref() != target.as_deref() {
                if let Some(old_iccid) = committed {
                    if let Some(old_record) = store.get_by_iccid(old_iccid)? {
                        changed |= store.clear_slot(old_record.sub_id)?;
                    }
                }
            }
        }

        // Phase 2: assign and refresh.
        for (slot, target) in targets.iter().enumerate() {
            let Some(target) = target else { continue };
            match target {
                Some(iccid) => {
                    let record = store.ensure_record(iccid)?;
                    changed |= store.assign_slot(record.sub_id, slot as u32)?;
                    if let Some(records) = &self.records[slot] {
                        if !records.msisdn.is_empty() {
                            changed |= store.update_number_if_changed(record.sub_id, &records.msisdn)?;
                        }
                        if !records.mcc.is_empty() {
                            changed |=
                                store.update_mcc_mnc_if_changed(record.sub_id, &records.mcc, &records.mnc)?;
                        }
                        if let Some(carrier_id) = records.carrier_id {
                            changed |= store.update_carrier_id_if_changed(record.sub_id, carrier_id)?;
                        }
                        changed |= store.set_cdma(record.sub_id, records.cdma)?;
                    }
                    self.committed[slot] = Some(iccid.clone());
                }
                None => {
                    if let Some(old_iccid) = self.committed[slot].take() {
                        if let Some(old_record) = store.get_by_iccid(&old_iccid)? {
                            changed |= store.clear_slot(old_record.sub_id)?;
                        }
                    }
                }
            }
        }

        outcome.subscriptions_changed |= changed;
        Ok(())
    }

    /// Per-slot reconciliation target: outer `None` = slot still unknown
    /// (skip), inner `None` = definitely no SIM, `Some(iccid)` = the
    /// effective ICCID after collision suffixing.
    fn effective_iccids(&self) -> Vec<Option<Option<String>>> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for slot in self.table.iter() {
            if let IccObservation::Iccid(iccid) = &slot.observation {
                *counts.entry(iccid.as_str()).or_default() += 1;
            }
        }
        self.table
            .iter()
            .map(|slot| match &slot.observation {
                IccObservation::Unknown => None,
                IccObservation::NoSim => Some(None),
                IccObservation::Iccid(iccid) => {
                    // Identical ICCIDs across slots get a deterministic
                    // per-slot suffix; subscription identity is keyed by
                    // ICCID, so colliding cards must diverge.
                    if counts.get(iccid.as_str()).copied().unwrap_or(0) > 1 {
                        Some(Some(format!("{iccid}-{}", slot.slot_index)))
                    } else {
                        Some(Some(iccid.clone()))
                    }
                }
            })
            .collect()
    }
}
