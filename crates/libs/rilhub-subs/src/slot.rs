use crate::error::SubsError;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    Absent,
    Present,
    Error,
}

/// Per-slot SIM application state. `Loaded` is reached only after
/// credential unlock and a full record read, and is terminal until a
/// hot-swap returns the slot to `NotInserted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimState {
    NotInserted,
    Unknown,
    NotReady,
    Absent,
    Locked,
    Ready,
    Error,
    Loaded,
}

impl SimState {
    pub fn can_transition(self, next: SimState) -> bool {
        if self == next {
            return true;
        }
        match self {
            // Loaded only leaves when the card goes away.
            Self::Loaded => matches!(next, Self::NotInserted | Self::Absent),
            _ => true,
        }
    }
}

/// What the slot currently reports about its ICCID. `Unknown` slots are
/// skipped by reconciliation; `NoSim` is the definite "empty slot"
/// sentinel, not an absence of information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IccObservation {
    Unknown,
    NoSim,
    Iccid(String),
}

impl IccObservation {
    pub fn is_definite(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlotIccState {
    pub slot_index: usize,
    pub card_state: CardState,
    pub sim_state: SimState,
    pub observation: IccObservation,
}

impl SlotIccState {
    fn empty(slot_index: usize) -> Self {
        Self {
            slot_index,
            card_state: CardState::Absent,
            sim_state: SimState::NotInserted,
            observation: IccObservation::Unknown,
        }
    }
}

/// Per-slot state with lifetime equal to its owner. One instance per
/// physical slot; entries are replaced on hot swap, never removed.
pub struct SlotStateTable {
    slots: Vec<SlotIccState>,
}

impl SlotStateTable {
    pub fn new(slot_count: usize) -> Self {
        Self { slots: (0..slot_count).map(SlotIccState::empty).collect() }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> Option<&SlotIccState> {
        self.slots.get(slot)
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Result<&mut SlotIccState, SubsError> {
        self.slots.get_mut(slot).ok_or(SubsError::InvalidSlot(slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotIccState> {
        self.slots.iter()
    }

    /// True once every slot reports a definite ICCID, the "no SIM"
    /// sentinel included.
    pub fn all_definite(&self) -> bool {
        self.slots.iter().all(|slot| slot.observation.is_definite())
    }
}
