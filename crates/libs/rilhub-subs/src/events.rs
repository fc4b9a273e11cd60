use crate::arbiter::{DefaultSelection, SelectionAxis};
use crate::slot::{CardState, SimState};
use crate::store::SubId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Outward-facing named events. Fire-and-forget with no delivery
/// guarantee; consumers must poll current state on startup rather than
/// rely on having seen every transition.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelephonyEvent {
    SimStateChanged { slot: usize, state: SimState },
    CardStateChanged { slot: usize, state: CardState },
    SubscriptionsInitialized,
    PrimaryListChanged,
    DefaultsChanged { selection: DefaultSelection },
    SelectionPrompt { axis: SelectionAxis },
    DualCdmaWarning { sub_ids: Vec<SubId> },
}

const BROADCAST_CAPACITY: usize = 64;

/// Broadcast channel for [`TelephonyEvent`]s. Slow or absent consumers
/// lose events by design.
pub struct TelephonyBroadcast {
    tx: broadcast::Sender<TelephonyEvent>,
}

impl Default for TelephonyBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl TelephonyBroadcast {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelephonyEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: TelephonyEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("subs: broadcast dropped, no receivers");
        }
    }
}

/// Carrier-config reload seam. This layer calls it, never implements it.
pub trait CarrierConfigNotifier {
    fn reload(&mut self, slot: usize, state: SimState);
}

/// No-op notifier for hosts and tests without a carrier-config service.
#[derive(Default)]
pub struct NullCarrierConfig {
    pub reloads: Vec<(usize, SimState)>,
}

impl CarrierConfigNotifier for NullCarrierConfig {
    fn reload(&mut self, slot: usize, state: SimState) {
        self.reloads.push((slot, state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_receivers_is_not_an_error() {
        let broadcast = TelephonyBroadcast::new();
        broadcast.send(TelephonyEvent::PrimaryListChanged);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let broadcast = TelephonyBroadcast::new();
        let mut rx = broadcast.subscribe();
        broadcast.send(TelephonyEvent::SubscriptionsInitialized);
        broadcast.send(TelephonyEvent::PrimaryListChanged);
        assert_eq!(rx.recv().await, Ok(TelephonyEvent::SubscriptionsInitialized));
        assert_eq!(rx.recv().await, Ok(TelephonyEvent::PrimaryListChanged));
    }
}
