//! End-to-end reconciler scenarios over an in-memory store.

use rilhub_subs::{
    IccRecords, SimSlotReconciler, SimState, SlotEvent, SubscriptionStore, TelephonyEvent,
};

fn loaded(slot: usize, iccid: &str) -> SlotEvent {
    SlotEvent::RecordsLoaded {
        slot,
        records: Some(IccRecords {
            iccid: iccid.to_string(),
            msisdn: String::new(),
            mcc: String::new(),
            mnc: String::new(),
            carrier_id: None,
            cdma: false,
        }),
    }
}

#[test]
fn initialized_fires_once_when_every_slot_is_definite() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(2);

    let outcome = reconciler.handle_event(&store, loaded(0, "8901")).expect("slot 0");
    assert!(!outcome.initialized);
    assert!(!outcome.embedded_sync_due);

    // An empty second slot is a definite observation, not missing data.
    let outcome = reconciler
        .handle_event(&store, SlotEvent::CardAbsent { slot: 1 })
        .expect("slot 1");
    assert!(outcome.initialized);
    assert!(outcome.embedded_sync_due);
    assert!(outcome.broadcasts.contains(&TelephonyEvent::SubscriptionsInitialized));

    let outcome = reconciler
        .handle_event(&store, SlotEvent::CardAbsent { slot: 1 })
        .expect("repeat");
    assert!(!outcome.initialized);
    assert!(outcome.embedded_sync_due);
    assert!(reconciler.initialized());
}

#[test]
fn colliding_iccids_get_per_slot_suffixes() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(2);

    reconciler.handle_event(&store, loaded(0, "111")).expect("slot 0");
    let outcome = reconciler.handle_event(&store, loaded(1, "111")).expect("slot 1");
    assert!(outcome.subscriptions_changed);

    let active = store.active_records().expect("active");
    let assignments: Vec<(&str, Option<u32>)> = active
        .iter()
        .map(|record| (record.iccid.as_str(), record.slot_index))
        .collect();
    assert_eq!(assignments, [("111-0", Some(0)), ("111-1", Some(1))]);
}

#[test]
fn identical_events_are_idempotent() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(2);

    reconciler.handle_event(&store, loaded(0, "111")).expect("slot 0");
    reconciler.handle_event(&store, loaded(1, "111")).expect("slot 1");

    let outcome = reconciler.handle_event(&store, loaded(1, "111")).expect("replay");
    assert!(!outcome.subscriptions_changed);
    assert!(!outcome.broadcasts.contains(&TelephonyEvent::PrimaryListChanged));
    assert_eq!(store.active_records().expect("active").len(), 2);
}

#[test]
fn one_primary_list_notification_per_pass() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(2);

    reconciler.handle_event(&store, loaded(0, "111")).expect("slot 0");
    // The collision pass rewrites both slots' assignments at once.
    let outcome = reconciler.handle_event(&store, loaded(1, "111")).expect("slot 1");
    let notifications = outcome
        .broadcasts
        .iter()
        .filter(|event| **event == TelephonyEvent::PrimaryListChanged)
        .count();
    assert_eq!(notifications, 1);
}

#[test]
fn hot_swap_reassigns_only_the_swapped_slot() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(2);

    reconciler.handle_event(&store, loaded(0, "111")).expect("slot 0");
    reconciler.handle_event(&store, loaded(1, "222")).expect("slot 1");

    let swap = reconciler
        .handle_event(&store, SlotEvent::HotSwap { slot: 0 })
        .expect("swap");
    assert!(!swap.embedded_sync_due);
    let reload = reconciler.handle_event(&store, loaded(0, "333")).expect("reload");
    assert!(reload.subscriptions_changed);
    assert!(reload.embedded_sync_due);
    assert!(!reload.initialized);

    let old = store.get_by_iccid("111").expect("get").expect("record");
    assert_eq!(old.slot_index, None);
    let new = store.get_by_iccid("333").expect("get").expect("record");
    assert_eq!(new.slot_index, Some(0));
    let untouched = store.get_by_iccid("222").expect("get").expect("record");
    assert_eq!(untouched.slot_index, Some(1));

    let sim_state_slots: Vec<usize> = swap
        .broadcasts
        .iter()
        .chain(reload.broadcasts.iter())
        .filter_map(|event| match event {
            TelephonyEvent::SimStateChanged { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    assert!(!sim_state_slots.is_empty());
    assert!(sim_state_slots.iter().all(|slot| *slot == 0));
}

#[test]
fn hot_swap_releases_the_slot_assignment_immediately() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(2);

    reconciler.handle_event(&store, loaded(0, "111")).expect("slot 0");
    let swap = reconciler
        .handle_event(&store, SlotEvent::HotSwap { slot: 0 })
        .expect("swap");
    assert!(swap.subscriptions_changed);
    let record = store.get_by_iccid("111").expect("get").expect("record");
    assert_eq!(record.slot_index, None);

    // The SIM reappears in the other slot while the swapped slot is
    // still unknown.
    reconciler.handle_event(&store, loaded(1, "111")).expect("slot 1");
    let moved = store.get_by_iccid("111").expect("get").expect("record");
    assert_eq!(moved.slot_index, Some(1));

    // Resolving the swapped slot as empty must not disturb the record
    // that moved, and nothing actually changed.
    let absent = reconciler
        .handle_event(&store, SlotEvent::CardAbsent { slot: 0 })
        .expect("absent");
    assert!(!absent.subscriptions_changed);
    let settled = store.get_by_iccid("111").expect("get").expect("record");
    assert_eq!(settled.slot_index, Some(1));
}

#[test]
fn unreadable_records_defer_the_pass() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(1);

    let outcome = reconciler
        .handle_event(&store, SlotEvent::RecordsLoaded { slot: 0, records: None })
        .expect("deferred");
    assert!(outcome.deferred);
    assert!(outcome.broadcasts.is_empty());
    assert!(!outcome.subscriptions_changed);
    assert!(store.active_records().expect("active").is_empty());

    // The next good event re-drives the pass.
    let outcome = reconciler.handle_event(&store, loaded(0, "444")).expect("retry");
    assert!(outcome.subscriptions_changed);
    assert!(outcome.initialized);
}

#[test]
fn locked_sim_exposes_iccid_before_unlock() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(1);

    let outcome = reconciler
        .handle_event(
            &store,
            SlotEvent::SimLocked { slot: 0, iccid: Some("555".to_string()) },
        )
        .expect("locked");
    assert!(outcome.subscriptions_changed);
    assert_eq!(outcome.carrier_config_slots, [0]);
    let record = store.get_by_iccid("555").expect("get").expect("record");
    assert_eq!(record.slot_index, Some(0));
    assert_eq!(
        reconciler.table().get(0).map(|slot| slot.sim_state),
        Some(SimState::Locked)
    );
}

#[test]
fn sim_fields_persist_on_load() {
    let store = SubscriptionStore::in_memory().expect("store");
    let mut reconciler = SimSlotReconciler::new(1);

    let event = SlotEvent::RecordsLoaded {
        slot: 0,
        records: Some(IccRecords {
            iccid: "666".to_string(),
            msisdn: "+15550001111".to_string(),
            mcc: "310".to_string(),
            mnc: "260".to_string(),
            carrier_id: Some(1839),
            cdma: true,
        }),
    };
    reconciler.handle_event(&store, event.clone()).expect("load");
    let record = store.get_by_iccid("666").expect("get").expect("record");
    assert_eq!(record.number, "+15550001111");
    assert_eq!(record.mcc, "310");
    assert_eq!(record.mnc, "260");
    assert_eq!(record.carrier_id, Some(1839));
    assert!(record.is_cdma);

    let outcome = reconciler.handle_event(&store, event).expect("replay");
    assert!(!outcome.subscriptions_changed);
}
