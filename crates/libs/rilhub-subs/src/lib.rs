//! SIM subscription lifecycle for rilhub.
//!
//! Everything that turns per-slot radio events into persisted subscription
//! state and default-subscription choices:
//!
//! - [`SlotStateTable`] — per-slot card/SIM state, owned, never ambient
//! - [`SimSlotReconciler`] — the slot/ICCID reconciliation state machine
//! - [`SubscriptionStore`] — the persisted subscription table (SQLite)
//! - [`apply_profiles`] — embedded (eSIM) profile list merge
//! - [`DefaultSubscriptionArbiter`] — multi-SIM default selection
//! - [`TelephonyBroadcast`] — fire-and-forget outward events
//!
//! All mutation happens on one dispatcher loop; nothing in this crate
//! takes a lock. The only blocking seam is [`EuiccBackend`], which the
//! host moves off the loop and posts back as a command.

pub mod arbiter;
pub mod error;
pub mod esim;
pub mod events;
pub mod reconcile;
pub mod slot;
pub mod store;

pub use arbiter::{
    ActiveSubscription, ArbitrationOutcome, DefaultSelection, DefaultSubscriptionArbiter,
    PrimaryTransition, SelectionAxis,
};
pub use error::SubsError;
pub use esim::{apply_profiles, EmbeddedProfile, EuiccBackend, StaticEuiccBackend};
pub use events::{CarrierConfigNotifier, NullCarrierConfig, TelephonyBroadcast, TelephonyEvent};
pub use reconcile::{IccRecords, ReconcileOutcome, SimSlotReconciler, SlotEvent};
pub use slot::{CardState, IccObservation, SimState, SlotIccState, SlotStateTable};
pub use store::{NameSource, SubId, SubscriptionRecord, SubscriptionStore};
