//! Embedded (eSIM) profile reconciliation.
//!
//! The backend query may block, so hosts run [`EuiccBackend::profiles`]
//! off the dispatcher loop and post the result back as a command;
//! [`apply_profiles`] is the loop-side apply step. Its return value is a
//! best-effort "did anything change" flag that lets dependents skip
//! spurious notifications.

use crate::error::SubsError;
use crate::store::{NameSource, SubscriptionStore};
use std::collections::HashSet;

/// One profile as reported by the eUICC backend.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedProfile {
    pub iccid: String,
    pub nickname: String,
    pub carrier_id: Option<i64>,
    pub access_rules: Vec<String>,
}

/// The blocking eUICC backend seam.
pub trait EuiccBackend: Send + Sync {
    fn profiles(&self, card_id: &str) -> Result<Vec<EmbeddedProfile>, SubsError>;
}

/// Fixed-response backend for hosts and tests without eUICC hardware.
#[derive(Default)]
pub struct StaticEuiccBackend {
    pub profiles: Vec<EmbeddedProfile>,
}

impl EuiccBackend for StaticEuiccBackend {
    fn profiles(&self, _card_id: &str) -> Result<Vec<EmbeddedProfile>, SubsError> {
        Ok(self.profiles.clone())
    }
}

/// Merges the backend-reported profile list into the store, diffing by
/// ICCID. Profiles that disappeared are marked non-embedded, never
/// deleted, preserving history for re-insertion.
pub fn apply_profiles(
    store: &SubscriptionStore,
    profiles: &[EmbeddedProfile],
) -> Result<bool, SubsError> {
    let mut changed = false;
    let mut reported: HashSet<String> = HashSet::new();

    for profile in profiles {
        reported.insert(profile.iccid.clone());
        let record = store.ensure_record(&profile.iccid)?;
        changed |= store.set_embedded(record.sub_id, true)?;
        changed |= store.update_access_rules_if_changed(record.sub_id, &profile.access_rules)?;
        if !profile.nickname.is_empty() {
            // Guarded by name-source priority: never overwrites a
            // user-set name.
            changed |= store.update_display_name(record.sub_id, &profile.nickname, NameSource::Carrier)?;
        }
        if let Some(carrier_id) = profile.carrier_id {
            if record.carrier_id.is_none() {
                changed |= store.update_carrier_id_if_changed(record.sub_id, carrier_id)?;
            }
        }
    }

    for record in store.embedded_records()? {
        if !reported.contains(&record.iccid) {
            changed |= store.set_embedded(record.sub_id, false)?;
        }
    }

    if changed {
        log::info!("subs: embedded profile sync changed subscription records");
    }
    Ok(changed)
}
