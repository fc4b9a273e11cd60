//! Default-subscription arbitration.
//!
//! Recomputes the default data/voice/SMS subscription ids whenever the
//! set of active subscriptions changes, classifies the transition, and
//! decides whether the change warrants a user-facing selection prompt.
//! Group-internal swaps (carrier-initiated eSIM profile changes) follow
//! the prior default silently; group members are interchangeable for
//! billing and identity purposes, so re-prompting on them would be wrong.

use crate::store::{SubId, SubscriptionRecord};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAxis {
    Data,
    Voice,
    Sms,
}

/// Process-wide default selection, one id per axis or none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DefaultSelection {
    pub data: Option<SubId>,
    pub voice: Option<SubId>,
    pub sms: Option<SubId>,
}

impl DefaultSelection {
    pub fn all(sub_id: SubId) -> Self {
        Self { data: Some(sub_id), voice: Some(sub_id), sms: Some(sub_id) }
    }

    pub fn first_unset(&self) -> Option<SelectionAxis> {
        if self.data.is_none() {
            Some(SelectionAxis::Data)
        } else if self.voice.is_none() {
            Some(SelectionAxis::Voice)
        } else if self.sms.is_none() {
            Some(SelectionAxis::Sms)
        } else {
            None
        }
    }
}

/// How the primary set moved relative to the previous pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryTransition {
    Initialized,
    NoChange,
    Added,
    Removed,
    Swapped,
    SwappedInGroup,
    MarkedOpportunistic,
}

impl PrimaryTransition {
    /// Transitions a user actually perceives; only these may prompt.
    pub fn is_user_visible(self) -> bool {
        matches!(self, Self::Added | Self::Removed | Self::Swapped)
    }
}

/// One currently active subscription, as the arbiter sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveSubscription {
    pub sub_id: SubId,
    pub is_opportunistic: bool,
    pub group_id: Option<String>,
    pub cdma_capable: bool,
}

impl ActiveSubscription {
    pub fn from_record(record: &SubscriptionRecord) -> Self {
        Self {
            sub_id: record.sub_id,
            is_opportunistic: record.is_opportunistic,
            group_id: record.group_id.clone(),
            cdma_capable: record.is_cdma,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArbitrationOutcome {
    pub transition: PrimaryTransition,
    pub selection: DefaultSelection,
    pub selection_changed: bool,
    /// Axis to put in front of the user, when disambiguation is needed.
    pub prompt: Option<SelectionAxis>,
    /// Active primary subscriptions backed by CDMA-capable applications,
    /// reported when two or more coexist. Independent of the prompt.
    pub dual_cdma_subs: Vec<SubId>,
}

#[derive(Clone, Debug, PartialEq)]
struct PrimarySub {
    sub_id: SubId,
    group_id: Option<String>,
}

/// Decides which subscription is default for data/voice/SMS.
#[derive(Default)]
pub struct DefaultSubscriptionArbiter {
    /// `None` until the first recompute ever runs.
    previous: Option<Vec<PrimarySub>>,
    selection: DefaultSelection,
}

impl DefaultSubscriptionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> DefaultSelection {
        self.selection
    }

    /// Records an explicit user choice for one axis, typically in answer
    /// to a selection prompt.
    pub fn choose(&mut self, axis: SelectionAxis, sub_id: SubId) {
        match axis {
            SelectionAxis::Data => self.selection.data = Some(sub_id),
            SelectionAxis::Voice => self.selection.voice = Some(sub_id),
            SelectionAxis::Sms => self.selection.sms = Some(sub_id),
        }
    }

    pub fn recompute(&mut self, active: &[ActiveSubscription]) -> ArbitrationOutcome {
        let primary: Vec<PrimarySub> = active
            .iter()
            .filter(|sub| !sub.is_opportunistic)
            .map(|sub| PrimarySub { sub_id: sub.sub_id, group_id: sub.group_id.clone() })
            .collect();

        let transition = self.classify(&primary, active);
        let before = self.selection;

        if primary.len() == 1 && transition != PrimaryTransition::Removed {
            self.selection = DefaultSelection::all(primary[0].sub_id);
        } else {
            self.selection = DefaultSelection {
                data: self.resolve_axis(self.selection.data, &primary),
                voice: self.resolve_axis(self.selection.voice, &primary),
                sms: self.resolve_axis(self.selection.sms, &primary),
            };
        }

        let prompt = if transition.is_user_visible() && !primary.is_empty() {
            self.selection.first_unset()
        } else {
            None
        };

        let dual_cdma: Vec<SubId> = active
            .iter()
            .filter(|sub| !sub.is_opportunistic && sub.cdma_capable)
            .map(|sub| sub.sub_id)
            .collect();
        let dual_cdma_subs = if dual_cdma.len() >= 2 { dual_cdma } else { Vec::new() };

        self.previous = Some(primary);
        ArbitrationOutcome {
            transition,
            selection: self.selection,
            selection_changed: self.selection != before,
            prompt,
            dual_cdma_subs,
        }
    }

    fn classify(
        &self,
        primary: &[PrimarySub],
        active: &[ActiveSubscription],
    ) -> PrimaryTransition {
        let Some(previous) = self.previous.as_ref() else {
            return PrimaryTransition::Initialized;
        };

        let old_ids: Vec<SubId> = previous.iter().map(|sub| sub.sub_id).collect();
        let new_ids: Vec<SubId> = primary.iter().map(|sub| sub.sub_id).collect();
        if same_id_set(&old_ids, &new_ids) {
            return PrimaryTransition::NoChange;
        }
        if new_ids.len() > old_ids.len() {
            return PrimaryTransition::Added;
        }
        if new_ids.len() < old_ids.len() {
            // Shrinkage caused by a subscription turning opportunistic
            // while staying active is not a removal.
            let missing_went_opportunistic = old_ids
                .iter()
                .filter(|sub_id| !new_ids.contains(sub_id))
                .all(|sub_id| {
                    active
                        .iter()
                        .any(|sub| sub.sub_id == *sub_id && sub.is_opportunistic)
                });
            return if missing_went_opportunistic {
                PrimaryTransition::MarkedOpportunistic
            } else {
                PrimaryTransition::Removed
            };
        }

        // Same cardinality, different ids: group-aware swap detection.
        let groups_cover_all = primary.iter().all(|sub| {
            old_ids.contains(&sub.sub_id)
                || previous
                    .iter()
                    .any(|old| old.group_id.is_some() && old.group_id == sub.group_id)
        });
        if groups_cover_all {
            PrimaryTransition::SwappedInGroup
        } else {
            PrimaryTransition::Swapped
        }
    }

    /// Keeps an axis default when it, or a same-group sibling, is still
    /// primary; a kept-via-group default follows to the sibling id.
    fn resolve_axis(&self, current: Option<SubId>, primary: &[PrimarySub]) -> Option<SubId> {
        let current = current?;
        if primary.iter().any(|sub| sub.sub_id == current) {
            return Some(current);
        }
        let prior_group = self
            .previous
            .as_ref()
            .and_then(|previous| previous.iter().find(|sub| sub.sub_id == current))
            .and_then(|sub| sub.group_id.clone())?;
        primary
            .iter()
            .find(|sub| sub.group_id.as_deref() == Some(prior_group.as_str()))
            .map(|sub| sub.sub_id)
    }
}

fn same_id_set(old_ids: &[SubId], new_ids: &[SubId]) -> bool {
    if old_ids.len() != new_ids.len() {
        return false;
    }
    let mut counts: BTreeMap<SubId, i32> = BTreeMap::new();
    for sub_id in old_ids {
        *counts.entry(*sub_id).or_default() += 1;
    }
    for sub_id in new_ids {
        *counts.entry(*sub_id).or_default() -= 1;
    }
    counts.values().all(|count| *count == 0)
}
