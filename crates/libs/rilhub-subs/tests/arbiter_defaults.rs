//! Default-selection arbitration scenarios, driven the way the daemon
//! drives them: one recompute per primary-list change.

use rilhub_subs::{
    ActiveSubscription, DefaultSelection, DefaultSubscriptionArbiter, PrimaryTransition,
    SelectionAxis,
};

fn sub(sub_id: i64) -> ActiveSubscription {
    ActiveSubscription { sub_id, is_opportunistic: false, group_id: None, cdma_capable: false }
}

fn grouped(sub_id: i64, group: &str) -> ActiveSubscription {
    ActiveSubscription {
        sub_id,
        is_opportunistic: false,
        group_id: Some(group.to_string()),
        cdma_capable: false,
    }
}

#[test]
fn single_sim_arrival_assigns_all_axes_without_prompting() {
    let mut arbiter = DefaultSubscriptionArbiter::new();
    let boot = arbiter.recompute(&[]);
    assert_eq!(boot.transition, PrimaryTransition::Initialized);
    assert_eq!(boot.selection, DefaultSelection::default());

    let outcome = arbiter.recompute(&[sub(1)]);
    assert_eq!(outcome.transition, PrimaryTransition::Added);
    assert_eq!(outcome.selection, DefaultSelection::all(1));
    assert!(outcome.selection_changed);
    assert_eq!(outcome.prompt, None);
}

#[test]
fn two_sims_arriving_prompt_for_data_first() {
    let mut arbiter = DefaultSubscriptionArbiter::new();
    arbiter.recompute(&[]);

    let outcome = arbiter.recompute(&[sub(1), sub(2)]);
    assert_eq!(outcome.transition, PrimaryTransition::Added);
    // Nothing is guessed; every axis stays unset until the user answers.
    assert_eq!(outcome.selection, DefaultSelection::default());
    assert_eq!(outcome.prompt, Some(SelectionAxis::Data));

    arbiter.choose(SelectionAxis::Data, 1);
    let outcome = arbiter.recompute(&[sub(1), sub(2)]);
    assert_eq!(outcome.transition, PrimaryTransition::NoChange);
    assert_eq!(outcome.selection.data, Some(1));
    assert_eq!(outcome.prompt, None);
}

#[test]
fn removal_keeps_defaults_pinned_to_the_survivor() {
    let mut arbiter = DefaultSubscriptionArbiter::new();
    arbiter.recompute(&[sub(1), sub(2)]);
    arbiter.choose(SelectionAxis::Data, 1);
    arbiter.choose(SelectionAxis::Voice, 1);
    arbiter.choose(SelectionAxis::Sms, 1);

    let outcome = arbiter.recompute(&[sub(1)]);
    assert_eq!(outcome.transition, PrimaryTransition::Removed);
    assert_eq!(outcome.selection, DefaultSelection::all(1));
    assert!(!outcome.selection_changed);
    assert_eq!(outcome.prompt, None);
}

#[test]
fn removing_the_default_sub_prompts_again() {
    let mut arbiter = DefaultSubscriptionArbiter::new();
    arbiter.recompute(&[sub(1), sub(2)]);
    arbiter.choose(SelectionAxis::Data, 2);
    arbiter.choose(SelectionAxis::Voice, 2);
    arbiter.choose(SelectionAxis::Sms, 2);

    let outcome = arbiter.recompute(&[sub(1)]);
    assert_eq!(outcome.transition, PrimaryTransition::Removed);
    // The vanished default is cleared, never silently reassigned.
    assert_eq!(outcome.selection, DefaultSelection::default());
    assert_eq!(outcome.prompt, Some(SelectionAxis::Data));
}

#[test]
fn group_swap_follows_the_sibling_silently() {
    let mut arbiter = DefaultSubscriptionArbiter::new();
    arbiter.recompute(&[grouped(1, "g1"), sub(2)]);
    arbiter.choose(SelectionAxis::Data, 1);
    arbiter.choose(SelectionAxis::Voice, 2);
    arbiter.choose(SelectionAxis::Sms, 1);

    let outcome = arbiter.recompute(&[grouped(5, "g1"), sub(2)]);
    assert_eq!(outcome.transition, PrimaryTransition::SwappedInGroup);
    assert_eq!(
        outcome.selection,
        DefaultSelection { data: Some(5), voice: Some(2), sms: Some(5) }
    );
    assert!(outcome.selection_changed);
    assert_eq!(outcome.prompt, None);
}

#[test]
fn unrelated_swap_prompts_for_the_replacement() {
    let mut arbiter = DefaultSubscriptionArbiter::new();
    arbiter.recompute(&[sub(1), sub(2)]);
    arbiter.choose(SelectionAxis::Data, 1);
    arbiter.choose(SelectionAxis::Voice, 1);
    arbiter.choose(SelectionAxis::Sms, 1);

    let outcome = arbiter.recompute(&[sub(3), sub(2)]);
    assert_eq!(outcome.transition, PrimaryTransition::Swapped);
    assert_eq!(outcome.selection, DefaultSelection::default());
    assert_eq!(outcome.prompt, Some(SelectionAxis::Data));
}
