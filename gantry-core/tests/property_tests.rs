//! Property tests for the status machines and PERT estimates.

use gantry_core::{SessionStatus, TaskEstimate, TaskStatus};
use proptest::prelude::*;

fn arb_session_status() -> impl Strategy<Value = SessionStatus> {
    prop::sample::select(SessionStatus::ALL.to_vec())
}

fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(vec![
        TaskStatus::Pending,
        TaskStatus::Ready,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Paused,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
        TaskStatus::Skipped,
    ])
}

proptest! {
    // Transition permission is exactly membership in the allowed list.
    #[test]
    fn session_transition_matches_allowed_list(
        from in arb_session_status(),
        to in arb_session_status(),
    ) {
        let allowed = from.allowed_transitions().contains(&to);
        prop_assert_eq!(from.can_transition_to(to), allowed);
    }

    // Terminal states admit no transition at all.
    #[test]
    fn terminal_session_states_are_closed(
        from in arb_session_status(),
        to in arb_session_status(),
    ) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    // A state is never simultaneously terminal and active.
    #[test]
    fn session_state_classification_is_disjoint(status in arb_session_status()) {
        prop_assert!(!(status.is_terminal() && status.is_active()));
    }

    #[test]
    fn task_terminal_states_are_closed(
        from in arb_task_status(),
        to in arb_task_status(),
    ) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    // Status strings roundtrip through the database representation.
    #[test]
    fn session_status_db_string_roundtrip(status in arb_session_status()) {
        let parsed = SessionStatus::from_db_str(status.as_db_str()).unwrap();
        prop_assert_eq!(parsed, status);
    }

    // For an ordered PERT triple, the expectation lies within [O, P] and
    // sigma is non-negative.
    #[test]
    fn pert_expectation_is_bounded(
        optimistic in 0.0f64..100.0,
        spread_likely in 0.0f64..50.0,
        spread_pessimistic in 0.0f64..50.0,
    ) {
        let estimate = TaskEstimate {
            optimistic_hours: optimistic,
            likely_hours: optimistic + spread_likely,
            pessimistic_hours: optimistic + spread_likely + spread_pessimistic,
            ..Default::default()
        };

        let expected = estimate.expected_hours();
        prop_assert!(expected >= estimate.optimistic_hours - 1e-9);
        prop_assert!(expected <= estimate.pessimistic_hours + 1e-9);
        prop_assert!(estimate.standard_deviation_hours() >= 0.0);
    }

    // Repeated identical execution updates converge the likely estimate to
    // the actual and never push confidence past 0.95.
    #[test]
    fn estimate_updates_converge(
        initial in 0.1f64..20.0,
        actual in 0.1f64..20.0,
        rounds in 1usize..30,
    ) {
        let mut estimate = TaskEstimate {
            likely_hours: initial,
            confidence: 0.5,
            ..Default::default()
        };

        let mut last_gap = (estimate.likely_hours - actual).abs();
        for _ in 0..rounds {
            let before = estimate.confidence;
            estimate.update_from_execution(actual, None, None);
            let gap = (estimate.likely_hours - actual).abs();
            prop_assert!(gap <= last_gap + 1e-9);
            prop_assert!(estimate.confidence >= before);
            prop_assert!(estimate.confidence <= 0.95 + 1e-9);
            last_gap = gap;
        }
    }
}
