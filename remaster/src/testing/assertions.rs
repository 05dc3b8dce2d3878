//! Test assertions for workflow events.

use crate::core::{Stage, WorkflowEvent};

/// Dotted type names of `events`, in order.
#[must_use]
pub fn event_types(events: &[WorkflowEvent]) -> Vec<&'static str> {
    events.iter().map(WorkflowEvent::event_type).collect()
}

/// Asserts that `expected` appears in `events` as an ordered subsequence.
pub fn assert_event_order(events: &[WorkflowEvent], expected: &[&str]) {
    let actual = event_types(events);
    let mut remaining = expected.iter().peekable();
    for event_type in &actual {
        if remaining.peek().is_some_and(|next| *next == event_type) {
            remaining.next();
        }
    }
    assert!(
        remaining.peek().is_none(),
        "Expected events {:?} in order, got {:?}",
        expected,
        actual
    );
}

/// Asserts the current stage.
pub fn assert_stage(actual: Stage, expected: Stage) {
    assert_eq!(
        actual, expected,
        "Expected stage '{}', got '{}'",
        expected, actual
    );
}
