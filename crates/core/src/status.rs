//! Order and task lifecycle statuses plus the transition rules the
//! repositories and the dispatcher enforce.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. The state machines
//! operate on raw status IDs because IDs are what the database layer
//! stores and what the UPDATE guards compare against.

use crate::error::CoreError;

/// Status ID type matching the SMALLINT lookup tables.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Task execution lifecycle.
    TaskStatus {
        /// Persisted during decomposition, not yet eligible for dispatch.
        New = 1,
        /// Waiting for a free worker slot and account.
        Queued = 2,
        /// Claimed by a worker, executor in flight.
        Running = 3,
        Completed = 4,
        Failed = 5,
    }
}

define_status_enum! {
    /// Order lifecycle as stored on the order row.
    ///
    /// `InProgress`, `Completed`, and `Failed` are derived from task
    /// statuses at read time until the order closes; see
    /// [`derive_order_status`].
    OrderStatus {
        New = 1,
        InProgress = 2,
        Completed = 3,
        Failed = 4,
        /// Rejected before any task was persisted (unknown service,
        /// invalid payload, or decomposition error).
        Aborted = 5,
    }
}

/// Wire name for a task status ID (for API payloads and error messages).
pub fn task_status_name(id: StatusId) -> &'static str {
    match id {
        1 => "new",
        2 => "queued",
        3 => "running",
        4 => "completed",
        5 => "failed",
        _ => "unknown",
    }
}

/// Wire name for an order status ID (for API payloads and error messages).
pub fn order_status_name(id: StatusId) -> &'static str {
    match id {
        1 => "new",
        2 => "in_progress",
        3 => "completed",
        4 => "failed",
        5 => "aborted",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Forward-only task transitions.
///
/// Requeueing a `Running` task is deliberately absent here: it is only
/// legal during startup recovery and is gated by [`task_state_machine::can_requeue`].
pub mod task_state_machine {
    use super::{task_status_name, StatusId, TaskStatus};
    use crate::error::CoreError;

    /// Returns the set of valid target status IDs reachable from `from_status`.
    ///
    /// Terminal states (Completed=4, Failed=5) return an empty slice
    /// because no further transitions are allowed.
    pub fn valid_transitions(from_status: StatusId) -> &'static [StatusId] {
        match from_status {
            // New -> Queued
            1 => &[2],
            // Queued -> Running
            2 => &[3],
            // Running -> Completed, Failed
            3 => &[4, 5],
            // Terminal states: Completed, Failed
            4 | 5 => &[],
            // Unknown status: no transitions allowed
            _ => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: StatusId, to: StatusId) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Whether a task in `from` may be put back on the queue during
    /// startup recovery. Only `Running` tasks orphaned by a crash or
    /// shutdown qualify.
    pub fn can_requeue(from: StatusId) -> bool {
        from == TaskStatus::Running.id()
    }

    /// Validate a state transition, returning a typed error for invalid ones.
    pub fn validate_transition(from: StatusId, to: StatusId) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: task_status_name(from),
                to: task_status_name(to),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Order state machine
// ---------------------------------------------------------------------------

/// Order transitions. Orders only ever move forward; a closed or aborted
/// order never reopens.
pub mod order_state_machine {
    use super::{order_status_name, StatusId};
    use crate::error::CoreError;

    /// Returns the set of valid target status IDs reachable from `from_status`.
    pub fn valid_transitions(from_status: StatusId) -> &'static [StatusId] {
        match from_status {
            // New -> InProgress, Completed, Failed, Aborted
            //
            // New may close directly: recovery fails orphaned orders
            // without passing through InProgress, and an order whose
            // tasks all finish before the first status read was ever
            // derived closes straight from its stored status.
            1 => &[2, 3, 4, 5],
            // InProgress -> Completed, Failed
            2 => &[3, 4],
            // Terminal states: Completed, Failed, Aborted
            3 | 4 | 5 => &[],
            // Unknown status: no transitions allowed
            _ => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: StatusId, to: StatusId) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning a typed error for invalid ones.
    pub fn validate_transition(from: StatusId, to: StatusId) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: order_status_name(from),
                to: order_status_name(to),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Order status derivation
// ---------------------------------------------------------------------------

/// Derive the effective order status from its stored status and the
/// statuses of its tasks.
///
/// An order with no tasks reports its stored status unchanged (covers
/// both `New` orders still being decomposed and `Aborted` orders, which
/// never get tasks). Otherwise:
///
/// - every task completed        -> `Completed`
/// - any task still new/queued/running -> `InProgress`
/// - remaining mix (>= 1 failed, rest terminal) -> `Failed`
pub fn derive_order_status(stored: StatusId, task_statuses: &[StatusId]) -> StatusId {
    if task_statuses.is_empty() {
        return stored;
    }

    let completed = TaskStatus::Completed.id();
    let failed = TaskStatus::Failed.id();

    if task_statuses.iter().all(|s| *s == completed) {
        return OrderStatus::Completed.id();
    }
    if task_statuses.iter().any(|s| *s != completed && *s != failed) {
        return OrderStatus::InProgress.id();
    }
    OrderStatus::Failed.id()
}

/// True when an order status ID is terminal (closed or aborted).
pub fn order_status_is_terminal(id: StatusId) -> bool {
    id == OrderStatus::Completed.id()
        || id == OrderStatus::Failed.id()
        || id == OrderStatus::Aborted.id()
}

/// True when a task status ID is terminal.
pub fn task_status_is_terminal(id: StatusId) -> bool {
    id == TaskStatus::Completed.id() || id == TaskStatus::Failed.id()
}

/// Validate that a raw status ID names a known task status.
pub fn validate_task_status_id(id: StatusId) -> Result<(), CoreError> {
    if (1..=5).contains(&id) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("unknown task status id: {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- status IDs ----------------------------------------------------------

    #[test]
    fn task_status_ids_match_seed_data() {
        assert_eq!(TaskStatus::New.id(), 1);
        assert_eq!(TaskStatus::Queued.id(), 2);
        assert_eq!(TaskStatus::Running.id(), 3);
        assert_eq!(TaskStatus::Completed.id(), 4);
        assert_eq!(TaskStatus::Failed.id(), 5);
    }

    #[test]
    fn order_status_ids_match_seed_data() {
        assert_eq!(OrderStatus::New.id(), 1);
        assert_eq!(OrderStatus::InProgress.id(), 2);
        assert_eq!(OrderStatus::Completed.id(), 3);
        assert_eq!(OrderStatus::Failed.id(), 4);
        assert_eq!(OrderStatus::Aborted.id(), 5);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = TaskStatus::Queued.into();
        assert_eq!(id, 2);
    }

    #[test]
    fn status_names_round_trip() {
        assert_eq!(task_status_name(TaskStatus::Running.id()), "running");
        assert_eq!(order_status_name(OrderStatus::InProgress.id()), "in_progress");
        assert_eq!(task_status_name(99), "unknown");
    }

    // -- task transitions ----------------------------------------------------

    #[test]
    fn new_to_queued() {
        assert!(task_state_machine::can_transition(1, 2));
    }

    #[test]
    fn queued_to_running() {
        assert!(task_state_machine::can_transition(2, 3));
    }

    #[test]
    fn running_to_completed() {
        assert!(task_state_machine::can_transition(3, 4));
    }

    #[test]
    fn running_to_failed() {
        assert!(task_state_machine::can_transition(3, 5));
    }

    #[test]
    fn completed_has_no_transitions() {
        assert!(task_state_machine::valid_transitions(4).is_empty());
    }

    #[test]
    fn failed_has_no_transitions() {
        assert!(task_state_machine::valid_transitions(5).is_empty());
    }

    #[test]
    fn queued_to_completed_invalid() {
        assert!(!task_state_machine::can_transition(2, 4));
    }

    #[test]
    fn running_to_queued_not_a_forward_transition() {
        assert!(!task_state_machine::can_transition(3, 2));
    }

    #[test]
    fn only_running_tasks_can_requeue() {
        assert!(task_state_machine::can_requeue(3));
        assert!(!task_state_machine::can_requeue(2));
        assert!(!task_state_machine::can_requeue(4));
        assert!(!task_state_machine::can_requeue(5));
    }

    #[test]
    fn validate_transition_err_names_both_statuses() {
        let err = task_state_machine::validate_transition(4, 3).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition { from: "completed", to: "running" }
        ));
    }

    // -- order transitions ---------------------------------------------------

    #[test]
    fn new_order_can_abort() {
        assert!(order_state_machine::can_transition(1, 5));
    }

    #[test]
    fn new_order_can_close_directly() {
        assert!(order_state_machine::can_transition(1, 3));
        assert!(order_state_machine::can_transition(1, 4));
    }

    #[test]
    fn in_progress_order_cannot_abort() {
        assert!(!order_state_machine::can_transition(2, 5));
    }

    #[test]
    fn closed_order_never_reopens() {
        assert!(order_state_machine::valid_transitions(3).is_empty());
        assert!(order_state_machine::valid_transitions(4).is_empty());
        assert!(order_state_machine::valid_transitions(5).is_empty());
    }

    // -- derive_order_status -------------------------------------------------

    #[test]
    fn empty_task_list_reports_stored_status() {
        assert_eq!(derive_order_status(OrderStatus::New.id(), &[]), 1);
        assert_eq!(derive_order_status(OrderStatus::Aborted.id(), &[]), 5);
    }

    #[test]
    fn all_completed_derives_completed() {
        let tasks = [TaskStatus::Completed.id(), TaskStatus::Completed.id()];
        assert_eq!(
            derive_order_status(OrderStatus::New.id(), &tasks),
            OrderStatus::Completed.id()
        );
    }

    #[test]
    fn any_active_task_derives_in_progress() {
        let tasks = [TaskStatus::Completed.id(), TaskStatus::Running.id()];
        assert_eq!(
            derive_order_status(OrderStatus::New.id(), &tasks),
            OrderStatus::InProgress.id()
        );
    }

    #[test]
    fn queued_task_keeps_order_in_progress_even_after_a_failure() {
        let tasks = [TaskStatus::Failed.id(), TaskStatus::Queued.id()];
        assert_eq!(
            derive_order_status(OrderStatus::New.id(), &tasks),
            OrderStatus::InProgress.id()
        );
    }

    #[test]
    fn all_terminal_with_a_failure_derives_failed() {
        let tasks = [TaskStatus::Completed.id(), TaskStatus::Failed.id()];
        assert_eq!(
            derive_order_status(OrderStatus::New.id(), &tasks),
            OrderStatus::Failed.id()
        );
    }

    #[test]
    fn terminal_status_predicates() {
        assert!(order_status_is_terminal(OrderStatus::Completed.id()));
        assert!(order_status_is_terminal(OrderStatus::Aborted.id()));
        assert!(!order_status_is_terminal(OrderStatus::InProgress.id()));
        assert!(task_status_is_terminal(TaskStatus::Failed.id()));
        assert!(!task_status_is_terminal(TaskStatus::Queued.id()));
    }
}
