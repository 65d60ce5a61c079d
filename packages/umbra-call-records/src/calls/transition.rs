//! # Status Transitions
//!
//! Which call status changes are legal. Pure functions, no storage.
//!
//! ```text
//! Individual                         Group
//! ──────────                         ─────
//!
//!  pending ──► incomingMissed         generic ──► joined ──────────┐
//!     │             │  │                 │                         │
//!     │             ▼  │                 ├──► ringing ──► joined   │
//!     ├──────► notAccepted               │       │                 ▼
//!     │             │  │                 │       ├──► ringingMissed ──► ringingDeclined
//!     │             ▼  ▼                 │       ├──► ringingDeclined     │
//!     └──────────► accepted              │       └──────────────────┐     │
//!                                        │                          ▼     ▼
//!                                        └──(any ringing-class)──► ringingAccepted
//! ```
//!
//! Nothing moves back into `pending` or `generic`, and no status
//! transitions to itself. Disallowed transitions are rejected quietly by
//! callers; they are a normal consequence of events arriving out of order.

use super::record::{CallStatus, GroupCallStatus, IndividualCallStatus};

/// Whether a one-to-one call may move from `from` to `to`
pub fn is_individual_transition_allowed(from: IndividualCallStatus, to: IndividualCallStatus) -> bool {
    use IndividualCallStatus::*;

    match from {
        Pending => matches!(to, IncomingMissed | NotAccepted | Accepted),
        IncomingMissed => matches!(to, NotAccepted | Accepted),
        NotAccepted => matches!(to, Accepted),
        Accepted => false,
    }
}

/// Whether a group call may move from `from` to `to`
pub fn is_group_transition_allowed(from: GroupCallStatus, to: GroupCallStatus) -> bool {
    use GroupCallStatus::*;

    match from {
        Generic => matches!(
            to,
            Joined | Ringing | RingingMissed | RingingDeclined | RingingAccepted
        ),
        Joined => matches!(to, RingingAccepted),
        Ringing => matches!(to, Joined | RingingMissed | RingingDeclined | RingingAccepted),
        RingingMissed => matches!(to, RingingDeclined | RingingAccepted),
        RingingDeclined => matches!(to, RingingAccepted),
        RingingAccepted => false,
    }
}

/// Whether a call may move from `from` to `to`.
///
/// Statuses of different call classes never transition into each other.
pub fn is_transition_allowed(from: CallStatus, to: CallStatus) -> bool {
    match (from, to) {
        (CallStatus::Individual(from), CallStatus::Individual(to)) => {
            is_individual_transition_allowed(from, to)
        }
        (CallStatus::Group(from), CallStatus::Group(to)) => is_group_transition_allowed(from, to),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_individual_transitions_match_table() {
        use IndividualCallStatus::*;

        let allowed: HashSet<(IndividualCallStatus, IndividualCallStatus)> = [
            (Pending, IncomingMissed),
            (Pending, NotAccepted),
            (Pending, Accepted),
            (NotAccepted, Accepted),
            (IncomingMissed, NotAccepted),
            (IncomingMissed, Accepted),
        ]
        .into_iter()
        .collect();

        for from in IndividualCallStatus::ALL {
            for to in IndividualCallStatus::ALL {
                assert_eq!(
                    is_individual_transition_allowed(from, to),
                    allowed.contains(&(from, to)),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_group_transitions_match_table() {
        use GroupCallStatus::*;

        let allowed: HashSet<(GroupCallStatus, GroupCallStatus)> = [
            (Generic, Joined),
            (Generic, Ringing),
            (Generic, RingingMissed),
            (Generic, RingingDeclined),
            (Generic, RingingAccepted),
            (Joined, RingingAccepted),
            (Ringing, Joined),
            (Ringing, RingingMissed),
            (Ringing, RingingDeclined),
            (Ringing, RingingAccepted),
            (RingingDeclined, RingingAccepted),
            (RingingMissed, RingingDeclined),
            (RingingMissed, RingingAccepted),
        ]
        .into_iter()
        .collect();

        for from in GroupCallStatus::ALL {
            for to in GroupCallStatus::ALL {
                assert_eq!(
                    is_group_transition_allowed(from, to),
                    allowed.contains(&(from, to)),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_nothing_returns_to_initial_state() {
        for from in IndividualCallStatus::ALL {
            assert!(!is_individual_transition_allowed(from, IndividualCallStatus::Pending));
        }
        for from in GroupCallStatus::ALL {
            assert!(!is_group_transition_allowed(from, GroupCallStatus::Generic));
        }
    }

    #[test]
    fn test_cross_class_transitions_rejected() {
        for individual in IndividualCallStatus::ALL {
            for group in GroupCallStatus::ALL {
                assert!(!is_transition_allowed(
                    CallStatus::Individual(individual),
                    CallStatus::Group(group)
                ));
                assert!(!is_transition_allowed(
                    CallStatus::Group(group),
                    CallStatus::Individual(individual)
                ));
            }
        }
    }
}
