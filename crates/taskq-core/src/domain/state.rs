//! Per-delivery state machine of the worker loop.

use serde::{Deserialize, Serialize};

use super::outcome::OutcomeStatus;

/// State of one delivery being processed by a worker.
///
/// State transitions:
/// - Fetched -> Executing -> Completed -> Acknowledged
/// - Fetched -> Executing -> Failed -> Acknowledged
///
/// `Executing` is the transient "pending" label: it only exists in memory and
/// is never written anywhere. A worker that dies before `Acknowledged` leaves
/// the message on the queue, where it becomes visible again after the
/// visibility timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptState {
    /// Received from the queued pool, not yet decoded.
    Fetched,

    /// Decoded (or failed to decode) and handed to the handler.
    Executing,

    /// The handler returned a value.
    Completed,

    /// Decode failure, unknown handler, argument mismatch, handler error or panic.
    Failed,

    /// Source message deleted from the queued pool.
    Acknowledged,
}

impl AttemptState {
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Fetched, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Completed, Acknowledged)
                | (Failed, Acknowledged)
        )
    }

    /// Move to `next`. Illegal transitions are a worker bug.
    pub fn advance(self, next: AttemptState) -> AttemptState {
        debug_assert!(
            self.can_transition_to(next),
            "illegal attempt transition {self:?} -> {next:?}"
        );
        next
    }

    /// Has the attempt produced a terminal outcome?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Completed | AttemptState::Failed | AttemptState::Acknowledged
        )
    }
}

impl From<OutcomeStatus> for AttemptState {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Completed => AttemptState::Completed,
            OutcomeStatus::Failed => AttemptState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AttemptState::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Fetched, Executing, true)]
    #[case(Executing, Completed, true)]
    #[case(Executing, Failed, true)]
    #[case(Completed, Acknowledged, true)]
    #[case(Failed, Acknowledged, true)]
    #[case(Fetched, Acknowledged, false)]
    #[case(Fetched, Completed, false)]
    #[case(Completed, Failed, false)]
    #[case(Acknowledged, Fetched, false)]
    fn transitions(#[case] from: AttemptState, #[case] to: AttemptState, #[case] ok: bool) {
        assert_eq!(from.can_transition_to(to), ok);
    }

    #[test]
    fn outcome_status_maps_to_terminal_state() {
        assert_eq!(AttemptState::from(OutcomeStatus::Completed), Completed);
        assert_eq!(AttemptState::from(OutcomeStatus::Failed), Failed);
        assert!(Failed.is_terminal());
        assert!(!Executing.is_terminal());
    }
}
