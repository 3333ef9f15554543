//! Pure epoch-transition logic (spec §4.4). No I/O and no locking here —
//! the coordinator calls these functions with a snapshot of the current
//! tally and decides what to do with the `Transition` it gets back.

use crate::config::QuorumPolicy;
use crate::vote::Tally;

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Not enough votes in yet and the epoch hasn't timed out.
    Wait,
    /// Every role cleared its quorum threshold (or all partners are
    /// in and the quorum was met) — move to the next period.
    Advance,
    /// A partner voted No, or the epoch elapsed without reaching quorum.
    Abort(AbortReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    PartnerRefused,
    QuorumNotReached,
}

/// Evaluate a vote-driven epoch (Prepare or Confirm) given the votes
/// collected so far. Call this both when a vote arrives (to catch an early
/// decision) and when the epoch's deadline elapses (`at_deadline = true`,
/// which forces a decision on whatever votes are in hand).
pub fn evaluate(tally: &Tally, quorum: &QuorumPolicy, at_deadline: bool) -> Transition {
    if tally.has_any_refusal() {
        return Transition::Abort(AbortReason::PartnerRefused);
    }
    let quorum_met = tally.meets_quorum(quorum);
    if quorum_met && tally.all_voted() {
        return Transition::Advance;
    }
    if at_deadline {
        return if quorum_met {
            Transition::Advance
        } else {
            Transition::Abort(AbortReason::QuorumNotReached)
        };
    }
    Transition::Wait
}

/// Commit is time-driven, not vote-driven: once the sender has sent
/// `Commit`, a partner simply waits out `commit_ms` and moves to
/// `Finished` (spec §4.4 — there is no commit-phase vote to tally).
pub fn commit_elapsed() -> Transition {
    Transition::Advance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::RoleTally;

    fn tally(yes: usize, no: usize, nominated: usize) -> Tally {
        let role = RoleTally {
            nominated,
            yes,
            no,
            abstain: 0,
        };
        Tally {
            data_supplier: role,
            power_supplier: RoleTally::default(),
            receiver: RoleTally::default(),
        }
    }

    #[test]
    fn unanimous_yes_advances_once_all_voted() {
        let t = tally(2, 0, 2);
        assert_eq!(evaluate(&t, &QuorumPolicy::default(), false), Transition::Advance);
    }

    #[test]
    fn single_refusal_aborts_immediately() {
        let t = tally(1, 1, 2);
        assert_eq!(
            evaluate(&t, &QuorumPolicy::default(), false),
            Transition::Abort(AbortReason::PartnerRefused)
        );
    }

    #[test]
    fn partial_votes_wait_until_deadline() {
        let t = tally(1, 0, 2);
        assert_eq!(evaluate(&t, &QuorumPolicy::default(), false), Transition::Wait);
        assert_eq!(
            evaluate(&t, &QuorumPolicy::default(), true),
            Transition::Abort(AbortReason::QuorumNotReached)
        );
    }

    #[test]
    fn lowered_quorum_tolerates_missing_votes_at_deadline() {
        let t = tally(1, 0, 2);
        let quorum = QuorumPolicy {
            data_supplier: 0.5,
            power_supplier: 1.0,
            receiver: 1.0,
        };
        assert_eq!(evaluate(&t, &quorum, true), Transition::Advance);
    }
}
