//! Approval vote aggregation.
//!
//! Final approval of a stage becomes available once the configured minimum
//! number of reviewer votes has accumulated. The check is recomputed from
//! the vote rows on every read and never cached: votes are append-only and
//! small in number, so recomputation is cheaper than invalidation.
//!
//! Duplicate votes are impossible by construction (one vote per
//! (stage, author), enforced by the ledger's uniqueness constraint), so no
//! tie-break logic exists here.

use crate::ledger::ApprovalVote;

/// Returns `true` once `vote_count` has reached `threshold`.
///
/// Boundary: `threshold - 1` votes leave final approval unavailable;
/// exactly `threshold` votes make it available. Votes beyond the threshold
/// are harmless (there is no upper bound on votes).
#[must_use]
pub const fn final_approval_available(vote_count: usize, threshold: usize) -> bool {
    vote_count >= threshold
}

/// Convenience wrapper over a stage's vote rows.
#[must_use]
pub fn is_final_approval_available(votes: &[ApprovalVote], threshold: usize) -> bool {
    final_approval_available(votes.len(), threshold)
}

/// Returns how many more votes are needed before final approval, zero once
/// the threshold is met.
#[must_use]
pub const fn votes_remaining(vote_count: usize, threshold: usize) -> usize {
    threshold.saturating_sub(vote_count)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        assert!(!final_approval_available(0, 2));
        assert!(!final_approval_available(1, 2));
        assert!(final_approval_available(2, 2));
    }

    #[test]
    fn test_votes_beyond_threshold_still_available() {
        assert!(final_approval_available(3, 2));
        assert!(final_approval_available(17, 2));
    }

    #[test]
    fn test_threshold_one() {
        assert!(!final_approval_available(0, 1));
        assert!(final_approval_available(1, 1));
    }

    #[test]
    fn test_votes_remaining() {
        assert_eq!(votes_remaining(0, 2), 2);
        assert_eq!(votes_remaining(1, 2), 1);
        assert_eq!(votes_remaining(2, 2), 0);
        assert_eq!(votes_remaining(5, 2), 0);
    }
}
