//! Workflow error types.

use thiserror::Error;

use crate::identity::IdentityError;
use crate::ledger::{LedgerError, MilestoneStatus, StageStatus};

/// Errors that can occur while applying a workflow action.
///
/// Every guard violation is a distinct, inspectable variant so the calling
/// layer can map each to an appropriate user-facing status. Nothing here is
/// retried; re-submitting an action that already happened fails the same
/// guard deterministically.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// The action is not legal in the stage's current status.
    #[error("invalid transition: cannot {action} while stage is {status}")]
    InvalidTransition {
        /// The attempted action.
        action: &'static str,
        /// The stage's current status.
        status: StageStatus,
    },

    /// The action is not legal in the milestone's current status.
    #[error("invalid transition: cannot {action} while milestone is {status}")]
    InvalidMilestoneTransition {
        /// The attempted action.
        action: &'static str,
        /// The milestone's current status.
        status: MilestoneStatus,
    },

    /// The action requires the admin role.
    #[error("{action} requires the admin role")]
    AdminRequired {
        /// The attempted action.
        action: &'static str,
    },

    /// The action may only be performed by the grant's owning builder.
    #[error("{action} may only be performed by the grant owner")]
    NotGrantOwner {
        /// The attempted action.
        action: &'static str,
    },

    /// The action requires either the admin role or grant ownership.
    #[error("{action} requires the admin role or grant ownership")]
    NotAuthorized {
        /// The attempted action.
        action: &'static str,
    },

    /// The action targets the wrong grant variant.
    #[error("{action} does not apply to {kind} grants")]
    WrongGrantKind {
        /// The attempted action.
        action: &'static str,
        /// The grant's kind discriminator.
        kind: &'static str,
    },

    /// The milestone set does not fit the grant variant.
    #[error("invalid milestone set for {action}: {reason}")]
    InvalidMilestones {
        /// The attempted action.
        action: &'static str,
        /// What is wrong with the set.
        reason: &'static str,
    },

    /// Stage completion for milestone-based stages is derived from
    /// payments, never set directly.
    #[error("stage {stage_id} completes automatically when all milestones are paid")]
    CompletionIsDerived {
        /// The stage whose completion was attempted directly.
        stage_id: u64,
    },

    /// Final approval requested before enough votes accumulated.
    #[error("final approval of stage {stage_id} requires {threshold} votes, has {votes}")]
    ThresholdNotMet {
        /// The stage being approved.
        stage_id: u64,
        /// Current vote count.
        votes: usize,
        /// Configured minimum.
        threshold: usize,
    },

    /// A milestone cannot be verified before completion proof exists.
    #[error("milestone {milestone_id} has no completion proof to verify")]
    MissingCompletionProof {
        /// The milestone being verified.
        milestone_id: u64,
    },

    /// Paying a milestone requires a payment transaction reference.
    #[error("paying milestone {milestone_id} requires a payment transaction reference")]
    PaymentReferenceRequired {
        /// The milestone being paid.
        milestone_id: u64,
    },

    /// Signature verification failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The underlying store failed or a referenced entity is absent.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
