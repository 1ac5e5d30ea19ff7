//! Grant workflow state machine.
//!
//! Ties together the ledger, the identity verifier, and the approval
//! policy: every mutating action checks authorization and the stage or
//! milestone status, verifies the actor's wallet signature over the
//! server-computed message payload, and only then writes. Illegal
//! transitions are rejected with a typed error; nothing panics on bad
//! input.

mod actions;
mod error;


pub use actions::{
    GrantWorkflow, MilestoneReview, MilestoneReviewOutcome, StageApplication, VoteOutcome,
};
pub use error::WorkflowError;
