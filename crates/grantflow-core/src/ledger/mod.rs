//! Entity store for grants, stages, milestones, votes, and notes.
//!
//! This module provides the relational ledger backed by `SQLite` with WAL
//! mode. It enforces the referential and numbering invariants of the data
//! model:
//!
//! - **Grant numbering**: unique per (builder, grant kind), assigned as
//!   `max(existing) + 1` inside the creation transaction
//! - **Stage numbering**: 1-based, strictly increasing per grant, with a
//!   uniqueness constraint so racing creations cannot both succeed
//! - **Vote uniqueness**: at most one approval vote per (stage, author);
//!   the second racing insert fails with [`LedgerError::DuplicateVote`]
//! - **Atomic multi-row writes**: stage + milestones, the approval cascade,
//!   and payment + derived stage completion each commit as one transaction
//!
//! Transition legality is NOT checked here; that is the workflow layer's
//! job. The store only guarantees that whatever is written is written
//! consistently.

mod records;
mod store;

#[cfg(test)]
mod tests;

pub use records::{
    ApprovalVote, Grant, GrantFunding, GrantInsert, Milestone, MilestoneDraft, MilestoneStatus,
    ParseEnumError, PrivateNote, PublicGrant, Stage, StageStatus, User, UserRole,
};
pub use store::{CreatedGrant, CreatedStage, GrantStore, LedgerError};
