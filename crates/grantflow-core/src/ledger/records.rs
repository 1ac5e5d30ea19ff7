//! Entity records for the grant ledger.
//!
//! Amounts are `u128` in memory (wei / USDC base units) and stored as
//! decimal TEXT so they round-trip exactly. Timestamps are unix seconds.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Address;

/// Error for an unrecognized enum value read from the database.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {field} value: {value}")]
pub struct ParseEnumError {
    /// Which enum field failed to parse.
    pub field: &'static str,
    /// The offending stored value.
    pub value: String,
}

/// Lifecycle status of a stage.
///
/// `proposed` is initial; `completed` and `rejected` are terminal for the
/// stage. Only the latest stage of a grant is ever mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Awaiting review.
    Proposed,
    /// Approved for funding.
    Approved,
    /// All funds delivered; a new stage may now be created.
    Completed,
    /// Rejected by an admin; no further progress for this stage.
    Rejected,
}

impl StageStatus {
    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Returns `true` if no further status change is legal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "approved" => Ok(Self::Approved),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                field: "stage status",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a milestone within a large-grant stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    /// Awaiting stage approval.
    Proposed,
    /// Approved alongside its stage; deliverable in progress.
    Approved,
    /// Completion proof verified by an admin.
    Verified,
    /// Paid out; terminal.
    Paid,
    /// Rejected; may be resubmitted, re-entering `proposed`.
    Rejected,
}

impl MilestoneStatus {
    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Verified => "verified",
            Self::Paid => "paid",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MilestoneStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "approved" => Ok(Self::Approved),
            "verified" => Ok(Self::Verified),
            "paid" => Ok(Self::Paid),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                field: "milestone status",
                value: other.to_string(),
            }),
        }
    }
}

/// Role of a wallet in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Reviews, votes on, and approves stages.
    Admin,
    /// Submits and owns grants. Default for lazily created users.
    Grantee,
}

impl UserRole {
    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Grantee => "grantee",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "grantee" => Ok(Self::Grantee),
            other => Err(ParseEnumError {
                field: "user role",
                value: other.to_string(),
            }),
        }
    }
}

/// Funding shape of a grant. The closed tagged union distinguishing the
/// two grant variants; consumers of mixed lists match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GrantFunding {
    /// Native-currency grant: a single requested amount in wei, per-stage
    /// grant amounts recorded at approval time.
    Eth {
        /// Requested funds in wei.
        requested_funds: u128,
    },
    /// Stablecoin large grant: amounts live on per-stage milestones.
    Usdc,
}

impl GrantFunding {
    /// Returns the stored discriminator string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Eth { .. } => "eth",
            Self::Usdc => "usdc",
        }
    }
}

/// A builder's funding request track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Row identity.
    pub id: u64,
    /// Sequential number, unique per (builder, kind), starting at 1.
    pub grant_number: u32,
    /// Grant title.
    pub title: String,
    /// Grant description.
    pub description: String,
    /// Planned milestones text (covers stage 1 of ETH grants).
    pub milestones: Option<String>,
    /// Funding variant discriminator and amount.
    pub funding: GrantFunding,
    /// Optional showcase video link.
    pub showcase_video_url: Option<String>,
    /// GitHub handle or repository of the builder.
    pub github: String,
    /// Contact email.
    pub email: String,
    /// Optional Twitter handle.
    pub twitter: Option<String>,
    /// Optional Telegram handle.
    pub telegram: Option<String>,
    /// Submission time, unix seconds.
    pub submitted_at: u64,
    /// Owning builder wallet.
    pub builder_address: Address,
}

impl Grant {
    /// Strips contact fields for unauthenticated listings.
    #[must_use]
    pub fn to_public(&self) -> PublicGrant {
        PublicGrant {
            id: self.id,
            grant_number: self.grant_number,
            title: self.title.clone(),
            description: self.description.clone(),
            milestones: self.milestones.clone(),
            funding: self.funding,
            showcase_video_url: self.showcase_video_url.clone(),
            submitted_at: self.submitted_at,
            builder_address: self.builder_address,
        }
    }
}

/// Public projection of a grant; email and social handles are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicGrant {
    /// Row identity.
    pub id: u64,
    /// Sequential number, unique per (builder, kind).
    pub grant_number: u32,
    /// Grant title.
    pub title: String,
    /// Grant description.
    pub description: String,
    /// Planned milestones text.
    pub milestones: Option<String>,
    /// Funding variant discriminator and amount.
    pub funding: GrantFunding,
    /// Optional showcase video link.
    pub showcase_video_url: Option<String>,
    /// Submission time, unix seconds.
    pub submitted_at: u64,
    /// Owning builder wallet.
    pub builder_address: Address,
}

/// Fields supplied when creating a grant. The grant number and stage 1 are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantInsert {
    /// Grant title.
    pub title: String,
    /// Grant description.
    pub description: String,
    /// Planned milestones text.
    pub milestones: Option<String>,
    /// Funding variant.
    pub funding: GrantFunding,
    /// Optional showcase video link.
    pub showcase_video_url: Option<String>,
    /// GitHub handle or repository.
    pub github: String,
    /// Contact email.
    pub email: String,
    /// Optional Twitter handle.
    pub twitter: Option<String>,
    /// Optional Telegram handle.
    pub telegram: Option<String>,
    /// Owning builder wallet.
    pub builder_address: Address,
}

/// One funding tranche within a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Row identity.
    pub id: u64,
    /// Owning grant.
    pub grant_id: u64,
    /// 1-based, strictly increasing per grant.
    pub stage_number: u32,
    /// Milestone description text for this stage (ETH grants, stage 2+).
    pub milestone: Option<String>,
    /// Amount granted at approval, in base units.
    pub grant_amount: Option<u128>,
    /// Current lifecycle status.
    pub status: StageStatus,
    /// Note recorded with the last status change.
    pub status_note: Option<String>,
    /// Approval transaction reference.
    pub approved_tx: Option<String>,
    /// Approval time, unix seconds.
    pub approved_at: Option<u64>,
    /// Submission time, unix seconds.
    pub submitted_at: u64,
}

/// A deliverable within a large-grant stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Row identity.
    pub id: u64,
    /// Owning stage.
    pub stage_id: u64,
    /// 1-based, assigned in input order at stage creation.
    pub milestone_number: u32,
    /// What will be delivered.
    pub description: String,
    /// Concrete deliverables text.
    pub proposed_deliverables: String,
    /// Amount in USDC base units.
    pub amount: u128,
    /// Current lifecycle status.
    pub status: MilestoneStatus,
    /// Proposed completion date, unix seconds.
    pub proposed_completion_date: Option<u64>,
    /// Builder-submitted completion proof.
    pub completion_proof: Option<String>,
    /// Note recorded with the last review.
    pub status_note: Option<String>,
    /// Payment transaction reference.
    pub payment_tx: Option<String>,
    /// When completion proof was submitted, unix seconds.
    pub completed_at: Option<u64>,
    /// When the proof was verified, unix seconds.
    pub verified_at: Option<u64>,
    /// When payment was recorded, unix seconds.
    pub paid_at: Option<u64>,
}

/// Fields supplied per milestone when creating a large-grant stage.
/// Numbering is assigned by the store in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDraft {
    /// What will be delivered.
    pub description: String,
    /// Concrete deliverables text.
    pub proposed_deliverables: String,
    /// Amount in USDC base units.
    pub amount: u128,
    /// Proposed completion date, unix seconds.
    pub proposed_completion_date: Option<u64>,
}

/// One admin's vote to approve a stage.
///
/// At most one vote per (stage, author) pair; enforced by a uniqueness
/// constraint, never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalVote {
    /// Row identity.
    pub id: u64,
    /// The stage voted on.
    pub stage_id: u64,
    /// Voting admin.
    pub author_address: Address,
    /// Endorsed grant amount in base units.
    pub amount: u128,
    /// Vote time, unix seconds.
    pub voted_at: u64,
}

/// An internal admin annotation on a stage. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateNote {
    /// Row identity.
    pub id: u64,
    /// The annotated stage.
    pub stage_id: u64,
    /// Authoring admin.
    pub author_address: Address,
    /// Note text.
    pub note: String,
    /// Write time, unix seconds.
    pub written_at: u64,
}

/// A wallet known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row identity.
    pub id: u64,
    /// Wallet address, unique.
    pub address: Address,
    /// Assigned role.
    pub role: UserRole,
}

impl ToSql for StageStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StageStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for MilestoneStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MilestoneStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for UserRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Address {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Address {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_stage_status_roundtrip() {
        for status in [
            StageStatus::Proposed,
            StageStatus::Approved,
            StageStatus::Completed,
            StageStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<StageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_stage_status_terminal() {
        assert!(!StageStatus::Proposed.is_terminal());
        assert!(!StageStatus::Approved.is_terminal());
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "paid".parse::<StageStatus>().unwrap_err();
        assert_eq!(err.value, "paid");
    }

    #[test]
    fn test_milestone_status_roundtrip() {
        for status in [
            MilestoneStatus::Proposed,
            MilestoneStatus::Approved,
            MilestoneStatus::Verified,
            MilestoneStatus::Paid,
            MilestoneStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<MilestoneStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_funding_kind_discriminator() {
        assert_eq!(GrantFunding::Eth { requested_funds: 1 }.kind(), "eth");
        assert_eq!(GrantFunding::Usdc.kind(), "usdc");
    }
}
