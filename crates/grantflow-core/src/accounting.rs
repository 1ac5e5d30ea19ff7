//! Derived financial accounting for grants and stages.
//!
//! All quantities here are recomputed from ledger rows and the external
//! withdrawal feed on every read; nothing is stored. Arithmetic is integer
//! only (`u128` amounts in base currency units, `i128` for the signed
//! pending balance) — floating point would misstate obligations at wei
//! scale.
//!
//! A negative pending balance means more was withdrawn than was granted.
//! That is a reconciliation anomaly: it is surfaced to the caller, never
//! clamped to zero and never turned into an error.

use serde::{Deserialize, Serialize};

use crate::identity::Address;
use crate::ledger::{Grant, GrantFunding, Milestone, MilestoneStatus, Stage, StageStatus};

/// One withdrawal or payment event from the on-chain feed, keyed the way
/// the streaming contract keys them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Builder wallet the stream belongs to.
    pub builder_address: Address,
    /// The builder's grant number on the contract.
    pub grant_number: u32,
    /// The stage the withdrawal was made against.
    pub stage_number: u32,
    /// Amount withdrawn, in base units.
    pub amount: u128,
}

/// Reconciliation verdict for a stage's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reconciliation {
    /// Withdrawn does not exceed granted.
    Balanced,
    /// More was withdrawn than granted; `overdrawn` is the excess.
    Anomaly {
        /// Excess of withdrawn over granted, in base units.
        overdrawn: u128,
    },
}

/// Derived amounts for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFinancials {
    /// Amount requested. For ETH grants this appears on stage 1 only; for
    /// USDC grants it is the sum of milestone amounts.
    pub requested: u128,
    /// Amount granted. Zero while the stage is `proposed` or `rejected`,
    /// regardless of any recorded amount fields.
    pub granted: u128,
    /// Amount withdrawn (ETH, from the withdrawal feed) or paid (USDC,
    /// sum of `paid` milestones).
    pub withdrawn: u128,
    /// `granted - withdrawn`. Negative when over-withdrawn.
    pub pending: i128,
    /// Balance verdict; an anomaly mirrors a negative `pending`.
    pub reconciliation: Reconciliation,
}

/// Derived amounts for a whole grant, folded over its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFinancials {
    /// Sum of per-stage requested amounts.
    pub requested: u128,
    /// Sum of per-stage granted amounts.
    pub granted: u128,
    /// Sum of per-stage withdrawn amounts.
    pub withdrawn: u128,
    /// Sum of per-stage pending balances.
    pub pending: i128,
}

/// Computes the derived amounts for one stage.
///
/// Pure and side-effect free apart from a warning log when the stage is
/// over-withdrawn.
#[must_use]
pub fn stage_financials(
    grant: &Grant,
    stage: &Stage,
    milestones: &[Milestone],
    withdrawals: &[WithdrawalRecord],
) -> StageFinancials {
    let milestone_total = sum(milestones.iter().map(|m| m.amount));

    let requested = match grant.funding {
        GrantFunding::Eth { requested_funds } => {
            if stage.stage_number == 1 {
                requested_funds
            } else {
                0
            }
        },
        GrantFunding::Usdc => milestone_total,
    };

    let granted = match stage.status {
        StageStatus::Proposed | StageStatus::Rejected => 0,
        StageStatus::Approved | StageStatus::Completed => match grant.funding {
            GrantFunding::Eth { .. } => stage.grant_amount.unwrap_or(0),
            GrantFunding::Usdc => milestone_total,
        },
    };

    let withdrawn = match grant.funding {
        GrantFunding::Eth { .. } => sum(withdrawals
            .iter()
            .filter(|w| {
                w.builder_address == grant.builder_address
                    && w.grant_number == grant.grant_number
                    && w.stage_number == stage.stage_number
            })
            .map(|w| w.amount)),
        GrantFunding::Usdc => sum(milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Paid)
            .map(|m| m.amount)),
    };

    let pending = signed_difference(granted, withdrawn);
    let reconciliation = if withdrawn > granted {
        tracing::warn!(
            stage_id = stage.id,
            granted,
            withdrawn,
            "stage over-withdrawn"
        );
        Reconciliation::Anomaly {
            overdrawn: withdrawn - granted,
        }
    } else {
        Reconciliation::Balanced
    };

    StageFinancials {
        requested,
        granted,
        withdrawn,
        pending,
        reconciliation,
    }
}

/// Folds stage financials over a whole grant.
///
/// `stages` pairs each stage with its milestone rows (empty for ETH
/// stages).
#[must_use]
pub fn grant_financials(
    grant: &Grant,
    stages: &[(Stage, Vec<Milestone>)],
    withdrawals: &[WithdrawalRecord],
) -> GrantFinancials {
    let mut totals = GrantFinancials {
        requested: 0,
        granted: 0,
        withdrawn: 0,
        pending: 0,
    };
    for (stage, milestones) in stages {
        let f = stage_financials(grant, stage, milestones, withdrawals);
        totals.requested = totals.requested.saturating_add(f.requested);
        totals.granted = totals.granted.saturating_add(f.granted);
        totals.withdrawn = totals.withdrawn.saturating_add(f.withdrawn);
        totals.pending = totals.pending.saturating_add(f.pending);
    }
    totals
}

/// Sums amounts without wrapping; saturation is unreachable at real
/// currency scales but keeps the arithmetic total-order safe.
fn sum(amounts: impl Iterator<Item = u128>) -> u128 {
    amounts.fold(0u128, u128::saturating_add)
}

/// `a - b` as a signed value, preserving sign for over-withdrawal.
fn signed_difference(a: u128, b: u128) -> i128 {
    if a >= b {
        i128::try_from(a - b).unwrap_or(i128::MAX)
    } else {
        i128::try_from(b - a).map_or(i128::MIN, |d| -d)
    }
}
