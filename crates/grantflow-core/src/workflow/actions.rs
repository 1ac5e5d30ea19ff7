//! Signature-gated workflow actions.
//!
//! Every mutating operation runs the same shape: load the affected
//! entities, check authorization and status guards, verify the actor's
//! signature over the server-computed message, then write through the
//! store. Guard checks and writes are not one atomic unit; the races that
//! matter (duplicate votes, racing stage creations) are settled by the
//! store's uniqueness constraints, and a guard that passed stale state
//! fails loudly at the constraint instead of corrupting the ledger.

use super::error::WorkflowError;
use crate::approval;
use crate::context::AppContext;
use crate::identity::{Address, TypedMessage};
use crate::ledger::{
    CreatedGrant, GrantFunding, GrantInsert, MilestoneDraft, MilestoneStatus, StageStatus,
    UserRole,
};

/// Result of a successful stage application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageApplication {
    /// The new stage row.
    pub stage_id: u64,
    /// The server-assigned stage number.
    pub stage_number: u32,
    /// Milestone rows in input order (empty for ETH stages).
    pub milestone_ids: Vec<u64>,
}

/// Result of a successful approval vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    /// The new vote row.
    pub vote_id: u64,
    /// Vote count for the stage after this vote.
    pub vote_count: usize,
    /// Whether the stage may now be finally approved.
    pub final_approval_available: bool,
}

/// Which review an admin applies to a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneReview {
    /// Accept the submitted completion proof.
    Verify,
    /// Record the payout; may derive stage completion.
    Pay,
    /// Send the milestone back to the builder.
    Reject,
}

impl MilestoneReview {
    /// The action string committed to in the signed message.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verify => "verified",
            Self::Pay => "paid",
            Self::Reject => "rejected",
        }
    }

    const fn action_name(&self) -> &'static str {
        match self {
            Self::Verify => "verify_milestone",
            Self::Pay => "pay_milestone",
            Self::Reject => "reject_milestone",
        }
    }
}

/// Result of a successful milestone review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneReviewOutcome {
    /// `true` when paying this milestone completed its stage.
    pub stage_completed: bool,
}

/// The grant workflow state machine, bound to an application context.
pub struct GrantWorkflow<'a> {
    context: &'a AppContext,
}

impl<'a> GrantWorkflow<'a> {
    /// Binds the workflow to a context.
    #[must_use]
    pub const fn new(context: &'a AppContext) -> Self {
        Self { context }
    }

    /// Submits a new grant. The store assigns the grant number and creates
    /// stage 1 in status `proposed`.
    ///
    /// Unsigned: the submission carries no on-chain consequence yet, and
    /// the actor must be the builder named in the request.
    ///
    /// # Errors
    ///
    /// Returns `NotGrantOwner` if the actor is not the named builder, or
    /// `InvalidMilestones` if the milestone set does not fit the funding
    /// variant (ETH grants carry none, USDC grants need at least one).
    pub fn submit_grant(
        &self,
        actor: Address,
        insert: &GrantInsert,
        milestones: &[MilestoneDraft],
    ) -> Result<CreatedGrant, WorkflowError> {
        if actor != insert.builder_address {
            return Err(WorkflowError::NotGrantOwner {
                action: "submit_grant",
            });
        }
        match insert.funding {
            GrantFunding::Eth { .. } if !milestones.is_empty() => {
                return Err(WorkflowError::InvalidMilestones {
                    action: "submit_grant",
                    reason: "eth grants do not carry milestone rows",
                });
            },
            GrantFunding::Usdc if milestones.is_empty() => {
                return Err(WorkflowError::InvalidMilestones {
                    action: "submit_grant",
                    reason: "usdc grants need at least one milestone",
                });
            },
            GrantFunding::Eth { .. } | GrantFunding::Usdc => {},
        }
        Ok(self.context.store.create_grant(insert, milestones)?)
    }

    /// Applies for the next stage of an ETH grant.
    ///
    /// The stage number is server-computed as `latest + 1`; the signature
    /// must cover that number, so a stale client signing for an outdated
    /// number fails verification rather than inserting out of order.
    ///
    /// # Errors
    ///
    /// Returns `WrongGrantKind` for USDC grants, `NotGrantOwner` if the
    /// actor does not own the grant, `InvalidTransition` if the latest
    /// stage is not completed, or an identity error if the signature does
    /// not cover the computed number.
    pub fn apply_for_stage(
        &self,
        actor: Address,
        grant_id: u64,
        milestone: &str,
        signature: &[u8],
    ) -> Result<StageApplication, WorkflowError> {
        let grant = self.context.store.grant_by_id(grant_id)?;
        match grant.funding {
            GrantFunding::Eth { .. } => {},
            GrantFunding::Usdc => {
                return Err(WorkflowError::WrongGrantKind {
                    action: "apply_for_stage",
                    kind: grant.funding.kind(),
                });
            },
        }

        let latest = self.context.store.latest_stage(grant_id)?;
        let stage_number = latest.stage_number + 1;

        let message = TypedMessage::ApplyForStage {
            stage_number: stage_number.to_string(),
            milestone: milestone.to_string(),
        };
        self.context.verifier.verify(&message, signature, actor)?;

        if actor != grant.builder_address {
            return Err(WorkflowError::NotGrantOwner {
                action: "apply_for_stage",
            });
        }
        if latest.status != StageStatus::Completed {
            return Err(WorkflowError::InvalidTransition {
                action: "apply_for_stage",
                status: latest.status,
            });
        }

        let created = self
            .context
            .store
            .create_stage(grant_id, stage_number, Some(milestone), &[])?;
        Ok(StageApplication {
            stage_id: created.stage_id,
            stage_number,
            milestone_ids: created.milestone_ids,
        })
    }

    /// Applies for the next stage of a USDC grant with its milestone set.
    ///
    /// Same guard order as [`Self::apply_for_stage`]; the signed message
    /// covers the server-computed stage number.
    ///
    /// # Errors
    ///
    /// Returns `WrongGrantKind` for ETH grants, `InvalidMilestones` for an
    /// empty set, `NotGrantOwner`, `InvalidTransition`, or an identity
    /// error.
    pub fn apply_for_large_stage(
        &self,
        actor: Address,
        grant_id: u64,
        milestones: &[MilestoneDraft],
        signature: &[u8],
    ) -> Result<StageApplication, WorkflowError> {
        let grant = self.context.store.grant_by_id(grant_id)?;
        match grant.funding {
            GrantFunding::Usdc => {},
            GrantFunding::Eth { .. } => {
                return Err(WorkflowError::WrongGrantKind {
                    action: "apply_for_large_stage",
                    kind: grant.funding.kind(),
                });
            },
        }
        if milestones.is_empty() {
            return Err(WorkflowError::InvalidMilestones {
                action: "apply_for_large_stage",
                reason: "usdc stages need at least one milestone",
            });
        }

        let latest = self.context.store.latest_stage(grant_id)?;
        let stage_number = latest.stage_number + 1;

        let message = TypedMessage::ApplyForLargeStage {
            stage_number: stage_number.to_string(),
        };
        self.context.verifier.verify(&message, signature, actor)?;

        if actor != grant.builder_address {
            return Err(WorkflowError::NotGrantOwner {
                action: "apply_for_large_stage",
            });
        }
        if latest.status != StageStatus::Completed {
            return Err(WorkflowError::InvalidTransition {
                action: "apply_for_large_stage",
                status: latest.status,
            });
        }

        let created = self
            .context
            .store
            .create_stage(grant_id, stage_number, None, milestones)?;
        Ok(StageApplication {
            stage_id: created.stage_id,
            stage_number,
            milestone_ids: created.milestone_ids,
        })
    }

    /// Records an admin's approval vote on a proposed stage.
    ///
    /// Votes are append-only; a second vote from the same admin fails with
    /// `DuplicateVote` from the store regardless of timing.
    ///
    /// # Errors
    ///
    /// Returns `AdminRequired`, `InvalidTransition` if the stage is not
    /// proposed, an identity error, or `DuplicateVote`.
    pub fn vote_approval(
        &self,
        actor: Address,
        stage_id: u64,
        amount: u128,
        signature: &[u8],
    ) -> Result<VoteOutcome, WorkflowError> {
        self.require_admin(actor, "vote_approval")?;

        let stage = self.context.store.stage_by_id(stage_id)?;
        if stage.status != StageStatus::Proposed {
            return Err(WorkflowError::InvalidTransition {
                action: "vote_approval",
                status: stage.status,
            });
        }

        let message = TypedMessage::VoteApproval {
            stage_id: stage_id.to_string(),
            amount: amount.to_string(),
        };
        self.context.verifier.verify(&message, signature, actor)?;

        let vote_id = self.context.store.insert_vote(stage_id, actor, amount)?;
        let votes = self.context.store.votes_for_stage(stage_id)?;
        let available =
            approval::is_final_approval_available(&votes, self.context.config.approval_threshold);
        tracing::info!(
            stage_id,
            vote_count = votes.len(),
            final_approval_available = available,
            "approval vote recorded"
        );
        Ok(VoteOutcome {
            vote_id,
            vote_count: votes.len(),
            final_approval_available: available,
        })
    }

    /// Finally approves a proposed stage, cascading approval to all its
    /// milestones.
    ///
    /// With a threshold above one, approval requires that many recorded
    /// votes first. A threshold of one is the no-voting deployment: the
    /// signed approval itself is the endorsement.
    ///
    /// # Errors
    ///
    /// Returns `AdminRequired`, `InvalidTransition` if the stage is not
    /// proposed, `ThresholdNotMet`, or an identity error.
    pub fn final_approve(
        &self,
        actor: Address,
        stage_id: u64,
        grant_amount: Option<u128>,
        tx_hash: Option<&str>,
        status_note: Option<&str>,
        signature: &[u8],
    ) -> Result<(), WorkflowError> {
        self.require_admin(actor, "final_approve")?;

        let stage = self.context.store.stage_by_id(stage_id)?;
        if stage.status != StageStatus::Proposed {
            return Err(WorkflowError::InvalidTransition {
                action: "final_approve",
                status: stage.status,
            });
        }

        let threshold = self.context.config.approval_threshold;
        if threshold > 1 {
            let votes = self.context.store.votes_for_stage(stage_id)?;
            if !approval::is_final_approval_available(&votes, threshold) {
                return Err(WorkflowError::ThresholdNotMet {
                    stage_id,
                    votes: votes.len(),
                    threshold,
                });
            }
        }

        let grant = self.context.store.grant_by_id(stage.grant_id)?;
        let message =
            review_message(grant.funding, stage_id, "approved", tx_hash, status_note);
        self.context.verifier.verify(&message, signature, actor)?;

        self.context
            .store
            .approve_stage(stage_id, grant_amount, tx_hash, status_note)?;
        Ok(())
    }

    /// Rejects a stage from `proposed` or `approved`.
    ///
    /// # Errors
    ///
    /// Returns `AdminRequired`, `InvalidTransition` from a terminal
    /// status, or an identity error.
    pub fn reject_stage(
        &self,
        actor: Address,
        stage_id: u64,
        status_note: Option<&str>,
        signature: &[u8],
    ) -> Result<(), WorkflowError> {
        self.require_admin(actor, "reject_stage")?;

        let stage = self.context.store.stage_by_id(stage_id)?;
        if stage.status.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                action: "reject_stage",
                status: stage.status,
            });
        }

        let grant = self.context.store.grant_by_id(stage.grant_id)?;
        let message =
            review_message(grant.funding, stage_id, "rejected", None, status_note);
        self.context.verifier.verify(&message, signature, actor)?;

        self.context
            .store
            .set_stage_status(stage_id, StageStatus::Rejected, status_note)?;
        Ok(())
    }

    /// Marks an approved, milestone-less stage as completed.
    ///
    /// Stages with milestone rows complete automatically when the last
    /// milestone is paid; calling this on one fails with
    /// `CompletionIsDerived`. Either an admin or the owning builder may
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthorized`, `CompletionIsDerived`,
    /// `InvalidTransition` if the stage is not approved, or an identity
    /// error.
    pub fn complete_stage(
        &self,
        actor: Address,
        stage_id: u64,
        signature: &[u8],
    ) -> Result<(), WorkflowError> {
        let stage = self.context.store.stage_by_id(stage_id)?;
        let grant = self.context.store.grant_by_id(stage.grant_id)?;

        let user = self.context.store.ensure_user(actor)?;
        if user.role != UserRole::Admin && actor != grant.builder_address {
            return Err(WorkflowError::NotAuthorized {
                action: "complete_stage",
            });
        }

        if !self.context.store.milestones_for_stage(stage_id)?.is_empty() {
            return Err(WorkflowError::CompletionIsDerived { stage_id });
        }
        if stage.status != StageStatus::Approved {
            return Err(WorkflowError::InvalidTransition {
                action: "complete_stage",
                status: stage.status,
            });
        }

        let message = review_message(grant.funding, stage_id, "completed", None, None);
        self.context.verifier.verify(&message, signature, actor)?;

        self.context
            .store
            .set_stage_status(stage_id, StageStatus::Completed, None)?;
        Ok(())
    }

    /// Records completion proof on an approved milestone.
    ///
    /// # Errors
    ///
    /// Returns `NotGrantOwner`, `InvalidMilestoneTransition` unless the
    /// milestone is approved, or an identity error.
    pub fn submit_milestone_completion(
        &self,
        actor: Address,
        milestone_id: u64,
        completion_proof: &str,
        signature: &[u8],
    ) -> Result<(), WorkflowError> {
        let milestone = self.context.store.milestone_by_id(milestone_id)?;
        self.require_milestone_owner(actor, milestone.stage_id, "submit_milestone_completion")?;

        if milestone.status != MilestoneStatus::Approved {
            return Err(WorkflowError::InvalidMilestoneTransition {
                action: "submit_milestone_completion",
                status: milestone.status,
            });
        }

        let message = TypedMessage::SubmitMilestoneCompletion {
            milestone_id: milestone_id.to_string(),
            completion_proof: completion_proof.to_string(),
        };
        self.context.verifier.verify(&message, signature, actor)?;

        self.context
            .store
            .submit_milestone_completion(milestone_id, completion_proof)?;
        Ok(())
    }

    /// Resubmits a rejected milestone with new completion proof, returning
    /// it to `proposed` and clearing the reviewer's note.
    ///
    /// # Errors
    ///
    /// Returns `NotGrantOwner`, `InvalidMilestoneTransition` unless the
    /// milestone is rejected, or an identity error.
    pub fn resubmit_milestone(
        &self,
        actor: Address,
        milestone_id: u64,
        completion_proof: &str,
        signature: &[u8],
    ) -> Result<(), WorkflowError> {
        let milestone = self.context.store.milestone_by_id(milestone_id)?;
        self.require_milestone_owner(actor, milestone.stage_id, "resubmit_milestone")?;

        if milestone.status != MilestoneStatus::Rejected {
            return Err(WorkflowError::InvalidMilestoneTransition {
                action: "resubmit_milestone",
                status: milestone.status,
            });
        }

        let message = TypedMessage::SubmitMilestoneCompletion {
            milestone_id: milestone_id.to_string(),
            completion_proof: completion_proof.to_string(),
        };
        self.context.verifier.verify(&message, signature, actor)?;

        self.context
            .store
            .resubmit_milestone(milestone_id, completion_proof)?;
        Ok(())
    }

    /// Applies an admin review to a milestone.
    ///
    /// Verify requires submitted completion proof; pay requires a payment
    /// transaction reference and may derive stage completion; reject only
    /// applies to a resubmitted (`proposed`) milestone.
    ///
    /// # Errors
    ///
    /// Returns `AdminRequired`, the guard error for the attempted review,
    /// or an identity error.
    pub fn review_milestone(
        &self,
        actor: Address,
        milestone_id: u64,
        review: MilestoneReview,
        payment_tx: Option<&str>,
        status_note: Option<&str>,
        signature: &[u8],
    ) -> Result<MilestoneReviewOutcome, WorkflowError> {
        self.require_admin(actor, review.action_name())?;

        let milestone = self.context.store.milestone_by_id(milestone_id)?;
        match review {
            MilestoneReview::Verify => {
                if milestone.status != MilestoneStatus::Approved {
                    return Err(WorkflowError::InvalidMilestoneTransition {
                        action: review.action_name(),
                        status: milestone.status,
                    });
                }
                if milestone.completion_proof.is_none() {
                    return Err(WorkflowError::MissingCompletionProof { milestone_id });
                }
            },
            MilestoneReview::Pay => {
                if milestone.status != MilestoneStatus::Verified {
                    return Err(WorkflowError::InvalidMilestoneTransition {
                        action: review.action_name(),
                        status: milestone.status,
                    });
                }
                if payment_tx.is_none() {
                    return Err(WorkflowError::PaymentReferenceRequired { milestone_id });
                }
            },
            MilestoneReview::Reject => {
                if milestone.status != MilestoneStatus::Proposed {
                    return Err(WorkflowError::InvalidMilestoneTransition {
                        action: review.action_name(),
                        status: milestone.status,
                    });
                }
            },
        }

        let message = TypedMessage::ReviewMilestone {
            milestone_id: milestone_id.to_string(),
            action: review.as_str().to_string(),
            payment_tx: payment_tx.unwrap_or("").to_string(),
            status_note: status_note.unwrap_or("").to_string(),
        };
        self.context.verifier.verify(&message, signature, actor)?;

        let stage_completed = match review {
            MilestoneReview::Verify => {
                self.context
                    .store
                    .verify_milestone(milestone_id, status_note)?;
                false
            },
            MilestoneReview::Pay => match payment_tx {
                Some(tx) => self.context.store.pay_milestone(milestone_id, tx, status_note)?,
                None => return Err(WorkflowError::PaymentReferenceRequired { milestone_id }),
            },
            MilestoneReview::Reject => {
                self.context
                    .store
                    .reject_milestone(milestone_id, status_note)?;
                false
            },
        };
        Ok(MilestoneReviewOutcome { stage_completed })
    }

    /// Appends an internal admin note to a stage. Unsigned and append-only.
    ///
    /// # Errors
    ///
    /// Returns `AdminRequired` or `StageNotFound`.
    pub fn add_private_note(
        &self,
        actor: Address,
        stage_id: u64,
        note: &str,
    ) -> Result<u64, WorkflowError> {
        self.require_admin(actor, "add_private_note")?;
        self.context.store.stage_by_id(stage_id)?;
        Ok(self.context.store.insert_private_note(stage_id, actor, note)?)
    }

    /// Returns whether a stage has accumulated enough votes for final
    /// approval under the configured threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the vote query fails.
    pub fn final_approval_available(&self, stage_id: u64) -> Result<bool, WorkflowError> {
        let votes = self.context.store.votes_for_stage(stage_id)?;
        Ok(approval::is_final_approval_available(
            &votes,
            self.context.config.approval_threshold,
        ))
    }

    /// Checks that the actor holds the admin role, lazily creating the
    /// user record (role `grantee`) for unknown wallets.
    fn require_admin(&self, actor: Address, action: &'static str) -> Result<(), WorkflowError> {
        let user = self.context.store.ensure_user(actor)?;
        if user.role == UserRole::Admin {
            Ok(())
        } else {
            Err(WorkflowError::AdminRequired { action })
        }
    }

    /// Checks that the actor owns the grant a milestone's stage belongs to.
    fn require_milestone_owner(
        &self,
        actor: Address,
        stage_id: u64,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        let stage = self.context.store.stage_by_id(stage_id)?;
        let grant = self.context.store.grant_by_id(stage.grant_id)?;
        if actor == grant.builder_address {
            Ok(())
        } else {
            Err(WorkflowError::NotGrantOwner { action })
        }
    }
}

/// Builds the stage-review message matching the grant's funding variant.
fn review_message(
    funding: GrantFunding,
    stage_id: u64,
    action: &str,
    tx_hash: Option<&str>,
    status_note: Option<&str>,
) -> TypedMessage {
    let stage_id = stage_id.to_string();
    let action = action.to_string();
    let tx_hash = tx_hash.unwrap_or("").to_string();
    let status_note = status_note.unwrap_or("").to_string();
    match funding {
        GrantFunding::Eth { .. } => TypedMessage::ReviewStage {
            stage_id,
            action,
            tx_hash,
            status_note,
        },
        GrantFunding::Usdc => TypedMessage::ReviewLargeStage {
            stage_id,
            action,
            tx_hash,
            status_note,
        },
    }
}
