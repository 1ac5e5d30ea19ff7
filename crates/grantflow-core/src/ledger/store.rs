//! `SQLite`-backed grant store implementation.
//!
//! The store owns a single connection behind a mutex. Multi-row mutations
//! (stage + milestones, approval cascade, payment + derived completion) run
//! inside one transaction so a crash mid-insert cannot leave milestones
//! without a parent or with wrong numbering. Uniqueness constraints are the
//! concurrency guard for duplicate votes and racing stage creations.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OpenFlags, Row, Transaction};
use thiserror::Error;

use super::records::{
    ApprovalVote, Grant, GrantFunding, GrantInsert, Milestone, MilestoneDraft, PrivateNote,
    PublicGrant, Stage, StageStatus, User, UserRole,
};
use crate::identity::Address;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Referenced grant does not exist.
    #[error("grant not found: {grant_id}")]
    GrantNotFound {
        /// The grant ID that was not found.
        grant_id: u64,
    },

    /// Referenced stage does not exist.
    #[error("stage not found: {stage_id}")]
    StageNotFound {
        /// The stage ID that was not found.
        stage_id: u64,
    },

    /// Referenced milestone does not exist.
    #[error("milestone not found: {milestone_id}")]
    MilestoneNotFound {
        /// The milestone ID that was not found.
        milestone_id: u64,
    },

    /// The author already voted on this stage.
    #[error("duplicate vote on stage {stage_id} by {author}")]
    DuplicateVote {
        /// The stage being voted on.
        stage_id: u64,
        /// The author whose second vote was rejected.
        author: Address,
    },

    /// A stage with this number already exists for the grant. Raised when
    /// two "create next stage" requests race; exactly one wins.
    #[error("stage number {stage_number} already exists for grant {grant_id}")]
    StageNumberConflict {
        /// The grant being extended.
        grant_id: u64,
        /// The contested stage number.
        stage_number: u32,
    },
}

/// Identities assigned when a grant is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedGrant {
    /// The new grant row.
    pub grant_id: u64,
    /// The assigned per-builder grant number.
    pub grant_number: u32,
    /// The auto-created stage 1.
    pub stage_id: u64,
    /// Stage 1's milestone rows in input order (empty for ETH grants).
    pub milestone_ids: Vec<u64>,
}

/// Identities assigned when a stage is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedStage {
    /// The new stage row.
    pub stage_id: u64,
    /// Milestone rows in input order (empty for ETH stages).
    pub milestone_ids: Vec<u64>,
}

/// The grant entity store, backed by `SQLite` with WAL mode.
pub struct GrantStore {
    conn: Arc<Mutex<Connection>>,
}

impl GrantStore {
    /// Opens or creates a store at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates a grant together with its stage 1 (status `proposed`).
    ///
    /// The grant number is `max(existing numbers for this builder and
    /// kind) + 1`, computed inside the same transaction as the insert.
    /// For USDC grants, `milestones` become stage 1's milestone rows,
    /// numbered from 1 in input order; pass an empty slice for ETH grants.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is written on error.
    pub fn create_grant(
        &self,
        insert: &GrantInsert,
        milestones: &[MilestoneDraft],
    ) -> Result<CreatedGrant, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_secs();

        tx.execute(
            "INSERT OR IGNORE INTO users (address, role) VALUES (?1, 'grantee')",
            params![insert.builder_address],
        )?;

        let max_number: u32 = tx.query_row(
            "SELECT COALESCE(MAX(grant_number), 0) FROM grants
             WHERE builder_address = ?1 AND kind = ?2",
            params![insert.builder_address, insert.funding.kind()],
            |row| row.get(0),
        )?;
        let grant_number = max_number + 1;

        let requested_funds = match insert.funding {
            GrantFunding::Eth { requested_funds } => Some(requested_funds.to_string()),
            GrantFunding::Usdc => None,
        };

        tx.execute(
            "INSERT INTO grants (kind, grant_number, title, description, milestones,
                                 requested_funds, showcase_video_url, github, email,
                                 twitter, telegram, submitted_at, builder_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                insert.funding.kind(),
                grant_number,
                insert.title,
                insert.description,
                insert.milestones,
                requested_funds,
                insert.showcase_video_url,
                insert.github,
                insert.email,
                insert.twitter,
                insert.telegram,
                now,
                insert.builder_address,
            ],
        )?;
        let grant_id = tx.last_insert_rowid() as u64;

        let created = insert_stage(&tx, grant_id, 1, None, milestones, now)?;

        tx.commit()?;
        tracing::info!(grant_id, grant_number, kind = insert.funding.kind(), "grant created");
        Ok(CreatedGrant {
            grant_id,
            grant_number,
            stage_id: created.stage_id,
            milestone_ids: created.milestone_ids,
        })
    }

    /// Reads a grant by ID.
    ///
    /// # Errors
    ///
    /// Returns `GrantNotFound` if no grant exists with that ID.
    pub fn grant_by_id(&self, grant_id: u64) -> Result<Grant, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {GRANT_COLUMNS} FROM grants WHERE id = ?1"),
            params![grant_id],
            grant_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::GrantNotFound { grant_id },
            other => LedgerError::Database(other),
        })
    }

    /// Reads all grants of a builder, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn builder_grants(&self, builder: Address) -> Result<Vec<Grant>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {GRANT_COLUMNS} FROM grants
             WHERE builder_address = ?1
             ORDER BY submitted_at DESC, id DESC"
        ))?;
        let grants = stmt
            .query_map(params![builder], grant_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    /// Reads all grants of both kinds, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_grants(&self) -> Result<Vec<Grant>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {GRANT_COLUMNS} FROM grants ORDER BY submitted_at DESC, id DESC"
        ))?;
        let grants = stmt
            .query_map([], grant_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    /// Reads all grants as public projections, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn public_grants(&self) -> Result<Vec<PublicGrant>, LedgerError> {
        Ok(self
            .all_grants()?
            .iter()
            .map(Grant::to_public)
            .collect())
    }

    /// Reads the stages of a grant, latest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stages_for_grant(&self, grant_id: u64) -> Result<Vec<Stage>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAGE_COLUMNS} FROM stages
             WHERE grant_id = ?1
             ORDER BY stage_number DESC"
        ))?;
        let stages = stmt
            .query_map(params![grant_id], stage_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stages)
    }

    /// Reads the most recent stage of a grant.
    ///
    /// # Errors
    ///
    /// Returns `GrantNotFound` if the grant has no stages (every created
    /// grant has at least one).
    pub fn latest_stage(&self, grant_id: u64) -> Result<Stage, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {STAGE_COLUMNS} FROM stages
                 WHERE grant_id = ?1
                 ORDER BY stage_number DESC
                 LIMIT 1"
            ),
            params![grant_id],
            stage_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::GrantNotFound { grant_id },
            other => LedgerError::Database(other),
        })
    }

    /// Reads a stage by ID.
    ///
    /// # Errors
    ///
    /// Returns `StageNotFound` if no stage exists with that ID.
    pub fn stage_by_id(&self, stage_id: u64) -> Result<Stage, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {STAGE_COLUMNS} FROM stages WHERE id = ?1"),
            params![stage_id],
            stage_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::StageNotFound { stage_id },
            other => LedgerError::Database(other),
        })
    }

    /// Creates a stage, optionally with milestone rows, in one transaction.
    ///
    /// Milestones are numbered from 1 in input order.
    ///
    /// # Errors
    ///
    /// Returns `StageNumberConflict` if a stage with this number already
    /// exists for the grant (two racing creations: one wins).
    pub fn create_stage(
        &self,
        grant_id: u64,
        stage_number: u32,
        milestone: Option<&str>,
        milestones: &[MilestoneDraft],
    ) -> Result<CreatedStage, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let created = insert_stage(&tx, grant_id, stage_number, milestone, milestones, now_secs())
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::StageNumberConflict {
                        grant_id,
                        stage_number,
                    }
                } else {
                    LedgerError::Database(e)
                }
            })?;
        tx.commit()?;
        tracing::info!(grant_id, stage_number, "stage created");
        Ok(created)
    }

    /// Reads the milestones of a stage in milestone-number order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn milestones_for_stage(&self, stage_id: u64) -> Result<Vec<Milestone>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones
             WHERE stage_id = ?1
             ORDER BY milestone_number ASC"
        ))?;
        let milestones = stmt
            .query_map(params![stage_id], milestone_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(milestones)
    }

    /// Reads a milestone by ID.
    ///
    /// # Errors
    ///
    /// Returns `MilestoneNotFound` if no milestone exists with that ID.
    pub fn milestone_by_id(&self, milestone_id: u64) -> Result<Milestone, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?1"),
            params![milestone_id],
            milestone_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                LedgerError::MilestoneNotFound { milestone_id }
            },
            other => LedgerError::Database(other),
        })
    }

    /// Approves a stage and cascades approval to all its milestones in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `StageNotFound` if the stage does not exist.
    pub fn approve_stage(
        &self,
        stage_id: u64,
        grant_amount: Option<u128>,
        approved_tx: Option<&str>,
        status_note: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let affected = tx.execute(
            "UPDATE stages
             SET status = 'approved', grant_amount = COALESCE(?2, grant_amount),
                 approved_tx = ?3, status_note = ?4, approved_at = ?5
             WHERE id = ?1",
            params![
                stage_id,
                grant_amount.map(|a| a.to_string()),
                approved_tx,
                status_note,
                now_secs(),
            ],
        )?;
        if affected == 0 {
            return Err(LedgerError::StageNotFound { stage_id });
        }

        tx.execute(
            "UPDATE milestones SET status = 'approved' WHERE stage_id = ?1",
            params![stage_id],
        )?;

        tx.commit()?;
        tracing::info!(stage_id, "stage approved");
        Ok(())
    }

    /// Sets a stage's status and note (used for reject and legacy complete).
    ///
    /// # Errors
    ///
    /// Returns `StageNotFound` if the stage does not exist.
    pub fn set_stage_status(
        &self,
        stage_id: u64,
        status: StageStatus,
        status_note: Option<&str>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE stages SET status = ?2, status_note = COALESCE(?3, status_note)
             WHERE id = ?1",
            params![stage_id, status, status_note],
        )?;
        if affected == 0 {
            return Err(LedgerError::StageNotFound { stage_id });
        }
        tracing::info!(stage_id, status = %status, "stage status updated");
        Ok(())
    }

    /// Inserts an approval vote.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateVote` if this author already voted on the stage.
    /// Two racing votes from the same author: exactly one succeeds.
    pub fn insert_vote(
        &self,
        stage_id: u64,
        author: Address,
        amount: u128,
    ) -> Result<u64, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO approval_votes (stage_id, author_address, amount, voted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![stage_id, author, amount.to_string(), now_secs()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateVote { stage_id, author }
            } else {
                LedgerError::Database(e)
            }
        })?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Reads the votes of a stage in vote order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn votes_for_stage(&self, stage_id: u64) -> Result<Vec<ApprovalVote>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, stage_id, author_address, amount, voted_at
             FROM approval_votes
             WHERE stage_id = ?1
             ORDER BY id ASC",
        )?;
        let votes = stmt
            .query_map(params![stage_id], |row| {
                Ok(ApprovalVote {
                    id: row.get::<_, i64>(0)? as u64,
                    stage_id: row.get::<_, i64>(1)? as u64,
                    author_address: row.get(2)?,
                    amount: parse_amount(3, &row.get::<_, String>(3)?)?,
                    voted_at: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(votes)
    }

    /// Appends a private note to a stage. Notes are never edited or deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_private_note(
        &self,
        stage_id: u64,
        author: Address,
        note: &str,
    ) -> Result<u64, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO private_notes (stage_id, author_address, note, written_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![stage_id, author, note, now_secs()],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Reads the private notes of a stage in write order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn notes_for_stage(&self, stage_id: u64) -> Result<Vec<PrivateNote>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, stage_id, author_address, note, written_at
             FROM private_notes
             WHERE stage_id = ?1
             ORDER BY id ASC",
        )?;
        let notes = stmt
            .query_map(params![stage_id], |row| {
                Ok(PrivateNote {
                    id: row.get::<_, i64>(0)? as u64,
                    stage_id: row.get::<_, i64>(1)? as u64,
                    author_address: row.get(2)?,
                    note: row.get(3)?,
                    written_at: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Returns the user for an address, creating it with role `grantee` if
    /// no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or lookup fails.
    pub fn ensure_user(&self, address: Address) -> Result<User, LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO users (address, role) VALUES (?1, 'grantee')",
            params![address],
        )?;
        let user = conn.query_row(
            "SELECT id, address, role FROM users WHERE address = ?1",
            params![address],
            |row| {
                Ok(User {
                    id: row.get::<_, i64>(0)? as u64,
                    address: row.get(1)?,
                    role: row.get(2)?,
                })
            },
        )?;
        Ok(user)
    }

    /// Sets the role of a user, creating the record if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_user_role(&self, address: Address, role: UserRole) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (address, role) VALUES (?1, ?2)
             ON CONFLICT(address) DO UPDATE SET role = excluded.role",
            params![address, role],
        )?;
        Ok(())
    }

    /// Records submitted completion proof on a milestone.
    ///
    /// # Errors
    ///
    /// Returns `MilestoneNotFound` if the milestone does not exist.
    pub fn submit_milestone_completion(
        &self,
        milestone_id: u64,
        completion_proof: &str,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE milestones SET completion_proof = ?2, completed_at = ?3 WHERE id = ?1",
            params![milestone_id, completion_proof, now_secs()],
        )?;
        if affected == 0 {
            return Err(LedgerError::MilestoneNotFound { milestone_id });
        }
        Ok(())
    }

    /// Returns a rejected milestone to `proposed` with new completion proof.
    ///
    /// # Errors
    ///
    /// Returns `MilestoneNotFound` if the milestone does not exist.
    pub fn resubmit_milestone(
        &self,
        milestone_id: u64,
        completion_proof: &str,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE milestones
             SET status = 'proposed', completion_proof = ?2, status_note = NULL,
                 completed_at = ?3
             WHERE id = ?1",
            params![milestone_id, completion_proof, now_secs()],
        )?;
        if affected == 0 {
            return Err(LedgerError::MilestoneNotFound { milestone_id });
        }
        Ok(())
    }

    /// Marks a milestone's completion proof as verified.
    ///
    /// # Errors
    ///
    /// Returns `MilestoneNotFound` if the milestone does not exist.
    pub fn verify_milestone(
        &self,
        milestone_id: u64,
        status_note: Option<&str>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE milestones
             SET status = 'verified', status_note = COALESCE(?2, status_note), verified_at = ?3
             WHERE id = ?1",
            params![milestone_id, status_note, now_secs()],
        )?;
        if affected == 0 {
            return Err(LedgerError::MilestoneNotFound { milestone_id });
        }
        tracing::info!(milestone_id, "milestone verified");
        Ok(())
    }

    /// Rejects a milestone with a note.
    ///
    /// # Errors
    ///
    /// Returns `MilestoneNotFound` if the milestone does not exist.
    pub fn reject_milestone(
        &self,
        milestone_id: u64,
        status_note: Option<&str>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE milestones
             SET status = 'rejected', status_note = COALESCE(?2, status_note)
             WHERE id = ?1",
            params![milestone_id, status_note],
        )?;
        if affected == 0 {
            return Err(LedgerError::MilestoneNotFound { milestone_id });
        }
        tracing::info!(milestone_id, "milestone rejected");
        Ok(())
    }

    /// Records payment of a milestone; if it was the stage's last unpaid
    /// milestone, completes the stage in the same transaction.
    ///
    /// Returns `true` when the stage transitioned to `completed`.
    ///
    /// # Errors
    ///
    /// Returns `MilestoneNotFound` if the milestone does not exist.
    pub fn pay_milestone(
        &self,
        milestone_id: u64,
        payment_tx: &str,
        status_note: Option<&str>,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let affected = tx.execute(
            "UPDATE milestones
             SET status = 'paid', payment_tx = ?2, status_note = COALESCE(?3, status_note),
                 paid_at = ?4
             WHERE id = ?1",
            params![milestone_id, payment_tx, status_note, now_secs()],
        )?;
        if affected == 0 {
            return Err(LedgerError::MilestoneNotFound { milestone_id });
        }

        let stage_id: u64 = tx.query_row(
            "SELECT stage_id FROM milestones WHERE id = ?1",
            params![milestone_id],
            |row| row.get::<_, i64>(0).map(|id| id as u64),
        )?;
        let unpaid: u32 = tx.query_row(
            "SELECT COUNT(*) FROM milestones WHERE stage_id = ?1 AND status != 'paid'",
            params![stage_id],
            |row| row.get(0),
        )?;

        let stage_completed = unpaid == 0;
        if stage_completed {
            tx.execute(
                "UPDATE stages SET status = 'completed' WHERE id = ?1",
                params![stage_id],
            )?;
        }

        tx.commit()?;
        tracing::info!(milestone_id, stage_id, stage_completed, "milestone paid");
        Ok(stage_completed)
    }
}

const GRANT_COLUMNS: &str = "id, kind, grant_number, title, description, milestones, \
                             requested_funds, showcase_video_url, github, email, twitter, \
                             telegram, submitted_at, builder_address";

const STAGE_COLUMNS: &str = "id, grant_id, stage_number, milestone, grant_amount, status, \
                             status_note, approved_tx, approved_at, submitted_at";

const MILESTONE_COLUMNS: &str = "id, stage_id, milestone_number, description, \
                                 proposed_deliverables, amount, status, \
                                 proposed_completion_date, completion_proof, status_note, \
                                 payment_tx, completed_at, verified_at, paid_at";

/// An eth-kind grant row with a NULL `requested_funds` column.
#[derive(Debug, Error)]
#[error("eth grant is missing requested_funds")]
struct MissingRequestedFunds;

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<Grant> {
    let kind: String = row.get(1)?;
    let requested_funds: Option<String> = row.get(6)?;
    let funding = match kind.as_str() {
        "eth" => {
            let text = requested_funds.ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Null,
                    Box::new(MissingRequestedFunds),
                )
            })?;
            GrantFunding::Eth {
                requested_funds: parse_amount(6, &text)?,
            }
        },
        _ => GrantFunding::Usdc,
    };

    Ok(Grant {
        id: row.get::<_, i64>(0)? as u64,
        grant_number: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        milestones: row.get(5)?,
        funding,
        showcase_video_url: row.get(7)?,
        github: row.get(8)?,
        email: row.get(9)?,
        twitter: row.get(10)?,
        telegram: row.get(11)?,
        submitted_at: row.get::<_, i64>(12)? as u64,
        builder_address: row.get(13)?,
    })
}

fn stage_from_row(row: &Row<'_>) -> rusqlite::Result<Stage> {
    let grant_amount = row
        .get::<_, Option<String>>(4)?
        .map(|text| parse_amount(4, &text))
        .transpose()?;
    Ok(Stage {
        id: row.get::<_, i64>(0)? as u64,
        grant_id: row.get::<_, i64>(1)? as u64,
        stage_number: row.get(2)?,
        milestone: row.get(3)?,
        grant_amount,
        status: row.get(5)?,
        status_note: row.get(6)?,
        approved_tx: row.get(7)?,
        approved_at: row.get::<_, Option<i64>>(8)?.map(|t| t as u64),
        submitted_at: row.get::<_, i64>(9)? as u64,
    })
}

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: row.get::<_, i64>(0)? as u64,
        stage_id: row.get::<_, i64>(1)? as u64,
        milestone_number: row.get(2)?,
        description: row.get(3)?,
        proposed_deliverables: row.get(4)?,
        amount: parse_amount(5, &row.get::<_, String>(5)?)?,
        status: row.get(6)?,
        proposed_completion_date: row.get::<_, Option<i64>>(7)?.map(|t| t as u64),
        completion_proof: row.get(8)?,
        status_note: row.get(9)?,
        payment_tx: row.get(10)?,
        completed_at: row.get::<_, Option<i64>>(11)?.map(|t| t as u64),
        verified_at: row.get::<_, Option<i64>>(12)?.map(|t| t as u64),
        paid_at: row.get::<_, Option<i64>>(13)?.map(|t| t as u64),
    })
}

/// Inserts a stage and its milestone rows inside an open transaction.
fn insert_stage(
    tx: &Transaction<'_>,
    grant_id: u64,
    stage_number: u32,
    milestone: Option<&str>,
    milestones: &[MilestoneDraft],
    now: u64,
) -> rusqlite::Result<CreatedStage> {
    tx.execute(
        "INSERT INTO stages (grant_id, stage_number, milestone, submitted_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![grant_id, stage_number, milestone, now],
    )?;
    let stage_id = tx.last_insert_rowid() as u64;

    let mut milestone_ids = Vec::with_capacity(milestones.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO milestones (stage_id, milestone_number, description,
                                     proposed_deliverables, amount, proposed_completion_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (index, draft) in milestones.iter().enumerate() {
            stmt.execute(params![
                stage_id,
                index as u32 + 1,
                draft.description,
                draft.proposed_deliverables,
                draft.amount.to_string(),
                draft.proposed_completion_date.map(|t| t as i64),
            ])?;
            milestone_ids.push(tx.last_insert_rowid() as u64);
        }
    }

    Ok(CreatedStage {
        stage_id,
        milestone_ids,
    })
}

fn parse_amount(column: usize, text: &str) -> rusqlite::Result<u128> {
    text.parse().map_err(|e: std::num::ParseIntError| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
