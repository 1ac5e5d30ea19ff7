//! # grantflow-core
//!
//! Core engine for a multi-stage grant program: signature-authorized
//! workflow transitions over a relational grant ledger, with derived
//! financial accounting.
//!
//! Grants come in two funding variants. ETH grants carry a single
//! requested amount and fund stage by stage; USDC (large) grants break
//! each stage into per-milestone payouts. Both move through the same
//! stage lifecycle: `proposed`, `approved`, `completed`, with `rejected`
//! as the terminal off-ramp.
//!
//! Every mutating action is authorized by an EIP-712 wallet signature
//! over a server-computed message, so an approval signed for one stage
//! can never be replayed against another stage, action, or deployment.
//!
//! ## Modules
//!
//! - [`identity`]: addresses, typed message digests, signer recovery
//! - [`ledger`]: the `SQLite`-backed entity store
//! - [`workflow`]: the signature-gated state machine over the ledger
//! - [`approval`]: vote-threshold policy for final approval
//! - [`accounting`]: derived per-stage and per-grant financials
//! - [`config`]: TOML deployment configuration
//! - [`context`]: explicit dependency container for workflow operations
//!
//! ## Example
//!
//! ```rust
//! use grantflow_core::config::GrantsConfig;
//! use grantflow_core::context::AppContext;
//! use grantflow_core::workflow::GrantWorkflow;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = AppContext::in_memory(GrantsConfig::default())?;
//! let workflow = GrantWorkflow::new(&ctx);
//! let grants = ctx.store.all_grants()?;
//! assert!(grants.is_empty());
//! # let _ = workflow;
//! # Ok(())
//! # }
//! ```

pub mod accounting;
pub mod approval;
pub mod config;
pub mod context;
pub mod identity;
pub mod ledger;
pub mod workflow;

pub use config::GrantsConfig;
pub use context::AppContext;
pub use identity::{Address, Eip712Domain, IdentityVerifier, TypedMessage};
pub use ledger::{GrantFunding, GrantStore, LedgerError};
pub use workflow::{GrantWorkflow, WorkflowError};
