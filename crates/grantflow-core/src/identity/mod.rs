//! Identity verification for signature-gated grant actions.
//!
//! Every mutating workflow operation carries an EIP-712 style signature
//! produced by the actor's wallet. This module provides:
//!
//! - **Typed messages**: one fixed field schema per action kind, so a
//!   signature over "apply for stage 3" can never authorize a review or a
//!   different stage number.
//! - **Signer recovery**: secp256k1 public-key recovery from the 65-byte
//!   r‖s‖v signature, hashed to a 20-byte wallet address.
//! - **Verification**: byte-for-byte comparison of the recovered address
//!   against the claimed actor.
//!
//! Verification is pure: no entity is read or written here. The workflow
//! layer calls [`IdentityVerifier::verify`] before touching the ledger.
//!
//! # Example
//!
//! ```rust
//! use grantflow_core::identity::{Eip712Domain, IdentityVerifier, TypedMessage};
//!
//! let verifier = IdentityVerifier::new(Eip712Domain {
//!     name: "Grantflow".to_string(),
//!     version: "1".to_string(),
//!     chain_id: 10,
//! });
//!
//! let message = TypedMessage::ApplyForStage {
//!     stage_number: "2".to_string(),
//!     milestone: "Ship the indexer".to_string(),
//! };
//! let digest = verifier.signing_digest(&message);
//! assert_eq!(digest.len(), 32);
//! ```

mod address;
mod message;
mod verify;

pub use address::{ADDRESS_LEN, Address, AddressParseError};
pub use message::{Eip712Domain, TypedMessage};
pub use verify::{IdentityError, IdentityVerifier, SIGNATURE_LEN};
