//! Signer recovery and verification.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use thiserror::Error;

use super::address::Address;
use super::message::{Eip712Domain, TypedMessage};

/// Length of an r‖s‖v recoverable signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// Errors that can occur during identity verification.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The signature could not be parsed or recovered against the message.
    #[error("malformed signature for {action}: {reason}")]
    MalformedSignature {
        /// The action the signature was submitted for.
        action: &'static str,
        /// Why parsing or recovery failed.
        reason: String,
    },

    /// The recovered signer does not match the claimed actor.
    #[error("recovered signer {recovered} does not match claimed signer {claimed} for {action}")]
    SignerMismatch {
        /// The action the signature was submitted for.
        action: &'static str,
        /// The address actually recovered from the signature.
        recovered: Address,
        /// The address the caller claimed to be.
        claimed: Address,
    },
}

/// Verifies that an action message was signed by a claimed wallet.
///
/// Holds the EIP-712 domain so every digest is scoped to this deployment.
/// Verification is pure and side-effect free; it gates every mutating
/// workflow operation.
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    domain: Eip712Domain,
}

impl IdentityVerifier {
    /// Creates a verifier for the given signing domain.
    #[must_use]
    pub const fn new(domain: Eip712Domain) -> Self {
        Self { domain }
    }

    /// Returns the signing digest a client must sign for `message`.
    #[must_use]
    pub fn signing_digest(&self, message: &TypedMessage) -> [u8; 32] {
        message.signing_digest(&self.domain)
    }

    /// Recovers the signer address from a 65-byte r‖s‖v signature.
    ///
    /// Accepts both raw recovery ids (0/1) and the Ethereum convention
    /// (27/28).
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MalformedSignature`] if the signature has
    /// the wrong length, an unknown recovery id, or does not recover to a
    /// valid public key for this message digest.
    pub fn recover_signer(
        &self,
        message: &TypedMessage,
        signature: &[u8],
    ) -> Result<Address, IdentityError> {
        let action = message.action_name();

        if signature.len() != SIGNATURE_LEN {
            return Err(IdentityError::MalformedSignature {
                action,
                reason: format!(
                    "expected {SIGNATURE_LEN} bytes, got {}",
                    signature.len()
                ),
            });
        }

        let sig = Signature::from_slice(&signature[..64]).map_err(|e| {
            IdentityError::MalformedSignature {
                action,
                reason: e.to_string(),
            }
        })?;

        let v = signature[64];
        let recovery_byte = match v {
            0 | 1 => v,
            27 | 28 => v - 27,
            other => {
                return Err(IdentityError::MalformedSignature {
                    action,
                    reason: format!("unknown recovery id {other}"),
                });
            },
        };
        let recovery_id = RecoveryId::try_from(recovery_byte).map_err(|e| {
            IdentityError::MalformedSignature {
                action,
                reason: e.to_string(),
            }
        })?;

        let digest = message.signing_digest(&self.domain);
        let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id).map_err(|e| {
            IdentityError::MalformedSignature {
                action,
                reason: e.to_string(),
            }
        })?;

        Ok(Address::from_uncompressed_point(
            key.to_encoded_point(false).as_bytes(),
        ))
    }

    /// Verifies that `signature` over `message` was produced by `claimed`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SignerMismatch`] when the recovered address
    /// differs from the claimed one, or [`IdentityError::MalformedSignature`]
    /// when recovery fails.
    pub fn verify(
        &self,
        message: &TypedMessage,
        signature: &[u8],
        claimed: Address,
    ) -> Result<(), IdentityError> {
        let recovered = self.recover_signer(message, signature)?;
        if recovered == claimed {
            Ok(())
        } else {
            Err(IdentityError::SignerMismatch {
                action: message.action_name(),
                recovered,
                claimed,
            })
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use k256::ecdsa::SigningKey;

    use super::*;

    fn verifier() -> IdentityVerifier {
        IdentityVerifier::new(Eip712Domain {
            name: "Grantflow".to_string(),
            version: "1".to_string(),
            chain_id: 10,
        })
    }

    fn test_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    fn address_of(key: &SigningKey) -> Address {
        Address::from_uncompressed_point(key.verifying_key().to_encoded_point(false).as_bytes())
    }

    fn sign(verifier: &IdentityVerifier, key: &SigningKey, message: &TypedMessage) -> Vec<u8> {
        let digest = verifier.signing_digest(message);
        let (sig, recovery_id) = key.sign_prehash_recoverable(&digest).unwrap();
        let mut bytes = sig.to_vec();
        bytes.push(recovery_id.to_byte());
        bytes
    }

    fn apply_message() -> TypedMessage {
        TypedMessage::ApplyForStage {
            stage_number: "2".to_string(),
            milestone: "Ship the indexer".to_string(),
        }
    }

    #[test]
    fn test_recover_matches_signer() {
        let v = verifier();
        let key = test_key(0x42);
        let message = apply_message();
        let signature = sign(&v, &key, &message);

        let recovered = v.recover_signer(&message, &signature).unwrap();
        assert_eq!(recovered, address_of(&key));
        v.verify(&message, &signature, address_of(&key)).unwrap();
    }

    #[test]
    fn test_ethereum_v_offset_accepted() {
        let v = verifier();
        let key = test_key(0x42);
        let message = apply_message();
        let mut signature = sign(&v, &key, &message);
        signature[64] += 27;

        v.verify(&message, &signature, address_of(&key)).unwrap();
    }

    #[test]
    fn test_tampered_field_fails_verification() {
        let v = verifier();
        let key = test_key(0x42);
        let signature = sign(&v, &key, &apply_message());

        // Same signature, different stage number: either recovery produces a
        // different address or fails outright. Never a clean pass.
        let tampered = TypedMessage::ApplyForStage {
            stage_number: "3".to_string(),
            milestone: "Ship the indexer".to_string(),
        };
        let result = v.verify(&tampered, &signature, address_of(&key));
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_claimed_signer_rejected() {
        let v = verifier();
        let signer = test_key(0x42);
        let impostor = test_key(0x17);
        let message = apply_message();
        let signature = sign(&v, &signer, &message);

        let result = v.verify(&message, &signature, address_of(&impostor));
        assert!(matches!(
            result,
            Err(IdentityError::SignerMismatch { recovered, claimed, .. })
                if recovered == address_of(&signer) && claimed == address_of(&impostor)
        ));
    }

    #[test]
    fn test_truncated_signature_malformed() {
        let v = verifier();
        let result = v.recover_signer(&apply_message(), &[0u8; 64]);
        assert!(matches!(
            result,
            Err(IdentityError::MalformedSignature { .. })
        ));
    }

    #[test]
    fn test_unknown_recovery_id_malformed() {
        let v = verifier();
        let key = test_key(0x42);
        let message = apply_message();
        let mut signature = sign(&v, &key, &message);
        signature[64] = 9;

        let result = v.recover_signer(&message, &signature);
        assert!(matches!(
            result,
            Err(IdentityError::MalformedSignature { .. })
        ));
    }

    #[test]
    fn test_zeroed_signature_malformed() {
        let v = verifier();
        let result = v.recover_signer(&apply_message(), &[0u8; SIGNATURE_LEN]);
        assert!(matches!(
            result,
            Err(IdentityError::MalformedSignature { .. })
        ));
    }
}
