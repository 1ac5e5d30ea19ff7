//! Explicitly constructed application context.
//!
//! All workflow operations receive an [`AppContext`] instead of reaching
//! for ambient global state. The context owns the entity store, the
//! identity verifier, and the deployment configuration; its lifecycle is
//! tied to the process (or request) boundary by the caller.

use crate::config::{ConfigError, GrantsConfig};
use crate::identity::IdentityVerifier;
use crate::ledger::{GrantStore, LedgerError};
use thiserror::Error;

/// Errors that can occur while constructing a context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be opened.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Shared dependencies for workflow operations.
pub struct AppContext {
    /// The entity store.
    pub store: GrantStore,
    /// Signature verifier bound to this deployment's signing domain.
    pub verifier: IdentityVerifier,
    /// Deployment configuration.
    pub config: GrantsConfig,
}

impl AppContext {
    /// Builds a context from an already-open store and a config.
    #[must_use]
    pub fn new(store: GrantStore, config: GrantsConfig) -> Self {
        let verifier = IdentityVerifier::new(config.domain.clone());
        Self {
            store,
            verifier,
            config,
        }
    }

    /// Opens the store at the configured path and builds a context.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the store cannot be
    /// opened.
    pub fn from_config(config: GrantsConfig) -> Result<Self, ContextError> {
        config.validate()?;
        let store = GrantStore::open(&config.db_path)?;
        Ok(Self::new(store, config))
    }

    /// Builds a context over an in-memory store, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn in_memory(config: GrantsConfig) -> Result<Self, ContextError> {
        config.validate()?;
        let store = GrantStore::in_memory()?;
        Ok(Self::new(store, config))
    }
}
