// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for reconciliation runs
//!
//! Errors come in two scopes:
//!
//! - [`EntryError`] belongs to a single desired-state entry. It is always
//!   recovered by the engine and turned into a reported outcome.
//! - [`SyncError`] ends a run (or prevents one from starting): the session
//!   could not be acquired, configuration is unusable, or a desired-state
//!   document could not be read.

use std::fmt;
use thiserror::Error;

use crate::client::ClientError;

/// Errors that abort a reconciliation run before or around the engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// The inventory session could not be acquired
    #[error("Session acquisition failed: {0}")]
    SessionAcquire(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A desired-state or facts document could not be loaded
    #[error("Failed to load {path}: {reason}")]
    Document { path: String, reason: String },

    /// Inventory client could not be constructed
    #[error("Inventory client error: {0}")]
    Client(#[from] ClientError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for run-level operations
pub type SyncResult<T> = Result<T, SyncError>;

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

/// Which inventory call an entry-level client error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lookup,
    Choices,
    Create,
    Update,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Lookup => "lookup",
            Phase::Choices => "choices",
            Phase::Create => "create",
            Phase::Update => "update",
        };
        f.write_str(s)
    }
}

/// Errors local to one desired-state entry
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EntryError {
    /// A required field is missing or a key field is malformed
    #[error("validation failed: {0}")]
    Validation(String),

    /// A foreign key could not be resolved
    #[error("unresolved reference: {0}")]
    Reference(String),

    /// An enumerated field holds a value the inventory does not advertise
    #[error("invalid value: {0}")]
    Enumeration(String),

    /// The inventory client rejected or failed a call
    #[error("{phase} failed: {source}")]
    Client {
        phase: Phase,
        #[source]
        source: ClientError,
    },
}

impl EntryError {
    pub fn client(phase: Phase, source: ClientError) -> Self {
        EntryError::Client { phase, source }
    }

    /// Whether the inventory itself became unreachable
    pub fn is_transport(&self) -> bool {
        matches!(self, EntryError::Client { source, .. } if source.is_transport())
    }
}
