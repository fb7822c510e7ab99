// Copyright (c) 2025 - Cowboy AI, Inc.
//! Entry Lifecycle State Machine
//!
//! Every desired-state entry starts `Pending` and takes exactly one
//! transition to a terminal state. There is no retry and no re-entry.
//!
//! # States
//!
//! - Pending: not yet processed
//! - Skipped(validation | unresolved-reference | invalid-enum): nothing written
//! - Resolved(existing | no-drift): record already correct, nothing written
//! - Created / Updated: one write issued
//! - Failed(lookup | create | update | timeout | transport): inventory error
//!
//! # Outputs
//!
//! The log level the outcome is reported at.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Level;

use super::{StateMachine, TransitionError, TransitionResult};
use crate::errors::{EntryError, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Validation,
    UnresolvedReference,
    InvalidEnum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedReason {
    Existing,
    NoDrift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    LookupError,
    CreateError,
    UpdateError,
    Timeout,
    Transport,
}

/// Reconciliation state of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Skipped(SkipReason),
    Resolved(ResolvedReason),
    Created,
    Updated,
    Failed(FailureReason),
}

/// What the engine observed about an entry (FSM input)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEvent {
    Skip(SkipReason),
    Resolve(ResolvedReason),
    Create,
    Update,
    Fail(FailureReason),
}

impl EntryEvent {
    /// Classify an entry-level error
    pub fn from_error(err: &EntryError) -> Self {
        match err {
            EntryError::Validation(_) => EntryEvent::Skip(SkipReason::Validation),
            EntryError::Reference(_) => EntryEvent::Skip(SkipReason::UnresolvedReference),
            EntryError::Enumeration(_) => EntryEvent::Skip(SkipReason::InvalidEnum),
            EntryError::Client { phase, source } => {
                if source.is_timeout() {
                    EntryEvent::Fail(FailureReason::Timeout)
                } else if source.is_transport() {
                    EntryEvent::Fail(FailureReason::Transport)
                } else {
                    EntryEvent::Fail(match phase {
                        Phase::Lookup | Phase::Choices => FailureReason::LookupError,
                        Phase::Create => FailureReason::CreateError,
                        Phase::Update => FailureReason::UpdateError,
                    })
                }
            }
        }
    }
}

impl EntryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EntryState::Pending)
    }

    /// Whether reaching this state issued a write
    pub fn is_write(&self) -> bool {
        matches!(self, EntryState::Created | EntryState::Updated)
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Pending => write!(f, "pending"),
            EntryState::Skipped(SkipReason::Validation) => write!(f, "skipped(validation)"),
            EntryState::Skipped(SkipReason::UnresolvedReference) => {
                write!(f, "skipped(unresolved-reference)")
            }
            EntryState::Skipped(SkipReason::InvalidEnum) => write!(f, "skipped(invalid-enum)"),
            EntryState::Resolved(ResolvedReason::Existing) => write!(f, "resolved(existing)"),
            EntryState::Resolved(ResolvedReason::NoDrift) => write!(f, "resolved(no-drift)"),
            EntryState::Created => write!(f, "created"),
            EntryState::Updated => write!(f, "updated"),
            EntryState::Failed(reason) => {
                let reason = match reason {
                    FailureReason::LookupError => "lookup-error",
                    FailureReason::CreateError => "create-error",
                    FailureReason::UpdateError => "update-error",
                    FailureReason::Timeout => "timeout",
                    FailureReason::Transport => "transport",
                };
                write!(f, "failed({})", reason)
            }
        }
    }
}

impl StateMachine for EntryState {
    type Input = EntryEvent;
    type Output = Level;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        if self.is_terminal() {
            return Err(TransitionError::InvalidTransition {
                from: self.to_string(),
                to: format!("{:?}", input),
            });
        }

        Ok(match *input {
            EntryEvent::Skip(reason) => (EntryState::Skipped(reason), Level::WARN),
            EntryEvent::Resolve(reason) => (EntryState::Resolved(reason), Level::DEBUG),
            EntryEvent::Create => (EntryState::Created, Level::INFO),
            EntryEvent::Update => (EntryState::Updated, Level::INFO),
            EntryEvent::Fail(reason) => (EntryState::Failed(reason), Level::ERROR),
        })
    }
}
