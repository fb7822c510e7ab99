// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Transitions are pure functions with no side effects:
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! The only machine in this crate is the per-entry reconciliation lifecycle
//! in [`entry_lifecycle`].

pub mod entry_lifecycle;

pub use entry_lifecycle::{EntryEvent, EntryState, FailureReason, ResolvedReason, SkipReason};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Trait for finite state machines
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Switch {
        Off,
        On,
    }

    struct Press;

    impl StateMachine for Switch {
        type Input = Press;
        type Output = ();

        fn transition(&self, _input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
            match self {
                Switch::Off => Ok((Switch::On, ())),
                Switch::On => Err(TransitionError::InvalidTransition {
                    from: "On".to_string(),
                    to: "On".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_can_transition() {
        assert!(Switch::Off.can_transition(&Press));
        assert!(!Switch::On.can_transition(&Press));
    }
}
