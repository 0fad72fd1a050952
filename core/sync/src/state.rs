//! Sync action lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use synctool_common::{Error, Result};

/// Lifecycle state of a sync action.
///
/// ```text
/// Queued -> Active -> Completed
///    \         \
///     `---------`--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncActionState {
    /// Waiting to be applied.
    Queued,
    /// Being applied.
    Active,
    /// Applied successfully.
    Completed,
    /// Dropped without being applied.
    Cancelled,
}

impl SyncActionState {
    /// Every state, in lifecycle order.
    pub const ALL: [SyncActionState; 4] = [
        SyncActionState::Queued,
        SyncActionState::Active,
        SyncActionState::Completed,
        SyncActionState::Cancelled,
    ];

    /// States of actions that still need attention.
    pub const PENDING: [SyncActionState; 2] = [SyncActionState::Queued, SyncActionState::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncActionState::Queued => "queued",
            SyncActionState::Active => "active",
            SyncActionState::Completed => "completed",
            SyncActionState::Cancelled => "cancelled",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SyncActionState::Queued | SyncActionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Check whether the state machine allows moving to `next`.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: SyncActionState) -> bool {
        use SyncActionState::*;
        *self == next
            || matches!(
                (self, next),
                (Queued, Active) | (Active, Completed) | (Queued, Cancelled) | (Active, Cancelled)
            )
    }

    /// Validate a move to `next`.
    ///
    /// # Errors
    /// - `InvalidTransition` if the state machine forbids it
    pub fn transition_to(&self, next: SyncActionState) -> Result<SyncActionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for SyncActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncActionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Format(format!("Unknown sync action state: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SyncActionState::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(Queued.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in [Queued, Active, Cancelled] {
            assert!(!Completed.can_transition_to(next));
        }
        for next in [Queued, Active, Completed] {
            assert!(!Cancelled.can_transition_to(next));
        }
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Queued));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = Completed.transition_to(Active).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition { ref from, ref to } if from == "completed" && to == "active"
        ));
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("Queued".parse::<SyncActionState>().unwrap(), Queued);
        assert_eq!("cancelled".parse::<SyncActionState>().unwrap(), Cancelled);
        assert!("done".parse::<SyncActionState>().is_err());
        assert!(Queued.is_pending() && Active.is_pending());
        assert!(Completed.is_terminal() && Cancelled.is_terminal());
    }
}
