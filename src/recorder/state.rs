// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle

use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Where a recording session is in its lifecycle
///
/// ```text
/// Idle -> Opening -> Recording -> Closing -> Done
///            |           |
///            +-----------+-------> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Opening,
    Recording,
    Closing,
    Done,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Aborted)
    }

    /// Whether `next` may follow this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Opening)
                | (Opening, Recording)
                | (Opening, Aborted)
                | (Recording, Closing)
                | (Recording, Aborted)
                | (Closing, Done)
        )
    }

    /// Process exit code for a finished session
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionState::Done => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Recording => "recording",
            SessionState::Closing => "closing",
            SessionState::Done => "done",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Current state plus every state visited
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: SessionState,
    history: Vec<SessionState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            current: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }
}

impl StateMachine {
    pub fn current(&self) -> SessionState {
        self.current
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Move to `next`. Illegal transitions are ignored and return false.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.current.can_transition_to(next) {
            debug!(from = %self.current, to = %next, "Ignoring illegal session transition");
            return false;
        }
        info!(from = %self.current, to = %next, "Session state");
        self.current = next;
        self.history.push(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::default();
        for next in [
            SessionState::Opening,
            SessionState::Recording,
            SessionState::Closing,
            SessionState::Done,
        ] {
            assert!(sm.advance(next));
        }
        assert!(sm.current().is_terminal());
        assert_eq!(sm.current().exit_code(), 0);
        assert_eq!(sm.history().len(), 5);
    }

    #[test]
    fn test_illegal_transitions_ignored() {
        let mut sm = StateMachine::default();
        assert!(!sm.advance(SessionState::Recording));
        assert!(sm.advance(SessionState::Opening));
        assert!(sm.advance(SessionState::Aborted));
        // Terminal states are final
        assert!(!sm.advance(SessionState::Closing));
        assert_eq!(sm.current(), SessionState::Aborted);
        assert_eq!(sm.current().exit_code(), 1);
    }
}
