//! Session state machine states.

use std::fmt;

/// Why a session stopped trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The device explicitly denied the login.
    AuthRejected,
    /// Transient failures used up the retry budget.
    RetriesExhausted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::AuthRejected => f.write_str("login rejected"),
            FailureReason::RetriesExhausted => f.write_str("retries exhausted"),
        }
    }
}

/// Lifecycle state of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No link and no attempt in progress.
    #[default]
    Disconnected,
    /// Scanning for or connecting to the device.
    Connecting,
    /// Link is up, login not yet started.
    ConnectedUnauthenticated,
    /// Login sent, waiting for the device's answer.
    Authenticating,
    /// Logged in; commands are accepted.
    Authenticated,
    /// Stopped trying. Only an explicit connect leaves this state.
    Failed(FailureReason),
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Disconnected -> Connecting | Failed
    /// - Connecting -> ConnectedUnauthenticated | Disconnected | Failed
    /// - ConnectedUnauthenticated -> Authenticating | Connecting | Disconnected | Failed
    /// - Authenticating -> Authenticated | Connecting | Disconnected | Failed
    /// - Authenticated -> Disconnected
    /// - Failed -> Connecting | Disconnected
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Disconnected, Connecting)
                | (Disconnected, Failed(_))
                | (Connecting, ConnectedUnauthenticated)
                | (Connecting, Disconnected)
                | (Connecting, Failed(_))
                | (ConnectedUnauthenticated, Authenticating)
                | (ConnectedUnauthenticated, Connecting)
                | (ConnectedUnauthenticated, Disconnected)
                | (ConnectedUnauthenticated, Failed(_))
                | (Authenticating, Authenticated)
                | (Authenticating, Connecting)
                | (Authenticating, Disconnected)
                | (Authenticating, Failed(_))
                | (Authenticated, Disconnected)
                | (Failed(_), Connecting)
                | (Failed(_), Disconnected)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::SesameError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if session can accept commands.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// Check if a connect sequence is running.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::ConnectedUnauthenticated
                | SessionState::Authenticating
        )
    }

    /// Failure reason, if the session gave up.
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            SessionState::Failed(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::ConnectedUnauthenticated => f.write_str("connected (unauthenticated)"),
            SessionState::Authenticating => f.write_str("authenticating"),
            SessionState::Authenticated => f.write_str("authenticated"),
            SessionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
