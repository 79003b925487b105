//! Device session management.
//!
//! One [`Session`] owns the connection lifecycle of one lock: connect,
//! login, automatic retry and reconnect, command admission and mech
//! status tracking.

mod actor;
mod dispatch;
mod handle;
mod retry;
mod state;

pub use dispatch::{history_tag_payload, CommandKind, DEFAULT_HISTORY_TAG, MAX_HISTORY_TAG_LEN};
pub use handle::{Session, SessionConfig, DEFAULT_LOGIN_TIMEOUT, DEFAULT_SCAN_DURATION};
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY};
pub use state::{FailureReason, SessionState};

/// Positive acknowledgement from the session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ack;
