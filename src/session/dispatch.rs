//! Lock/unlock admission and single-flight bookkeeping.

use tokio::sync::oneshot;

use super::{Ack, SessionState};
use crate::error::{CommandError, TransportError};
use crate::transport::Opcode;

/// History tag used when the caller has nothing better.
pub const DEFAULT_HISTORY_TAG: &str = "hass.io";

/// Longest history tag the device stores, in bytes.
pub const MAX_HISTORY_TAG_LEN: usize = 21;

/// Lock mechanism command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Lock,
    Unlock,
}

impl CommandKind {
    pub fn opcode(&self) -> Opcode {
        match self {
            CommandKind::Lock => Opcode::Lock,
            CommandKind::Unlock => Opcode::Unlock,
        }
    }
}

/// Length-prefixed history tag, truncated on a UTF-8 boundary.
pub fn history_tag_payload(tag: &str) -> Vec<u8> {
    let mut end = tag.len().min(MAX_HISTORY_TAG_LEN);
    while !tag.is_char_boundary(end) {
        end -= 1;
    }
    let mut payload = Vec::with_capacity(1 + end);
    payload.push(end as u8);
    payload.extend_from_slice(&tag.as_bytes()[..end]);
    payload
}

pub(crate) type CommandReply = oneshot::Sender<Result<Ack, CommandError>>;

/// The one command allowed in flight.
#[derive(Debug)]
pub(crate) struct PendingCommand {
    id: u64,
    kind: CommandKind,
    tag: String,
    reply: CommandReply,
}

/// Admitted command, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub(crate) id: u64,
    pub(crate) opcode: Opcode,
    pub(crate) payload: Vec<u8>,
}

/// Enforces "authenticated" and "one at a time" per device.
#[derive(Debug, Default)]
pub(crate) struct CommandDispatcher {
    next_id: u64,
    pending: Option<PendingCommand>,
}

impl CommandDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admit a command or answer the caller right away.
    ///
    /// On rejection the reply is sent here and `None` is returned.
    pub(crate) fn begin(
        &mut self,
        state: SessionState,
        kind: CommandKind,
        tag: String,
        reply: CommandReply,
    ) -> Option<Ticket> {
        let verdict = if !state.is_authenticated() {
            Err(CommandError::NotReady(state))
        } else if self.pending.is_some() {
            Err(CommandError::Busy)
        } else {
            Ok(())
        };

        if let Err(err) = verdict {
            let _ = reply.send(Err(err));
            return None;
        }

        self.next_id += 1;
        let ticket = Ticket {
            id: self.next_id,
            opcode: kind.opcode(),
            payload: history_tag_payload(&tag),
        };
        self.pending = Some(PendingCommand {
            id: ticket.id,
            kind,
            tag,
            reply,
        });
        Some(ticket)
    }

    /// Deliver the write outcome. Returns the finished command's kind and tag.
    pub(crate) fn complete(
        &mut self,
        id: u64,
        result: Result<(), TransportError>,
    ) -> Option<(CommandKind, String)> {
        if self.pending.as_ref().map(|p| p.id) != Some(id) {
            return None;
        }
        let pending = self.pending.take()?;
        let _ = pending
            .reply
            .send(result.map(|()| Ack).map_err(CommandError::Transport));
        Some((pending.kind, pending.tag))
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}
