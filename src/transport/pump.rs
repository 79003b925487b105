//! Hand-off of transport events into a session mailbox.
//!
//! Adapters deliver events from their own execution context. The pump
//! moves them, in arrival order, into the single consumer that owns the
//! session state so that no state is touched from the adapter's side.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::TransportEvent;

/// Forwards a device's event stream into a mailbox.
pub struct EventPump<M, F>
where
    F: Fn(TransportEvent) -> M,
{
    events: mpsc::Receiver<TransportEvent>,
    mailbox: mpsc::Sender<M>,
    wrap: F,
}

impl<M, F> EventPump<M, F>
where
    M: Send + 'static,
    F: Fn(TransportEvent) -> M + Send + 'static,
{
    /// Create a new pump.
    ///
    /// # Arguments
    ///
    /// * `events` - The adapter's event stream.
    /// * `mailbox` - Sender of the consuming task.
    /// * `wrap` - Turns an event into the consumer's message type.
    pub fn new(events: mpsc::Receiver<TransportEvent>, mailbox: mpsc::Sender<M>, wrap: F) -> Self {
        Self {
            events,
            mailbox,
            wrap,
        }
    }

    /// Run until the event stream ends or the mailbox closes.
    pub async fn run(self) {
        let mut events = self.events;
        let mailbox = self.mailbox;
        let wrap = self.wrap;

        while let Some(event) = events.recv().await {
            trace!(?event, "transport event");
            if mailbox.send(wrap(event)).await.is_err() {
                debug!("event pump: mailbox closed");
                return;
            }
        }
        debug!("event pump: stream ended");
    }
}
