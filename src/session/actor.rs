//! The per-device session task.
//!
//! All session state lives in [`SessionActor`] and is only touched from
//! its own task. Callers talk to it through [`Request`]s; transport
//! operations run on short-lived spawned tasks and report back as
//! [`Internal`] messages, so the loop never blocks on the radio.
//!
//! ```text
//! Disconnected -> Connecting -> ConnectedUnauthenticated -> Authenticating -> Authenticated
//!                     ^                                           |
//!                     +------------- transient failure -----------+
//!                                                                 |
//!                                  Failed <-- rejected / budget --+
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::dispatch::{CommandDispatcher, CommandKind, CommandReply, Ticket};
use super::retry::{RetryDecision, RetryState};
use super::{Ack, FailureReason, SessionConfig, SessionState};
use crate::device::{DeviceIdentity, DeviceKey};
use crate::error::{AuthError, ConnectError, DisconnectError, ScanError, TransportError};
use crate::events::{DeviceEvent, EventNotifier};
use crate::mech::{MechDecoder, MechStatus};
use crate::transport::{DeviceHandle, EventPump, Opcode, Transport, TransportEvent};

/// Capacity of the internal mailbox.
const INTERNAL_CAPACITY: usize = 64;

pub(crate) type ConnectReply = oneshot::Sender<Result<Ack, ConnectError>>;
pub(crate) type DisconnectReply = oneshot::Sender<Result<Ack, DisconnectError>>;

/// Caller requests.
#[derive(Debug)]
pub(crate) enum Request {
    Connect(ConnectReply),
    Disconnect(DisconnectReply),
    Command {
        kind: CommandKind,
        tag: String,
        reply: CommandReply,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Why a link attempt failed.
#[derive(Debug)]
enum LinkFailure {
    Scan(ScanError),
    Transport(TransportError),
}

impl std::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkFailure::Scan(e) => write!(f, "{}", e),
            LinkFailure::Transport(e) => write!(f, "{}", e),
        }
    }
}

/// Results of spawned work and forwarded transport events.
enum Internal {
    Link {
        attempt: u64,
        scanned: Option<Arc<dyn DeviceHandle>>,
        result: Result<(), LinkFailure>,
    },
    LoginWritten {
        attempt: u64,
        result: Result<(), TransportError>,
    },
    CommandWritten {
        id: u64,
        result: Result<(), TransportError>,
    },
    Transport {
        link: u64,
        event: TransportEvent,
    },
}

pub(crate) struct SessionActor {
    identity: DeviceIdentity,
    key: DeviceKey,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    decoder: MechDecoder,
    notifier: EventNotifier,
    state_tx: watch::Sender<SessionState>,
    mech_tx: watch::Sender<Option<MechStatus>>,
    internal_tx: mpsc::Sender<Internal>,

    state: SessionState,
    retry: RetryState,
    dispatcher: CommandDispatcher,
    mech: Option<MechStatus>,

    /// A caller wants the device connected; drives automatic reconnect.
    wants_link: bool,
    /// The running sequence came from a connect request (cancellable).
    caller_initiated: bool,
    connect_waiters: Vec<ConnectReply>,

    /// Generation of the current attempt; older results are ignored.
    attempt: u64,
    attempt_task: Option<JoinHandle<()>>,
    /// When the next scheduled attempt is due.
    retry_at: Option<Instant>,
    login_deadline: Option<Instant>,

    device: Option<Arc<dyn DeviceHandle>>,
    /// Generation of `device`; events from replaced handles are ignored.
    link: u64,
    link_up: bool,
    pump_task: Option<JoinHandle<()>>,
    /// Disconnect in flight; the next attempt waits for it.
    releasing: Option<JoinHandle<()>>,
    /// Disconnect events we caused and have not seen yet.
    stale_disconnects: u32,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        identity: DeviceIdentity,
        key: DeviceKey,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        decoder: MechDecoder,
        notifier: EventNotifier,
        state_tx: watch::Sender<SessionState>,
        mech_tx: watch::Sender<Option<MechStatus>>,
        requests: mpsc::Receiver<Request>,
    ) -> JoinHandle<()> {
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CAPACITY);
        let retry = RetryState::new(config.retry);

        let actor = SessionActor {
            identity,
            key,
            transport,
            config,
            decoder,
            notifier,
            state_tx,
            mech_tx,
            internal_tx,
            state: SessionState::Disconnected,
            retry,
            dispatcher: CommandDispatcher::new(),
            mech: None,
            wants_link: false,
            caller_initiated: false,
            connect_waiters: Vec::new(),
            attempt: 0,
            attempt_task: None,
            retry_at: None,
            login_deadline: None,
            device: None,
            link: 0,
            link_up: false,
            pump_task: None,
            releasing: None,
            stale_disconnects: 0,
        };

        tokio::spawn(actor.run(requests, internal_rx))
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut internal: mpsc::Receiver<Internal>,
    ) {
        debug!(device = %self.identity, "session task started");

        let shutdown_reply = loop {
            let deadline = self.login_deadline;
            let retry_at = self.retry_at;

            tokio::select! {
                biased;

                Some(msg) = internal.recv() => self.on_internal(msg),

                request = requests.recv() => match request {
                    Some(Request::Shutdown(reply)) => break Some(reply),
                    Some(request) => self.on_request(request),
                    None => break None,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_login_timeout();
                }

                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.on_retry_due();
                }
            }
        };

        self.stop().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        debug!(device = %self.identity, "session task stopped");
    }

    // ------------------------------------------------------------------
    // State changes
    // ------------------------------------------------------------------

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        if let Err(e) = self.state.transition_to(to) {
            error!(device = %self.identity, error = %e, "rejected state change");
            return;
        }

        info!(device = %self.identity, from = %from, to = %to, "session state changed");
        self.state_tx.send_replace(to);
        self.notifier
            .publish(DeviceEvent::state_changed(self.identity.clone(), from, to));
    }

    fn resolve_waiters(&mut self, result: Result<Ack, ConnectError>) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    fn on_request(&mut self, request: Request) {
        match request {
            Request::Connect(reply) => self.on_connect(reply),
            Request::Disconnect(reply) => self.on_disconnect(reply),
            Request::Command { kind, tag, reply } => self.on_command(kind, tag, reply),
            // handled by the run loop
            Request::Shutdown(_) => {}
        }
    }

    fn on_connect(&mut self, reply: ConnectReply) {
        match self.state {
            SessionState::Authenticated => {
                let _ = reply.send(Ok(Ack));
            }
            state if state.is_connecting() => {
                self.connect_waiters.push(reply);
            }
            _ => {
                self.connect_waiters.push(reply);
                self.wants_link = true;
                self.caller_initiated = true;
                self.retry.reset();
                self.start_attempt(Duration::ZERO);
            }
        }
    }

    fn on_disconnect(&mut self, reply: DisconnectReply) {
        let was_connecting = self.state.is_connecting();

        self.wants_link = false;
        self.caller_initiated = false;
        self.abort_attempt();
        self.resolve_waiters(Err(ConnectError::Cancelled));

        if self.state != SessionState::Disconnected {
            self.transition(SessionState::Disconnected);
        }

        let Some(device) = self.device.clone() else {
            let _ = reply.send(Ok(Ack));
            return;
        };

        if self.link_up {
            self.link_up = false;
            self.stale_disconnects += 1;
            tokio::spawn(async move {
                let result = device.disconnect().await;
                let _ = reply.send(result.map(|()| Ack).map_err(DisconnectError::Transport));
            });
        } else {
            if was_connecting {
                // A connect may still land in the adapter after the abort
                tokio::spawn(async move {
                    let _ = device.disconnect().await;
                });
            }
            let _ = reply.send(Ok(Ack));
        }
    }

    fn on_command(&mut self, kind: CommandKind, tag: String, reply: CommandReply) {
        let Some(Ticket { id, opcode, payload }) =
            self.dispatcher.begin(self.state, kind, tag, reply)
        else {
            return;
        };

        let Some(device) = self.device.clone() else {
            self.dispatcher.complete(id, Err(TransportError::Closed));
            return;
        };

        debug!(device = %self.identity, ?kind, "writing command");
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = device.write_command(opcode, &payload).await;
            let _ = tx.send(Internal::CommandWritten { id, result }).await;
        });
    }

    // ------------------------------------------------------------------
    // Connect sequence
    // ------------------------------------------------------------------

    fn abort_attempt(&mut self) {
        self.attempt += 1;
        self.retry_at = None;
        self.login_deadline = None;
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }
    }

    /// Enter `Connecting` and run the next attempt after `delay`.
    ///
    /// A link that is still up is dropped first.
    fn start_attempt(&mut self, delay: Duration) {
        self.abort_attempt();
        self.transition(SessionState::Connecting);
        self.release_link();

        if delay.is_zero() {
            self.launch_attempt();
        } else {
            self.retry_at = Some(Instant::now() + delay);
        }
    }

    fn on_retry_due(&mut self) {
        self.retry_at = None;
        if self.state != SessionState::Connecting {
            return;
        }
        if self.abandoned() {
            self.abandon();
            return;
        }
        self.launch_attempt();
    }

    /// Spawn one scan + connect.
    fn launch_attempt(&mut self) {
        let attempt = self.attempt;
        let releasing = self.releasing.take();
        let known = self.device.clone();
        let transport = Arc::clone(&self.transport);
        let address = self.identity.address().to_string();
        let scan_duration = self.config.scan_duration;
        let tx = self.internal_tx.clone();

        debug!(device = %self.identity, attempt = self.retry.failures() + 1, "connect attempt");

        self.attempt_task = Some(tokio::spawn(async move {
            if let Some(releasing) = releasing {
                let _ = releasing.await;
            }

            let (device, scanned) = match known {
                Some(device) => (device, None),
                None => match transport.scan_by_address(&address, scan_duration).await {
                    Ok(device) => (Arc::clone(&device), Some(device)),
                    Err(e) => {
                        let _ = tx
                            .send(Internal::Link {
                                attempt,
                                scanned: None,
                                result: Err(LinkFailure::Scan(e)),
                            })
                            .await;
                        return;
                    }
                },
            };

            let result = device.connect().await.map_err(LinkFailure::Transport);
            let _ = tx
                .send(Internal::Link {
                    attempt,
                    scanned,
                    result,
                })
                .await;
        }));
    }

    /// Every caller of a caller-initiated connect has gone away.
    fn abandoned(&mut self) -> bool {
        self.connect_waiters.retain(|w| !w.is_closed());
        self.caller_initiated && self.connect_waiters.is_empty()
    }

    fn abandon(&mut self) {
        info!(device = %self.identity, "connect abandoned by caller");
        self.abort_attempt();
        self.wants_link = false;
        self.caller_initiated = false;
        self.release_link();
        self.transition(SessionState::Disconnected);
    }

    fn install_device(&mut self, device: Arc<dyn DeviceHandle>) {
        if let Some(pump) = self.pump_task.take() {
            pump.abort();
        }
        self.link += 1;
        self.stale_disconnects = 0;

        if let Some(events) = device.take_events() {
            let link = self.link;
            let pump = EventPump::new(events, self.internal_tx.clone(), move |event| {
                Internal::Transport { link, event }
            });
            self.pump_task = Some(tokio::spawn(pump.run()));
        } else {
            warn!(device = %self.identity, "device handle has no event stream");
        }
        self.device = Some(device);
    }

    fn on_link(
        &mut self,
        attempt: u64,
        scanned: Option<Arc<dyn DeviceHandle>>,
        result: Result<(), LinkFailure>,
    ) {
        if attempt != self.attempt || self.state != SessionState::Connecting {
            debug!(device = %self.identity, attempt, "ignoring stale link result");
            return;
        }
        self.attempt_task = None;

        if let Some(device) = scanned {
            self.install_device(device);
        }

        if let Err(e) = result {
            warn!(device = %self.identity, error = %e, "connect attempt failed");
            self.on_transient_failure();
            return;
        }

        self.link_up = true;
        if self.abandoned() {
            self.abandon();
            return;
        }
        self.transition(SessionState::ConnectedUnauthenticated);
        self.begin_login();
    }

    fn begin_login(&mut self) {
        let Some(device) = self.device.clone() else {
            self.on_transient_failure();
            return;
        };

        self.transition(SessionState::Authenticating);
        self.login_deadline = Some(Instant::now() + self.config.login_timeout);

        let attempt = self.attempt;
        let payload = self.key.login_payload();
        let tx = self.internal_tx.clone();
        self.attempt_task = Some(tokio::spawn(async move {
            let result = device.write_command(Opcode::Login, &payload).await;
            let _ = tx.send(Internal::LoginWritten { attempt, result }).await;
        }));
    }

    fn on_login_written(&mut self, attempt: u64, result: Result<(), TransportError>) {
        if attempt != self.attempt || self.state != SessionState::Authenticating {
            return;
        }
        self.attempt_task = None;
        if let Err(e) = result {
            warn!(device = %self.identity, error = %e, "login write failed");
            self.on_transient_failure();
        }
    }

    fn on_login_timeout(&mut self) {
        self.login_deadline = None;
        if self.state == SessionState::Authenticating {
            warn!(device = %self.identity, timeout = ?self.config.login_timeout, "login timed out");
            self.on_transient_failure();
        }
    }

    fn on_transient_failure(&mut self) {
        self.login_deadline = None;

        match self.retry.record_failure() {
            RetryDecision::Exhausted => {
                warn!(
                    device = %self.identity,
                    attempts = self.retry.failures(),
                    "retry budget exhausted"
                );
                self.give_up(FailureReason::RetriesExhausted);
            }
            RetryDecision::Retry { attempt, delay } => {
                if self.abandoned() {
                    self.abandon();
                    return;
                }
                debug!(device = %self.identity, attempt, ?delay, "scheduling retry");
                self.start_attempt(delay);
            }
        }
    }

    fn give_up(&mut self, reason: FailureReason) {
        self.abort_attempt();
        self.wants_link = false;
        self.caller_initiated = false;
        self.release_link();
        self.transition(SessionState::Failed(reason));

        let err = match reason {
            FailureReason::AuthRejected => ConnectError::Auth(AuthError::Rejected),
            FailureReason::RetriesExhausted => ConnectError::RetriesExhausted,
        };
        self.resolve_waiters(Err(err));
    }

    /// Drop the link in the background if it is up.
    fn release_link(&mut self) {
        if !self.link_up {
            return;
        }
        self.link_up = false;
        self.stale_disconnects += 1;
        if let Some(device) = self.device.clone() {
            self.releasing = Some(tokio::spawn(async move {
                let _ = device.disconnect().await;
            }));
        }
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    fn on_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Link {
                attempt,
                scanned,
                result,
            } => self.on_link(attempt, scanned, result),
            Internal::LoginWritten { attempt, result } => self.on_login_written(attempt, result),
            Internal::CommandWritten { id, result } => {
                if let Some((kind, tag)) = self.dispatcher.complete(id, result) {
                    debug!(device = %self.identity, ?kind, tag = %tag, "command finished");
                }
            }
            Internal::Transport { link, event } => {
                if link == self.link {
                    self.on_transport_event(event);
                }
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::MechStatus(raw) => self.on_mech_status(&raw),
            TransportEvent::LoginAccepted => self.on_login_accepted(),
            TransportEvent::LoginRejected => self.on_login_rejected(),
            TransportEvent::Disconnected => self.on_link_lost(),
            TransportEvent::NoSignal => self.on_no_signal(),
        }
    }

    fn on_mech_status(&mut self, raw: &[u8]) {
        match self.decoder.decode(raw) {
            Ok(status) => {
                if self.mech == Some(status) {
                    return;
                }
                self.mech = Some(status);
                self.mech_tx.send_replace(Some(status));
                self.notifier
                    .publish(DeviceEvent::mech_status_changed(self.identity.clone(), status));
            }
            Err(e) => {
                debug!(device = %self.identity, error = %e, "dropping mech status notification");
            }
        }
    }

    fn on_login_accepted(&mut self) {
        if self.state != SessionState::Authenticating {
            debug!(device = %self.identity, state = %self.state, "unexpected login ack");
            return;
        }
        if self.abandoned() {
            self.abandon();
            return;
        }
        self.abort_attempt();
        self.retry.reset();
        self.stale_disconnects = 0;
        self.caller_initiated = false;
        self.transition(SessionState::Authenticated);
        self.resolve_waiters(Ok(Ack));
    }

    fn on_login_rejected(&mut self) {
        if self.state != SessionState::Authenticating {
            debug!(device = %self.identity, state = %self.state, "unexpected login rejection");
            return;
        }
        warn!(device = %self.identity, "login rejected");
        self.give_up(FailureReason::AuthRejected);
    }

    fn on_link_lost(&mut self) {
        if self.stale_disconnects > 0 {
            self.stale_disconnects -= 1;
            debug!(device = %self.identity, "ignoring disconnect we initiated");
            return;
        }
        if !self.link_up
            || matches!(self.state, SessionState::Disconnected | SessionState::Failed(_))
        {
            return;
        }

        let previous = self.state;
        self.link_up = false;
        self.abort_attempt();
        warn!(device = %self.identity, state = %previous, "link lost");
        self.transition(SessionState::Disconnected);

        if !self.wants_link {
            return;
        }
        if previous == SessionState::Authenticated {
            self.retry.reset();
            self.start_attempt(Duration::ZERO);
        } else {
            self.on_transient_failure();
        }
    }

    fn on_no_signal(&mut self) {
        if self.state != SessionState::Authenticated {
            debug!(device = %self.identity, state = %self.state, "ignoring no-signal");
            return;
        }
        warn!(device = %self.identity, "no signal, reconnecting");
        self.transition(SessionState::Disconnected);
        self.retry.reset();
        self.start_attempt(Duration::ZERO);
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    async fn stop(&mut self) {
        self.wants_link = false;
        self.abort_attempt();
        self.resolve_waiters(Err(ConnectError::Closed));
        if self.dispatcher.is_busy() {
            debug!(device = %self.identity, "dropping in-flight command");
        }

        if self.link_up {
            self.link_up = false;
            if let Some(device) = self.device.clone() {
                let limit = self.config.login_timeout;
                if tokio::time::timeout(limit, device.disconnect()).await.is_err() {
                    warn!(device = %self.identity, "disconnect on shutdown timed out");
                }
            }
        }
        if let Some(pump) = self.pump_task.take() {
            pump.abort();
        }
        if self.state != SessionState::Disconnected {
            self.transition(SessionState::Disconnected);
        }
    }
}
