//! Public handle to a running device session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::actor::{Request, SessionActor};
use super::dispatch::CommandKind;
use super::{Ack, RetryPolicy, SessionState};
use crate::device::{DeviceIdentity, DeviceKey};
use crate::error::{CommandError, ConnectError, DisconnectError};
use crate::events::{DeviceEvent, EventNotifier, Observer, SubscriptionHandle};
use crate::mech::{MechDecoder, MechStatus};
use crate::transport::Transport;

/// Default time the device has to answer a login.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default scan window per connect attempt.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(15);

/// Capacity of a session's request queue.
const REQUEST_CAPACITY: usize = 32;

/// Tunables for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub retry: RetryPolicy,
    /// A login without answer after this long counts as a transient failure.
    pub login_timeout: Duration,
    pub scan_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }
}

/// Cheap, cloneable handle to one device session.
///
/// The session runs on its own task and stops when [`Session::shutdown`]
/// is called or the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    identity: DeviceIdentity,
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<SessionState>,
    mech: watch::Receiver<Option<MechStatus>>,
    notifier: EventNotifier,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session using the default decoder for the device type.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        identity: DeviceIdentity,
        key: DeviceKey,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        let decoder = MechDecoder::for_device_type(identity.device_type());
        Self::spawn_with_decoder(identity, key, transport, config, decoder)
    }

    /// Start a session with a custom mech status decoder.
    pub fn spawn_with_decoder(
        identity: DeviceIdentity,
        key: DeviceKey,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        decoder: MechDecoder,
    ) -> Self {
        let (requests, requests_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (state_tx, state) = watch::channel(SessionState::Disconnected);
        let (mech_tx, mech) = watch::channel(None);
        let notifier = EventNotifier::new();

        SessionActor::spawn(
            identity.clone(),
            key,
            transport,
            config,
            decoder,
            notifier.clone(),
            state_tx,
            mech_tx,
            requests_rx,
        );

        Self {
            identity,
            requests,
            state,
            mech,
            notifier,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Connect and log in, retrying transient failures.
    ///
    /// Resolves once the session is authenticated or has given up.
    /// Dropping the future before then abandons the attempt unless
    /// another caller is also waiting.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Connect(reply))
            .await
            .map_err(|_| ConnectError::Closed)?;
        rx.await.map_err(|_| ConnectError::Closed)?.map(|Ack| ())
    }

    /// Drop the link and stop reconnecting.
    pub async fn disconnect(&self) -> Result<(), DisconnectError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Disconnect(reply))
            .await
            .map_err(|_| DisconnectError::Closed)?;
        rx.await.map_err(|_| DisconnectError::Closed)?.map(|Ack| ())
    }

    /// Lock the device, recording `tag` in its history.
    pub async fn lock(&self, tag: &str) -> Result<(), CommandError> {
        self.command(CommandKind::Lock, tag).await
    }

    /// Unlock the device, recording `tag` in its history.
    pub async fn unlock(&self, tag: &str) -> Result<(), CommandError> {
        self.command(CommandKind::Unlock, tag).await
    }

    async fn command(&self, kind: CommandKind, tag: &str) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Command {
                kind,
                tag: tag.to_string(),
                reply,
            })
            .await
            .map_err(|_| CommandError::Closed)?;
        rx.await.map_err(|_| CommandError::Closed)?.map(|Ack| ())
    }

    /// Stop the session task, dropping the link if it is up.
    ///
    /// Returns once the task has finished. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Shutdown(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Last successfully decoded mechanical status.
    pub fn mech_status(&self) -> Option<MechStatus> {
        *self.mech.borrow()
    }

    /// Register an observer for this device's events.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> SubscriptionHandle {
        self.notifier.subscribe(observer)
    }

    /// Receive this device's events on a channel.
    pub fn subscribe_channel(
        &self,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<DeviceEvent>) {
        self.notifier.subscribe_channel()
    }
}
