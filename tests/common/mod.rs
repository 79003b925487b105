//! Scripted in-memory transport for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sesame_ble::{
    DeviceEvent, DeviceHandle, EventKind, Observer, Opcode, ScanError, SessionState, Transport,
    TransportError, TransportEvent,
};
use tokio::sync::{mpsc, Notify};

pub const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

/// How the device answers a login write.
#[derive(Debug, Clone)]
pub enum Login {
    Accept,
    Reject,
    /// Write succeeds, no answer ever comes.
    Silent,
    WriteError(TransportError),
}

#[derive(Default)]
struct Script {
    connects: VecDeque<Result<(), TransportError>>,
    logins: VecDeque<Login>,
    commands: VecDeque<Result<(), TransportError>>,
}

/// One fake peripheral.
///
/// Unscripted operations succeed. A voluntary `disconnect` emits no event.
pub struct MockDevice {
    script: Mutex<Script>,
    always_fail_connect: AtomicBool,
    hold_commands: AtomicBool,
    release: Notify,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    writes: Mutex<Vec<(Opcode, Vec<u8>)>>,
    connects: AtomicU32,
    disconnects: AtomicU32,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(64);
        Arc::new(Self {
            script: Mutex::new(Script::default()),
            always_fail_connect: AtomicBool::new(false),
            hold_commands: AtomicBool::new(false),
            release: Notify::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            writes: Mutex::new(Vec::new()),
            connects: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
        })
    }

    /// Fail the next `n` connects with a transient error.
    pub fn fail_connects(&self, n: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..n {
            script.connects.push_back(Err(TransportError::RadioBusy));
        }
    }

    pub fn fail_every_connect(&self) {
        self.always_fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn script_login(&self, login: Login) {
        self.script.lock().unwrap().logins.push_back(login);
    }

    pub fn script_command(&self, result: Result<(), TransportError>) {
        self.script.lock().unwrap().commands.push_back(result);
    }

    /// Keep lock/unlock writes pending until [`MockDevice::release_command`].
    pub fn hold_commands(&self) {
        self.hold_commands.store(true, Ordering::SeqCst);
    }

    pub fn release_command(&self) {
        self.release.notify_one();
    }

    pub async fn emit(&self, event: TransportEvent) {
        self.events_tx.send(event).await.unwrap();
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(Opcode, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn logins(&self) -> usize {
        self.writes()
            .iter()
            .filter(|(opcode, _)| *opcode == Opcode::Login)
            .count()
    }
}

#[async_trait]
impl DeviceHandle for MockDevice {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.always_fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Stack("org.bluez.Error.Failed".into()));
        }
        self.script
            .lock()
            .unwrap()
            .connects
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_command(&self, opcode: Opcode, payload: &[u8]) -> Result<(), TransportError> {
        self.writes.lock().unwrap().push((opcode, payload.to_vec()));

        if opcode == Opcode::Login {
            let login = self
                .script
                .lock()
                .unwrap()
                .logins
                .pop_front()
                .unwrap_or(Login::Accept);
            let answer = match login {
                Login::Accept => TransportEvent::LoginAccepted,
                Login::Reject => TransportEvent::LoginRejected,
                Login::Silent => return Ok(()),
                Login::WriteError(e) => return Err(e),
            };
            let _ = self.events_tx.send(answer).await;
            return Ok(());
        }

        if self.hold_commands.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.script
            .lock()
            .unwrap()
            .commands
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}

/// Fake adapter that knows a fixed set of devices.
#[derive(Default)]
pub struct MockTransport {
    devices: Mutex<HashMap<String, Arc<MockDevice>>>,
    scan_failures: AtomicU32,
    scans: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport with a single device at [`ADDRESS`].
    pub fn with_device() -> (Arc<Self>, Arc<MockDevice>) {
        let transport = Self::new();
        let device = transport.add(ADDRESS);
        (transport, device)
    }

    pub fn add(&self, address: &str) -> Arc<MockDevice> {
        let device = MockDevice::new();
        self.devices
            .lock()
            .unwrap()
            .insert(address.to_string(), Arc::clone(&device));
        device
    }

    /// Fail the next `n` scans with an adapter error.
    pub fn fail_scans(&self, n: u32) {
        self.scan_failures.store(n, Ordering::SeqCst);
    }

    pub fn scans(&self) -> u32 {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn scan_by_address(
        &self,
        address: &str,
        _scan_duration: Duration,
    ) -> Result<Arc<dyn DeviceHandle>, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);

        let pending = self.scan_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.scan_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ScanError::Adapter("org.bluez.Error.InProgress".into()));
        }

        match self.devices.lock().unwrap().get(address) {
            Some(device) => Ok(Arc::clone(device) as Arc<dyn DeviceHandle>),
            None => Err(ScanError::NotFound {
                address: address.to_string(),
            }),
        }
    }
}

/// Observer that forwards every event to a channel.
pub struct Forward(pub mpsc::UnboundedSender<DeviceEvent>);

#[async_trait]
impl Observer for Forward {
    async fn on_event(&self, event: &DeviceEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Observer that never finishes handling an event.
pub struct Stalled;

#[async_trait]
impl Observer for Stalled {
    async fn on_event(&self, _event: &DeviceEvent) {
        std::future::pending::<()>().await;
    }
}

/// Next state transition, skipping mech status events.
pub async fn next_transition(
    rx: &mut mpsc::UnboundedReceiver<DeviceEvent>,
) -> (SessionState, SessionState) {
    loop {
        let event = rx.recv().await.expect("event stream closed");
        if let EventKind::StateChanged { old, new } = event.kind {
            return (old, new);
        }
    }
}

/// Drain transitions until the session reaches `target`.
pub async fn wait_for_state(rx: &mut mpsc::UnboundedReceiver<DeviceEvent>, target: SessionState) {
    loop {
        let (_, new) = next_transition(rx).await;
        if new == target {
            return;
        }
    }
}

/// Let every runnable task finish its work.
///
/// With a paused clock the sleep only completes once the runtime is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Raw mech status notification: battery code, target, position.
pub fn mech_payload(battery: u16, position: i16) -> Vec<u8> {
    let mut raw = Vec::with_capacity(6);
    raw.extend_from_slice(&battery.to_le_bytes());
    raw.extend_from_slice(&0i16.to_le_bytes());
    raw.extend_from_slice(&position.to_le_bytes());
    raw
}
