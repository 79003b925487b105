//! Registry of device sessions keyed by unique id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{HostAdapter, HostObserver, SetupInput};
use crate::config::Config;
use crate::device::{DeviceIdentity, DeviceKey, DeviceType};
use crate::error::SesameError;
use crate::events::SubscriptionHandle;
use crate::mech::{LockWindow, MechDecoder, MechStatus};
use crate::session::{Session, SessionConfig, SessionState};
use crate::transport::Transport;
use crate::Result;

struct Entry {
    session: Session,
    _subscription: Option<SubscriptionHandle>,
}

/// Point-in-time view of one registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub unique_id: String,
    pub name: String,
    pub model: &'static str,
    #[serde(serialize_with = "display")]
    pub state: SessionState,
    pub mech_status: Option<MechStatus>,
}

fn display<S: serde::Serializer>(state: &SessionState, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(state)
}

/// Thread-safe set of device sessions sharing one transport.
pub struct LockRegistry {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    observer: Option<Arc<dyn HostObserver>>,
    lock_windows: HashMap<DeviceType, LockWindow>,
    devices: RwLock<HashMap<String, Entry>>,
}

impl LockRegistry {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            observer: None,
            lock_windows: HashMap::new(),
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Registry using the session tunables and lock windows from `config`.
    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        config
            .decoder
            .lock_windows
            .iter()
            .fold(Self::new(transport, config.session_config()), |registry, (t, w)| {
                registry.with_lock_window(*t, *w)
            })
    }

    /// Deliver every device's events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn HostObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Override the locked window for one device type.
    pub fn with_lock_window(mut self, device_type: DeviceType, window: LockWindow) -> Self {
        self.lock_windows.insert(device_type, window);
        self
    }

    fn decoder_for(&self, device_type: DeviceType) -> MechDecoder {
        let decoder = MechDecoder::for_device_type(device_type);
        match self.lock_windows.get(&device_type) {
            Some(window) => decoder.with_window(Some(*window)),
            None => decoder,
        }
    }

    /// Register a device from setup input and start connecting it.
    ///
    /// Returns the device's unique id.
    pub fn add(&self, input: &SetupInput) -> Result<String> {
        let identity = input.identity()?;
        self.add_device(identity, input.key()?)
    }

    /// Register a device and connect it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_device(&self, identity: DeviceIdentity, key: DeviceKey) -> Result<String> {
        let unique_id = identity.unique_id();

        let mut devices = self
            .devices
            .write()
            .map_err(|_| SesameError::LockPoisoned)?;
        if devices.contains_key(&unique_id) {
            return Err(SesameError::DeviceExists(unique_id));
        }

        let decoder = self.decoder_for(identity.device_type());
        let session = Session::spawn_with_decoder(
            identity.clone(),
            key,
            Arc::clone(&self.transport),
            self.config,
            decoder,
        );
        let subscription = self
            .observer
            .as_ref()
            .map(|observer| session.subscribe(Arc::new(HostAdapter(Arc::clone(observer)))));

        let background = session.clone();
        tokio::spawn(async move {
            if let Err(e) = background.connect().await {
                warn!(device = %background.identity(), error = %e, "initial connect failed");
            }
        });

        info!(device = %identity, unique_id = %unique_id, "device added");
        devices.insert(
            unique_id.clone(),
            Entry {
                session,
                _subscription: subscription,
            },
        );
        Ok(unique_id)
    }

    /// Unregister a device, dropping its link and stopping its retries.
    pub async fn remove_device(&self, unique_id: &str) -> Result<()> {
        let entry = {
            let mut devices = self
                .devices
                .write()
                .map_err(|_| SesameError::LockPoisoned)?;
            devices
                .remove(unique_id)
                .ok_or_else(|| SesameError::DeviceNotFound(unique_id.to_string()))?
        };

        if let Err(e) = entry.session.disconnect().await {
            debug!(unique_id, error = %e, "disconnect on removal failed");
        }
        entry.session.shutdown().await;
        info!(unique_id, "device removed");
        Ok(())
    }

    /// Get a handle to a registered device's session.
    pub fn session(&self, unique_id: &str) -> Result<Session> {
        let devices = self
            .devices
            .read()
            .map_err(|_| SesameError::LockPoisoned)?;
        devices
            .get(unique_id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| SesameError::DeviceNotFound(unique_id.to_string()))
    }

    pub async fn request_lock(&self, unique_id: &str, tag: &str) -> Result<()> {
        let session = self.session(unique_id)?;
        session.lock(tag).await?;
        Ok(())
    }

    pub async fn request_unlock(&self, unique_id: &str, tag: &str) -> Result<()> {
        let session = self.session(unique_id)?;
        session.unlock(tag).await?;
        Ok(())
    }

    pub fn state(&self, unique_id: &str) -> Result<SessionState> {
        Ok(self.session(unique_id)?.current_state())
    }

    pub fn mech_status(&self, unique_id: &str) -> Result<Option<MechStatus>> {
        Ok(self.session(unique_id)?.mech_status())
    }

    /// Get the number of registered devices.
    pub fn count(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Summaries of all registered devices, sorted by unique id.
    pub fn list(&self) -> Result<Vec<DeviceSummary>> {
        let devices = self
            .devices
            .read()
            .map_err(|_| SesameError::LockPoisoned)?;

        let mut summaries: Vec<DeviceSummary> = devices
            .iter()
            .map(|(unique_id, entry)| {
                let identity = entry.session.identity();
                DeviceSummary {
                    unique_id: unique_id.clone(),
                    name: identity.display_name(),
                    model: identity.device_type().model_name(),
                    state: entry.session.current_state(),
                    mech_status: entry.session.mech_status(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Ok(summaries)
    }

    /// Stop every session concurrently and empty the registry.
    pub async fn shutdown_all(&self) -> Result<()> {
        let entries: Vec<Entry> = {
            let mut devices = self
                .devices
                .write()
                .map_err(|_| SesameError::LockPoisoned)?;
            devices.drain().map(|(_, entry)| entry).collect()
        };

        let count = entries.len();
        join_all(entries.iter().map(|entry| entry.session.shutdown())).await;
        info!(count, "all devices shut down");
        Ok(())
    }
}
