//! posebridge-osc/src/lib.rs
//!
//! The main library file for the `posebridge-osc` crate.
//! Re-exports major submodules and hosts the top-level manager the tracking
//! host drives through its lifecycle hooks.

pub mod config;
pub mod discovery;
pub mod oscquery;
pub mod registry;
pub mod tracking;

use crate::config::{BridgeConfig, ConfigStore};
use crate::discovery::{DiscoveryMatcher, ServiceProfile, local_ip};
use crate::oscquery::OscQueryApi;
use crate::registry::{MANUAL_SESSION_KEY, ReceiverRegistry, ReceiverSession};
use crate::tracking::TrackerSample;
use crate::tracking::dispatch::{OscSender, PoseDispatcher, UdpOscSender};
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("OSC transport error: {0}")]
    TransportError(String),

    #[error("OSCQuery error: {0}")]
    OscQueryError(String),

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Where the bridge currently stands, surfaced to the host's status UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Started (or not yet started), no receiver accepted so far.
    Unknown,
    /// Initialization failed; the bridge idles in a degraded state.
    InitException,
    /// At least one discovered receiver is registered.
    Success,
    /// A user-entered destination is pinned and discovery is suppressed.
    ManualOverride,
}

/// Owns the receiver registry, the validated config and the discovery task,
/// and exposes the entry points the tracking host calls: initialize,
/// shutdown, per-frame pose updates and a connection test. Nothing in here
/// panics across these boundaries; failures surface as status + logs.
pub struct PoseBridgeManager {
    registry: Arc<ReceiverRegistry>,
    config: Mutex<BridgeConfig>,
    store: Arc<dyn ConfigStore>,
    own_service_name: String,

    transport: Mutex<Option<Arc<dyn OscSender>>>,
    dispatcher: Mutex<Option<PoseDispatcher>>,

    status_tx: Arc<watch::Sender<ServiceStatus>>,
    status_rx: watch::Receiver<ServiceStatus>,
    override_tx: watch::Sender<bool>,
    override_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    discovery_task: Mutex<Option<JoinHandle<()>>>,
    last_init_error: Mutex<Option<String>>,
}

impl PoseBridgeManager {
    pub fn new(store: Arc<dyn ConfigStore>, own_service_name: impl Into<String>) -> Self {
        let (status_tx, status_rx) = watch::channel(ServiceStatus::Unknown);
        let (override_tx, override_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            registry: Arc::new(ReceiverRegistry::new()),
            config: Mutex::new(BridgeConfig::default()),
            store,
            own_service_name: own_service_name.into(),
            transport: Mutex::new(None),
            dispatcher: Mutex::new(None),
            status_tx: Arc::new(status_tx),
            status_rx,
            override_tx,
            override_rx,
            shutdown_tx,
            shutdown_rx,
            discovery_task: Mutex::new(None),
            last_init_error: Mutex::new(None),
        }
    }

    /// Replaces the default UDP transport, e.g. with a capture for tests.
    /// Must happen before `initialize`.
    pub fn set_transport(&self, sender: Arc<dyn OscSender>) {
        *self.transport.lock().unwrap() = Some(sender);
    }

    pub fn registry(&self) -> Arc<ReceiverRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> BridgeConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status_rx.borrow()
    }

    /// Watch channel the status UI refreshes from.
    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    /// Brings the bridge up: loads persisted config, restores a manual
    /// override session if one was saved, and starts the discovery matcher
    /// on the given announcement feed. Any failure is retained for the
    /// status text and reported as `InitException`; never panics or throws.
    pub async fn initialize(
        &self,
        announcements: mpsc::Receiver<ServiceProfile>,
        query: Arc<dyn OscQueryApi>,
    ) -> ServiceStatus {
        match self.try_initialize(announcements, query).await {
            Ok(status) => status,
            Err(e) => {
                error!("initialization failed: {e}");
                *self.last_init_error.lock().unwrap() = Some(e.to_string());
                let _ = self.status_tx.send(ServiceStatus::InitException);
                ServiceStatus::InitException
            }
        }
    }

    async fn try_initialize(
        &self,
        announcements: mpsc::Receiver<ServiceProfile>,
        query: Arc<dyn OscQueryApi>,
    ) -> Result<ServiceStatus> {
        let _ = self.shutdown_tx.send(false);

        // Reuse an injected transport; otherwise bind the UDP sender here so
        // a bind failure surfaces as InitException instead of a panic later.
        let sender = {
            let mut transport = self.transport.lock().unwrap();
            match transport.as_ref() {
                Some(s) => s.clone(),
                None => {
                    let s: Arc<dyn OscSender> = Arc::new(
                        UdpOscSender::new()
                            .map_err(|e| BridgeError::InitError(e.to_string()))?,
                    );
                    *transport = Some(s.clone());
                    s
                }
            }
        };
        *self.dispatcher.lock().unwrap() = Some(PoseDispatcher::new(sender));

        let status = {
            let mut cfg = self.config.lock().unwrap();
            *cfg = BridgeConfig::load(self.store.as_ref());
            cfg.save(self.store.as_ref());

            if cfg.manual_override {
                self.registry.upsert(ReceiverSession::new(
                    MANUAL_SESSION_KEY,
                    cfg.target_addr(),
                    cfg.osc_port,
                ));
                let _ = self.override_tx.send(true);
                ServiceStatus::ManualOverride
            } else {
                let _ = self.override_tx.send(false);
                ServiceStatus::Unknown
            }
        };

        let matcher = Arc::new(DiscoveryMatcher::new(
            self.registry.clone(),
            query,
            self.own_service_name.clone(),
            local_ip(),
            self.status_tx.clone(),
            self.override_rx.clone(),
        ));
        let handle = tokio::spawn(matcher.run(announcements, self.shutdown_rx.clone()));
        *self.discovery_task.lock().unwrap() = Some(handle);

        let _ = self.status_tx.send(status);
        info!(
            "bridge initialized as '{}', status {status:?}",
            self.own_service_name
        );
        Ok(status)
    }

    /// Stops discovery and drops all sessions. In-flight OSCQuery requests
    /// are abandoned best-effort.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.discovery_task.lock().unwrap().take() {
            handle.abort();
        }
        self.registry.clear();
        let _ = self.status_tx.send(ServiceStatus::Unknown);
        info!("bridge shut down");
    }

    /// Called once per frame by the host.
    pub fn heartbeat(&self) {
        trace!("heartbeat, {} receiver session(s)", self.registry.len());
    }

    /// Per-frame entry point: fans the batch out to all active receivers.
    /// Returns `None` when the host did not ask for a reply. With no
    /// receivers (service not yet started) every sample reports failed and
    /// nothing touches the wire.
    pub fn update_tracker_poses(
        &self,
        batch: &[TrackerSample],
        want_reply: bool,
    ) -> Option<Vec<(TrackerSample, bool)>> {
        let dispatcher = self.dispatcher.lock().unwrap();
        let results = match dispatcher.as_ref() {
            Some(d) => d.dispatch(batch, &self.registry),
            None => {
                warn!("update_tracker_poses before initialize, failing batch");
                batch.iter().map(|s| (s.clone(), false)).collect()
            }
        };
        want_reply.then_some(results)
    }

    /// Tracker add/enable state from the host. OSC receivers have no notion
    /// of tracker state, so this acknowledges without wire traffic.
    pub fn set_tracker_states(
        &self,
        roles: &[tracking::TrackerRole],
        want_reply: bool,
    ) -> Option<Vec<(tracking::TrackerRole, bool)>> {
        trace!("set_tracker_states for {} tracker(s)", roles.len());
        want_reply.then(|| roles.iter().map(|r| (*r, true)).collect())
    }

    /// Broadcasts an auxiliary string+bool message (`,sT`/`,sF`) to every
    /// active receiver. Like pose dispatch, every session is attempted even
    /// if one fails; the first failure is returned afterwards.
    pub fn send_aux_flag(&self, address: &str, text: &str, flag: bool) -> Result<()> {
        let transport = self
            .transport
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BridgeError::TransportError("transport not initialized".into()))?;
        let mut first_err = None;
        for session in self.registry.snapshot() {
            if let Err(e) = transport.send_string_bool(session.socket_addr(), address, text, flag)
            {
                error!("aux send to '{}' ({}) failed: {e}", session.key, session.socket_addr());
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One UI edit of the destination fields, evaluated atomically: both
    /// fields empty clears the override (and the MANUAL session, back to
    /// Unknown); anything else validates field-wise, keeps previous values
    /// on bad input, and pins the MANUAL session. The config is persisted on
    /// every edit.
    pub fn apply_target_edit(&self, ip_field: &str, port_field: &str) {
        let ip_text = ip_field.trim();
        let port_text = port_field.trim();
        let mut cfg = self.config.lock().unwrap();

        if ip_text.is_empty() && port_text.is_empty() {
            if cfg.manual_override {
                cfg.manual_override = false;
                self.registry.remove(MANUAL_SESSION_KEY);
                let _ = self.override_tx.send(false);
                let _ = self.status_tx.send(ServiceStatus::Unknown);
                info!("manual override cleared, discovery re-enabled");
            }
        } else {
            if !ip_text.is_empty() {
                cfg.set_target_ip(ip_text);
            }
            if !port_text.is_empty() {
                cfg.set_osc_port(port_text);
            }
            cfg.manual_override = true;
            // The override wins outright: anything discovery registered
            // before this edit stops receiving traffic.
            self.registry.remove_discovered();
            self.registry.upsert(ReceiverSession::new(
                MANUAL_SESSION_KEY,
                cfg.target_addr(),
                cfg.osc_port,
            ));
            let _ = self.override_tx.send(true);
            let _ = self.status_tx.send(ServiceStatus::ManualOverride);
            info!(
                "manual override => {}:{}",
                cfg.target_ip, cfg.osc_port
            );
        }

        cfg.save(self.store.as_ref());
    }

    /// Status text plus a rough reachability probe of the first session.
    pub fn test_connection(&self) -> (ServiceStatus, String, u128) {
        let status = self.status();
        if status == ServiceStatus::InitException {
            let message = self
                .last_init_error
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "initialization failed".to_string());
            return (status, message, 0);
        }

        let sessions = self.registry.snapshot();
        let Some(first) = sessions.first() else {
            return (status, "no active receiver sessions".to_string(), 0);
        };

        let started = Instant::now();
        let probe = UdpSocket::bind(("0.0.0.0", 0)).and_then(|s| s.connect(first.socket_addr()));
        let ping_ms = started.elapsed().as_millis();
        match probe {
            Ok(_) => (
                status,
                format!("receiver '{}' at {} reachable", first.key, first.socket_addr()),
                ping_ms,
            ),
            Err(e) => (
                status,
                format!("probe to '{}' failed: {e}", first.key),
                ping_ms,
            ),
        }
    }
}
