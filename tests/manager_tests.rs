//! tests/manager_tests.rs
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use posebridge_osc::config::{
    BridgeConfig, ConfigStore, KEY_IP_ADDRESS, KEY_MANUAL, KEY_OSC_PORT,
};
use posebridge_osc::discovery::{ServiceKind, ServiceProfile};
use posebridge_osc::oscquery::{OscQueryApi, OscQueryHostInfo, OscQueryNode};
use posebridge_osc::registry::{MANUAL_SESSION_KEY, ReceiverSession};
use posebridge_osc::tracking::dispatch::OscSender;
use posebridge_osc::tracking::{Quat, TrackerRole, TrackerSample, Vec3};
use posebridge_osc::{BridgeError, PoseBridgeManager, Result, ServiceStatus};

// ---------- In-memory config store ----------
#[derive(Default)]
struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    fn with(pairs: &[(&str, &str)]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut values = store.values.lock().unwrap();
            for (k, v) in pairs {
                values.insert(k.to_string(), v.to_string());
            }
        }
        Arc::new(store)
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

// ---------- Recording transport ----------
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(SocketAddr, String)>>,
    /// Destination port whose sends fail, if set.
    fail_port: Mutex<Option<u16>>,
}

impl RecordingSender {
    fn check(&self, dest: SocketAddr) -> Result<()> {
        if *self.fail_port.lock().unwrap() == Some(dest.port()) {
            return Err(BridgeError::TransportError(format!("{dest} unreachable")));
        }
        Ok(())
    }
}

impl OscSender for RecordingSender {
    fn send_floats(&self, dest: SocketAddr, addr: &str, _args: &[f32]) -> Result<()> {
        self.check(dest)?;
        self.sent.lock().unwrap().push((dest, addr.to_string()));
        Ok(())
    }

    fn send_string_bool(
        &self,
        dest: SocketAddr,
        addr: &str,
        _text: &str,
        _flag: bool,
    ) -> Result<()> {
        self.check(dest)?;
        self.sent.lock().unwrap().push((dest, addr.to_string()));
        Ok(())
    }
}

// ---------- Canned OSCQuery responder ----------
struct TrackingQueryApi {
    osc_port: u16,
}

#[async_trait]
impl OscQueryApi for TrackingQueryApi {
    async fn query_tree(&self, _address: IpAddr, _port: u16) -> Result<OscQueryNode> {
        Ok(serde_json::from_str(
            r#"{
                "FULL_PATH": "/",
                "CONTENTS": {
                    "tracking": {
                        "FULL_PATH": "/tracking",
                        "CONTENTS": {
                            "trackers": { "FULL_PATH": "/tracking/trackers", "ACCESS": 2 }
                        }
                    }
                }
            }"#,
        )
        .unwrap())
    }

    async fn query_host_info(&self, _address: IpAddr, _port: u16) -> Result<OscQueryHostInfo> {
        Ok(OscQueryHostInfo {
            NAME: "mock".into(),
            OSC_IP: None,
            OSC_PORT: self.osc_port,
            OSC_TRANSPORT: Some("UDP".into()),
            EXTENSIONS: Default::default(),
        })
    }
}

fn manager_with(store: Arc<MemoryStore>) -> (Arc<PoseBridgeManager>, Arc<RecordingSender>) {
    let manager = Arc::new(PoseBridgeManager::new(store, "posebridge-osc-test"));
    let sender = Arc::new(RecordingSender::default());
    manager.set_transport(sender.clone());
    (manager, sender)
}

async fn initialize(
    manager: &PoseBridgeManager,
) -> mpsc::Sender<ServiceProfile> {
    let (tx, rx) = mpsc::channel(8);
    let status = manager
        .initialize(rx, Arc::new(TrackingQueryApi { osc_port: 9000 }))
        .await;
    assert_ne!(status, ServiceStatus::InitException);
    tx
}

#[tokio::test]
async fn initialize_restores_a_persisted_manual_override() {
    let store = MemoryStore::with(&[
        (KEY_IP_ADDRESS, "10.0.0.5"),
        (KEY_OSC_PORT, "9010"),
        (KEY_MANUAL, "true"),
    ]);
    let (manager, _sender) = manager_with(store);
    let _tx = initialize(&manager).await;

    assert_eq!(manager.status(), ServiceStatus::ManualOverride);
    let session = manager.registry().get(MANUAL_SESSION_KEY).expect("manual session");
    assert_eq!(session.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
    assert_eq!(session.port, 9010);
    manager.shutdown();
}

#[tokio::test]
async fn discovered_receiver_flips_status_to_success() {
    let (manager, _sender) = manager_with(Arc::new(MemoryStore::default()));
    let tx = initialize(&manager).await;

    tx.send(ServiceProfile {
        name: "VRChat-Client-1234".into(),
        address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        port: 8080,
        kind: ServiceKind::OscQuery,
    })
    .await
    .unwrap();

    // discovery runs on its own task; poll briefly for the session
    let mut registered = false;
    for _ in 0..50 {
        if manager.registry().get("VRChat-Client-1234").is_some() {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(registered, "announced receiver never registered");
    assert_eq!(manager.status(), ServiceStatus::Success);
    manager.shutdown();
}

#[tokio::test]
async fn target_edit_sets_and_clears_the_manual_session() {
    let store = MemoryStore::with(&[]);
    let (manager, _sender) = manager_with(store.clone());
    let _tx = initialize(&manager).await;

    manager.apply_target_edit("localhost", "9005");
    let session = manager.registry().get(MANUAL_SESSION_KEY).expect("manual session");
    assert_eq!(session.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(session.port, 9005);
    assert_eq!(manager.status(), ServiceStatus::ManualOverride);
    assert_eq!(store.get(KEY_MANUAL).as_deref(), Some("true"));
    assert_eq!(store.get(KEY_IP_ADDRESS).as_deref(), Some("127.0.0.1"));

    // clearing both fields in one edit drops the override
    manager.apply_target_edit("", "");
    assert!(manager.registry().get(MANUAL_SESSION_KEY).is_none());
    assert_eq!(manager.status(), ServiceStatus::Unknown);
    assert_eq!(store.get(KEY_MANUAL).as_deref(), Some("false"));
    manager.shutdown();
}

#[tokio::test]
async fn invalid_edit_keeps_previous_values() {
    let (manager, _sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    manager.apply_target_edit("10.0.0.9", "9020");
    manager.apply_target_edit("999.999.999.999", "not-a-port");

    let cfg: BridgeConfig = manager.config();
    assert_eq!(cfg.target_ip, "10.0.0.9");
    assert_eq!(cfg.osc_port, 9020);
    assert!(cfg.manual_override);
    manager.shutdown();
}

#[tokio::test]
async fn empty_registry_fast_path_reports_failure_without_sends() {
    let (manager, sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    let batch = [TrackerSample::new(
        TrackerRole::Waist,
        Vec3::ZERO,
        Quat::IDENTITY,
    )];
    let reply = manager.update_tracker_poses(&batch, true).unwrap();
    assert!(reply.iter().all(|(_, ok)| !*ok));
    assert!(sender.sent.lock().unwrap().is_empty());

    assert!(manager.update_tracker_poses(&batch, false).is_none());
    manager.shutdown();
}

#[tokio::test]
async fn manual_session_receives_pose_traffic() {
    let (manager, sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    manager.apply_target_edit("127.0.0.1", "9055");
    let batch = [TrackerSample::new(
        TrackerRole::Waist,
        Vec3::ZERO,
        Quat::IDENTITY,
    )];
    let reply = manager.update_tracker_poses(&batch, true).unwrap();
    assert!(reply.iter().all(|(_, ok)| *ok));

    let sent = sender.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(dest, _)| dest.port() == 9055));
    manager.shutdown();
}

#[tokio::test]
async fn override_evicts_discovered_sessions() {
    let (manager, sender) = manager_with(Arc::new(MemoryStore::default()));
    let tx = initialize(&manager).await;

    tx.send(ServiceProfile {
        name: "VRChat-Client-1234".into(),
        address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        port: 8080,
        kind: ServiceKind::OscQuery,
    })
    .await
    .unwrap();
    let mut registered = false;
    for _ in 0..50 {
        if manager.registry().get("VRChat-Client-1234").is_some() {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(registered, "announced receiver never registered");

    // pinning a manual destination removes everything discovery accepted
    manager.apply_target_edit("127.0.0.1", "9055");
    assert!(manager.registry().get("VRChat-Client-1234").is_none());
    assert_eq!(manager.registry().len(), 1);

    let batch = [TrackerSample::new(
        TrackerRole::Waist,
        Vec3::ZERO,
        Quat::IDENTITY,
    )];
    manager.update_tracker_poses(&batch, false);
    let sent = sender.sent.lock().unwrap().clone();
    assert!(!sent.is_empty());
    assert!(
        sent.iter().all(|(dest, _)| dest.port() == 9055),
        "pose traffic leaked past the manual override: {sent:?}"
    );
    manager.shutdown();
}

#[tokio::test]
async fn aux_flag_broadcast_attempts_every_session() {
    let (manager, sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    let registry = manager.registry();
    registry.upsert(ReceiverSession::new(
        "a",
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        9001,
    ));
    registry.upsert(ReceiverSession::new(
        "b",
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        9002,
    ));
    *sender.fail_port.lock().unwrap() = Some(9001);

    let result = manager.send_aux_flag("/tracking/trackers/aux", "ready", true);
    assert!(result.is_err(), "failing session must surface an error");

    // the healthy session was still attempted despite the failure
    let sent = sender.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.port(), 9002);
    manager.shutdown();
}

#[tokio::test]
async fn test_connection_reports_degraded_state() {
    let (manager, _sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    let (status, message, ping_ms) = manager.test_connection();
    assert_eq!(status, ServiceStatus::Unknown);
    assert!(message.contains("no active receiver"));
    assert_eq!(ping_ms, 0);

    manager.apply_target_edit("127.0.0.1", "9000");
    let (status, message, _ping_ms) = manager.test_connection();
    assert_eq!(status, ServiceStatus::ManualOverride);
    assert!(message.contains("MANUAL"));
    manager.shutdown();
}

#[tokio::test]
async fn aux_flag_broadcast_reaches_every_session() {
    let (manager, sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    manager.apply_target_edit("127.0.0.1", "9060");
    manager.send_aux_flag("/tracking/trackers/aux", "ready", true).unwrap();

    let sent = sender.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "/tracking/trackers/aux");
    manager.shutdown();
}

#[tokio::test]
async fn tracker_states_are_acknowledged_without_traffic() {
    let (manager, sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    let roles = [TrackerRole::Waist, TrackerRole::Head];
    let acks = manager.set_tracker_states(&roles, true).unwrap();
    assert!(acks.iter().all(|(_, ok)| *ok));
    assert!(manager.set_tracker_states(&roles, false).is_none());
    assert!(sender.sent.lock().unwrap().is_empty());
    manager.shutdown();
}

#[tokio::test]
async fn shutdown_drops_all_sessions() {
    let (manager, _sender) = manager_with(Arc::new(MemoryStore::default()));
    let _tx = initialize(&manager).await;

    manager.apply_target_edit("127.0.0.1", "9000");
    assert!(!manager.registry().is_empty());

    manager.shutdown();
    assert!(manager.registry().is_empty());
    assert_eq!(manager.status(), ServiceStatus::Unknown);
}
