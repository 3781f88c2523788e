//! posebridge-osc/src/discovery.rs
//!
//! Decides which announced services are tracking-capable receivers. The
//! announcement feed itself (mDNS browsing) belongs to the external
//! discovery collaborator; we consume resolved profiles over a channel,
//! interrogate each candidate over OSCQuery and register the ones that
//! understand the tracker address space.

use crate::oscquery::OscQueryApi;
use crate::registry::{MANUAL_SESSION_KEY, ReceiverRegistry, ReceiverSession};
use crate::tracking::TRACKERS_ROOT;
use crate::{Result, ServiceStatus};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Transport an announcement was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Osc,
    OscQuery,
}

/// A resolved service announcement handed to us by the discovery
/// collaborator. Read-only input.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub kind: ServiceKind,
}

/// Consumes service announcements and maintains the receiver registry.
pub struct DiscoveryMatcher {
    registry: Arc<ReceiverRegistry>,
    query: Arc<dyn OscQueryApi>,
    /// Our own advertised instance name; announcements echoing it are ours.
    own_service_name: String,
    /// This host's non-loopback address, for the loopback substitution rule.
    local_address: Option<IpAddr>,
    status_tx: Arc<watch::Sender<ServiceStatus>>,
    /// Mirrors `Config::manual_override`; while true, announcements are
    /// observed but have no effect.
    override_rx: watch::Receiver<bool>,
}

impl DiscoveryMatcher {
    pub fn new(
        registry: Arc<ReceiverRegistry>,
        query: Arc<dyn OscQueryApi>,
        own_service_name: impl Into<String>,
        local_address: Option<IpAddr>,
        status_tx: Arc<watch::Sender<ServiceStatus>>,
        override_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            query,
            own_service_name: own_service_name.into(),
            local_address,
            status_tx,
            override_rx,
        }
    }

    /// The registry this matcher writes into.
    pub fn registry(&self) -> Arc<ReceiverRegistry> {
        self.registry.clone()
    }

    /// Drains the announcement feed until it closes or shutdown is signalled
    /// (a dropped shutdown sender counts as shutdown). Each profile is vetted
    /// on its own task, fire-and-forget: a peer that hangs in its OSCQuery
    /// round-trips only stalls itself, never the feed.
    pub async fn run(
        self: Arc<Self>,
        mut announcements: mpsc::Receiver<ServiceProfile>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    match changed {
                        Ok(()) if !*shutdown_rx.borrow() => continue,
                        _ => {
                            info!("discovery matcher shutting down");
                            break;
                        }
                    }
                }
                maybe_profile = announcements.recv() => {
                    match maybe_profile {
                        Some(profile) => {
                            let matcher = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = matcher.handle_announcement(&profile).await {
                                    warn!(
                                        "discovery failed for '{}' at {}:{}: {e}",
                                        profile.name, profile.address, profile.port
                                    );
                                }
                            });
                        }
                        None => {
                            info!("announcement feed closed, discovery matcher exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Vets a single announcement and upserts a session on acceptance.
    pub async fn handle_announcement(&self, profile: &ServiceProfile) -> Result<()> {
        if *self.override_rx.borrow() {
            debug!("manual override active, ignoring '{}'", profile.name);
            return Ok(());
        }
        if profile.name == self.own_service_name {
            debug!("skipping our own announcement '{}'", profile.name);
            return Ok(());
        }
        if profile.name == MANUAL_SESSION_KEY {
            warn!("announcement uses the reserved key '{MANUAL_SESSION_KEY}', ignoring");
            return Ok(());
        }
        // Plain OSC announcements carry no queryable tree; only the OSCQuery
        // side of a service tells us whether it understands trackers.
        if profile.kind != ServiceKind::OscQuery {
            debug!("'{}' is not an OSCQuery announcement, ignoring", profile.name);
            return Ok(());
        }

        let tree = self.query.query_tree(profile.address, profile.port).await?;
        if tree.node_with_path(TRACKERS_ROOT).is_none() {
            info!(
                "'{}' does not expose {TRACKERS_ROOT}, not a tracking receiver",
                profile.name
            );
            return Ok(());
        }

        let host_info = self
            .query
            .query_host_info(profile.address, profile.port)
            .await?;

        // A service advertised under our own routable address is pinned to
        // loopback; on multi-homed hosts the external route may not loop.
        let mut address = profile.address;
        if self.local_address == Some(address) {
            debug!("'{}' advertised our local address, pinning to loopback", profile.name);
            address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        }

        let session = ReceiverSession::new(&profile.name, address, host_info.OSC_PORT);
        if self.registry.upsert(session) {
            info!(
                "accepted tracking receiver '{}' => {}:{}",
                profile.name, address, host_info.OSC_PORT
            );
            if *self.status_tx.borrow() != ServiceStatus::Success {
                let _ = self.status_tx.send(ServiceStatus::Success);
            }
        }
        Ok(())
    }
}

/// First non-loopback IPv4 address of this host, if any.
pub fn local_ip() -> Option<IpAddr> {
    if_addrs::get_if_addrs().ok().and_then(|addrs| {
        addrs
            .into_iter()
            .filter(|a| !a.is_loopback())
            .map(|a| a.ip())
            .find(|ip| ip.is_ipv4())
    })
}
