//! posebridge-osc/src/oscquery/client.rs
//!
//! HTTP client for querying a discovered OSCQuery service: its capability
//! tree (root endpoint) and its `/host_info` document.

use crate::oscquery::models::{OscQueryHostInfo, OscQueryNode};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use tokio::time::Duration;
use tracing::debug;

/// Capability-tree and host-info queries against an announced service.
/// Behind a trait so discovery tests can stand in a canned responder.
#[async_trait]
pub trait OscQueryApi: Send + Sync {
    async fn query_tree(&self, address: IpAddr, port: u16) -> Result<OscQueryNode>;
    async fn query_host_info(&self, address: IpAddr, port: u16) -> Result<OscQueryHostInfo>;
}

pub struct OscQueryClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl OscQueryClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), timeout }
    }

    fn url(address: IpAddr, port: u16, path: &str) -> String {
        // SocketAddr's Display brackets IPv6 hosts for us.
        format!("http://{}{}", SocketAddr::new(address, port), path)
    }
}

impl Default for OscQueryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OscQueryApi for OscQueryClient {
    async fn query_tree(&self, address: IpAddr, port: u16) -> Result<OscQueryNode> {
        let url = Self::url(address, port, "/");
        debug!("querying OSCQuery tree from {url}");

        let res = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BridgeError::OscQueryError(format!("failed to query tree: {e}")))?;

        res.json::<OscQueryNode>()
            .await
            .map_err(|e| BridgeError::OscQueryError(format!("failed to parse tree response: {e}")))
    }

    async fn query_host_info(&self, address: IpAddr, port: u16) -> Result<OscQueryHostInfo> {
        let url = Self::url(address, port, "/host_info");
        debug!("querying OSCQuery host info from {url}");

        let res = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BridgeError::OscQueryError(format!("failed to query host info: {e}")))?;

        res.json::<OscQueryHostInfo>().await.map_err(|e| {
            BridgeError::OscQueryError(format!("failed to parse host info response: {e}"))
        })
    }
}
