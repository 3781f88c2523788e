//! Data structures for the OSCQuery JSON surface we consume as a client.

#![allow(non_snake_case)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Host info response for `/host_info`, uppercase keys per the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscQueryHostInfo {
    #[serde(default)]
    pub NAME: String,

    #[serde(default)]
    pub OSC_IP: Option<String>,

    pub OSC_PORT: u16,

    #[serde(default)]
    pub OSC_TRANSPORT: Option<String>,

    #[serde(default)]
    pub EXTENSIONS: HashMap<String, bool>,
}

/// Node in the OSCQuery "directory" tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscQueryNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub DESCRIPTION: Option<String>,

    #[serde(default)]
    pub FULL_PATH: String,

    /// Bitmask for read/write. 1=Read, 2=Write, 3=Read+Write
    #[serde(default)]
    pub ACCESS: u8,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub CONTENTS: HashMap<String, OscQueryNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub TYPE: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub VALUE: Vec<serde_json::Value>,
}

impl OscQueryNode {
    /// Walks `CONTENTS` along a `/`-separated path from this node.
    /// Returns `None` when any segment is missing.
    pub fn node_with_path(&self, path: &str) -> Option<&OscQueryNode> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Some(self);
        }
        let mut node = self;
        for segment in trimmed.split('/') {
            node = node.CONTENTS.get(segment)?;
        }
        Some(node)
    }
}
