//! posebridge-osc/src/tracking/mod.rs
//!
//! Tracker sample types, the role→id mapping and OSC address building
//! for the `/tracking/trackers/...` address space.

pub mod convert;
pub mod dispatch;

use serde::{Deserialize, Serialize};

/// Root of the tracker address space a receiver must understand.
pub const TRACKERS_ROOT: &str = "/tracking/trackers";

/// The head channel is addressed by this literal label, never by a numeric id.
pub const HEAD_LABEL: &str = "head";

/// Semantic body-part assignment of a tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TrackerRole {
    Waist,
    LeftFoot,
    RightFoot,
    LeftKnee,
    RightKnee,
    LeftElbow,
    RightElbow,
    Chest,
    Head,
    LeftShoulder,
    RightShoulder,
    LeftHand,
    RightHand,
}

/// Plain 3-component vector; OSC carries these as `,fff` triplets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Unit quaternion, w first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }
}

/// One pose update for one tracker, produced per frame by the tracking host.
#[derive(Debug, Clone)]
pub struct TrackerSample {
    pub role: TrackerRole,
    pub position: Vec3,
    pub orientation: Quat,
}

impl TrackerSample {
    pub fn new(role: TrackerRole, position: Vec3, orientation: Quat) -> Self {
        Self { role, position, orientation }
    }
}

/// Stable numeric id a role is addressed by on the wire.
/// Returns -1 for every role outside the eight supported ones; the head is
/// handled separately by label and also maps to -1 here.
pub fn role_to_id(role: TrackerRole) -> i32 {
    match role {
        TrackerRole::Waist => 1,
        TrackerRole::LeftFoot => 2,
        TrackerRole::RightFoot => 3,
        TrackerRole::LeftKnee => 4,
        TrackerRole::RightKnee => 5,
        TrackerRole::LeftElbow => 6,
        TrackerRole::RightElbow => 7,
        TrackerRole::Chest => 8,
        _ => -1,
    }
}

/// The address label a role is sent under, or `None` when the role is
/// unsupported and the sample should be skipped.
pub fn role_label(role: TrackerRole) -> Option<String> {
    if role == TrackerRole::Head {
        return Some(HEAD_LABEL.to_string());
    }
    match role_to_id(role) {
        -1 => None,
        id => Some(id.to_string()),
    }
}

/// Which of the two per-tracker messages an address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Position,
    Rotation,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Position => "position",
            Channel::Rotation => "rotation",
        }
    }
}

/// Builds `/tracking/trackers/{label}/{position|rotation}`.
pub fn tracker_address(label: &str, channel: Channel) -> String {
    format!("{TRACKERS_ROOT}/{label}/{}", channel.as_str())
}
