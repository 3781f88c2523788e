//! posebridge-osc/src/tracking/dispatch.rs
//!
//! Fan-out of tracker samples to every active receiver session: two OSC
//! messages (position, rotation) per tracker per receiver.

use super::convert::{head_osc_position, quaternion_to_euler, to_osc_position};
use super::{Channel, TrackerRole, TrackerSample, role_label, tracker_address};
use crate::registry::ReceiverRegistry;
use crate::{BridgeError, Result};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{debug, error};

/// Send capability a session dispatches through. Float triplets carry the
/// pose channels; the string+bool variant covers auxiliary flag messages.
pub trait OscSender: Send + Sync {
    fn send_floats(&self, dest: SocketAddr, addr: &str, args: &[f32]) -> Result<()>;
    fn send_string_bool(&self, dest: SocketAddr, addr: &str, text: &str, flag: bool)
    -> Result<()>;
}

/// [`OscSender`] over a single unconnected UDP socket, rosc-encoded.
pub struct UdpOscSender {
    socket: UdpSocket,
}

impl UdpOscSender {
    pub fn new() -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| BridgeError::TransportError(format!("bind sock error: {e}")))?;
        Ok(Self { socket })
    }

    fn send_packet(&self, dest: SocketAddr, msg: OscMessage) -> Result<()> {
        let packet = OscPacket::Message(msg);
        let buf = rosc::encoder::encode(&packet)
            .map_err(|e| BridgeError::TransportError(format!("encode error: {e:?}")))?;
        self.socket
            .send_to(&buf, dest)
            .map_err(|e| BridgeError::TransportError(format!("send error: {e}")))?;
        Ok(())
    }
}

impl OscSender for UdpOscSender {
    fn send_floats(&self, dest: SocketAddr, addr: &str, args: &[f32]) -> Result<()> {
        self.send_packet(
            dest,
            OscMessage {
                addr: addr.to_string(),
                args: args.iter().map(|f| OscType::Float(*f)).collect(),
            },
        )
    }

    fn send_string_bool(
        &self,
        dest: SocketAddr,
        addr: &str,
        text: &str,
        flag: bool,
    ) -> Result<()> {
        self.send_packet(
            dest,
            OscMessage {
                addr: addr.to_string(),
                args: vec![OscType::String(text.to_string()), OscType::Bool(flag)],
            },
        )
    }
}

/// Translates a batch of samples and fans it out across a registry snapshot.
pub struct PoseDispatcher {
    sender: Arc<dyn OscSender>,
}

impl PoseDispatcher {
    pub fn new(sender: Arc<dyn OscSender>) -> Self {
        Self { sender }
    }

    /// Sends position+rotation for every supported sample to every session.
    ///
    /// Returns one `(sample, success)` pair per input. A send failure on any
    /// session fails the whole batch for this call (the next call starts
    /// clean); an empty registry fails the batch without touching the wire.
    pub fn dispatch(
        &self,
        samples: &[TrackerSample],
        registry: &ReceiverRegistry,
    ) -> Vec<(TrackerSample, bool)> {
        let sessions = registry.snapshot();
        if sessions.is_empty() {
            debug!("no receiver sessions, dropping batch of {}", samples.len());
            return samples.iter().map(|s| (s.clone(), false)).collect();
        }

        let mut batch_ok = true;
        for session in &sessions {
            let dest = session.socket_addr();
            for sample in samples {
                let Some(label) = role_label(sample.role) else {
                    continue;
                };
                let position = if sample.role == TrackerRole::Head {
                    head_osc_position(sample.position)
                } else {
                    to_osc_position(sample.position)
                };
                let rotation = quaternion_to_euler(sample.orientation);

                let sent = self
                    .sender
                    .send_floats(
                        dest,
                        &tracker_address(&label, Channel::Position),
                        &[position.x, position.y, position.z],
                    )
                    .and_then(|_| {
                        self.sender.send_floats(
                            dest,
                            &tracker_address(&label, Channel::Rotation),
                            &[rotation.x, rotation.y, rotation.z],
                        )
                    });
                if let Err(e) = sent {
                    error!("send to '{}' ({dest}) failed: {e}", session.key);
                    batch_ok = false;
                }
            }
        }

        samples.iter().map(|s| (s.clone(), batch_ok)).collect()
    }
}
