//! Capability seams over the connection library.
//!
//! `RtcPeer` is what a session may ask of its connection, `PeerEvents` is
//! what the connection reports back, and `PeerFactory` builds new
//! connections for the HTTP bootstrap. The `webrtc` crate adapter lives in
//! [`rtc`]; tests use the in-memory fakes in `mock`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

#[cfg(test)]
pub(crate) mod mock;
pub mod rtc;

pub use rtc::{WebRtcPeer, WebRtcPeerFactory};

#[async_trait]
pub trait RtcPeer: Send + Sync + 'static {
    async fn apply_remote_offer(&self, sdp: String) -> anyhow::Result<()>;
    async fn apply_remote_answer(&self, sdp: String) -> anyhow::Result<()>;
    async fn create_offer(&self) -> anyhow::Result<RTCSessionDescription>;
    async fn create_answer(&self) -> anyhow::Result<RTCSessionDescription>;
    async fn commit_local(&self, description: RTCSessionDescription) -> anyhow::Result<()>;
    async fn add_remote_candidate(&self, candidate: RTCIceCandidateInit) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;

    /// Route every connection callback to `events`. Called once, before the
    /// remote offer is applied.
    fn subscribe(&self, events: Arc<dyn PeerEvents>);
}

/// Independent subscription points. Local candidates and channel messages
/// are delivered one at a time in arrival order; every other call runs on its
/// own task.
#[async_trait]
pub trait PeerEvents: Send + Sync + 'static {
    async fn negotiation_needed(&self);

    /// `None` marks the end of candidate gathering.
    async fn local_candidate(&self, candidate: Option<RTCIceCandidateInit>);

    /// Returns `false` when the channel was refused; its events are then
    /// never forwarded.
    async fn data_channel(&self, channel: Arc<dyn ControlChannel>) -> bool;
    async fn channel_open(&self);
    async fn channel_message(&self, payload: Bytes);
    async fn channel_closed(&self);

    async fn track(&self, track: TrackInfo, source: Arc<dyn PacketSource>);
    async fn connection_state(&self, state: RTCPeerConnectionState);
}

#[async_trait]
pub trait PeerFactory: Send + Sync + 'static {
    async fn create(&self) -> anyhow::Result<Arc<dyn RtcPeer>>;
}

/// The peer-to-peer control channel, reduced to what signaling needs.
#[async_trait]
pub trait ControlChannel: Send + Sync + 'static {
    fn name(&self) -> String;
    fn stream_id(&self) -> u16;
    async fn transmit(&self, frame: String) -> anyhow::Result<()>;
}

/// A blocking packet read against an inbound media stream. Resolves with
/// the payload size; any error (including end of stream) is final.
#[async_trait]
pub trait PacketSource: Send + Sync + 'static {
    async fn next_packet(&self) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub codec: String,
}
