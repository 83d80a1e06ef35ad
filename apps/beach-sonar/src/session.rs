use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::bootstrap::HandshakeError;
use crate::liveness::{LivenessConfig, TrackMonitor};
use crate::negotiation::{self, Negotiation, NegotiationState};
use crate::peer::{ControlChannel, PacketSource, PeerEvents, RtcPeer, TrackInfo};
use crate::relay;
use crate::signaling::{
    heartbeat, CandidatePolicy, SignalingChannel, SignalingKey, DEFAULT_BUFFER_CAPACITY,
};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// `None` disables the dev heartbeat.
    pub heartbeat_interval: Option<Duration>,
    pub liveness: LivenessConfig,
    pub candidate_policy: CandidatePolicy,
    pub buffer_capacity: usize,
    pub apply_remote_answers: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Some(heartbeat::DEFAULT_INTERVAL),
            liveness: LivenessConfig::default(),
            candidate_policy: CandidatePolicy::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            apply_remote_answers: true,
        }
    }
}

/// State for one accepted connection.
///
/// After the bootstrap returns, the session is owned only by the callbacks it
/// subscribed on its peer. A failed or closed connection releases the peer,
/// which drops those callbacks and with them the session.
pub struct Session {
    id: Uuid,
    peer: Mutex<Option<Arc<dyn RtcPeer>>>,
    signaling: Arc<SignalingChannel>,
    negotiation: Negotiation,
    settings: SessionSettings,
}

impl Session {
    pub fn new(peer: Arc<dyn RtcPeer>, settings: SessionSettings) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            peer: Mutex::new(Some(peer)),
            signaling: Arc::new(SignalingChannel::new(
                settings.candidate_policy,
                settings.buffer_capacity,
            )),
            negotiation: Negotiation::default(),
            settings,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn signaling(&self) -> &Arc<SignalingChannel> {
        &self.signaling
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiation.state()
    }

    pub fn is_released(&self) -> bool {
        self.peer.lock().is_none()
    }

    fn peer(&self) -> Option<Arc<dyn RtcPeer>> {
        self.peer.lock().clone()
    }

    /// Apply a remote offer and commit a local answer, returning its SDP.
    pub async fn answer_offer(&self, offer: String) -> Result<String, HandshakeError> {
        let peer = self
            .peer()
            .ok_or_else(|| HandshakeError::internal("answer offer", "session released"))?;

        peer.apply_remote_offer(offer)
            .await
            .map_err(|err| HandshakeError::internal("apply remote offer", err))?;
        let answer = peer
            .create_answer()
            .await
            .map_err(|err| HandshakeError::internal("create answer", err))?;
        if answer.sdp.is_empty() {
            return Err(HandshakeError::internal("create answer", "empty answer"));
        }
        let sdp = answer.sdp.clone();
        peer.commit_local(answer)
            .await
            .map_err(|err| HandshakeError::internal("commit local answer", err))?;

        self.negotiation.settle();
        Ok(sdp)
    }

    /// Close the signaling channel and the connection, then drop the
    /// session's handle to it. The dev heartbeat stops on its next tick.
    pub async fn release(&self) {
        self.signaling.mark_closed();
        let peer = self.peer.lock().take();
        if let Some(peer) = peer {
            if let Err(err) = peer.close().await {
                warn!(session_id = %self.id, error = %err, "failed to close peer connection");
            }
            debug!(session_id = %self.id, "session released");
        }
    }

    /// React to one inbound `{key, value}` message.
    pub async fn handle_signal(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let Some(key) = SignalingKey::parse(key) else {
            if !key.is_empty() {
                debug!(session_id = %self.id, key, "ignoring unknown signaling key");
            }
            return Ok(());
        };

        match key {
            SignalingKey::Dev => {
                debug!(session_id = %self.id, value, "remote dev message");
            }
            SignalingKey::Answer if !self.settings.apply_remote_answers => {
                info!(session_id = %self.id, "ignoring remote answer; applying answers is disabled");
            }
            SignalingKey::Answer => {
                let peer = self.peer().context("session released")?;
                peer.apply_remote_answer(value.to_owned())
                    .await
                    .context("apply remote answer")?;
                self.negotiation.settle();
                info!(session_id = %self.id, "remote answer applied");
            }
            SignalingKey::Candidate => {
                let candidate: RTCIceCandidateInit =
                    serde_json::from_str(value).context("decode remote candidate")?;
                let peer = self.peer().context("session released")?;
                peer.add_remote_candidate(candidate)
                    .await
                    .context("add remote candidate")?;
                debug!(session_id = %self.id, "remote ICE candidate added");
            }
            SignalingKey::Offer => {
                let answer = self.answer_offer(value.to_owned()).await?;
                self.signaling
                    .send(SignalingKey::Answer, &answer)
                    .await
                    .context("send renegotiation answer")?;
                info!(session_id = %self.id, "answered remote renegotiation offer");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeerEvents for Session {
    async fn negotiation_needed(&self) {
        let Some(peer) = self.peer() else {
            debug!(session_id = %self.id, "negotiation needed after release");
            return;
        };
        negotiation::on_negotiation_needed(peer.as_ref(), &self.signaling, &self.negotiation, self.id)
            .await;
    }

    async fn local_candidate(&self, candidate: Option<RTCIceCandidateInit>) {
        relay::trickle(&self.signaling, candidate, self.id).await;
    }

    async fn data_channel(&self, channel: Arc<dyn ControlChannel>) -> bool {
        let label = channel.name();
        let channel_id = channel.stream_id();
        match self.signaling.attach(channel) {
            Ok(()) => {
                info!(session_id = %self.id, label = %label, channel_id, "signaling channel attached");
                true
            }
            Err(err) => {
                warn!(
                    session_id = %self.id,
                    label = %label,
                    channel_id,
                    error = %err,
                    "refusing additional data channel"
                );
                false
            }
        }
    }

    async fn channel_open(&self) {
        let flushed = self.signaling.mark_open().await;
        info!(session_id = %self.id, flushed, "signaling channel open");
        if let Some(period) = self.settings.heartbeat_interval {
            heartbeat::spawn(self.signaling.clone(), period, self.id);
        }
    }

    async fn channel_message(&self, payload: Bytes) {
        let (key, value) = SignalingChannel::receive(&payload);
        debug!(session_id = %self.id, key = %key, len = value.len(), "signaling message received");
        if let Err(err) = self.handle_signal(&key, &value).await {
            warn!(session_id = %self.id, key = %key, error = %err, "failed to handle signaling message");
        }
    }

    async fn channel_closed(&self) {
        self.signaling.mark_closed();
        info!(session_id = %self.id, "signaling channel closed");
    }

    async fn track(&self, track: TrackInfo, source: Arc<dyn PacketSource>) {
        info!(
            session_id = %self.id,
            track_id = %track.id,
            codec = %track.codec,
            "audio track attached; watching for packets"
        );
        let mut monitor = TrackMonitor::new(self.settings.liveness);
        let stall = monitor.run(source.as_ref()).await;
        warn!(
            session_id = %self.id,
            track_id = %track.id,
            error = %stall,
            "audio track stalled"
        );
    }

    async fn connection_state(&self, state: RTCPeerConnectionState) {
        info!(
            session_id = %self.id,
            state = %state,
            at = %chrono::Utc::now().to_rfc3339(),
            "peer connection state changed"
        );
        if matches!(
            state,
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
        ) {
            self.release().await;
        }
    }
}
