use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use super::{ControlChannel, PacketSource, PeerEvents, PeerFactory, RtcPeer, TrackInfo};

/// Builds `RTCPeerConnection`s with default codecs and interceptors so that
/// inbound audio negotiates.
pub struct WebRtcPeerFactory {
    api: API,
    config: RTCConfiguration,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<String>) -> anyhow::Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers,
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self) -> anyhow::Result<Arc<dyn RtcPeer>> {
        let pc = self.api.new_peer_connection(self.config.clone()).await?;
        Ok(Arc::new(WebRtcPeer { pc: Arc::new(pc) }))
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl RtcPeer for WebRtcPeer {
    async fn apply_remote_offer(&self, sdp: String) -> anyhow::Result<()> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.pc.set_remote_description(offer).await?;
        Ok(())
    }

    async fn apply_remote_answer(&self, sdp: String) -> anyhow::Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn create_offer(&self) -> anyhow::Result<RTCSessionDescription> {
        Ok(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> anyhow::Result<RTCSessionDescription> {
        Ok(self.pc.create_answer(None).await?)
    }

    async fn commit_local(&self, description: RTCSessionDescription) -> anyhow::Result<()> {
        self.pc.set_local_description(description).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: RTCIceCandidateInit) -> anyhow::Result<()> {
        self.pc.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pc.close().await?;
        Ok(())
    }

    fn subscribe(&self, events: Arc<dyn PeerEvents>) {
        let handler = events.clone();
        self.pc.on_negotiation_needed(Box::new(move || {
            let events = handler.clone();
            tokio::spawn(async move { events.negotiation_needed().await });
            Box::pin(async {})
        }));

        let handler = events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = handler.clone();
                // Inline so candidates trickle in discovery order and the
                // end-of-gathering event comes last.
                Box::pin(async move {
                    match candidate.map(|c| c.to_json()).transpose() {
                        Ok(init) => events.local_candidate(init).await,
                        Err(err) => warn!(error = %err, "failed to describe local ICE candidate"),
                    }
                })
            }));

        let handler = events.clone();
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let events = handler.clone();
                Box::pin(async move {
                    info!(label = %dc.label(), channel_id = dc.id(), "data channel announced");
                    let channel: Arc<dyn ControlChannel> = dc.clone();
                    // Handlers are installed before this future resolves so an
                    // already-open channel still reports its open event.
                    if events.data_channel(channel).await {
                        wire_data_channel(&dc, events);
                    }
                })
            }));

        let handler = events.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                if track.kind() == RTPCodecType::Audio {
                    let events = handler.clone();
                    let info = TrackInfo {
                        id: track.id(),
                        codec: track.codec().capability.mime_type,
                    };
                    tokio::spawn(async move { events.track(info, track).await });
                } else {
                    debug!(kind = ?track.kind(), track_id = %track.id(), "ignoring non-audio track");
                }
                Box::pin(async {})
            },
        ));

        let handler = events;
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let events = handler.clone();
                tokio::spawn(async move { events.connection_state(state).await });
                Box::pin(async {})
            }));

        self.pc
            .on_ice_connection_state_change(Box::new(|state: RTCIceConnectionState| {
                info!(
                    state = %state,
                    at = %chrono::Utc::now().to_rfc3339(),
                    "ICE connection state changed"
                );
                Box::pin(async {})
            }));
    }
}

fn wire_data_channel(dc: &Arc<RTCDataChannel>, events: Arc<dyn PeerEvents>) {
    let on_open = events.clone();
    dc.on_open(Box::new(move || {
        tokio::spawn(async move { on_open.channel_open().await });
        Box::pin(async {})
    }));

    // Messages are handled in arrival order, one at a time.
    let on_message = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = on_message.clone();
        Box::pin(async move { events.channel_message(msg.data).await })
    }));

    dc.on_close(Box::new(move || {
        let events = events.clone();
        Box::pin(async move { events.channel_closed().await })
    }));
}

#[async_trait]
impl ControlChannel for RTCDataChannel {
    fn name(&self) -> String {
        self.label().to_owned()
    }

    fn stream_id(&self) -> u16 {
        self.id()
    }

    async fn transmit(&self, frame: String) -> anyhow::Result<()> {
        self.send_text(frame).await?;
        Ok(())
    }
}

#[async_trait]
impl PacketSource for TrackRemote {
    async fn next_packet(&self) -> anyhow::Result<usize> {
        let (packet, _attributes) = self.read_rtp().await?;
        Ok(packet.payload.len())
    }
}
