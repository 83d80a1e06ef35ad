//! In-memory stand-ins for the connection library, used by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::{ControlChannel, PacketSource, PeerEvents, PeerFactory, RtcPeer};

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub fn description(kind: &str, sdp: &str) -> RTCSessionDescription {
    serde_json::from_value(serde_json::json!({ "type": kind, "sdp": sdp }))
        .expect("session description json")
}

pub struct RecordingChannel {
    name: String,
    frames: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlChannel for RecordingChannel {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn stream_id(&self) -> u16 {
        1
    }

    async fn transmit(&self, frame: String) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("sctp association closed");
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ApplyRemote,
    CreateOffer,
    CreateAnswer,
    CommitLocal,
}

pub struct FakePeer {
    fail_at: Mutex<Option<Stage>>,
    answer_sdp: Mutex<String>,
    offers_created: AtomicUsize,
    local: Mutex<Vec<RTCSessionDescription>>,
    remote: Mutex<Vec<(String, String)>>,
    candidates: Mutex<Vec<RTCIceCandidateInit>>,
    events: Mutex<Option<Arc<dyn PeerEvents>>>,
    closed: AtomicBool,
}

impl FakePeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_at: Mutex::new(None),
            answer_sdp: Mutex::new(ANSWER_SDP.to_string()),
            offers_created: AtomicUsize::new(0),
            local: Mutex::new(Vec::new()),
            remote: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn fail_at(&self, stage: Stage) {
        *self.fail_at.lock() = Some(stage);
    }

    pub fn answer_with(&self, sdp: &str) {
        *self.answer_sdp.lock() = sdp.to_string();
    }

    pub fn local_descriptions(&self) -> Vec<RTCSessionDescription> {
        self.local.lock().clone()
    }

    /// `(type, sdp)` pairs applied as remote descriptions.
    pub fn remote_descriptions(&self) -> Vec<(String, String)> {
        self.remote.lock().clone()
    }

    pub fn remote_candidates(&self) -> Vec<RTCIceCandidateInit> {
        self.candidates.lock().clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self, stage: Stage) -> anyhow::Result<()> {
        if *self.fail_at.lock() == Some(stage) {
            anyhow::bail!("injected failure at {stage:?}");
        }
        Ok(())
    }
}

#[async_trait]
impl RtcPeer for FakePeer {
    async fn apply_remote_offer(&self, sdp: String) -> anyhow::Result<()> {
        self.check(Stage::ApplyRemote)?;
        self.remote.lock().push(("offer".into(), sdp));
        Ok(())
    }

    async fn apply_remote_answer(&self, sdp: String) -> anyhow::Result<()> {
        self.check(Stage::ApplyRemote)?;
        self.remote.lock().push(("answer".into(), sdp));
        Ok(())
    }

    async fn create_offer(&self) -> anyhow::Result<RTCSessionDescription> {
        self.check(Stage::CreateOffer)?;
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(description(
            "offer",
            &format!("v=0\r\no=- {n} {n} IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n"),
        ))
    }

    async fn create_answer(&self) -> anyhow::Result<RTCSessionDescription> {
        self.check(Stage::CreateAnswer)?;
        Ok(description("answer", &self.answer_sdp.lock()))
    }

    async fn commit_local(&self, description: RTCSessionDescription) -> anyhow::Result<()> {
        self.check(Stage::CommitLocal)?;
        self.local.lock().push(description);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: RTCIceCandidateInit) -> anyhow::Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, events: Arc<dyn PeerEvents>) {
        *self.events.lock() = Some(events);
    }
}

/// Hands out one prepared peer per call and counts the calls.
pub struct FakeFactory {
    peer: Arc<FakePeer>,
    fail: bool,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(peer: Arc<FakePeer>) -> Arc<Self> {
        Arc::new(Self {
            peer,
            fail: false,
            created: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            peer: FakePeer::new(),
            fail: true,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerFactory for FakeFactory {
    async fn create(&self) -> anyhow::Result<Arc<dyn RtcPeer>> {
        if self.fail {
            anyhow::bail!("no UDP sockets available");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.peer.clone())
    }
}

/// Packet source driven by a channel. Dropping every sender ends the
/// stream; holding one open with nothing queued models a silent peer.
pub struct ScriptedSource {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<usize, String>>>,
}

impl ScriptedSource {
    pub fn new() -> (mpsc::UnboundedSender<Result<usize, String>>, Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Arc::new(Self {
                rx: tokio::sync::Mutex::new(rx),
            }),
        )
    }
}

#[async_trait]
impl PacketSource for ScriptedSource {
    async fn next_packet(&self) -> anyhow::Result<usize> {
        match self.rx.lock().await.recv().await {
            Some(Ok(len)) => Ok(len),
            Some(Err(err)) => Err(anyhow::anyhow!(err)),
            None => anyhow::bail!("EOF"),
        }
    }
}
