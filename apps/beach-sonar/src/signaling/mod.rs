//! Key/value signaling over the peer-to-peer control channel.
//!
//! The channel reference is assigned once, when the remote peer announces
//! its data channel, and every read of it goes through the same lock as the
//! assignment. Frames produced before the channel is open wait in a bounded
//! queue and are flushed when the open event arrives.

pub mod heartbeat;
pub mod message;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::peer::ControlChannel;

pub use message::{SignalingKey, SignalingMessage};

pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel not attached")]
    ChannelUnavailable,
    #[error("signaling channel already attached")]
    AlreadyAttached,
    #[error("outbound signaling buffer full ({0} frames)")]
    BufferFull(usize),
    #[error("signaling transport error: {0}")]
    Transport(String),
    #[error("malformed signaling message: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What to do with a local candidate discovered before the control channel
/// is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePolicy {
    /// Queue it and send it once the channel opens.
    #[default]
    Buffer,
    /// Fail with `ChannelUnavailable` and drop it.
    Drop,
}

/// Result of a send that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

enum Link {
    Detached,
    Attached {
        channel: Arc<dyn ControlChannel>,
        open: bool,
    },
    Closed,
}

struct Inner {
    link: Link,
    pending: VecDeque<String>,
}

pub struct SignalingChannel {
    inner: Mutex<Inner>,
    policy: CandidatePolicy,
    capacity: usize,
}

impl SignalingChannel {
    pub fn new(policy: CandidatePolicy, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                link: Link::Detached,
                pending: VecDeque::new(),
            }),
            policy,
            capacity,
        }
    }

    pub fn policy(&self) -> CandidatePolicy {
        self.policy
    }

    pub fn attach(&self, channel: Arc<dyn ControlChannel>) -> Result<(), SignalingError> {
        let mut inner = self.inner.lock();
        match inner.link {
            Link::Detached => {
                inner.link = Link::Attached {
                    channel,
                    open: false,
                };
                Ok(())
            }
            _ => Err(SignalingError::AlreadyAttached),
        }
    }

    /// Mark the channel open and flush queued frames. Returns how many
    /// queued frames were handed to the transport.
    pub async fn mark_open(&self) -> usize {
        let (channel, pending) = {
            let mut inner = self.inner.lock();
            let channel = match &mut inner.link {
                Link::Attached { channel, open } if !*open => {
                    *open = true;
                    channel.clone()
                }
                _ => return 0,
            };
            (channel, std::mem::take(&mut inner.pending))
        };

        let mut flushed = 0;
        for frame in pending {
            match channel.transmit(frame).await {
                Ok(()) => flushed += 1,
                Err(err) => warn!(
                    label = %channel.name(),
                    error = %err,
                    "failed to flush queued signaling frame"
                ),
            }
        }
        flushed
    }

    pub fn mark_closed(&self) {
        let mut inner = self.inner.lock();
        inner.link = Link::Closed;
        inner.pending.clear();
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.inner.lock().link, Link::Attached { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().link, Link::Attached { open: true, .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.inner.lock().link, Link::Closed)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Send one `{key, value}` frame.
    ///
    /// Fails with `ChannelUnavailable` before attach, queues between attach
    /// and open, and transmits once open.
    pub async fn send(&self, key: SignalingKey, value: &str) -> Result<Delivery, SignalingError> {
        let frame = message::encode(key, value)?;
        let channel = {
            let mut inner = self.inner.lock();
            let ready = match &inner.link {
                Link::Detached => return Err(SignalingError::ChannelUnavailable),
                Link::Closed => return Err(SignalingError::Transport("channel closed".into())),
                Link::Attached { channel, open } => open.then(|| channel.clone()),
            };
            match ready {
                Some(channel) => channel,
                None => {
                    self.enqueue(&mut inner, frame)?;
                    return Ok(Delivery::Queued);
                }
            }
        };

        channel
            .transmit(frame)
            .await
            .map_err(|err| SignalingError::Transport(err.to_string()))?;
        Ok(Delivery::Sent)
    }

    /// Send a serialized candidate, honouring the pre-attach policy.
    pub async fn relay_candidate(&self, value: &str) -> Result<Delivery, SignalingError> {
        if self.policy == CandidatePolicy::Buffer {
            let mut inner = self.inner.lock();
            if matches!(inner.link, Link::Detached) {
                let frame = message::encode(SignalingKey::Candidate, value)?;
                self.enqueue(&mut inner, frame)?;
                return Ok(Delivery::Queued);
            }
        }
        self.send(SignalingKey::Candidate, value).await
    }

    /// Parse an inbound frame. Malformed payloads yield `("", "")`; an empty
    /// key means the message should be ignored.
    pub fn receive(payload: &[u8]) -> (String, String) {
        match message::decode(payload) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, len = payload.len(), "ignoring malformed signaling message");
                (String::new(), String::new())
            }
        }
    }

    fn enqueue(&self, inner: &mut Inner, frame: String) -> Result<(), SignalingError> {
        if inner.pending.len() >= self.capacity {
            return Err(SignalingError::BufferFull(self.capacity));
        }
        inner.pending.push_back(frame);
        debug!(pending = inner.pending.len(), "queued signaling frame until channel opens");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::mock::RecordingChannel;

    fn channel(policy: CandidatePolicy) -> SignalingChannel {
        SignalingChannel::new(policy, 4)
    }

    #[test_timeout::tokio_timeout_test]
    async fn send_before_attach_is_unavailable_and_silent() {
        let signaling = channel(CandidatePolicy::Buffer);
        let err = signaling.send(SignalingKey::Dev, "0").await.unwrap_err();
        assert!(matches!(err, SignalingError::ChannelUnavailable));
        assert_eq!(signaling.pending_len(), 0);

        let wire = RecordingChannel::new("control");
        signaling.attach(wire.clone()).unwrap();
        signaling.mark_open().await;
        assert!(wire.frames().is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn round_trips_every_key_after_open() {
        let signaling = channel(CandidatePolicy::Buffer);
        let wire = RecordingChannel::new("control");
        signaling.attach(wire.clone()).unwrap();
        signaling.mark_open().await;

        for key in SignalingKey::ALL {
            let value = format!("value-for-{key}");
            assert_eq!(signaling.send(key, &value).await.unwrap(), Delivery::Sent);
            let frames = wire.frames();
            let last = frames.last().unwrap();
            let (got_key, got_value) = SignalingChannel::receive(last.as_bytes());
            assert_eq!(got_key, key.as_str());
            assert_eq!(got_value, value);
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn dev_counter_scenario() {
        let signaling = channel(CandidatePolicy::Buffer);
        let wire = RecordingChannel::new("control");
        signaling.attach(wire.clone()).unwrap();
        signaling.mark_open().await;

        signaling.send(SignalingKey::Dev, "3").await.unwrap();
        let frames = wire.frames();
        assert_eq!(
            SignalingChannel::receive(frames[0].as_bytes()),
            ("dev".to_string(), "3".to_string())
        );
    }

    #[test_timeout::timeout]
    fn receive_malformed_yields_empty_pair() {
        for payload in [&b"{"[..], b"[]", b"", br#"{"key":1}"#] {
            assert_eq!(
                SignalingChannel::receive(payload),
                (String::new(), String::new())
            );
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn attach_is_single_assignment() {
        let signaling = channel(CandidatePolicy::Buffer);
        signaling.attach(RecordingChannel::new("first")).unwrap();
        let err = signaling.attach(RecordingChannel::new("second")).unwrap_err();
        assert!(matches!(err, SignalingError::AlreadyAttached));
    }

    #[test_timeout::tokio_timeout_test]
    async fn frames_sent_between_attach_and_open_are_flushed_in_order() {
        let signaling = channel(CandidatePolicy::Buffer);
        let wire = RecordingChannel::new("control");
        signaling.attach(wire.clone()).unwrap();

        assert_eq!(
            signaling.send(SignalingKey::Offer, "sdp-1").await.unwrap(),
            Delivery::Queued
        );
        assert_eq!(
            signaling.send(SignalingKey::Dev, "0").await.unwrap(),
            Delivery::Queued
        );
        assert!(wire.frames().is_empty());

        assert_eq!(signaling.mark_open().await, 2);
        let keys: Vec<String> = wire
            .frames()
            .iter()
            .map(|f| SignalingChannel::receive(f.as_bytes()).0)
            .collect();
        assert_eq!(keys, vec!["offer", "dev"]);
        assert_eq!(signaling.pending_len(), 0);
        assert_eq!(signaling.mark_open().await, 0);
    }

    #[test_timeout::tokio_timeout_test]
    async fn buffer_policy_holds_candidates_before_attach() {
        let signaling = channel(CandidatePolicy::Buffer);
        assert_eq!(
            signaling.relay_candidate("{}").await.unwrap(),
            Delivery::Queued
        );
        assert_eq!(signaling.pending_len(), 1);

        let wire = RecordingChannel::new("control");
        signaling.attach(wire.clone()).unwrap();
        signaling.mark_open().await;
        assert_eq!(
            SignalingChannel::receive(wire.frames()[0].as_bytes()).0,
            "candidate"
        );
    }

    #[test_timeout::tokio_timeout_test]
    async fn drop_policy_rejects_candidates_before_attach() {
        let signaling = channel(CandidatePolicy::Drop);
        let err = signaling.relay_candidate("{}").await.unwrap_err();
        assert!(matches!(err, SignalingError::ChannelUnavailable));
        assert_eq!(signaling.pending_len(), 0);
    }

    #[test_timeout::tokio_timeout_test]
    async fn queue_is_bounded() {
        let signaling = channel(CandidatePolicy::Buffer);
        for _ in 0..4 {
            signaling.relay_candidate("{}").await.unwrap();
        }
        let err = signaling.relay_candidate("{}").await.unwrap_err();
        assert!(matches!(err, SignalingError::BufferFull(4)));
    }

    #[test_timeout::tokio_timeout_test]
    async fn transport_failures_surface_as_transport_errors() {
        let signaling = channel(CandidatePolicy::Buffer);
        let wire = RecordingChannel::new("control");
        signaling.attach(wire.clone()).unwrap();
        signaling.mark_open().await;
        wire.fail_sends(true);

        let err = signaling.send(SignalingKey::Dev, "1").await.unwrap_err();
        assert!(matches!(err, SignalingError::Transport(_)));
    }

    #[test_timeout::tokio_timeout_test]
    async fn closed_channel_rejects_sends_and_drops_queue() {
        let signaling = channel(CandidatePolicy::Buffer);
        signaling.relay_candidate("{}").await.unwrap();
        signaling.attach(RecordingChannel::new("control")).unwrap();
        signaling.mark_closed();

        assert!(signaling.is_closed());
        assert_eq!(signaling.pending_len(), 0);
        let err = signaling.send(SignalingKey::Dev, "1").await.unwrap_err();
        assert!(matches!(err, SignalingError::Transport(_)));
    }
}
