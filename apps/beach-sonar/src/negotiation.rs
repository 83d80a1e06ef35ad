use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::peer::RtcPeer;
use crate::signaling::{SignalingChannel, SignalingError, SignalingKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Stable,
    OfferPending,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("create offer failed: {0}")]
    CreateOffer(String),
    #[error("commit local offer failed: {0}")]
    Commit(String),
    #[error("offer committed but not delivered: {0}")]
    Deliver(#[from] SignalingError),
}

/// Per-session negotiation state. Overlapping cycles are allowed; the state
/// only reflects the latest transition.
#[derive(Debug)]
pub struct Negotiation {
    state: Mutex<NegotiationState>,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self {
            state: Mutex::new(NegotiationState::Stable),
        }
    }
}

impl Negotiation {
    pub fn state(&self) -> NegotiationState {
        *self.state.lock()
    }

    /// Returns the previous state.
    pub fn begin(&self) -> NegotiationState {
        std::mem::replace(&mut *self.state.lock(), NegotiationState::OfferPending)
    }

    pub fn settle(&self) {
        *self.state.lock() = NegotiationState::Stable;
    }
}

/// One renegotiation cycle: create an offer, commit it locally, push it to
/// the remote side over the control channel.
pub async fn renegotiate(
    peer: &dyn RtcPeer,
    signaling: &SignalingChannel,
    negotiation: &Negotiation,
    session_id: Uuid,
) -> Result<(), NegotiationError> {
    if negotiation.begin() == NegotiationState::OfferPending {
        info!(session_id = %session_id, "negotiation needed while an offer is still pending");
    }

    let offer = match peer.create_offer().await {
        Ok(offer) => offer,
        Err(err) => {
            negotiation.settle();
            return Err(NegotiationError::CreateOffer(err.to_string()));
        }
    };
    let sdp = offer.sdp.clone();
    if let Err(err) = peer.commit_local(offer).await {
        negotiation.settle();
        return Err(NegotiationError::Commit(err.to_string()));
    }

    signaling.send(SignalingKey::Offer, &sdp).await?;
    info!(session_id = %session_id, sdp_len = sdp.len(), "renegotiation offer sent");
    Ok(())
}

/// Log-and-continue wrapper used by the session callback.
pub async fn on_negotiation_needed(
    peer: &dyn RtcPeer,
    signaling: &SignalingChannel,
    negotiation: &Negotiation,
    session_id: Uuid,
) {
    info!(session_id = %session_id, "negotiation needed");
    if let Err(err) = renegotiate(peer, signaling, negotiation, session_id).await {
        warn!(session_id = %session_id, error = %err, "renegotiation failed");
    }
}
