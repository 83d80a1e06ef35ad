use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use crate::signaling::{Delivery, SignalingChannel, SignalingError};

/// Trickle one locally discovered candidate to the remote peer.
///
/// `None` marks the end of gathering and sends nothing. Failures are
/// returned for the caller to log; nothing is retried.
pub async fn relay_candidate(
    signaling: &SignalingChannel,
    candidate: Option<RTCIceCandidateInit>,
    session_id: Uuid,
) -> Result<Option<Delivery>, SignalingError> {
    let Some(candidate) = candidate else {
        info!(session_id = %session_id, "local ICE gathering complete");
        return Ok(None);
    };

    let value = serde_json::to_string(&candidate)?;
    let delivery = signaling.relay_candidate(&value).await?;
    debug!(
        session_id = %session_id,
        candidate = %candidate.candidate,
        ?delivery,
        "relayed local ICE candidate"
    );
    Ok(Some(delivery))
}

/// Log-and-continue wrapper used by the session callback.
pub async fn trickle(
    signaling: &SignalingChannel,
    candidate: Option<RTCIceCandidateInit>,
    session_id: Uuid,
) {
    if let Err(err) = relay_candidate(signaling, candidate, session_id).await {
        warn!(
            session_id = %session_id,
            policy = ?signaling.policy(),
            error = %err,
            "dropping local ICE candidate"
        );
    }
}
