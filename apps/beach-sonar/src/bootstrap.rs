//! HTTP bootstrap: one inbound offer in, one local answer out.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::peer::PeerFactory;
use crate::session::{Session, SessionSettings};

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    #[serde(default)]
    pub offer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{stage} failed: {message}")]
    Internal {
        stage: &'static str,
        message: String,
    },
}

impl HandshakeError {
    pub(crate) fn internal(stage: &'static str, err: impl std::fmt::Display) -> Self {
        HandshakeError::Internal {
            stage,
            message: err.to_string(),
        }
    }
}

/// Decode a raw request body into a non-empty offer.
pub fn parse_offer(body: &[u8]) -> Result<String, HandshakeError> {
    let request: OfferRequest = serde_json::from_slice(body)
        .map_err(|err| HandshakeError::BadRequest(format!("invalid offer body: {err}")))?;
    if request.offer.trim().is_empty() {
        return Err(HandshakeError::BadRequest("offer is required".into()));
    }
    Ok(request.offer)
}

/// Create a connection for `offer`, wire a session to it and return the
/// committed local answer. On failure the connection is closed and nothing
/// refers to it afterwards.
pub async fn accept(
    factory: &dyn PeerFactory,
    settings: &SessionSettings,
    offer: String,
) -> Result<String, HandshakeError> {
    let peer = factory
        .create()
        .await
        .map_err(|err| HandshakeError::internal("create connection", err))?;

    let session = Session::new(peer.clone(), settings.clone());
    peer.subscribe(session.clone());

    match session.answer_offer(offer).await {
        Ok(answer) => {
            info!(session_id = %session.id(), answer_len = answer.len(), "session accepted");
            Ok(answer)
        }
        Err(err) => {
            warn!(session_id = %session.id(), error = %err, "bootstrap handshake failed");
            session.release().await;
            Err(err)
        }
    }
}
