use serde::{Deserialize, Serialize};

/// Keys understood on the peer-to-peer control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingKey {
    Offer,
    Answer,
    Candidate,
    Dev,
}

impl SignalingKey {
    pub const ALL: [SignalingKey; 4] = [
        SignalingKey::Offer,
        SignalingKey::Answer,
        SignalingKey::Candidate,
        SignalingKey::Dev,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalingKey::Offer => "offer",
            SignalingKey::Answer => "answer",
            SignalingKey::Candidate => "candidate",
            SignalingKey::Dev => "dev",
        }
    }

    /// Unrecognized keys map to `None`; callers ignore them.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "offer" => Some(SignalingKey::Offer),
            "answer" => Some(SignalingKey::Answer),
            "candidate" => Some(SignalingKey::Candidate),
            "dev" => Some(SignalingKey::Dev),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound control-channel frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalingMessage {
    pub key: SignalingKey,
    pub value: String,
}

impl SignalingMessage {
    pub fn new(key: SignalingKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// Inbound frames keep the key as a raw string so that keys added by newer
// peers decode cleanly and are dropped by the dispatcher instead.
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

/// Serialize one `{"key": .., "value": ..}` frame.
pub fn encode(key: SignalingKey, value: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SignalingMessage::new(key, value))
}

/// Parse one frame into its raw `(key, value)` pair.
pub fn decode(payload: &[u8]) -> Result<(String, String), serde_json::Error> {
    let frame: InboundFrame = serde_json::from_slice(payload)?;
    Ok((frame.key, frame.value))
}
