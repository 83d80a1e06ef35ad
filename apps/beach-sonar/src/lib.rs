//! Signaling broker for a single-track audio WebRTC session.
//!
//! An HTTP bootstrap exchanges the initial offer and answer. After that every
//! signaling message (renegotiation offers, trickled candidates and a dev
//! heartbeat) travels as a `{key, value}` JSON frame over the data channel
//! the remote peer opens.

pub mod bootstrap;
pub mod config;
pub mod liveness;
pub mod negotiation;
pub mod peer;
pub mod relay;
pub mod routes;
pub mod session;
pub mod signaling;
pub mod telemetry;
