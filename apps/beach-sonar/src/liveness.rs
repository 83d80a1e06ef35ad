use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::peer::PacketSource;

pub const DEFAULT_FIRST_PACKET_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Deadline until the first packet arrives.
    pub first_packet_grace: Duration,
    /// Deadline between packets afterwards.
    pub packet_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            first_packet_grace: DEFAULT_FIRST_PACKET_GRACE,
            packet_timeout: DEFAULT_PACKET_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Alive,
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Stall {
    #[error("no packet within {waited:?} ({packets} packets received)")]
    Timeout { waited: Duration, packets: u64 },
    #[error("packet read failed after {packets} packets: {reason}")]
    ReadError { reason: String, packets: u64 },
}

/// Watches one inbound stream. Each packet resets the deadline; the first
/// deadline is the longer warm-up grace. Stalling is terminal.
#[derive(Debug)]
pub struct TrackMonitor {
    config: LivenessConfig,
    state: TrackState,
    last_activity: Instant,
    deadline: Duration,
    packets: u64,
}

impl TrackMonitor {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            state: TrackState::Alive,
            last_activity: Instant::now(),
            deadline: config.first_packet_grace,
            packets: 0,
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    fn record_packet(&mut self) {
        self.packets += 1;
        self.last_activity = Instant::now();
        self.deadline = self.config.packet_timeout;
    }

    /// Drain packets until the stream stalls. Packets are discarded. A
    /// monitor is spent once it returns.
    pub async fn run(&mut self, source: &dyn PacketSource) -> Stall {
        loop {
            match tokio::time::timeout(self.deadline, source.next_packet()).await {
                Ok(Ok(_len)) => self.record_packet(),
                Ok(Err(err)) => {
                    self.state = TrackState::Stalled;
                    return Stall::ReadError {
                        reason: err.to_string(),
                        packets: self.packets,
                    };
                }
                Err(_elapsed) => {
                    self.state = TrackState::Stalled;
                    return Stall::Timeout {
                        waited: self.deadline,
                        packets: self.packets,
                    };
                }
            }
        }
    }
}
