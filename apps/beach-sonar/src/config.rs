use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::liveness::LivenessConfig;
use crate::session::SessionSettings;
use crate::signaling::{CandidatePolicy, DEFAULT_BUFFER_CAPACITY};
use crate::telemetry::logging::{LogConfig, LogLevel};

pub const ENV_PREFIX: &str = "SONAR";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Comma-separated ICE server URLs.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: String,
    #[serde(default = "default_first_packet_grace")]
    pub first_packet_grace_ms: u64,
    #[serde(default = "default_packet_timeout")]
    pub packet_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_true")]
    pub heartbeat_enabled: bool,
    #[serde(default)]
    pub candidate_policy: CandidatePolicy,
    #[serde(default = "default_buffer_capacity")]
    pub candidate_buffer_capacity: usize,
    #[serde(default = "default_true")]
    pub apply_remote_answers: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: default_bind_addr(),
            ice_servers: default_ice_servers(),
            first_packet_grace_ms: default_first_packet_grace(),
            packet_timeout_ms: default_packet_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_enabled: true,
            candidate_policy: CandidatePolicy::default(),
            candidate_buffer_capacity: default_buffer_capacity(),
            apply_remote_answers: true,
            log_level: LogLevel::default(),
            log_file: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_source(environment())
    }

    fn from_source<S>(source: S) -> Self
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .map(AppConfig::normalize)
            .unwrap_or_else(|_| AppConfig::default().normalize())
    }

    fn normalize(mut self) -> Self {
        self.log_file = Self::normalize_opt(self.log_file.take());
        self.bind_addr =
            Self::normalize_opt(Some(self.bind_addr)).unwrap_or_else(default_bind_addr);
        if self.candidate_buffer_capacity == 0 {
            self.candidate_buffer_capacity = default_buffer_capacity();
        }
        if self.packet_timeout_ms == 0 {
            self.packet_timeout_ms = default_packet_timeout();
        }
        if self.first_packet_grace_ms == 0 {
            self.first_packet_grace_ms = default_first_packet_grace();
        }
        if self.heartbeat_interval_ms == 0 {
            self.heartbeat_enabled = false;
        }
        self
    }

    fn normalize_opt(value: Option<String>) -> Option<String> {
        value.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    pub fn ice_server_urls(&self) -> Vec<String> {
        self.ice_servers
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            heartbeat_interval: self
                .heartbeat_enabled
                .then(|| Duration::from_millis(self.heartbeat_interval_ms)),
            liveness: LivenessConfig {
                first_packet_grace: Duration::from_millis(self.first_packet_grace_ms),
                packet_timeout: Duration::from_millis(self.packet_timeout_ms),
            },
            candidate_policy: self.candidate_policy,
            buffer_capacity: self.candidate_buffer_capacity,
            apply_remote_answers: self.apply_remote_answers,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: self.log_file.as_ref().map(PathBuf::from),
        }
    }
}

/// `SONAR_BIND_ADDR`, `SONAR_LOG_LEVEL`, ...
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn default_bind_addr() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_ice_servers() -> String {
    "stun:stun.l.google.com:19302".to_string()
}

fn default_true() -> bool {
    true
}

fn default_first_packet_grace() -> u64 {
    5_000
}

fn default_packet_timeout() -> u64 {
    1_000
}

fn default_heartbeat_interval() -> u64 {
    1_000
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}
