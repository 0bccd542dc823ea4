//! Host-supplied engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One direction of the audio stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecSpec {
    /// Codec name as understood by the codec factory and the server.
    pub codec: String,
    /// Wire sample rate for this direction.
    pub sample_rate: u32,
}

/// Configuration for a [`Client`](crate::Client).
///
/// The idle-reply thresholds drive the `Reply → Listen` fallback in
/// `read_audio`: they are measured in wall-clock milliseconds and converted
/// to device-rate samples internally, accumulating with each `read_audio`
/// call, so their resolution is tied to the host's read cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server base URL, e.g. `wss://voice.example.com`.
    pub server: String,
    /// Project identifier appended to the connection URL.
    pub project_id: String,
    /// Optional bearer token for the upgrade request.
    pub auth_token: Option<String>,
    /// Outbound audio direction.
    pub send: CodecSpec,
    /// Inbound audio direction.
    pub recv: CodecSpec,
    /// Device sample rate for `write_audio`/`read_audio` samples.
    pub sample_rate: u32,
    /// IANA time zone reported in the authorization call.
    pub time_zone: String,
    /// Per-step timeout for resolve/connect/TLS/upgrade.
    pub connect_timeout_ms: u64,
    /// Fall back from `Reply` after this long without reply audio.
    pub reply_audio_idle_ms: u64,
    /// Fall back from `Reply` after this long without reply events.
    pub reply_event_idle_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: String::new(),
            project_id: String::new(),
            auth_token: None,
            send: CodecSpec {
                codec: "pcm_s16le".to_string(),
                sample_rate: 16000,
            },
            recv: CodecSpec {
                codec: "pcm_s16le".to_string(),
                sample_rate: 16000,
            },
            sample_rate: 44100,
            time_zone: "UTC".to_string(),
            connect_timeout_ms: 10_000,
            reply_audio_idle_ms: 75,
            reply_event_idle_ms: 5000,
        }
    }
}

impl Config {
    /// Full WebSocket endpoint URL for this project.
    pub fn endpoint_url(&self) -> String {
        format!("{}/ws_project/{}", self.server, self.project_id)
    }

    /// Per-step connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// An idle threshold converted to device-rate samples.
    pub(crate) fn idle_ms_to_samples(&self, ms: u64) -> i64 {
        (ms as i64) * (self.sample_rate as i64) / 1000
    }
}
