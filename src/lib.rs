//! # voicewire-client
//!
//! Rust client SDK for the Voicewire real-time voice assistant protocol.
//!
//! The crate maintains a persistent, auto-reconnecting secure WebSocket
//! connection to a voice-assistant endpoint and multiplexes two channels
//! over it: binary frames carrying timestamped audio packets and metadata,
//! and JSON text carrying RPC calls and server events. The host sees a
//! push-to-talk surface: enable the turn, write captured samples, read the
//! reply, issue calls.
//!
//! ## Architecture
//!
//! - **Engine thread**: every [`Client`] owns one event-loop thread that
//!   holds all connection state, the RPC call table and the codecs.
//! - **Shared queues**: the outgoing and incoming audio queues sit behind a
//!   single mutex so the host's audio threads hand samples across without
//!   blocking on anything slower than a copy.
//! - **Transport**: each connection attempt walks resolve → TCP → TLS →
//!   upgrade with per-step timeouts, then splits into a continuous reader
//!   and a FIFO writer; failed attempts retry with quadratic backoff.
//!
//! ## Example
//!
//! ```ignore
//! use voicewire_client::{Client, ClientEvent, Config};
//! use serde_json::json;
//!
//! let config = Config {
//!     server: "wss://voice.example.com".to_string(),
//!     project_id: "my-project".to_string(),
//!     ..Config::default()
//! };
//! let client = Client::start(json!({"key": "secret"}), config)?;
//! let mut events = client.take_events().unwrap();
//!
//! client.turn(true);
//! // feed microphone samples, drain speaker samples...
//! client.write_audio(&mic_chunk);
//! # Ok::<(), voicewire_client::VoicewireError>(())
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

mod calls;
mod client;
mod engine;
mod state;

pub use client::{Client, ClientEvent};
pub use config::{CodecSpec, Config};
pub use error::VoicewireError;
pub use state::{ConnectionState, DialogState};
