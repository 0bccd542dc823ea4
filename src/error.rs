//! Error types for voicewire-client.

use thiserror::Error;

/// Main error type for all voicewire operations.
#[derive(Debug, Error)]
pub enum VoicewireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (text channel).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame carried a field tag outside the known set.
    #[error("unknown frame field tag: {0}")]
    UnknownFieldTag(u8),

    /// Length-prefixed frame field declared a size above the hard cap.
    #[error("frame field of {size} bytes exceeds cap of {cap}")]
    FieldTooLarge { size: usize, cap: usize },

    /// Protocol error (truncated frame, unsupported version, bad JSON shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Resolve/connect/TLS/handshake/read/write failure. Non-fatal: the
    /// engine disconnects and retries with backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// Authorization RPC rejected by the server. Fatal to the session.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// The server rejected an RPC with an error payload.
    #[error("call failed: {0}")]
    Rpc(serde_json::Value),

    /// No codec registered under the requested name.
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// Commit past the writable region of a sample buffer.
    #[error("sample buffer overflow: commit {requested} with {available} writable")]
    BufferOverflow { requested: usize, available: usize },

    /// Consume past the buffered length of a sample buffer.
    #[error("sample buffer underflow: consume {requested} of {available}")]
    BufferUnderflow { requested: usize, available: usize },

    /// Connection torn down with the operation still outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Engine was stopped by the host.
    #[error("client stopped")]
    Stopped,
}

/// Result type alias using VoicewireError.
pub type Result<T> = std::result::Result<T, VoicewireError>;
