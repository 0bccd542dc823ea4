//! Secure WebSocket transport.
//!
//! One [`ws::run_link`] invocation drives one connection attempt through
//! resolve → TCP connect → TLS handshake → protocol upgrade, then splits
//! into a continuous reader and a FIFO writer task. Everything the engine
//! needs to know arrives as generation-tagged [`LinkEvent`]s, so events
//! from an abandoned attempt are trivially discarded.

pub(crate) mod ws;

use tokio::sync::mpsc;

use crate::error::VoicewireError;

/// Lifecycle of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkState::Idle => "Idle",
            LinkState::Connecting => "Connecting",
            LinkState::Connected => "Connected",
            LinkState::Closing => "Closing",
            LinkState::Closed => "Closed",
        };
        f.write_str(s)
    }
}

/// A message queued for the writer task.
///
/// Writes are dispatched strictly in queue order with a single write in
/// flight, so text and binary messages never interleave on the socket.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Pong(Vec<u8>),
    /// Send a close frame and begin the closing handshake.
    Shutdown,
}

/// Notification from a connection attempt to the engine loop.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// The handshake chain completed; the link is readable and writable.
    Up { generation: u64, link: LinkHandle },
    /// A step of the handshake chain failed.
    DialFailed {
        generation: u64,
        error: VoicewireError,
    },
    /// One text message arrived.
    Text { generation: u64, text: String },
    /// One binary message arrived.
    Binary { generation: u64, data: Vec<u8> },
    /// The link quiesced: reader and writer have both stopped.
    Down { generation: u64 },
}

/// Write handle for an established link.
#[derive(Debug, Clone)]
pub(crate) struct LinkHandle {
    out: mpsc::UnboundedSender<Outbound>,
    pub generation: u64,
}

impl LinkHandle {
    pub(crate) fn new(out: mpsc::UnboundedSender<Outbound>, generation: u64) -> Self {
        Self { out, generation }
    }

    /// Queue a text message.
    pub fn send_text(&self, text: String) {
        let _ = self.out.send(Outbound::Text(text));
    }

    /// Queue a binary message.
    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.out.send(Outbound::Binary(data));
    }

    /// Request a graceful close.
    pub fn shutdown(&self) {
        let _ = self.out.send(Outbound::Shutdown);
    }
}
