//! Connection and dialog state enums.
//!
//! Both are published to the host through `tokio::sync::watch` channels on
//! every change. [`ConnectionState`] follows one connection attempt linearly;
//! [`DialogState`] cycles with the conversational turn.

use std::fmt;

/// Lifecycle of the engine's connection to the server.
///
/// `Closed` is terminal for the engine instance; a reconnect cycle within a
/// running engine moves back through `Connecting` without ever reporting
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Authorizing,
    Connected,
    Closed,
}

/// Whose turn it is in the dialog.
///
/// `Listen` = capturing user audio, `Process` = waiting on recognition,
/// `Reply` = server is streaming audio/events back. Transitions are driven
/// by protocol events, never by the host directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    Idle,
    Listen,
    Process,
    Reply,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Authorizing => "Authorizing",
            ConnectionState::Connected => "Connected",
            ConnectionState::Closed => "Closed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DialogState::Idle => "Idle",
            DialogState::Listen => "Listen",
            DialogState::Process => "Process",
            DialogState::Reply => "Reply",
        };
        f.write_str(s)
    }
}
