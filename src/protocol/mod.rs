//! Wire protocol: binary frame codec and text-channel message shapes.
//!
//! The connection multiplexes two channels over one WebSocket:
//!
//! - **binary**: self-describing [`Frame`]s carrying timestamps, encoded
//!   audio payloads and JSON metadata (see [`wire_format`] for the layout)
//! - **text**: JSON RPC requests/responses and server events (see [`text`])

pub mod frame;
pub mod text;
pub mod wire_format;

pub use frame::Frame;
pub use text::TextMessage;
