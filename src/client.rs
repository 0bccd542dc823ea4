//! Host-facing client handle.
//!
//! [`Client::start`] spawns the dedicated event-loop thread and begins
//! connecting immediately. The handle is cheap to share between the host's
//! control and audio threads: `write_audio`/`read_audio`/`turn` only touch
//! the mutex-guarded queue section, everything else is marshaled onto the
//! event loop as a message.
//!
//! # Example
//!
//! ```ignore
//! use voicewire_client::{Client, Config};
//! use serde_json::json;
//!
//! let config = Config {
//!     server: "wss://voice.example.com".to_string(),
//!     project_id: "my-project".to_string(),
//!     ..Config::default()
//! };
//! let client = Client::start(json!({"key": "secret"}), config)?;
//!
//! client.turn(true);
//! client.write_audio(&captured_samples);
//! let mut playback = vec![0.0f32; 882];
//! client.read_audio(&mut playback);
//!
//! client.stop();
//! # Ok::<(), voicewire_client::VoicewireError>(())
//! ```

use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::audio::queue::Shared;
use crate::config::Config;
use crate::engine::{Command, Engine};
use crate::error::{Result, VoicewireError};
use crate::state::{ConnectionState, DialogState};

/// A notification delivered through [`Client::take_events`].
#[derive(Debug)]
pub enum ClientEvent {
    /// A server event forwarded to the host.
    Event { name: String, payload: Value },
    /// An error notification. Transport errors are informational (the
    /// engine reconnects on its own); an [`VoicewireError::Auth`] error is
    /// fatal and the engine stops after delivering it.
    Error(VoicewireError),
}

/// A running voice connection.
///
/// Dropping the client stops it; [`stop`](Client::stop) does the same
/// explicitly. A stopped client is inert: construct a fresh one to start a
/// new session.
pub struct Client {
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Start the engine thread and begin connecting.
    ///
    /// `auth` is the project's authorization payload, sent verbatim (plus
    /// time zone and any resumed dialog id) in the `_auth_` call after
    /// every connect.
    ///
    /// # Errors
    ///
    /// Fails if a configured codec name is unknown to the codec factory or
    /// the engine thread cannot be spawned.
    pub fn start(auth: Value, config: Config) -> Result<Self> {
        let (event_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(
            event_tx,
            config.idle_ms_to_samples(config.reply_audio_idle_ms),
            config.idle_ms_to_samples(config.reply_event_idle_ms),
        ));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let engine = Engine::new(auth, config, shared.clone(), cmd_rx)?;

        let thread = std::thread::Builder::new()
            .name("voicewire-engine".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("event-loop runtime");
                runtime.block_on(engine.run());
            })
            .map_err(VoicewireError::Io)?;

        Ok(Self {
            shared,
            cmd_tx,
            events_rx: Mutex::new(Some(events_rx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Append captured device samples to the outgoing queue.
    ///
    /// Accepted only while the dialog is enabled and in `Listen` or `Idle`;
    /// otherwise the samples are silently dropped.
    pub fn write_audio(&self, samples: &[f32]) {
        self.shared.write_audio(samples);
    }

    /// Fill `out` with decoded reply audio in arrival order.
    ///
    /// Events queued between audio chunks are delivered through the events
    /// channel as they are reached. Any unfilled tail is zero-filled.
    /// Returns `false` when disabled or when no reply data is buffered.
    pub fn read_audio(&self, out: &mut [f32]) -> bool {
        self.shared.read_audio(out)
    }

    /// Enable or disable the dialog.
    ///
    /// Clears both audio queues, then signals the server (`listen` /
    /// `stopListen`) and resets the dialog state to `Idle`.
    pub fn turn(&self, enabled: bool) {
        self.shared.turn_flip(enabled);
        let _ = self.cmd_tx.send(Command::Turn { enabled });
    }

    /// Issue an RPC to the server.
    ///
    /// The request is sent immediately when the connection is authorized;
    /// otherwise it is deferred and replayed, in submission order, right
    /// after the next successful authorization. The returned future
    /// resolves with the server's result, the server's error as
    /// [`VoicewireError::Rpc`], or [`VoicewireError::ConnectionClosed`] if
    /// the connection or engine goes away first.
    pub fn call(
        &self,
        method: impl Into<String>,
        params: Value,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let queued = self
            .cmd_tx
            .send(Command::Call {
                method: method.into(),
                params,
                tx,
            })
            .is_ok();
        async move {
            if !queued {
                return Err(VoicewireError::Stopped);
            }
            rx.await.map_err(|_| VoicewireError::ConnectionClosed)?
        }
    }

    /// Watch connection state changes.
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection_states()
    }

    /// Watch dialog state changes.
    pub fn dialog_states(&self) -> watch::Receiver<DialogState> {
        self.shared.dialog_states()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection_states().borrow()
    }

    /// Current dialog state.
    pub fn dialog_state(&self) -> DialogState {
        *self.shared.dialog_states().borrow()
    }

    /// Take the events receiver (server events and error notifications).
    ///
    /// Returns `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.lock().take()
    }

    /// Stop the engine and join its thread. Pending calls fail with
    /// [`VoicewireError::ConnectionClosed`]. Idempotent.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
        if let Some(handle) = self.thread.lock().take() {
            if let Err(e) = handle.join() {
                tracing::error!("engine thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}
