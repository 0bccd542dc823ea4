//! Send/receive audio queues shared between host threads and the engine.
//!
//! This is the only state crossing the thread boundary: the host's audio
//! I/O threads call [`write_audio`](Shared::write_audio),
//! [`read_audio`](Shared::read_audio) and turn flips while the event-loop
//! thread drains and fills the queues. Everything lives behind one
//! `parking_lot` mutex and nothing on the hot path holds it longer than a
//! queue copy.
//!
//! The receive queue is a single FIFO of audio chunks and discrete events
//! so playback and event delivery stay synchronized with arrival order.

use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::buffer::SampleBuffer;
use crate::client::ClientEvent;
use crate::state::{ConnectionState, DialogState};

/// One entry of the receive queue.
#[derive(Debug)]
pub enum QueueItem {
    /// Decoded reply audio.
    Audio(SampleBuffer),
    /// A discrete event ordered relative to the surrounding audio.
    Event(Value),
}

/// Mutex-guarded engine/host shared state.
pub(crate) struct SharedState {
    pub enabled: bool,
    pub connection: ConnectionState,
    pub dialog: DialogState,
    pub send_queue: Vec<f32>,
    pub recv_queue: VecDeque<QueueItem>,
    /// Samples read since the last reply audio chunk; -1 until one arrives.
    reply_voice_samples: i64,
    /// Samples read since the last reply event; -1 until one arrives.
    reply_event_samples: i64,
    conn_tx: watch::Sender<ConnectionState>,
    dialog_tx: watch::Sender<DialogState>,
}

impl SharedState {
    /// Update the connection state and notify watchers on change.
    pub fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            tracing::debug!(%state, "connection state");
            self.connection = state;
            self.conn_tx.send_replace(state);
        }
    }

    /// Update the dialog state and notify watchers on change.
    pub fn set_dialog(&mut self, state: DialogState) {
        if self.dialog != state {
            tracing::debug!(%state, "dialog state");
            self.dialog = state;
            self.dialog_tx.send_replace(state);
        }
    }

    /// Re-arm the reply idle counters (a recognition just completed).
    pub fn reset_reply_counters(&mut self) {
        self.reply_voice_samples = -1;
        self.reply_event_samples = -1;
    }
}

/// The shared section plus its immutable parameters.
pub(crate) struct Shared {
    state: Mutex<SharedState>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
    conn_rx: watch::Receiver<ConnectionState>,
    dialog_rx: watch::Receiver<DialogState>,
    /// Reply → Listen after this many samples without reply audio.
    voice_idle_samples: i64,
    /// Reply → Listen after this many samples without reply events.
    event_idle_samples: i64,
}

impl Shared {
    /// Create the shared section. Idle limits are in device-rate samples.
    pub fn new(
        event_tx: mpsc::UnboundedSender<ClientEvent>,
        voice_idle_samples: i64,
        event_idle_samples: i64,
    ) -> Self {
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Idle);
        let (dialog_tx, dialog_rx) = watch::channel(DialogState::Idle);
        Self {
            state: Mutex::new(SharedState {
                enabled: false,
                connection: ConnectionState::Idle,
                dialog: DialogState::Idle,
                send_queue: Vec::new(),
                recv_queue: VecDeque::new(),
                reply_voice_samples: -1,
                reply_event_samples: -1,
                conn_tx,
                dialog_tx,
            }),
            event_tx,
            conn_rx,
            dialog_rx,
            voice_idle_samples,
            event_idle_samples,
        }
    }

    /// Lock the shared state for a compound engine-side operation.
    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock()
    }

    /// Watch receiver for connection state changes.
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.conn_rx.clone()
    }

    /// Watch receiver for dialog state changes.
    pub fn dialog_states(&self) -> watch::Receiver<DialogState> {
        self.dialog_rx.clone()
    }

    /// Forward an event to the host.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Append captured samples to the outgoing queue.
    ///
    /// Samples are accepted only while the dialog is enabled and in
    /// `Listen` or `Idle`; otherwise they are silently dropped so no
    /// backlog builds up while the server is not expecting input.
    pub fn write_audio(&self, samples: &[f32]) {
        let mut st = self.state.lock();
        if st.enabled && matches!(st.dialog, DialogState::Listen | DialogState::Idle) {
            st.send_queue.extend_from_slice(samples);
        }
    }

    /// Fill `out` from the receive queue in arrival order.
    ///
    /// Queued events encountered mid-read are forwarded to the host events
    /// channel without consuming output space. Any unfilled tail is
    /// zero-filled. Returns `false` when the dialog is disabled or the
    /// queue is empty.
    ///
    /// While the dialog sits in `Reply` with an empty queue, each call
    /// advances the idle counters by `out.len()` samples; once either limit
    /// is crossed the dialog falls back to `Listen`, so a reply that never
    /// comes cannot stall the turn forever.
    pub fn read_audio(&self, out: &mut [f32]) -> bool {
        let mut st = self.state.lock();
        if !st.enabled {
            return false;
        }
        if st.recv_queue.is_empty() {
            if st.dialog == DialogState::Reply {
                let step = out.len() as i64;
                if st.reply_voice_samples >= 0 {
                    st.reply_voice_samples += step;
                }
                if st.reply_event_samples >= 0 {
                    st.reply_event_samples += step;
                }
                if st.reply_voice_samples > self.voice_idle_samples
                    || st.reply_event_samples > self.event_idle_samples
                {
                    st.set_dialog(DialogState::Listen);
                }
            }
            return false;
        }

        let mut idx = 0;
        while idx < out.len() {
            let front_is_event = match st.recv_queue.front() {
                Some(QueueItem::Event(_)) => true,
                Some(QueueItem::Audio(_)) => false,
                None => break,
            };
            if front_is_event {
                st.reply_event_samples = 0;
                if let Some(QueueItem::Event(js)) = st.recv_queue.pop_front() {
                    let name = js["e"].as_str().unwrap_or_default().to_string();
                    let payload = js.get("p").cloned().unwrap_or(Value::Null);
                    let _ = self.event_tx.send(ClientEvent::Event { name, payload });
                }
                continue;
            }
            let mut emptied = false;
            if let Some(QueueItem::Audio(buf)) = st.recv_queue.front_mut() {
                let take = (out.len() - idx).min(buf.len());
                out[idx..idx + take].copy_from_slice(&buf.peek()[..take]);
                buf.consume(take).expect("take bounded by len");
                emptied = buf.is_empty();
                idx += take;
            }
            st.reply_voice_samples = 0;
            if emptied {
                st.recv_queue.pop_front();
            }
        }
        out[idx..].fill(0.0);
        true
    }

    /// Atomically flip the enabled flag and clear both queues.
    pub fn turn_flip(&self, enabled: bool) {
        let mut st = self.state.lock();
        st.enabled = enabled;
        st.send_queue.clear();
        st.recv_queue.clear();
    }

    /// Append decoded reply samples, transitioning the dialog to `Reply`.
    ///
    /// Dropped while the dialog is disabled. Consecutive audio coalesces
    /// into the trailing chunk; an intervening event starts a new one.
    pub fn push_audio(&self, samples: &[f32]) {
        let mut st = self.state.lock();
        if !st.enabled {
            return;
        }
        st.set_dialog(DialogState::Reply);
        if !matches!(st.recv_queue.back(), Some(QueueItem::Audio(_))) {
            st.recv_queue.push_back(QueueItem::Audio(SampleBuffer::new()));
        }
        let Some(QueueItem::Audio(buf)) = st.recv_queue.back_mut() else {
            unreachable!("audio chunk was just ensured");
        };
        buf.extend_from_slice(samples);
    }

    /// Queue an in-band event, ordered after any audio already queued.
    ///
    /// Dropped while the dialog is disabled.
    pub fn push_event(&self, event: Value) {
        let mut st = self.state.lock();
        if !st.enabled {
            return;
        }
        st.set_dialog(DialogState::Reply);
        st.recv_queue.push_back(QueueItem::Event(event));
    }
}
