//! Connection engine event loop.
//!
//! One engine instance owns one dedicated event-loop thread. The loop
//! multiplexes three sources: a ~20 ms timer tick (reconnect checks and
//! outgoing audio drain), generation-tagged transport events, and commands
//! marshaled from the host handle. All connection state, the call table and
//! the codecs are confined to this loop; the only cross-thread state is the
//! mutex-guarded audio queue section in [`crate::audio::queue`].

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::audio::queue::Shared;
use crate::calls::{CallTable, Completion, QueuedCall};
use crate::client::ClientEvent;
use crate::codec::{self, AudioDecoder, AudioEncoder};
use crate::config::Config;
use crate::error::{Result, VoicewireError};
use crate::protocol::text::{self, Format, FormatSide, TextMessage};
use crate::protocol::Frame;
use crate::state::{ConnectionState, DialogState};
use crate::transport::{ws, LinkEvent, LinkHandle};

/// Event-loop tick period.
const TICK: Duration = Duration::from_millis(20);

/// Ceiling for the reconnect backoff.
const MAX_BACKOFF_MS: u64 = 7000;

/// Delay before the next reconnect attempt after `disconnects` consecutive
/// failures: `min(100ms * disconnects², 7000ms)`.
pub(crate) fn backoff_interval(disconnects: u32) -> Duration {
    let d = disconnects as u64;
    Duration::from_millis((100 * d * d).min(MAX_BACKOFF_MS))
}

/// Milliseconds since the Unix epoch, for frame timestamps.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Merge the engine-owned members into the host's auth payload.
fn auth_params(auth: &Value, dialog_id: Option<&str>, time_zone: &str) -> Value {
    let mut params = auth.clone();
    if let Value::Object(map) = &mut params {
        if let Some(id) = dialog_id {
            map.insert("dialogId".to_string(), json!(id));
        }
        map.insert("timeZone".to_string(), json!(time_zone));
    }
    params
}

/// A host request marshaled onto the event loop.
pub(crate) enum Command {
    Call {
        method: String,
        params: Value,
        tx: oneshot::Sender<Result<Value>>,
    },
    Turn {
        enabled: bool,
    },
    Stop,
}

enum Link {
    Down,
    Dialing,
    Up(LinkHandle),
}

pub(crate) struct Engine {
    shared: Arc<Shared>,
    config: Config,
    auth: Value,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    link: Link,
    generation: u64,
    disconnects: u32,
    last_disconnect: Option<Instant>,
    calls: CallTable,
    dialog_id: Option<String>,
    format_sent: bool,
    encoder: Box<dyn AudioEncoder>,
    decoder: Box<dyn AudioDecoder>,
    encode_buf: Vec<f32>,
    interrupted: bool,
}

impl Engine {
    pub fn new(
        auth: Value,
        config: Config,
        shared: Arc<Shared>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Result<Self> {
        let encoder = codec::create_encoder(
            &config.send.codec,
            config.sample_rate,
            config.send.sample_rate,
        )?;
        let decoder = codec::create_decoder(
            &config.recv.codec,
            config.recv.sample_rate,
            config.sample_rate,
        )?;
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Ok(Self {
            shared,
            config,
            auth,
            cmd_rx,
            link_tx,
            link_rx,
            link: Link::Down,
            generation: 0,
            disconnects: 0,
            last_disconnect: None,
            calls: CallTable::new(),
            dialog_id: None,
            format_sent: false,
            encoder,
            decoder,
            encode_buf: Vec::new(),
            interrupted: false,
        })
    }

    /// Run until the host stops the engine and the transport has quiesced.
    pub async fn run(mut self) {
        tracing::debug!("engine loop started");
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.reconnect();
                    self.pump_audio();
                }
                Some(event) = self.link_rx.recv() => self.on_link_event(event),
                Some(command) = self.cmd_rx.recv() => self.on_command(command),
            }
            if self.interrupted && matches!(self.link, Link::Down) {
                break;
            }
        }
        self.calls.fail_all(|| VoicewireError::ConnectionClosed);
        self.shared.lock().set_connection(ConnectionState::Closed);
        tracing::debug!("engine loop exited");
    }

    /// Start a new connection attempt if the link is down and the backoff
    /// window has elapsed.
    fn reconnect(&mut self) {
        if !matches!(self.link, Link::Down) || self.interrupted {
            return;
        }
        self.shared.lock().set_connection(ConnectionState::Connecting);
        if let Some(at) = self.last_disconnect {
            if at.elapsed() < backoff_interval(self.disconnects) {
                return;
            }
        }
        let url = self.config.endpoint_url();
        tracing::info!(%url, "reconnecting");
        self.generation += 1;
        self.link = Link::Dialing;
        tokio::spawn(ws::run_link(ws::Dial {
            url,
            bearer: self.config.auth_token.clone(),
            step_timeout: self.config.connect_timeout(),
            generation: self.generation,
            events: self.link_tx.clone(),
        }));
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Up { generation, link } => {
                if generation != self.generation {
                    link.shutdown();
                    return;
                }
                if self.interrupted {
                    link.shutdown();
                    self.link = Link::Up(link);
                    return;
                }
                self.disconnects = 0;
                self.link = Link::Up(link);
                self.send_auth();
            }
            LinkEvent::DialFailed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                tracing::warn!(%error, "connection attempt failed");
                self.link = Link::Down;
                self.register_disconnect();
                if !self.interrupted {
                    self.shared.emit(ClientEvent::Error(error));
                }
            }
            LinkEvent::Text { generation, text } => {
                if generation == self.generation {
                    self.on_text(&text);
                }
            }
            LinkEvent::Binary { generation, data } => {
                if generation == self.generation {
                    self.on_binary(&data);
                }
            }
            LinkEvent::Down { generation } => {
                if generation != self.generation {
                    return;
                }
                tracing::info!("connection closed");
                self.link = Link::Down;
                self.register_disconnect();
                // Calls written to the dead connection can never complete.
                self.calls.fail_inflight(|| VoicewireError::ConnectionClosed);
            }
        }
    }

    fn register_disconnect(&mut self) {
        self.disconnects += 1;
        self.last_disconnect = Some(Instant::now());
    }

    fn send_auth(&mut self) {
        self.shared
            .lock()
            .set_connection(ConnectionState::Authorizing);
        let params = auth_params(
            &self.auth,
            self.dialog_id.as_deref(),
            &self.config.time_zone,
        );
        let id = self.calls.next_id();
        self.send_call(id, "_auth_", &params);
        self.calls
            .register(id, "_auth_".to_string(), Completion::Auth);
    }

    fn handle_auth_result(&mut self, result: std::result::Result<Value, Value>) {
        match result {
            Ok(js) => {
                if let Some(id) = js.get("dialogId").and_then(Value::as_str) {
                    tracing::trace!(dialog_id = id, "authorized");
                    self.dialog_id = Some(id.to_string());
                }
                self.format_sent = false;
                for call in self.calls.take_deferred() {
                    let id = self.calls.next_id();
                    self.send_call(id, &call.method, &call.params);
                    self.calls.register(id, call.method, call.completion);
                }
                self.shared.lock().set_connection(ConnectionState::Connected);
            }
            Err(error) => {
                tracing::error!(%error, "authorization rejected");
                self.shared
                    .emit(ClientEvent::Error(VoicewireError::Auth(error.to_string())));
                self.interrupted = true;
                if let Link::Up(link) = &self.link {
                    link.shutdown();
                }
            }
        }
    }

    fn send_call(&mut self, id: i64, method: &str, params: &Value) {
        if let Link::Up(link) = &self.link {
            match (text::CallRequest {
                i: id,
                m: method,
                p: params,
            })
            .to_wire()
            {
                Ok(wire) => link.send_text(wire),
                Err(e) => tracing::error!(method, error = %e, "failed to serialize call"),
            }
        }
    }

    fn on_text(&mut self, raw: &str) {
        match text::parse(raw) {
            Ok(TextMessage::Response { id, result }) => {
                if let Some(call) = self.calls.remove(id) {
                    match call.completion {
                        Completion::Host(tx) => {
                            let _ = tx.send(result.map_err(VoicewireError::Rpc));
                        }
                        Completion::Auth => self.handle_auth_result(result),
                    }
                } else {
                    tracing::warn!(id, "response for unknown call");
                }
            }
            Ok(TextMessage::Event { name, payload }) => self.on_event(name, payload),
            Err(e) => tracing::warn!(error = %e, "dropping invalid text message"),
        }
    }

    fn on_event(&mut self, name: String, payload: Value) {
        if name == "options" {
            self.shared.emit(ClientEvent::Event { name, payload });
            return;
        }
        if !self.shared.lock().enabled {
            return;
        }
        match name.as_str() {
            "vievent" => {
                // Ordered with the reply audio around it, delivered from
                // read_audio.
                self.shared.push_event(json!({"e": name, "p": payload}));
                return;
            }
            "inactivity" => {
                self.turn_off();
                return;
            }
            "recognized" => {
                if payload.get("final").and_then(Value::as_bool).unwrap_or(false) {
                    let mut st = self.shared.lock();
                    st.reset_reply_counters();
                    st.set_dialog(DialogState::Process);
                }
            }
            _ => {}
        }
        self.shared.emit(ClientEvent::Event { name, payload });
    }

    fn on_binary(&mut self, data: &[u8]) {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        if let Some(metadata) = &frame.metadata {
            if let Some(format) = text::parse_format(metadata) {
                self.apply_format(format);
            }
        }
        if let Some(payload) = &frame.payload {
            if let Err(e) = self.decoder.decode(payload) {
                tracing::warn!(error = %e, "dropping undecodable packet");
                return;
            }
            let staged = self.decoder.output();
            let n = staged.len();
            if n == 0 {
                return;
            }
            self.shared.push_audio(staged.peek());
            staged.consume(n).expect("n bounded by staged length");
        }
    }

    /// Apply a server-initiated codec renegotiation to both directions.
    fn apply_format(&mut self, format: Format) {
        tracing::info!(
            send = %format.send.codec,
            recv = %format.recv.codec,
            "codec renegotiation"
        );
        let encoder = codec::create_encoder(
            &format.send.codec,
            self.config.sample_rate,
            format.send.sample_rate,
        );
        let decoder = codec::create_decoder(
            &format.recv.codec,
            format.recv.sample_rate,
            self.config.sample_rate,
        );
        match (encoder, decoder) {
            (Ok(encoder), Ok(decoder)) => {
                self.encoder = encoder;
                self.decoder = decoder;
                self.format_sent = false;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "ignoring renegotiation");
                self.shared.emit(ClientEvent::Error(e));
            }
        }
    }

    /// Drain the outgoing queue through the encoder into payload frames.
    ///
    /// The format-negotiation frame precedes the first payload frame of
    /// every connection.
    fn pump_audio(&mut self) {
        {
            let mut st = self.shared.lock();
            if st.connection != ConnectionState::Connected || st.send_queue.is_empty() {
                return;
            }
            self.encode_buf.clear();
            self.encode_buf.extend_from_slice(&st.send_queue);
            st.send_queue.clear();
            if st.dialog == DialogState::Idle {
                st.set_dialog(DialogState::Listen);
            }
        }
        self.encoder.encode(&self.encode_buf);
        while let Some(packet) = self.encoder.next_packet() {
            if !self.format_sent {
                self.format_sent = true;
                let format = Format {
                    send: FormatSide {
                        codec: self.encoder.codec().to_string(),
                        sample_rate: self.encoder.output_sample_rate(),
                    },
                    recv: FormatSide {
                        codec: self.decoder.codec().to_string(),
                        sample_rate: self.decoder.input_sample_rate(),
                    },
                };
                match text::format_metadata(&format) {
                    Ok(metadata) => self.send_frame(Frame::with_metadata(metadata)),
                    Err(e) => tracing::error!(error = %e, "failed to build format frame"),
                }
            }
            self.send_frame(Frame::with_payload(packet));
        }
    }

    fn send_frame(&mut self, mut frame: Frame) {
        frame.sent_ts = Some(now_ms());
        if let Link::Up(link) = &self.link {
            link.send_binary(frame.encode());
        } else {
            tracing::trace!("dropping frame: link is down");
        }
    }

    /// Flip the turn signal; the queues were already cleared by the caller.
    fn send_turn_signal(&mut self, enabled: bool) {
        self.send_frame(Frame::with_metadata(text::signal_metadata(enabled)));
        self.shared.lock().set_dialog(DialogState::Idle);
    }

    /// Engine-initiated turn disable (server signaled inactivity).
    fn turn_off(&mut self) {
        self.shared.turn_flip(false);
        self.send_turn_signal(false);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Call { method, params, tx } => {
                let connected = self.shared.lock().connection == ConnectionState::Connected;
                if connected {
                    let id = self.calls.next_id();
                    self.send_call(id, &method, &params);
                    self.calls.register(id, method, Completion::Host(tx));
                } else {
                    self.calls.defer(QueuedCall {
                        method,
                        params,
                        completion: Completion::Host(tx),
                    });
                }
            }
            Command::Turn { enabled } => self.send_turn_signal(enabled),
            Command::Stop => {
                tracing::debug!("stop requested");
                self.interrupted = true;
                if let Link::Up(link) = &self.link {
                    link.shutdown();
                }
            }
        }
    }
}
