//! Integration tests for voicewire-client.
//!
//! Each test runs an in-process WebSocket server and drives a real client
//! through the handshake, audio and RPC flows.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use voicewire_client::codec::{AudioEncoder, PcmS16Encoder};
use voicewire_client::protocol::Frame;
use voicewire_client::{
    Client, ClientEvent, Config, ConnectionState, DialogState, VoicewireError,
};

const LONG: Duration = Duration::from_secs(10);

type ServerWs = WebSocketStream<TcpStream>;

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(LONG, fut)
        .await
        .expect("test timed out")
}

fn test_config(port: u16) -> Config {
    Config {
        server: format!("ws://127.0.0.1:{}", port),
        project_id: "p1".to_string(),
        time_zone: "Europe/Berlin".to_string(),
        ..Config::default()
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// Next text message, parsed as JSON. Skips anything else.
async fn next_text(ws: &mut ServerWs) -> Value {
    loop {
        match ws.next().await.expect("connection open").expect("read") {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

/// Next binary message, decoded as a frame. Skips anything else.
async fn next_binary_frame(ws: &mut ServerWs) -> Frame {
    loop {
        match ws.next().await.expect("connection open").expect("read") {
            Message::Binary(data) => return Frame::decode(&data).unwrap(),
            Message::Text(_) | Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

/// Read the `_auth_` call, reply with a dialog id, return the request.
async fn serve_auth(ws: &mut ServerWs, dialog_id: &str) -> Value {
    let auth = next_text(ws).await;
    assert_eq!(auth["m"], json!("_auth_"));
    let id = auth["i"].as_i64().expect("auth call id");
    ws.send(Message::Text(
        json!({"i": id, "r": {"dialogId": dialog_id}}).to_string(),
    ))
    .await
    .unwrap();
    auth
}

async fn wait_state<T: PartialEq + Copy>(rx: &mut watch::Receiver<T>, want: T) {
    within(async {
        while *rx.borrow() != want {
            rx.changed().await.unwrap();
        }
    })
    .await;
}

/// Handshake scenario: upgrade path, auth payload with time zone, the
/// `Connected` transition, and `options` forwarding while disabled.
#[tokio::test]
async fn test_connects_and_authorizes() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let (path_tx, path_rx) = oneshot::channel();
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| {
            let _ = path_tx.send(req.uri().path().to_string());
            Ok(resp)
        })
        .await
        .unwrap();
        assert_eq!(path_rx.await.unwrap(), "/ws_project/p1");

        let auth = serve_auth(&mut ws, "d1").await;
        assert_eq!(auth["p"]["key"], json!("k1"));
        assert_eq!(auth["p"]["timeZone"], json!("Europe/Berlin"));

        ws.send(Message::Text(
            json!({"e": "options", "p": {"tts": true}}).to_string(),
        ))
        .await
        .unwrap();

        // Hold the connection until the client closes it.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Client::start(json!({"key": "k1"}), test_config(port)).unwrap();
    let mut events = client.take_events().unwrap();
    let mut conn = client.connection_states();
    wait_state(&mut conn, ConnectionState::Connected).await;
    assert_eq!(client.dialog_state(), DialogState::Idle);

    // "options" reaches the host even though the dialog is disabled.
    match within(events.recv()).await.unwrap() {
        ClientEvent::Event { name, payload } => {
            assert_eq!(name, "options");
            assert_eq!(payload["tts"], json!(true));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    client.stop();
    assert_eq!(client.connection_state(), ConnectionState::Closed);
    within(server).await.unwrap();
}

/// Audio scenario: the turn signal frame, then exactly one format
/// negotiation frame before the first payload frame.
#[tokio::test]
async fn test_write_audio_emits_format_then_payload() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_auth(&mut ws, "d1").await;

        let signal = next_binary_frame(&mut ws).await;
        assert!(signal.sent_ts.is_some());
        assert_eq!(signal.metadata.as_deref(), Some(r#"{"signal":"listen"}"#));
        assert!(signal.payload.is_none());

        let format = next_binary_frame(&mut ws).await;
        let meta: Value =
            serde_json::from_str(format.metadata.as_deref().expect("format metadata")).unwrap();
        assert_eq!(meta["format"]["send"]["codec"], json!("pcm_s16le"));
        assert_eq!(meta["format"]["send"]["sampleRate"], json!(16000));
        assert_eq!(meta["format"]["recv"]["codec"], json!("pcm_s16le"));
        assert!(format.payload.is_none());

        let audio = next_binary_frame(&mut ws).await;
        let payload = audio.payload.expect("payload frame");
        assert_eq!(payload.len(), 480 * 2);
        let first = i16::from_le_bytes([payload[0], payload[1]]);
        assert!((first as f32 / i16::MAX as f32 - 0.5).abs() < 0.001);

        ws
    });

    let client = Client::start(json!({"key": "k1"}), test_config(port)).unwrap();
    let mut conn = client.connection_states();
    wait_state(&mut conn, ConnectionState::Connected).await;

    client.turn(true);
    // Let the engine dispatch the turn signal before queueing samples, so
    // the wire order below is deterministic.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.write_audio(&vec![0.5f32; 480]);

    let ws = within(server).await.unwrap();
    drop(ws);
    client.stop();
}

/// Dialog scenario: `recognized(final)` drives `Process`, reply audio
/// drives `Reply` and is readable, `turn(false)` signals the server and
/// lands in `Idle`.
#[tokio::test]
async fn test_dialog_follows_server_events() {
    let (listener, port) = bind().await;
    let (audio_tx, audio_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_auth(&mut ws, "d1").await;

        let signal = next_binary_frame(&mut ws).await;
        assert_eq!(signal.metadata.as_deref(), Some(r#"{"signal":"listen"}"#));

        ws.send(Message::Text(
            json!({"e": "recognized", "p": {"final": true, "text": "hello"}}).to_string(),
        ))
        .await
        .unwrap();

        // Hold the reply audio until the test observed `Process`, so the
        // two dialog transitions stay distinguishable.
        audio_rx.await.unwrap();

        let mut encoder = PcmS16Encoder::new(16000, 16000);
        encoder.encode(&[0.25f32; 8]);
        let packet = encoder.next_packet().unwrap();
        ws.send(Message::Binary(Frame::with_payload(packet).encode()))
            .await
            .unwrap();

        let stop = next_binary_frame(&mut ws).await;
        assert_eq!(stop.metadata.as_deref(), Some(r#"{"signal":"stopListen"}"#));

        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Client::start(json!({"key": "k1"}), test_config(port)).unwrap();
    let mut events = client.take_events().unwrap();
    let mut conn = client.connection_states();
    let mut dialog = client.dialog_states();
    wait_state(&mut conn, ConnectionState::Connected).await;

    client.turn(true);
    wait_state(&mut dialog, DialogState::Process).await;

    match within(events.recv()).await.unwrap() {
        ClientEvent::Event { name, payload } => {
            assert_eq!(name, "recognized");
            assert_eq!(payload["text"], json!("hello"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    audio_tx.send(()).unwrap();
    wait_state(&mut dialog, DialogState::Reply).await;

    let mut out = [0.0f32; 4];
    within(async {
        while !client.read_audio(&mut out) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!((out[0] - 0.25).abs() < 0.001);
    assert!((out[3] - 0.25).abs() < 0.001);

    client.turn(false);
    wait_state(&mut dialog, DialogState::Idle).await;
    assert!(!client.read_audio(&mut out));

    within(server).await.unwrap();
    client.stop();
}

/// RPC deferral: calls issued before authorization are replayed in
/// submission order once `Connected`.
#[tokio::test]
async fn test_calls_deferred_until_authorized() {
    let (listener, port) = bind().await;
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let auth = next_text(&mut ws).await;
        assert_eq!(auth["m"], json!("_auth_"));
        let auth_id = auth["i"].as_i64().unwrap();

        // Keep the client unauthorized until both calls are queued.
        go_rx.await.unwrap();
        ws.send(Message::Text(
            json!({"i": auth_id, "r": {"dialogId": "d1"}}).to_string(),
        ))
        .await
        .unwrap();

        let first = next_text(&mut ws).await;
        assert_eq!(first["m"], json!("first"));
        assert_eq!(first["p"], json!({"n": 1}));
        let second = next_text(&mut ws).await;
        assert_eq!(second["m"], json!("second"));
        assert!(first["i"].as_i64().unwrap() > auth_id);
        assert!(second["i"].as_i64().unwrap() > first["i"].as_i64().unwrap());

        ws.send(Message::Text(
            json!({"i": first["i"], "r": "A"}).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            json!({"i": second["i"], "e": "rejected"}).to_string(),
        ))
        .await
        .unwrap();

        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Client::start(json!({"key": "k1"}), test_config(port)).unwrap();
    let first = client.call("first", json!({"n": 1}));
    let second = client.call("second", json!({"n": 2}));
    go_tx.send(()).unwrap();

    let (a, b) = within(futures_util::future::join(first, second)).await;
    assert_eq!(a.unwrap(), json!("A"));
    match b {
        Err(VoicewireError::Rpc(e)) => assert_eq!(e, json!("rejected")),
        other => panic!("expected rpc error, got {:?}", other),
    }

    client.stop();
    within(server).await.unwrap();
}

/// Reconnect scenario: an in-flight call fails when the connection drops,
/// the engine reconnects with backoff, resumes the prior dialog id, and
/// replays a call deferred across the gap.
#[tokio::test]
async fn test_reconnect_resumes_dialog_and_replays_calls() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        // First connection: authorize, swallow one call, drop the link.
        let mut ws = accept(&listener).await;
        serve_auth(&mut ws, "d42").await;
        let mark = next_text(&mut ws).await;
        assert_eq!(mark["m"], json!("mark"));
        drop(ws);

        // Second connection resumes the dialog.
        let mut ws = accept(&listener).await;
        let auth = next_text(&mut ws).await;
        assert_eq!(auth["p"]["dialogId"], json!("d42"));
        let auth_id = auth["i"].as_i64().unwrap();
        ws.send(Message::Text(
            json!({"i": auth_id, "r": {"dialogId": "d42"}}).to_string(),
        ))
        .await
        .unwrap();

        let ping = next_text(&mut ws).await;
        assert_eq!(ping["m"], json!("ping"));
        ws.send(Message::Text(json!({"i": ping["i"], "r": "pong"}).to_string()))
            .await
            .unwrap();

        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Client::start(json!({"key": "k1"}), test_config(port)).unwrap();
    let mut conn = client.connection_states();
    wait_state(&mut conn, ConnectionState::Connected).await;

    // Written to the first connection, which dies before answering.
    let mark = client.call("mark", Value::Null);
    match within(mark).await {
        Err(VoicewireError::ConnectionClosed) => {}
        other => panic!("expected ConnectionClosed, got {:?}", other),
    }

    // Issued while the link is down (or reconnecting): replayed after the
    // resumed authorization.
    let pong = within(client.call("ping", Value::Null)).await.unwrap();
    assert_eq!(pong, json!("pong"));

    client.stop();
    within(server).await.unwrap();
}

/// Stopping with a call outstanding resolves its future instead of
/// leaking the waiter.
#[tokio::test]
async fn test_stop_fails_pending_calls() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_auth(&mut ws, "d1").await;
        let hang = next_text(&mut ws).await;
        assert_eq!(hang["m"], json!("hang"));
        // Never respond.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let client = Client::start(json!({"key": "k1"}), test_config(port)).unwrap();
    let mut conn = client.connection_states();
    wait_state(&mut conn, ConnectionState::Connected).await;

    let hanging = client.call("hang", Value::Null);
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.stop();
    match within(hanging).await {
        Err(VoicewireError::ConnectionClosed) => {}
        other => panic!("expected ConnectionClosed, got {:?}", other),
    }

    within(server).await.unwrap();
}
