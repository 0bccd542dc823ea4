//! WebSocket connection driver.
//!
//! [`run_link`] owns one connection attempt end to end: it walks the
//! handshake chain with a per-step timeout, reports `Up` with a write
//! handle, keeps reading until the link dies or a local shutdown finishes
//! the closing handshake, and reports `Down` exactly once when everything
//! has quiesced.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use super::{LinkEvent, LinkHandle, LinkState, Outbound};
use crate::error::{Result, VoicewireError};

/// How long to keep draining after a local close request before giving up
/// on the peer's close reply.
const CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Parameters of one connection attempt.
pub(crate) struct Dial {
    pub url: String,
    pub bearer: Option<String>,
    pub step_timeout: Duration,
    pub generation: u64,
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

/// Parsed connection endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub tls: bool,
}

/// Parse a `ws://` or `wss://` URL into its connection endpoint.
pub(crate) fn parse_endpoint(raw: &str) -> Result<Endpoint> {
    let url = Url::parse(raw)
        .map_err(|e| VoicewireError::Transport(format!("invalid url {}: {}", raw, e)))?;
    let tls = match url.scheme() {
        "ws" => false,
        "wss" => true,
        other => {
            return Err(VoicewireError::Transport(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| VoicewireError::Transport(format!("url has no host: {}", raw)))?
        .to_string();
    let port = url
        .port_or_known_default()
        .unwrap_or(if tls { 443 } else { 80 });
    let path = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };
    Ok(Endpoint {
        host,
        port,
        path,
        tls,
    })
}

/// Plain-TCP or TLS byte stream behind one type.
pub(crate) enum ByteStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ByteStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            ByteStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ByteStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ByteStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            ByteStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ByteStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            ByteStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ByteStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            ByteStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ByteStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Run a future with the per-step connect timeout.
async fn step<T>(
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(VoicewireError::Transport(format!("{} timed out", what))),
    }
}

/// Walk the handshake chain: resolve → connect → TLS → upgrade.
async fn connect(dial: &Dial) -> Result<WebSocketStream<ByteStream>> {
    let endpoint = parse_endpoint(&dial.url)?;
    let limit = dial.step_timeout;

    let addr = step("resolve", limit, async {
        tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| {
                VoicewireError::Transport(format!("failed to resolve {}: {}", endpoint.host, e))
            })?
            .next()
            .ok_or_else(|| {
                VoicewireError::Transport(format!("no address for {}", endpoint.host))
            })
    })
    .await?;
    tracing::trace!(host = %endpoint.host, %addr, "name resolved");

    let tcp = step("connect", limit, async {
        TcpStream::connect(addr)
            .await
            .map_err(|e| VoicewireError::Transport(format!("failed to connect {}: {}", addr, e)))
    })
    .await?;

    let stream = if endpoint.tls {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
            VoicewireError::Transport(format!("invalid server name {}: {}", endpoint.host, e))
        })?;
        let tls = step("tls handshake", limit, async {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| VoicewireError::Transport(format!("tls handshake failed: {}", e)))
        })
        .await?;
        tracing::trace!(host = %endpoint.host, "tls established");
        ByteStream::Tls(Box::new(tls))
    } else {
        ByteStream::Plain(tcp)
    };

    let mut request = dial
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| VoicewireError::Transport(format!("invalid upgrade request: {}", e)))?;
    if let Some(token) = &dial.bearer {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| VoicewireError::Transport(format!("invalid bearer token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws, _response) = step("upgrade handshake", limit, async {
        tokio_tungstenite::client_async(request, stream)
            .await
            .map_err(|e| VoicewireError::Transport(format!("upgrade handshake failed: {}", e)))
    })
    .await?;

    Ok(ws)
}

/// Drive one connection attempt to completion.
///
/// Emits exactly one of `Up` or `DialFailed`, then (after `Up`) any number
/// of `Text`/`Binary` events followed by exactly one `Down`.
pub(crate) async fn run_link(dial: Dial) {
    let generation = dial.generation;
    let events = dial.events.clone();
    tracing::debug!(url = %dial.url, generation, "link state: {}", LinkState::Connecting);

    let ws = match connect(&dial).await {
        Ok(ws) => ws,
        Err(error) => {
            tracing::debug!(generation, %error, "link state: {}", LinkState::Closed);
            let _ = events.send(LinkEvent::DialFailed { generation, error });
            return;
        }
    };
    tracing::debug!(generation, "link state: {}", LinkState::Connected);

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (closing_tx, mut closing_rx) = oneshot::channel();
    let (sink, mut stream) = ws.split();
    let writer = tokio::spawn(write_loop(sink, out_rx, closing_tx));

    let _ = events.send(LinkEvent::Up {
        generation,
        link: LinkHandle::new(out_tx.clone(), generation),
    });

    loop {
        let message = tokio::select! {
            m = stream.next() => m,
            _ = &mut closing_rx => {
                // Local close requested: wait briefly for the peer's close
                // reply so the handshake can finish, then stop regardless.
                tracing::debug!(generation, "link state: {}", LinkState::Closing);
                let _ = tokio::time::timeout(CLOSE_GRACE, async {
                    while let Some(m) = stream.next().await {
                        if matches!(m, Ok(Message::Close(_)) | Err(_)) {
                            break;
                        }
                    }
                })
                .await;
                break;
            }
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                let _ = events.send(LinkEvent::Text { generation, text });
            }
            Some(Ok(Message::Binary(data))) => {
                let _ = events.send(LinkEvent::Binary { generation, data });
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = out_tx.send(Outbound::Pong(payload));
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(generation, ?frame, "peer closed");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(generation, error = %e, "read failed");
                break;
            }
            None => break,
        }
    }

    writer.abort();
    tracing::debug!(generation, "link state: {}", LinkState::Closed);
    let _ = events.send(LinkEvent::Down { generation });
}

/// Serialize outbound messages: one in-flight write at a time, in queue
/// order.
async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WebSocketStream<ByteStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    closing: oneshot::Sender<()>,
) {
    while let Some(outbound) = rx.recv().await {
        let result = match outbound {
            Outbound::Text(text) => sink.send(Message::Text(text)).await,
            Outbound::Binary(data) => sink.send(Message::Binary(data)).await,
            Outbound::Pong(payload) => sink.send(Message::Pong(payload)).await,
            Outbound::Shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = closing.send(());
                return;
            }
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "write failed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wss_endpoint() {
        let ep = parse_endpoint("wss://voice.example.com/ws_project/demo").unwrap();
        assert_eq!(
            ep,
            Endpoint {
                host: "voice.example.com".to_string(),
                port: 443,
                path: "/ws_project/demo".to_string(),
                tls: true,
            }
        );
    }

    #[test]
    fn test_parse_ws_endpoint_with_port_and_query() {
        let ep = parse_endpoint("ws://127.0.0.1:8080/ws_project/p?v=1").unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 8080);
        assert_eq!(ep.path, "/ws_project/p?v=1");
        assert!(!ep.tls);
    }

    #[test]
    fn test_parse_ws_default_port() {
        let ep = parse_endpoint("ws://example.com/x").unwrap();
        assert_eq!(ep.port, 80);
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(matches!(
            parse_endpoint("https://example.com/"),
            Err(VoicewireError::Transport(_))
        ));
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(VoicewireError::Transport(_))
        ));
    }
}
