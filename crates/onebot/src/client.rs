use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    secrecy::{ExposeSecret, Secret},
    tokio::{net::TcpStream, sync::mpsc},
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{self, Message, client::IntoClientRequest, http},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use onebridge_convert::OutboundEvent;

use crate::error::ForwardError;

/// Delay between reconnect attempts. Retries are unbounded.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive period while connected, independent of message traffic.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Keep-alive frame the target consumer expects.
const HEARTBEAT_FRAME: &str = r#"{"op":2,"d":{"heartbeat":true}}"#;

/// Outbound queue depth; sends start failing once the link has been down
/// long enough to fill it.
const QUEUE_DEPTH: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of the forwarding link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection settings for the forwarding link.
#[derive(Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the target consumer (`ws://host:port`).
    pub url: String,
    /// Bearer token, if the consumer requires one.
    pub access_token: Option<Secret<String>>,
    /// The bridge's derived integer identity, sent as `X-Self-ID`.
    pub self_id: i64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("self_id", &self.self_id)
            .finish()
    }
}

/// Supervisor for the forwarding link.
///
/// `spawn` starts a background task that owns the socket and drives the
/// Disconnected → Connecting → Connected state machine: connect with a
/// bounded timeout, heartbeat while connected, drop back to Disconnected on
/// any send/read failure, and retry forever with a fixed delay.
pub struct TargetClient;

impl TargetClient {
    pub fn spawn(config: ClientConfig) -> TargetHandle {
        let (tx, rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        let state = Arc::new(RwLock::new(LinkState::Disconnected));
        let cancel = CancellationToken::new();

        tokio::spawn(supervise(config, rx, Arc::clone(&state), cancel.clone()));

        TargetHandle { tx, state, cancel }
    }
}

/// Cheap, cloneable handle for enqueueing events onto the link.
#[derive(Clone)]
pub struct TargetHandle {
    tx: mpsc::Sender<String>,
    state: Arc<RwLock<LinkState>>,
    cancel: CancellationToken,
}

impl TargetHandle {
    /// Serialize and enqueue one event. The supervisor delivers it once the
    /// link is up; queueing succeeds even while disconnected.
    pub fn forward(&self, event: &OutboundEvent) -> Result<(), ForwardError> {
        let frame = serde_json::to_string(event)?;
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ForwardError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ForwardError::ChannelClosed,
        })
    }

    /// Current state of the link.
    pub fn state(&self) -> LinkState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask the supervisor to close the link and exit.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn supervise(
    config: ClientConfig,
    mut rx: mpsc::Receiver<String>,
    state: Arc<RwLock<LinkState>>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        set_state(&state, LinkState::Connecting);
        let attempt = tokio::select! {
            () = cancel.cancelled() => break,
            attempt = tokio::time::timeout(CONNECT_TIMEOUT, connect(&config)) => attempt,
        };

        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(url = %config.url, error = %e, "target connect failed");
                set_state(&state, LinkState::Disconnected);
                if wait_before_retry(&cancel).await {
                    break;
                }
                continue;
            },
            Err(_) => {
                warn!(url = %config.url, "target connect timed out");
                set_state(&state, LinkState::Disconnected);
                if wait_before_retry(&cancel).await {
                    break;
                }
                continue;
            },
        };

        set_state(&state, LinkState::Connected);
        info!(url = %config.url, self_id = config.self_id, "connected to target consumer");

        run_connected(&mut rx, stream, &cancel).await;
        set_state(&state, LinkState::Disconnected);

        if cancel.is_cancelled() {
            break;
        }
        warn!(url = %config.url, "target link lost, reconnecting");
        if wait_before_retry(&cancel).await {
            break;
        }
    }

    set_state(&state, LinkState::Disconnected);
    info!("target link supervisor stopped");
}

/// Drive one established connection until it fails, the handle side closes,
/// or shutdown is requested.
async fn run_connected(rx: &mut mpsc::Receiver<String>, stream: WsStream, cancel: &CancellationToken) {
    let (mut write, mut read) = stream.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            },
            queued = rx.recv() => match queued {
                Some(frame) => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        warn!(error = %e, "forward send failed");
                        return;
                    }
                    debug!("event forwarded to target");
                },
                // All handles dropped; close out cleanly.
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    cancel.cancel();
                    return;
                },
            },
            _ = heartbeat.tick() => {
                if let Err(e) = write.send(Message::Text(HEARTBEAT_FRAME.into())).await {
                    warn!(error = %e, "heartbeat failed");
                    return;
                }
                debug!("heartbeat sent");
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("target closed the connection");
                    return;
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    warn!(error = %e, "target read error");
                    return;
                },
            },
        }
    }
}

/// Sleep out the reconnect delay; returns true when shutdown was requested.
async fn wait_before_retry(cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(RECONNECT_DELAY) => false,
    }
}

async fn connect(config: &ClientConfig) -> Result<WsStream, tungstenite::Error> {
    let request = build_request(config)?;
    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}

fn build_request(config: &ClientConfig) -> Result<http::Request<()>, tungstenite::Error> {
    let mut request = config.url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        "X-Self-ID",
        http::HeaderValue::from_str(&config.self_id.to_string()).map_err(http::Error::from)?,
    );
    headers.insert("X-Client-Role", http::HeaderValue::from_static("Universal"));
    headers.insert(
        "User-Agent",
        http::HeaderValue::from_static(concat!("onebridge/", env!("CARGO_PKG_VERSION"))),
    );
    if let Some(token) = &config.access_token {
        headers.insert(
            "Authorization",
            http::HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(http::Error::from)?,
        );
    }
    Ok(request)
}

fn set_state(state: &Arc<RwLock<LinkState>>, next: LinkState) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    *guard = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event() -> OutboundEvent {
        OutboundEvent {
            post_type: "message".into(),
            time: 1700000000,
            self_id: 42,
            scope: onebridge_convert::Scope::Direct,
            sub_type: "normal".into(),
            sequence_id: 1,
            actor_id: 2,
            rendered_text: "hi".into(),
            raw_text: "hi".into(),
            font: 0,
            sender: onebridge_convert::SenderProfile {
                user_id: 2,
                nickname: "wxid_a".into(),
                card: "wxid_a".into(),
            },
            group_id: None,
        }
    }

    #[test]
    fn heartbeat_frame_shape() {
        let value: serde_json::Value = serde_json::from_str(HEARTBEAT_FRAME).unwrap();
        assert_eq!(value["op"], 2);
        assert_eq!(value["d"]["heartbeat"], true);
    }

    #[test]
    fn debug_redacts_access_token() {
        let config = ClientConfig {
            url: "ws://localhost:8081".into(),
            access_token: Some(Secret::new("top-secret".into())),
            self_id: 1,
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("top-secret"));
    }

    #[test]
    fn request_carries_identification_headers() {
        let config = ClientConfig {
            url: "ws://localhost:8081".into(),
            access_token: Some(Secret::new("tok".into())),
            self_id: 99,
        };
        let request = build_request(&config).unwrap();
        let headers = request.headers();
        assert_eq!(headers.get("X-Self-ID").unwrap(), "99");
        assert_eq!(headers.get("X-Client-Role").unwrap(), "Universal");
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer tok");
        assert!(
            headers
                .get("User-Agent")
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("onebridge/")
        );
    }

    #[tokio::test]
    async fn forward_queues_while_disconnected() {
        let handle = TargetClient::spawn(ClientConfig {
            url: "ws://127.0.0.1:9".into(),
            access_token: None,
            self_id: 1,
        });

        // Nothing is listening, but queueing must still succeed.
        handle.forward(&test_event()).unwrap();
        assert_ne!(handle.state(), LinkState::Connected);
        handle.shutdown();
    }

    #[tokio::test]
    async fn delivers_events_to_a_live_consumer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let received = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            // Collect frames until the forwarded event shows up; heartbeats
            // may interleave.
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    if value.get("post_type").is_some() {
                        return value;
                    }
                }
            }
            panic!("consumer never saw the event");
        });

        let handle = TargetClient::spawn(ClientConfig {
            url: format!("ws://{addr}"),
            access_token: None,
            self_id: 42,
        });
        handle.forward(&test_event()).unwrap();

        let value = tokio::time::timeout(Duration::from_secs(5), received)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["post_type"], "message");
        assert_eq!(value["self_id"], 42);
        assert_eq!(value["message"], "hi");

        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_the_supervisor() {
        let handle = TargetClient::spawn(ClientConfig {
            url: "ws://127.0.0.1:9".into(),
            access_token: None,
            self_id: 1,
        });
        handle.shutdown();

        // Once the supervisor exits, the queue is closed.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            handle.forward(&test_event()),
            Err(ForwardError::ChannelClosed)
        ));
        assert_eq!(handle.state(), LinkState::Disconnected);
    }
}
