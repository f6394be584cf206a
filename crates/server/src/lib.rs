//! Receiver endpoint for the source relay: a webhook and a duplex WebSocket
//! feed, both funneling into the normalization engine and out through the
//! forwarding link.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{
            State,
            ws::{Message, WebSocket, WebSocketUpgrade},
        },
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    onebridge_convert::{InboundEvent, Normalizer},
    onebridge_onebot::TargetHandle,
};

/// Shared state of the receiver endpoint.
#[derive(Clone)]
pub struct AppState {
    pub normalizer: Arc<Normalizer>,
    pub target: TargetHandle,
}

/// Build the receiver router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook_handler))
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state)
}

/// Bind and serve until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "receiver endpoint listening");
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// Webhook callback from the relay. Malformed envelopes get a 400,
/// conversion failures a 500; neither is ever retried from here.
async fn webhook_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let event = match InboundEvent::from_json_str(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, raw = body, "webhook envelope rejected");
            return (StatusCode::BAD_REQUEST, format!("invalid envelope: {e}"));
        },
    };

    match state.normalizer.normalize(event).await {
        Ok(outbound) => {
            if let Err(e) = state.target.forward(&outbound) {
                // The link's own reconnect policy handles delivery; the
                // relay must not retry the webhook.
                warn!(error = %e, "forwarding failed");
            }
            (StatusCode::OK, "OK".to_string())
        },
        Err(e) => {
            error!(error = %e, raw = body, "conversion failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        },
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Duplex feed: every text frame is one wire envelope; the reply reports
/// per-frame success or failure.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("relay websocket connected");

    while let Some(received) = socket.recv().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "relay websocket error");
                break;
            },
        };
        match message {
            Message::Text(text) => {
                let reply = process_frame(&state, &text).await;
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            },
            Message::Close(_) => break,
            other => debug!(?other, "ignoring non-text frame"),
        }
    }

    info!("relay websocket closed");
}

async fn process_frame(state: &AppState, raw: &str) -> String {
    let event = match InboundEvent::from_json_str(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, raw, "websocket envelope rejected");
            return r#"{"error":"invalid JSON"}"#.to_string();
        },
    };

    match state.normalizer.normalize(event).await {
        Ok(outbound) => {
            if let Err(e) = state.target.forward(&outbound) {
                warn!(error = %e, "forwarding failed");
            }
            r#"{"status":"ok"}"#.to_string()
        },
        Err(e) => {
            error!(error = %e, raw, "conversion failed");
            serde_json::json!({ "error": e.to_string() }).to_string()
        },
    }
}
