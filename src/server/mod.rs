// ABOUTME: WebSocket binding of tutorial sessions (GET /socket)
// Identity comes from an upstream-authenticated header or the `user` query parameter

use crate::config::ServerConfig;
use crate::session::{ChannelTransport, ClientEvent, Coordinator, Multiplexer, ServerEvent};
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct ServerState {
    pub multiplexer: Arc<Multiplexer>,
    pub identity_header: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SocketQuery {
    user: Option<String>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new().route("/socket", get(socket_handler)).with_state(state)
}

pub async fn serve(config: &ServerConfig, multiplexer: Arc<Multiplexer>) -> Result<()> {
    let state = Arc::new(ServerState {
        multiplexer,
        identity_header: config.identity_header.clone(),
    });

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await.context("Server stopped")
}

/// Header identity first, then the query parameter. Blank values do not count.
pub fn identity(headers: &HeaderMap, header: &str, query: &SocketQuery) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .or(query.user.as_deref())
        .map(str::trim)
        .filter(|identity| !identity.is_empty())
        .map(str::to_string)
}

async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<SocketQuery>,
) -> Response {
    let Some(identity) = identity(&headers, &state.identity_header, &query) else {
        warn!("Socket connection without identity rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Parse one inbound text frame. Unknown or malformed frames yield `None`.
pub fn parse_frame(text: &str) -> Option<ClientEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Ignoring unparseable frame: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>, identity: String) {
    let connection_id = Uuid::new_v4().to_string();
    let (transport, events) = ChannelTransport::new(connection_id.clone());
    let coordinator = state.multiplexer.connect(&identity, Arc::new(transport));
    info!("{} connected on {}", identity, connection_id);

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_events(sink, events));

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Some(event) = parse_frame(text.as_str()) {
                    dispatch(&coordinator, event);
                }
            }
            Ok(Message::Close(_)) => {
                debug!("{} closed connection {}", identity, connection_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    writer.abort();
    // The session stays registered so a reconnect finds its shell again
    info!("{} disconnected from {}", identity, connection_id);
}

fn dispatch(coordinator: &Arc<Coordinator>, event: ClientEvent) {
    match event {
        // Attaching builds and starts things; keep reading input meanwhile
        ClientEvent::Attach(_) => {
            let coordinator = Arc::clone(coordinator);
            tokio::spawn(async move { coordinator.handle(event).await });
        }
        ClientEvent::Resize { h, w } => coordinator.resize(h, w),
        ClientEvent::Cmd(data) => coordinator.cmd(data),
    }
}

async fn write_events(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = events.recv().await {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize '{}' event: {}", event.name(), e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            debug!("Connection closed while sending: {}", e);
            break;
        }
    }
}
