use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    event::EventEnvelope,
    protocol::{push_socket_route, user_events_route, DeliverResponse, PushFrame},
};
use tokio::sync::broadcast::error::RecvError;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

#[derive(Debug, Deserialize)]
struct WsQuery {
    user_id: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let state = Arc::new(AppState::new(settings.channel_capacity));
    let app = build_router(state, settings.max_body_bytes);

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(%addr, max_body_bytes = settings.max_body_bytes, "relay: listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("relay: stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "relay: could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(user_events_route(), post(deliver_event))
        .route(push_socket_route(), get(ws_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn deliver_event(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<(StatusCode, Json<DeliverResponse>), (StatusCode, Json<ApiError>)> {
    let user_id = UserId(user_id);
    if envelope.origin_user_id != user_id {
        warn!(
            path_user_id = user_id.0,
            origin_user_id = envelope.origin_user_id.0,
            event_id = %envelope.event_id,
            "relay: rejected event addressed to another user"
        );
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::new(
                ErrorCode::Forbidden,
                "event origin does not match the addressed user",
            )),
        ));
    }

    let event_id = envelope.event_id;
    let subscribers = state.hub.publish(user_id, envelope);
    info!(
        user_id = user_id.0,
        %event_id,
        subscribers,
        "relay: event accepted"
    );
    Ok((StatusCode::ACCEPTED, Json(DeliverResponse { subscribers })))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket, UserId(q.user_id)))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket, user_id: UserId) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.hub.subscribe(user_id);
    info!(user_id = user_id.0, "relay: subscriber connected");

    let send_task = tokio::spawn(async move {
        loop {
            let frame = match events_rx.recv().await {
                Ok(envelope) => PushFrame::Event(envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user_id.0, skipped, "relay: subscriber lagged");
                    PushFrame::Lagged { skipped }
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&frame) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    let _ = send_task.await;
    state.hub.release(user_id);
    debug!(user_id = user_id.0, "relay: subscriber disconnected");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
