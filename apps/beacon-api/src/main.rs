//! The sessions backend: an in-memory store behind the four `/sessions`
//! routes the tracker speaks to. Accepted state is whatever
//! [`SessionRecord::apply`] folds in; this binary adds no semantics of its
//! own beyond lookup and the 404 that drives client-side recreation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_protocol::{CreateReply, CreateSession, SessionId, SessionRecord, SessionUpdate};
use chrono::Utc;
use clap::Parser;
use parking_lot::RwLock;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "beacon-api")]
#[command(about = "beacon session backend")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8788")]
    listen: SocketAddr,
}

#[derive(Clone, Default)]
struct AppState {
    sessions: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl AppState {
    fn create(&self, request: &CreateSession) -> CreateReply {
        let mut sessions = self.sessions.write();
        let id = SessionId::new_uuid();
        sessions.insert(id.clone(), SessionRecord::new(id.clone(), request, Utc::now()));
        CreateReply {
            id,
            count: sessions.len() as u64,
        }
    }

    fn fold(&self, update: &SessionUpdate) -> Option<()> {
        let mut sessions = self.sessions.write();
        let record = sessions.get_mut(&update.id)?;
        record.apply(&update.body, Utc::now());
        Some(())
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unknown_session(id: &SessionId) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("unknown session {id}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let state = AppState::default();

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/sessions",
            post(create_session)
                .put(update_session)
                .get(list_sessions)
                .delete(clear_sessions),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "beacon-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "beacon-api"
    }))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSession>,
) -> Json<CreateReply> {
    let reply = state.create(&request);
    info!(session_id = %reply.id, path = %request.path, count = reply.count, "session created");
    Json(reply)
}

async fn update_session(
    State(state): State<AppState>,
    Json(update): Json<SessionUpdate>,
) -> ApiResult<StatusCode> {
    state
        .fold(&update)
        .ok_or_else(|| ApiError::unknown_session(&update.id))?;
    Ok(StatusCode::OK)
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionRecord>> {
    let mut records: Vec<_> = state.sessions.read().values().cloned().collect();
    records.sort_by_key(|record| record.created_at);
    Json(records)
}

async fn clear_sessions(State(state): State<AppState>) -> StatusCode {
    let dropped = {
        let mut sessions = state.sessions.write();
        let dropped = sessions.len();
        sessions.clear();
        dropped
    };
    info!(dropped, "sessions cleared");
    StatusCode::NO_CONTENT
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
