pub mod args;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod group;
pub mod ledger;
pub mod state;
pub mod store;
pub mod timer;

use crate::{
    args::Args,
    error::ApiError,
    group::{GroupSnapshot, NewGroup, Player},
    state::ServerState,
    store::InMemoryRosterStore,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

pub use game_group_protocol as protocol;

pub fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_group_server=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(false)
                .with_target(false),
        )
        .init();
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let state = ServerState::new(Arc::new(InMemoryRosterStore::new()), &args);
    let listener = tokio::net::TcpListener::bind(args.host).await?;

    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.coordinator.shutdown().await;
    info!("coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

pub fn app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/groups", post(create_group_handler).get(list_groups_handler))
        .route("/groups/:group_id", get(get_group_handler))
        .route("/groups/:group_id/join", post(join_group_handler))
        .route("/ws", get(connection::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "degraded_groups": state.coordinator.degraded_groups() })),
    )
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    name: String,
    max_players: Option<u32>,
    game_timer_seconds: Option<u64>,
}

async fn create_group_handler(
    State(state): State<ServerState>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("group name must not be empty".into()));
    }
    let max_players = payload.max_players.unwrap_or(state.defaults.max_players);
    let game_timer_seconds = payload
        .game_timer_seconds
        .unwrap_or(state.defaults.game_timer_seconds);
    if max_players == 0 || game_timer_seconds == 0 {
        return Err(ApiError::InvalidInput(
            "max_players and game_timer_seconds must be positive".into(),
        ));
    }

    let group = state
        .store
        .create_group(NewGroup {
            name: name.to_string(),
            max_players,
            game_timer_seconds,
        })
        .await?;
    info!(group_id = %group.id, name = %group.name, max_players, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

async fn list_groups_handler(State(state): State<ServerState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_groups().await?))
}

async fn get_group_handler(
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupSnapshot>, ApiError> {
    Ok(Json(state.coordinator.snapshot(group_id).await?))
}

#[derive(Deserialize)]
pub struct JoinGroupRequest {
    username: String,
}

#[derive(Serialize)]
struct JoinGroupResponse {
    player: Player,
    group: GroupSnapshot,
}

async fn join_group_handler(
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<JoinGroupRequest>,
) -> Result<Json<JoinGroupResponse>, ApiError> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(ApiError::InvalidInput("username must not be empty".into()));
    }

    let (player, group) = state.coordinator.join_new_player(group_id, username).await?;
    Ok(Json(JoinGroupResponse { player, group }))
}
