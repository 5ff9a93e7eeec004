//! Request handlers.
//!
//! Each mutating handler calls into `core`, then tells connected displays what
//! changed. Displays re-fetch `/api/dashboard` on any event.

use crate::{
    core::{
        agent::{self, NewAgent},
        entity::{EntityKind, EntityRef},
        history::{HistoryEntry, recent_history},
        leaderboard::{Dashboard, build_dashboard},
        reset::{PassReport, format_pass_summary},
        sale::{self, NewSale, SaleUpdate},
        settings,
        targets::TargetUpdate,
        team::{self, NewTeam},
    },
    entities::{agent as agent_entity, sale as sale_entity, team as team_entity},
    errors::{Error, Result},
    realtime::{
        ChannelSink, ConnectionState, DisplaySink,
        events::{BoardEvent, CurrencyChanged, EntityChanged, SaleDeleted},
    },
    server::SharedState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Liveness check.
pub async fn health() -> &'static str {
    "OK"
}

/// Current standings.
pub async fn dashboard(State(state): State<SharedState>) -> Result<Json<Dashboard>> {
    Ok(Json(build_dashboard(&state.store, state.clock.now()).await?))
}

/// Query string of the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of records, newest first
    pub limit: Option<u64>,
}

/// Closed periods of one agent or team.
pub async fn history(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, i64)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>> {
    let kind = EntityKind::parse(&kind).ok_or_else(|| Error::Validation {
        message: format!("Unknown entity type '{kind}'"),
    })?;
    let entity = EntityRef { kind, id };
    Ok(Json(recent_history(state.db(), entity, query.limit).await?))
}

fn entity_changed(kind: EntityKind, id: i64) -> EntityChanged {
    EntityChanged {
        entity_type: kind,
        entity_id: id,
    }
}

/// Creates an agent.
pub async fn create_agent(
    State(state): State<SharedState>,
    Json(new): Json<NewAgent>,
) -> Result<(StatusCode, Json<agent_entity::Model>)> {
    let agent = agent::create_agent(state.db(), new, state.clock.now()).await?;
    state
        .broadcaster
        .broadcast(&BoardEvent::AgentChanged(entity_changed(EntityKind::Agent, agent.id)));
    Ok((StatusCode::CREATED, Json(agent)))
}

/// Deactivates an agent.
pub async fn delete_agent(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<agent_entity::Model>> {
    let agent = agent::deactivate_agent(state.db(), id).await?;
    state
        .broadcaster
        .broadcast(&BoardEvent::AgentChanged(entity_changed(EntityKind::Agent, agent.id)));
    Ok(Json(agent))
}

/// Replaces an agent's targets.
pub async fn update_agent_targets(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(update): Json<TargetUpdate>,
) -> Result<Json<agent_entity::Model>> {
    let agent = agent::update_agent_targets(state.db(), id, &update, state.clock.now()).await?;
    state
        .broadcaster
        .broadcast(&BoardEvent::TargetsUpdated(entity_changed(EntityKind::Agent, agent.id)));
    Ok(Json(agent))
}

/// Creates a team.
pub async fn create_team(
    State(state): State<SharedState>,
    Json(new): Json<NewTeam>,
) -> Result<(StatusCode, Json<team_entity::Model>)> {
    let team = team::create_team(state.db(), new, state.clock.now()).await?;
    state
        .broadcaster
        .broadcast(&BoardEvent::TeamChanged(entity_changed(EntityKind::Team, team.id)));
    Ok((StatusCode::CREATED, Json(team)))
}

/// Deactivates a team.
pub async fn delete_team(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<team_entity::Model>> {
    let team = team::deactivate_team(state.db(), id).await?;
    state
        .broadcaster
        .broadcast(&BoardEvent::TeamChanged(entity_changed(EntityKind::Team, team.id)));
    Ok(Json(team))
}

/// Replaces a team's targets.
pub async fn update_team_targets(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(update): Json<TargetUpdate>,
) -> Result<Json<team_entity::Model>> {
    let team = team::update_team_targets(state.db(), id, &update, state.clock.now()).await?;
    state
        .broadcaster
        .broadcast(&BoardEvent::TargetsUpdated(entity_changed(EntityKind::Team, team.id)));
    Ok(Json(team))
}

/// Records a sale.
pub async fn create_sale(
    State(state): State<SharedState>,
    Json(new): Json<NewSale>,
) -> Result<(StatusCode, Json<sale_entity::Model>)> {
    let sale = sale::create_sale(state.db(), new, state.clock.now()).await?;
    state.broadcaster.broadcast(&BoardEvent::SaleCreated(sale.clone()));
    Ok((StatusCode::CREATED, Json(sale)))
}

/// Corrects a sale.
pub async fn update_sale(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(update): Json<SaleUpdate>,
) -> Result<Json<sale_entity::Model>> {
    let sale = sale::update_sale(state.db(), id, &update).await?;
    state.broadcaster.broadcast(&BoardEvent::SaleUpdated(sale.clone()));
    Ok(Json(sale))
}

/// Removes a sale.
pub async fn delete_sale(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let sale = sale::delete_sale(state.db(), id).await?;
    state.broadcaster.broadcast(&BoardEvent::SaleDeleted(SaleDeleted {
        id: sale.id,
        agent_id: sale.agent_id,
    }));
    Ok(StatusCode::NO_CONTENT)
}

/// Body of the currency endpoint.
#[derive(Debug, Deserialize)]
pub struct CurrencyRequest {
    /// Three-letter currency code
    pub currency: String,
}

/// Changes the display currency.
pub async fn set_currency(
    State(state): State<SharedState>,
    Json(request): Json<CurrencyRequest>,
) -> Result<Json<CurrencyChanged>> {
    let currency = settings::set_currency(state.db(), &request.currency).await?;
    let changed = CurrencyChanged { currency };
    state
        .broadcaster
        .broadcast(&BoardEvent::CurrencyChanged(changed.clone()));
    Ok(Json(changed))
}

/// Response of the manual cycle triggers.
#[derive(Debug, Serialize)]
pub struct PassResponse {
    /// Human-readable summary
    pub summary: String,
    /// Counts of the pass
    #[serde(flatten)]
    pub report: PassReport,
}

impl From<PassReport> for PassResponse {
    fn from(report: PassReport) -> Self {
        Self {
            summary: format_pass_summary(&report),
            report,
        }
    }
}

/// Initializes entities that have no cycle state yet.
pub async fn initialize_cycles(State(state): State<SharedState>) -> Result<Json<PassResponse>> {
    let report = state.engine.trigger_initialize(state.clock.now()).await?;
    Ok(Json(report.into()))
}

/// Runs a full reset pass now.
pub async fn reset_cycles(State(state): State<SharedState>) -> Result<Json<PassResponse>> {
    let report = state.engine.trigger_reset(state.clock.now()).await?;
    Ok(Json(report.into()))
}

/// Upgrades a display connection to WebSocket.
pub async fn websocket(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Registers the socket with the broadcaster and pumps events to it until it closes.
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut outgoing) = ChannelSink::open();
    let id = state
        .broadcaster
        .register(Arc::clone(&sink) as Arc<dyn DisplaySink>);

    let send_task = tokio::spawn(async move {
        while let Some(text) = outgoing.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Displays only listen; anything they send besides close is ignored
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    sink.set_state(ConnectionState::Closing);
    state.broadcaster.deregister(id);
    send_task.abort();
    debug!("Display connection {} closed", id);
}
