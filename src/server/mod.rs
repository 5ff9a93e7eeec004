//! HTTP and WebSocket surface of the board.

/// Admin bearer-token middleware
pub mod auth;
/// Route handlers
pub mod handlers;
/// Error to HTTP response mapping
pub mod response;

use crate::{
    core::{
        reset::{Clock, CycleResetEngine},
        store::SeaOrmStore,
    },
    errors::Result,
    realtime::Broadcaster,
};
use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared by every handler.
pub struct AppState {
    /// Database access, shared with the reset engine
    pub store: SeaOrmStore,
    /// Connected displays
    pub broadcaster: Arc<Broadcaster>,
    /// Reset engine for the manual triggers
    pub engine: Arc<CycleResetEngine>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Admin bearer token; `None` leaves admin routes open
    pub admin_token: Option<String>,
}

impl AppState {
    /// Connection used by the admin and read handlers.
    #[must_use]
    pub fn db(&self) -> &DatabaseConnection {
        self.store.connection()
    }
}

/// Handle to [`AppState`] passed to handlers.
pub type SharedState = Arc<AppState>;

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    let admin = Router::new()
        .route("/api/agents", post(handlers::create_agent))
        .route("/api/agents/:id", delete(handlers::delete_agent))
        .route("/api/agents/:id/targets", put(handlers::update_agent_targets))
        .route("/api/teams", post(handlers::create_team))
        .route("/api/teams/:id", delete(handlers::delete_team))
        .route("/api/teams/:id/targets", put(handlers::update_team_targets))
        .route("/api/sales", post(handlers::create_sale))
        .route(
            "/api/sales/:id",
            put(handlers::update_sale).delete(handlers::delete_sale),
        )
        .route("/api/settings/currency", put(handlers::set_currency))
        .route("/api/cycles/initialize", post(handlers::initialize_cycles))
        .route("/api/cycles/reset", post(handlers::reset_cycles))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_admin,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(handlers::websocket))
        .route("/api/dashboard", get(handlers::dashboard))
        .route("/api/history/:kind/:id", get(handlers::history))
        .merge(admin)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: SharedState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Sales board listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::store::CycleStore,
        realtime::{ChannelSink, DisplaySink},
        test_utils::*,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct Harness {
        state: SharedState,
        clock: Arc<FixedClock>,
    }

    async fn harness(admin_token: Option<&str>) -> Harness {
        let store = setup_test_store().await.unwrap();
        let broadcaster = Arc::new(Broadcaster::new());
        let engine = Arc::new(CycleResetEngine::new(
            Arc::new(store.clone()) as Arc<dyn CycleStore>,
            Arc::clone(&broadcaster),
        ));
        let start = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let state = Arc::new(AppState {
            store,
            broadcaster,
            engine,
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
            admin_token: admin_token.map(str::to_string),
        });
        Harness { state, clock }
    }

    async fn send(
        state: &SharedState,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(None).await;
        let response = router(Arc::clone(&h.state))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let h = harness(Some("s3cret")).await;
        let body = json!({ "name": "Ava" });

        let (status, _) = send(&h.state, "POST", "/api/agents", Some(body.clone()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let wrong = Some("wrong");
        let (status, _) = send(&h.state, "POST", "/api/agents", Some(body.clone()), wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let right = Some("s3cret");
        let (status, agent) = send(&h.state, "POST", "/api/agents", Some(body), right).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(agent["name"], "Ava");

        // Read paths stay public
        let (status, _) = send(&h.state, "GET", "/api/dashboard", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_cycle_is_bad_request() {
        let h = harness(None).await;
        let body = json!({ "name": "Ava", "target_cycle": "yearly", "reset_day": 1 });
        let (status, error) = send(&h.state, "POST", "/api/agents", Some(body), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["error"].as_str().unwrap().contains("reset month"));
    }

    #[tokio::test]
    async fn test_sale_flow_broadcasts_and_updates_dashboard() {
        let h = harness(None).await;
        let (sink, mut rx) = ChannelSink::open();
        h.state.broadcaster.register(Arc::clone(&sink) as Arc<dyn DisplaySink>);

        let (_, agent) = send(
            &h.state,
            "POST",
            "/api/agents",
            Some(json!({ "name": "Ava", "target_volume_cents": 100_000 })),
            None,
        )
        .await;
        let agent_id = agent["id"].as_i64().unwrap();
        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "agent_changed");

        let (status, sale) = send(
            &h.state,
            "POST",
            "/api/sales",
            Some(json!({ "agent_id": agent_id, "amount_cents": 25_000, "category": "solar" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let event: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["type"], "sale_created");
        assert_eq!(event["data"]["id"], sale["id"]);

        let (_, dashboard) = send(&h.state, "GET", "/api/dashboard", None, None).await;
        assert_eq!(dashboard["agents"][0]["achieved_volume_cents"], 25_000);
        assert_eq!(dashboard["agents"][0]["progress_percent"], 25.0);

        let uri = format!("/api/sales/{}", sale["id"]);
        let (status, _) = send(&h.state, "DELETE", &uri, None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let event: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["type"], "sale_deleted");
        assert_eq!(event["data"]["agent_id"], agent_id);

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/sales",
            Some(json!({ "agent_id": agent_id, "amount_cents": -1 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_manual_reset_and_history() {
        let h = harness(None).await;
        let body = json!({ "name": "North" });
        let (_, team) = send(&h.state, "POST", "/api/teams", Some(body), None).await;
        let team_id = team["id"].as_i64().unwrap();

        h.clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
        let (status, report) = send(&h.state, "POST", "/api/cycles/reset", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["periods_closed"], 2);
        assert!(report["summary"].as_str().unwrap().contains("2 period(s) closed"));

        let uri = format!("/api/history/teams/{team_id}?limit=1");
        let (status, history) = send(&h.state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["period_start"], "2024-04-01T00:00:00Z");

        let (status, _) = send(&h.state, "GET", "/api/history/offices/1", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_currency_update() {
        let h = harness(None).await;
        let (status, body) = send(
            &h.state,
            "PUT",
            "/api/settings/currency",
            Some(json!({ "currency": "gbp" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currency"], "GBP");

        let (_, dashboard) = send(&h.state, "GET", "/api/dashboard", None, None).await;
        assert_eq!(dashboard["currency"], "GBP");
    }

    #[tokio::test]
    async fn test_unknown_agent_targets_is_not_found() {
        let h = harness(None).await;
        let body = json!({
            "target_volume_cents": 1,
            "target_units": 1,
            "target_cycle": "monthly",
            "reset_day": 1
        });
        let (status, _) = send(&h.state, "PUT", "/api/agents/42/targets", Some(body), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
