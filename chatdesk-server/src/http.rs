//! chatdesk-server/src/http.rs
//!
//! Operator-facing HTTP API: the "assign now" button, the cron entry point,
//! manual assignment and a desk summary.

use std::net::SocketAddr;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_server::{Handle, Server};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use chatdesk_core::Error;
use chatdesk_core::models::{ChatAssignment, TriggerSummary};
use chatdesk_core::services::DeskServices;
use chatdesk_core::tasks::CycleReport;

#[derive(Clone)]
pub struct AppState {
    pub desk: DeskServices,
}

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) | Error::ConcurrentModification(_) => StatusCode::CONFLICT,
            Error::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentWorkload {
    pub agent_id: String,
    pub availability: String,
    pub active_chat_count: i32,
    pub max_concurrent_chats: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskSummary {
    pub queue_depth: usize,
    pub open_chats: usize,
    pub agents: Vec<AgentWorkload>,
    pub unnotified_breaches: usize,
}

pub fn router(desk: DeskServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/summary", get(summary))
        .route("/cycle", post(run_cycle))
        .route("/assign-now", post(assign_now))
        .route("/chats/{chat_id}/assign", post(assign_chat))
        .with_state(AppState { desk })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn health() -> &'static str {
    "ok"
}

async fn summary(State(state): State<AppState>) -> Result<Json<DeskSummary>, ApiError> {
    let desk = &state.desk;
    let queue_depth = desk.queue.pending().await?.len();
    let open_chats = desk.queue.active().await?.len();
    let agents = desk
        .registry
        .list_agents()
        .await?
        .into_iter()
        .map(|a| AgentWorkload {
            agent_id: a.agent_id,
            availability: a.availability.to_string(),
            active_chat_count: a.active_chat_count,
            max_concurrent_chats: a.max_concurrent_chats,
        })
        .collect();
    let unnotified_breaches = desk.stores.breaches.list_unnotified().await?.len();

    Ok(Json(DeskSummary {
        queue_depth,
        open_chats,
        agents,
        unnotified_breaches,
    }))
}

/// Entry point for an external cron dispatcher.
async fn run_cycle(State(state): State<AppState>) -> Json<CycleReport> {
    Json(state.desk.scheduler.run_cycle().await)
}

async fn assign_now(State(state): State<AppState>) -> Result<Json<TriggerSummary>, ApiError> {
    Ok(Json(state.desk.scheduler.trigger_assignment_now().await?))
}

async fn assign_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<ChatAssignment>, ApiError> {
    let assignment = state
        .desk
        .assignment
        .assign_chat_to(chat_id, &req.agent_id, Utc::now())
        .await?;
    Ok(Json(assignment))
}

/// Serves the API until `handle` is told to shut down.
pub async fn serve(desk: DeskServices, addr: SocketAddr, handle: Handle) {
    info!("Desk API listening on http://{}", addr);
    let server = Server::bind(addr)
        .handle(handle)
        .serve(router(desk).into_make_service());

    if let Err(e) = server.await {
        error!("Desk API server error: {}", e);
    }
    info!("Desk API shut down.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chatdesk_core::models::{AgentAvailability, ChatSession, SchedulerConfig};
    use chatdesk_core::test_utils::helpers::memory_desk;
    use tower::ServiceExt;

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_assign_now_returns_counts() -> Result<(), Error> {
        let fx = memory_desk(SchedulerConfig::default());
        fx.desk.registry.register_agent("agent-a", "A", 3, AgentAvailability::Online).await?;
        fx.desk.queue.enqueue(ChatSession::new("member", None, Utc::now())).await?;

        let (status, body) = send(router(fx.desk.clone()), Request::post("/assign-now").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assignedCount"], 1);
        assert_eq!(body["rebalancedCount"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_manual_assign_route() -> Result<(), Error> {
        let fx = memory_desk(SchedulerConfig::default());
        fx.desk.registry.register_agent("agent-a", "A", 1, AgentAvailability::Online).await?;
        let chat = fx.desk.queue.enqueue(ChatSession::new("member", None, Utc::now())).await?;
        let uri = format!("/chats/{}/assign", chat.chat_id);

        let (status, body) = send(router(fx.desk.clone()), post_json(&uri, serde_json::json!({"agent_id": "agent-a"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent_id"], "agent-a");

        let (status, _) = send(router(fx.desk.clone()), post_json(&uri, serde_json::json!({"agent_id": "agent-a"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let missing = format!("/chats/{}/assign", Uuid::new_v4());
        let (status, _) = send(router(fx.desk.clone()), post_json(&missing, serde_json::json!({"agent_id": "agent-a"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn test_summary_and_outage() -> Result<(), Error> {
        let fx = memory_desk(SchedulerConfig::default());
        fx.desk.registry.register_agent("agent-a", "A", 3, AgentAvailability::Online).await?;
        fx.desk.queue.enqueue(ChatSession::new("member", None, Utc::now())).await?;

        let (status, body) = send(router(fx.desk.clone()), Request::get("/summary").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queueDepth"], 1);
        assert_eq!(body["agents"][0]["maxConcurrentChats"], 3);

        fx.store.set_offline(true);
        let (status, _) = send(router(fx.desk.clone()), Request::get("/summary").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[tokio::test]
    async fn test_cycle_route_reports_failed_stage() -> Result<(), Error> {
        let fx = memory_desk(SchedulerConfig::default());
        let (status, body) = send(router(fx.desk.clone()), Request::post("/cycle").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        // No SLA policy is configured.
        assert_eq!(body["failures"][0]["stage"], "sla_scan");
        assert_eq!(body["failures"][0]["transient"], false);
        Ok(())
    }
}
