use std::net::SocketAddr;
use std::sync::Arc;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, TypedHeader};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn};
use crate::handlers::session_actor::SessionServices;
use crate::handlers::websocket_actor::SessionConnection;
use crate::models::hospital::HospitalCandidate;
use crate::models::position::Position;
use crate::models::traffic::TrafficEstimate;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Clone)]
pub struct AppState {
    pub services: SessionServices,
    /// One permit per live session.
    pub sessions: Arc<Semaphore>,
}

#[derive(Debug, Deserialize)]
pub struct PointQuery {
    pub lat: f64,
    pub lon: f64,
}

impl PointQuery {
    fn position(&self) -> Result<Position, (StatusCode, Json<ErrorResponse>)> {
        let valid = (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon);
        if !valid {
            return Err(fail(StatusCode::BAD_REQUEST, format!("Invalid coordinates {},{}", self.lat, self.lon)));
        }
        Ok(Position::new(self.lat, self.lon))
    }
}

fn fail(status: StatusCode, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { status: "fail", message }))
}

pub fn router(state: AppState, assets_dir: &str) -> Router {
    Router::new()
        .route("/ws/session", get(session_ws_handler))
        .route("/api/hospitals", get(nearby_hospitals))
        .route("/api/traffic", get(traffic_estimate))
        .fallback_service(ServeDir::new(assets_dir))
        // logging so we can see whats going on
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(state)
}

async fn session_ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let permit = match state.sessions.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Rejecting session from {}, at capacity", addr);
            return fail(StatusCode::SERVICE_UNAVAILABLE, "Too many active sessions".to_string()).into_response();
        }
    };

    let agent = user_agent
        .map(|TypedHeader(agent)| agent.to_string())
        .unwrap_or_else(|| "unknown client".to_string());
    info!("Session requested by {} ({})", addr, agent);

    ws.on_upgrade(move |socket| SessionConnection::new(socket, state.services, permit).run_actor())
}

pub async fn nearby_hospitals(
    State(state): State<AppState>,
    Query(query): Query<PointQuery>,
) -> Result<Json<Vec<HospitalCandidate>>, (StatusCode, Json<ErrorResponse>)> {
    let origin = query.position()?;
    state
        .services
        .ranker
        .find(origin)
        .await
        .map(Json)
        .map_err(|e| fail(StatusCode::BAD_GATEWAY, e.to_string()))
}

pub async fn traffic_estimate(
    State(state): State<AppState>,
    Query(query): Query<PointQuery>,
) -> Result<Json<TrafficEstimate>, (StatusCode, Json<ErrorResponse>)> {
    let position = query.position()?;
    let advisor = state
        .services
        .advisor
        .as_ref()
        .ok_or_else(|| fail(StatusCode::SERVICE_UNAVAILABLE, "Traffic advice is not configured".to_string()))?;

    advisor
        .estimate_congestion(position)
        .await
        .map(Json)
        .ok_or_else(|| fail(StatusCode::SERVICE_UNAVAILABLE, "Traffic estimate unavailable".to_string()))
}
