//! Emergency hospital locator.
//!
//! Serves the map client from `ASSETS_DIR` and runs one navigation session
//! per websocket connection on `/ws/session`. The browser acts as map surface
//! and geolocation provider; the server ranks nearby hospitals, drives the
//! session state machine and adds traffic advice.
//!
//! Run the server with
//! ```not_rust
//! TRAFFIC_API_KEY=... cargo run
//! ```

mod config;
mod geo;
mod handlers;
mod models;
mod services;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::Server;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::CONFIG;
use crate::handlers::api::{router, AppState};
use crate::handlers::session_actor::SessionServices;
use crate::services::directory::{HospitalRanker, OverpassDirectory};
use crate::services::traffic::{FlowSegmentClient, TrafficAdvisor};

const USER_AGENT: &str = concat!("HospitalLocator/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "HospitalLocator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let http = reqwest::Client::builder()
        .timeout(CONFIG.http_timeout)
        .user_agent(USER_AGENT)
        .build()?;

    let directory = OverpassDirectory::new(http.clone(), CONFIG.overpass_url.clone());
    let advisor = match &CONFIG.traffic_api_key {
        Some(key) => Some(Arc::new(TrafficAdvisor::new(Arc::new(FlowSegmentClient::new(
            http.clone(),
            CONFIG.traffic_url.clone(),
            key.clone(),
        ))))),
        None => {
            info!("TRAFFIC_API_KEY not set, traffic advice disabled");
            None
        }
    };

    let state = AppState {
        services: SessionServices {
            ranker: Arc::new(HospitalRanker::new(Arc::new(directory), CONFIG.search_radius_meters)),
            advisor,
            loading_min: CONFIG.loading_min,
        },
        sessions: Arc::new(Semaphore::new(CONFIG.max_concurrent_sessions)),
    };

    let app = router(state, &CONFIG.assets_dir);

    let addr: SocketAddr = format!("{}:{}", CONFIG.host, CONFIG.port).parse()?;
    info!("listening on {}", addr);

    Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
