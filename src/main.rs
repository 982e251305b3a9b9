use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod store;

use services::lifecycle::LifecycleEngine;
use services::notifier::AttributionNotifier;
use services::pix_gateway::PixGatewayClient;
use state::AppState;
use store::InMemoryDonationStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = config::AppConfig::from_env();
    let app_state = initialize_app_state(config.clone());

    let app = build_router(app_state);
    start_server(app, &config).await;
}

fn initialize_app_state(config: config::AppConfig) -> AppState {
    let store = Arc::new(InMemoryDonationStore::new());
    let gateway = Arc::new(PixGatewayClient::new(config.clone()));
    let notifier = Arc::new(AttributionNotifier::new(config));

    let engine = Arc::new(LifecycleEngine::new(store, gateway, notifier));
    tracing::info!("Lifecycle engine initialized");

    AppState::new(engine)
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .nest("/donations", routes::donations::routes())
        .nest("/webhooks", routes::webhooks::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, config: &config::AppConfig) {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid HOST/PORT");

    tracing::info!("🚀 Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            axum::serve(listener, app).await.unwrap();
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn root_handler() -> &'static str {
    "💚 Donations API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
