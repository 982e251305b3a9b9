// handlers/donations.rs
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use tracing::info;

use crate::errors::Result;
use crate::models::donation::{CreateDonationRequest, DonationCreated, DonationView, SyncResult};
use crate::state::AppState;

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_donation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateDonationRequest>,
) -> Result<(StatusCode, Json<DonationCreated>)> {
    info!("Creating donation for amount {}", payload.amount);

    let created = state
        .engine
        .create(payload.amount, payload.attribution, client_ip(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DonationView>> {
    let view = state.engine.status_view(&id).await?;
    Ok(Json(view))
}

pub async fn sync_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncResult>> {
    info!("Sync requested for donation {}", id);
    let result = state.engine.sync(&id).await?;
    Ok(Json(result))
}
