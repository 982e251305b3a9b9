// handlers/webhooks.rs
use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProviderNotification {
    #[serde(alias = "transactionId")]
    pub transaction_id: String,
    pub status: String,
}

/// Push reconciliation endpoint. Duplicate confirmations are acknowledged
/// with 200; an unrecognized transaction id is a 404 with no side effects
/// (providers notify about charges that are not ours).
pub async fn payment_provider_webhook(
    State(state): State<AppState>,
    Json(notification): Json<ProviderNotification>,
) -> Result<Json<Value>> {
    info!(
        "Provider webhook: transaction {} status {}",
        notification.transaction_id, notification.status
    );

    state
        .engine
        .handle_webhook(&notification.transaction_id, &notification.status)
        .await?;

    Ok(Json(json!({ "received": true })))
}
