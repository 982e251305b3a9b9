use axum::{routing::post, Router};

use crate::handlers::webhooks;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/payment-provider", post(webhooks::payment_provider_webhook))
}
