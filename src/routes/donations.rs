use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::donations;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(donations::create_donation))
        .route("/:id", get(donations::get_donation))
        .route("/:id/sync", post(donations::sync_donation))
}
