use std::sync::Arc;

use crate::services::lifecycle::LifecycleEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        AppState { engine }
    }
}
