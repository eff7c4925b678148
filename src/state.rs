use std::sync::Arc;

use crate::config::Config;
use crate::store::Store;
use axum::extract::FromRef;

/// Shared handle to whichever store backs the service.
pub type SharedStore = Arc<dyn Store>;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: Config,
}

impl FromRef<AppState> for SharedStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
