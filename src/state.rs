use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::store::PgStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: PgStore,
}

impl AppState {
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let store = PgStore::new(pool, config.history_point_limit);
        Self { config, store }
    }
}

impl FromRef<AppState> for PgStore {
    fn from_ref(state: &AppState) -> PgStore {
        state.store.clone()
    }
}
