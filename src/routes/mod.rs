pub mod health;
pub mod sensors;
pub mod users;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(sensors::router())
        .merge(users::router())
        .nest("/api", crate::openapi::router())
        .with_state(state)
}
