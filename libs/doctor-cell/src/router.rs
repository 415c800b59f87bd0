use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/{doctor_id}/slots", get(handlers::get_slots_for_date))
        .route("/{doctor_id}/availability", get(handlers::get_weekly_availability));

    let protected_routes = Router::new()
        .route("/{doctor_id}/availability", put(handlers::add_or_update_availability))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
