use std::sync::Arc;

use axum::{
    Router,
    routing::post,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn billing_routes(state: Arc<AppConfig>) -> Router {
    // Signed by the checkout provider, not by a user token
    let public_routes = Router::new()
        .route("/webhook", post(handlers::checkout_webhook));

    let protected_routes = Router::new()
        .route("/checkout-sessions", post(handlers::create_checkout_session))
        .route("/checkout-sessions/{session_id}/verify", post(handlers::verify_checkout_session))
        .route("/invoices", post(handlers::create_invoice))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
