use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use billing_cell::router::billing_routes;
use doctor_cell::router::doctor_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "ClinicBook API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/billing", billing_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn state() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_service_role_key: "service".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            checkout_api_base_url: "http://localhost:12111/v1".to_string(),
            checkout_secret_key: String::new(),
            checkout_webhook_secret: String::new(),
            checkout_success_url: String::new(),
            checkout_cancel_url: String::new(),
            checkout_currency: "usd".to_string(),
            email_api_url: String::new(),
            email_api_key: String::new(),
            email_from: "no-reply@clinicbook.local".to_string(),
            reminder_interval_minutes: 60,
            server_port: 3000,
        })
    }

    #[tokio::test]
    async fn root_answers() {
        let response = create_router(state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cell_routes_are_mounted_behind_auth() {
        for uri in ["/appointments", "/doctors/00000000-0000-0000-0000-000000000000/availability"] {
            let method = if uri.starts_with("/doctors") { "PUT" } else { "GET" };
            let response = create_router(state())
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }
}
