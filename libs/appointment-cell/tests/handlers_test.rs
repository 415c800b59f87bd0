use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn booking_requires_a_token() {
    let app = appointment_routes(TestConfig::default().to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Content-Type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_with_missing_fields_returns_validation_envelope() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, Some(1));

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(json_request("POST", "/", &token, json!({ "patient_id": patient.id })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["status"], 0);
    assert!(body["message"].as_str().unwrap().contains("Missing required fields"));
}

#[tokio::test]
async fn reschedule_conflict_maps_to_409() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri());
    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, Some(1));
    let appointment_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(&appointment_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/update_appointment_status"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation("appointments_active_slot_key"),
        ))
        .mount(&mock_server)
        .await;

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/{}/status", appointment_id),
            &token,
            json!({ "status": "rescheduled", "appointment_date": "2030-03-06", "appointment_time": "10:40" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], 409);
}

#[tokio::test]
async fn unknown_status_value_is_rejected() {
    let config = TestConfig::default();
    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, Some(1));

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/{}/status", Uuid::new_v4()),
            &token,
            json!({ "status": "no_show" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_status_routes_share_one_contract() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri());
    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, Some(1));
    let appointment_id = Uuid::new_v4().to_string();
    let invoice_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/change_payment_status"))
        .and(body_partial_json(json!({
            "p_appointment_id": appointment_id,
            "p_payment_status": "paid"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appointment_id": appointment_id,
            "payment_status": "paid",
            "invoice_id": invoice_id,
            "invoice_status": "paid"
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let app = appointment_routes(config.to_arc());

    for (verb, uri) in [
        ("PATCH", format!("/{}/payment-status", appointment_id)),
        ("PUT", format!("/{}/payment", appointment_id)),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(verb, &uri, &token, json!({ "payment_status": "paid" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["payload"]["invoice_status"], "paid");
        assert_eq!(body["payload"]["invoice_id"], invoice_id.as_str());
    }
}

#[tokio::test]
async fn patients_cannot_change_payment_status() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, Some(1));

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/{}/payment-status", Uuid::new_v4()),
            &token,
            json!({ "payment_status": "paid" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
