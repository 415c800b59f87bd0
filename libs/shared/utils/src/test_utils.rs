use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub checkout_url: String,
    pub email_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            checkout_url: "http://localhost:12111/v1".to_string(),
            email_url: String::new(),
        }
    }
}

impl TestConfig {
    /// Points every external collaborator at one mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            checkout_url: format!("{}/v1", uri),
            email_url: format!("{}/email", uri),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            checkout_api_base_url: self.checkout_url.clone(),
            checkout_secret_key: "sk_test_123".to_string(),
            checkout_webhook_secret: "whsec_test_secret".to_string(),
            checkout_success_url: "https://app.example.com/payments/success".to_string(),
            checkout_cancel_url: "https://app.example.com/payments/cancel".to_string(),
            checkout_currency: "usd".to_string(),
            email_api_url: self.email_url.clone(),
            email_api_key: if self.email_url.is_empty() { String::new() } else { "test-email-key".to_string() },
            email_from: "no-reply@clinicbook.test".to_string(),
            reminder_interval_minutes: 60,
            server_port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn clinic(email: &str) -> Self {
        Self::new(email, "clinic")
    }

    pub fn caregiver(email: &str) -> Self {
        Self::new(email, "caregiver")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Row shapes returned by the PostgREST mocks.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn user_response(user_id: &str, role: &str, full_name: &str) -> serde_json::Value {
        json!({
            "id": user_id,
            "full_name": full_name,
            "email": format!("{}@example.com", role),
            "role": role,
            "is_active": true,
            "address_line1": "12 Park Street",
            "address_line2": null,
            "city": "Pune",
            "state": "MH",
            "country": "India",
            "pin_code": "411001"
        })
    }

    pub fn doctor_response(doctor_id: &str) -> serde_json::Value {
        Self::user_response(doctor_id, "doctor", "Dr. Asha Rao")
    }

    pub fn patient_response(patient_id: &str) -> serde_json::Value {
        Self::user_response(patient_id, "patient", "Test Patient")
    }

    pub fn clinic_response(clinic_id: &str) -> serde_json::Value {
        json!({
            "id": clinic_id,
            "name": "Riverside Clinic",
            "email": "clinic@example.com",
            "is_active": true,
            "address_line1": "4 River Road",
            "address_line2": "Floor 2",
            "city": "Pune",
            "state": "MH",
            "country": "India",
            "pin_code": "411002"
        })
    }

    pub fn availability_window_response(
        doctor_id: &str,
        day: &str,
        start_time: &str,
        end_time: &str,
        slot_duration: i32,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "doctor_id": doctor_id,
            "consultation_type": "home_visit",
            "clinic_id": null,
            "day": day,
            "start_time": start_time,
            "end_time": end_time,
            "slot_duration": slot_duration,
            "is_active": true
        })
    }

    pub fn appointment_response(appointment_id: &str, patient_id: &str, doctor_id: &str) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "caregiver_id": null,
            "clinic_id": null,
            "appointment_date": "2030-03-05",
            "appointment_time": "09:20:00",
            "consultation_type": "home_visit",
            "appointment_type": "paid",
            "status": "pending",
            "payment_status": "unpaid",
            "amount": 500.0,
            "currency": "INR",
            "reminder_sent": false,
            "created_at": "2030-03-01T10:00:00Z",
            "updated_at": "2030-03-01T10:00:00Z"
        })
    }

    pub fn unique_violation(constraint: &str) -> serde_json::Value {
        json!({
            "code": "23505",
            "details": "Key already exists.",
            "hint": null,
            "message": format!("duplicate key value violates unique constraint \"{}\"", constraint)
        })
    }

    pub fn no_data_found(message: &str) -> serde_json::Value {
        json!({
            "code": "P0002",
            "details": null,
            "hint": null,
            "message": message
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "code": code,
            "details": null,
            "hint": null,
            "message": message
        })
    }
}
