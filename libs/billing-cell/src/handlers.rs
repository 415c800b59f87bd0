use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::HeaderMap,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::extractor::ValidatedJson;

use crate::models::{BillingError, CheckoutSessionRequest, CreateInvoiceRequest, VerificationOutcome, WebhookEvent};
use crate::services::webhook::{verify_signature, SIGNATURE_HEADER};
use crate::services::{InvoiceService, PaymentService};

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::ValidationError(msg) => AppError::ValidationError(msg),
            BillingError::NotFound(msg) => AppError::NotFound(msg),
            BillingError::NotAuthorized(msg) => AppError::Forbidden(msg),
            BillingError::Conflict(msg) => AppError::Conflict(msg),
            BillingError::InvalidSignature(msg) => AppError::BadRequest(format!("Invalid webhook signature: {}", msg)),
            BillingError::NotConfigured => AppError::ExternalService("Checkout provider not configured".to_string()),
            BillingError::ProviderError(msg) => AppError::ExternalService(msg),
            BillingError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// CHECKOUT
// ==============================================================================

#[axum::debug_handler]
pub async fn create_checkout_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<CheckoutSessionRequest>,
) -> Result<ApiResponse, AppError> {
    if !user.has_role(Role::Patient) {
        return Err(AppError::Forbidden("Only patients can start a checkout".to_string()));
    }

    let payment_service = PaymentService::new(&state);
    let session = payment_service.create_checkout_session(request, &user, auth.token()).await?;

    Ok(ApiResponse::created("Checkout session created successfully", json!(session)))
}

#[axum::debug_handler]
pub async fn verify_checkout_session(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(session_id): Path<String>,
) -> Result<ApiResponse, AppError> {
    let payment_service = PaymentService::new(&state);
    let outcome = payment_service.verify_session_and_save(&session_id, auth.token()).await?;

    let message = match &outcome {
        VerificationOutcome::Verified { .. } => "Payment verified successfully",
        VerificationOutcome::NotCompleted { .. } => "Payment has not been completed",
    };

    Ok(ApiResponse::success(message, json!(outcome)))
}

// ==============================================================================
// INVOICES
// ==============================================================================

#[axum::debug_handler]
pub async fn create_invoice(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<CreateInvoiceRequest>,
) -> Result<ApiResponse, AppError> {
    if !user.is_admin() && !user.has_role(Role::Clinic) {
        return Err(AppError::Forbidden("Only admins and clinics can issue invoices".to_string()));
    }

    let invoice_service = InvoiceService::new(&state);
    let invoice = invoice_service.create_invoice(&request, Some(auth.token())).await?;

    Ok(ApiResponse::created("Invoice created successfully", json!({
        "invoice_id": invoice.id,
        "invoice_number": invoice.invoice_number,
        "status": invoice.status,
    })))
}

// ==============================================================================
// PROVIDER WEBHOOK
// ==============================================================================

#[axum::debug_handler]
pub async fn checkout_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse, AppError> {
    let signature = headers.get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing webhook signature".to_string()))?;

    if let Err(e) = verify_signature(signature, &body, &state.checkout_webhook_secret, Utc::now().timestamp()) {
        warn!("Rejected checkout webhook: {}", e);
        return Err(e.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    let payment_service = PaymentService::new(&state);
    let outcome = payment_service.handle_webhook_event(&event).await?;

    info!("Processed checkout event {} ({})", event.id, event.event_type);

    Ok(ApiResponse::success("Webhook processed", json!({
        "received": true,
        "outcome": outcome,
    })))
}
