use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;

use billing_cell::models::ChangePaymentStatusRequest;
use billing_cell::services::PaymentService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::extractor::ValidatedJson;

use crate::models::{AppointmentError, BookAppointmentRequest, ListAppointmentsQuery, UpdateStatusRequest};
use crate::services::{AppointmentBookingService, AppointmentQueryService, AppointmentStatusService};

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AppointmentError::ReferenceNotFound(entity) => AppError::NotFound(format!("{} not found", entity)),
            AppointmentError::SlotNotAvailable => {
                AppError::Conflict("The requested time slot is already booked".to_string())
            }
            AppointmentError::InvoiceNumberExhausted => {
                AppError::Conflict("Could not allocate an invoice number, please retry".to_string())
            }
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
            AppointmentError::ExternalServiceError(msg) => AppError::ExternalService(msg),
        }
    }
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<BookAppointmentRequest>,
) -> Result<ApiResponse, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let confirmation = booking_service.book_appointment(request, &user, auth.token()).await?;

    Ok(ApiResponse::created("Appointment booked successfully", json!(confirmation)))
}

// ==============================================================================
// FETCH AND LIST
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<ApiResponse, AppError> {
    let query_service = AppointmentQueryService::new(&state);
    let page = query_service.list_appointments(query, &user, auth.token()).await?;

    Ok(ApiResponse::success("Appointments fetched successfully", json!(page)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<ApiResponse, AppError> {
    let query_service = AppointmentQueryService::new(&state);
    let appointment = query_service.get_appointment(&appointment_id, &user, auth.token()).await?;

    Ok(ApiResponse::success("Appointment fetched successfully", json!(appointment)))
}

// ==============================================================================
// STATUS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateStatusRequest>,
) -> Result<ApiResponse, AppError> {
    let status_service = AppointmentStatusService::new(&state);
    let transition = status_service
        .update_appointment_status(&appointment_id, request, &user, auth.token())
        .await?;

    Ok(ApiResponse::success("Appointment status updated successfully", json!(transition)))
}

/// Served on both `PATCH /{id}/payment-status` and the older `PUT /{id}/payment`.
#[axum::debug_handler]
pub async fn change_payment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    ValidatedJson(request): ValidatedJson<ChangePaymentStatusRequest>,
) -> Result<ApiResponse, AppError> {
    let payment_service = PaymentService::new(&state);
    let change = payment_service
        .change_payment_status(&appointment_id, request, &user, auth.token())
        .await?;

    Ok(ApiResponse::success("Payment status updated successfully", json!(change)))
}
