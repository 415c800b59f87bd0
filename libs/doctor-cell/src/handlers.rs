use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::extractor::ValidatedJson;

use crate::models::{AvailabilityError, SlotQuery, UpsertAvailabilityRequest, WeeklyAvailabilityQuery};
use crate::services::AvailabilityService;

impl From<AvailabilityError> for AppError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
            AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_slots_for_date(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<SlotQuery>,
) -> Result<ApiResponse, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let result = availability_service.get_slots_for_date(
        &doctor_id,
        query.date.as_deref(),
        query.clinic_id.as_deref(),
        None,
    ).await?;

    Ok(ApiResponse::success("Slots fetched successfully", json!(result)))
}

#[axum::debug_handler]
pub async fn get_weekly_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<WeeklyAvailabilityQuery>,
) -> Result<ApiResponse, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let days = availability_service.get_weekly_availability(
        &doctor_id,
        query.clinic_id.as_deref(),
        None,
    ).await?;

    Ok(ApiResponse::success("Availability fetched successfully", json!({
        "doctor_id": doctor_id,
        "availability": days,
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn add_or_update_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpsertAvailabilityRequest>,
) -> Result<ApiResponse, AppError> {
    let token = auth.token();

    // Doctors manage their own schedule; admins manage anyone's
    let is_owner = user.id == doctor_id && user.role.as_deref() == Some("doctor");
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to manage this doctor's availability".to_string()));
    }

    let availability_service = AvailabilityService::new(&state);
    let windows = availability_service.add_or_update_availability(&doctor_id, request, token).await?;

    Ok(ApiResponse::success("Availability saved successfully", json!({
        "doctor_id": doctor_id,
        "windows": windows,
    })))
}
