use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use billing_cell::models::BillingError;
use doctor_cell::models::{hhmm, AvailabilityError};
use shared_database::SupabaseError;

pub use billing_cell::models::PaymentStatus;
pub use doctor_cell::models::ConsultationMode;

// ==============================================================================
// CLOSED SETS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "rescheduled" => Ok(AppointmentStatus::Rescheduled),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(format!(
                "Invalid status '{}'. Expected one of pending, confirmed, rescheduled, cancelled, completed",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentType {
    Free,
    Paid,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Free => "free",
            AppointmentType::Paid => "paid",
        }
    }
}

impl FromStr for AppointmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(AppointmentType::Free),
            "paid" => Ok(AppointmentType::Paid),
            other => Err(format!("Invalid appointment type '{}'. Expected free or paid", other)),
        }
    }
}

// ==============================================================================
// ADDRESSES AND PARTICIPANTS
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub pin_code: Option<String>,
}

impl PostalAddress {
    /// A stored address only counts once it has a first line.
    pub fn is_present(&self) -> bool {
        self.address_line1.as_deref().is_some_and(|l| !l.trim().is_empty())
    }

    pub fn formatted(&self) -> String {
        [
            &self.address_line1,
            &self.address_line2,
            &self.city,
            &self.state,
            &self.country,
            &self.pin_code,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref().map(str::trim).filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentAddress {
    pub id: Uuid,
    pub appointment_id: Uuid,
    #[serde(flatten)]
    pub address: PostalAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContact {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    #[serde(flatten)]
    pub address: PostalAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicContact {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    #[serde(flatten)]
    pub address: PostalAddress,
}

#[derive(Debug, Clone, Default)]
pub struct Participants {
    pub patient: Option<UserContact>,
    pub doctor: Option<UserContact>,
    pub caregiver: Option<UserContact>,
    pub clinic: Option<ClinicContact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Clinic,
    Appointment,
    Caregiver,
    Patient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub source: AddressSource,
    #[serde(flatten)]
    pub address: PostalAddress,
    pub formatted: String,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub caregiver_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub appointment_time: NaiveTime,
    pub consultation_type: ConsultationMode,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub reminder_sent: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An appointment with its stored visit address and the address the visit resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub address: Option<PostalAddress>,
    pub visit_address: Option<ResolvedAddress>,
}

// ==============================================================================
// BOOKING
// ==============================================================================

/// Booking payload as received. Every field is optional here so that all
/// missing fields can be reported together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub caregiver_id: Option<String>,
    pub clinic_id: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub consultation_type: Option<String>,
    pub appointment_type: Option<String>,
    pub payment_status: Option<String>,
    pub amount: Option<Value>,
    pub currency: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub pin_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBooking {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub caregiver_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub consultation_type: ConsultationMode,
    pub appointment_type: AppointmentType,
    pub payment_status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub address: Option<PostalAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_number: String,
}

// ==============================================================================
// STATUS UPDATES
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub reason: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub appointment_id: Uuid,
    pub previous_status: AppointmentStatus,
    pub status: AppointmentStatus,
}

// ==============================================================================
// LISTING
// ==============================================================================

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAppointmentsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("{0} not found")]
    ReferenceNotFound(String),

    #[error("Appointment slot not available")]
    SlotNotAvailable,

    #[error("Could not allocate an invoice number")]
    InvoiceNumberExhausted,

    #[error("Unauthorized access to appointment: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl From<SupabaseError> for AppointmentError {
    fn from(e: SupabaseError) -> Self {
        match e {
            SupabaseError::NotFound(_) => AppointmentError::NotFound,
            SupabaseError::MissingReference { constraint, .. } => {
                AppointmentError::ReferenceNotFound(referenced_entity(constraint.as_deref()).to_string())
            }
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

/// Names the row an `appointments_<column>_fkey` constraint points at.
fn referenced_entity(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(c) if c.contains("clinic_id") => "Clinic",
        Some(c) if c.contains("caregiver_id") => "Caregiver",
        Some(c) if c.contains("patient_id") => "Patient",
        Some(c) if c.contains("doctor_id") => "Doctor",
        _ => "Referenced record",
    }
}

impl From<AvailabilityError> for AppointmentError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::DoctorNotFound => AppointmentError::DoctorNotFound,
            AvailabilityError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            AvailabilityError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<BillingError> for AppointmentError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            BillingError::NotFound(_) => AppointmentError::NotFound,
            BillingError::NotAuthorized(msg) => AppointmentError::Unauthorized(msg),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}
