use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use uuid::Uuid;

use billing_cell::services::payment::normalize_currency;
use doctor_cell::models::hhmm;
use shared_models::auth::{Role, User};

use crate::models::{
    AppointmentError, AppointmentType, BookAppointmentRequest, ConsultationMode, PaymentStatus,
    PostalAddress, ValidatedBooking,
};

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppointmentError::ValidationError(format!("{} must be a valid id", field)))
}

fn parse_optional_uuid(field: &str, raw: &Option<String>) -> Result<Option<Uuid>, AppointmentError> {
    trimmed(raw).map(|v| parse_uuid(field, &v)).transpose()
}

/// Accepts `YYYY-MM-DD` or a full ISO-8601 date-time, keeping only the date.
pub fn parse_appointment_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    let raw = raw.trim();

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .map_err(|_| AppointmentError::ValidationError(
            format!("Invalid appointment_date '{}', expected an ISO-8601 date", raw),
        ))
}

pub fn parse_appointment_time(raw: &str) -> Result<NaiveTime, AppointmentError> {
    hhmm::parse(raw).ok_or_else(|| AppointmentError::ValidationError(
        format!("Invalid appointment_time '{}', expected HH:MM", raw.trim()),
    ))
}

/// Number or numeric string; finite, non-negative, at most two decimals.
pub fn parse_amount(raw: &Value) -> Result<f64, AppointmentError> {
    let amount = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AppointmentError::ValidationError("amount must be a number".to_string()))?;

    if !amount.is_finite() || amount < 0.0 {
        return Err(AppointmentError::ValidationError("amount must be a non-negative number".to_string()));
    }

    let cents = amount * 100.0;
    if (cents - cents.round()).abs() > 1e-6 {
        return Err(AppointmentError::ValidationError("amount must have at most two decimal places".to_string()));
    }

    Ok(amount)
}

/// Full field-level validation of a booking. Runs before anything is written.
pub fn validate_booking(request: &BookAppointmentRequest) -> Result<ValidatedBooking, AppointmentError> {
    let required: [(&str, bool); 9] = [
        ("patient_id", is_blank(&request.patient_id)),
        ("doctor_id", is_blank(&request.doctor_id)),
        ("appointment_date", is_blank(&request.appointment_date)),
        ("appointment_time", is_blank(&request.appointment_time)),
        ("consultation_type", is_blank(&request.consultation_type)),
        ("appointment_type", is_blank(&request.appointment_type)),
        ("payment_status", is_blank(&request.payment_status)),
        ("amount", matches!(request.amount, None | Some(Value::Null))),
        ("currency", is_blank(&request.currency)),
    ];

    let missing: Vec<&str> = required.iter().filter(|(_, m)| *m).map(|(f, _)| *f).collect();
    if !missing.is_empty() {
        return Err(AppointmentError::ValidationError(
            format!("Missing required fields: {}", missing.join(", ")),
        ));
    }

    let field = |value: &Option<String>| value.clone().unwrap_or_default();

    let patient_id = parse_uuid("patient_id", &field(&request.patient_id))?;
    let doctor_id = parse_uuid("doctor_id", &field(&request.doctor_id))?;
    let caregiver_id = parse_optional_uuid("caregiver_id", &request.caregiver_id)?;
    let clinic_id = parse_optional_uuid("clinic_id", &request.clinic_id)?;
    let appointment_date = parse_appointment_date(&field(&request.appointment_date))?;
    let appointment_time = parse_appointment_time(&field(&request.appointment_time))?;

    let consultation_type: ConsultationMode = field(&request.consultation_type).parse()
        .map_err(AppointmentError::ValidationError)?;
    let appointment_type: AppointmentType = field(&request.appointment_type).parse()
        .map_err(AppointmentError::ValidationError)?;
    let payment_status: PaymentStatus = field(&request.payment_status).parse()
        .map_err(AppointmentError::ValidationError)?;

    let amount = parse_amount(request.amount.as_ref().unwrap_or(&Value::Null))?;
    let currency = normalize_currency(&field(&request.currency))
        .map_err(|_| AppointmentError::ValidationError("currency must be a 3-letter code".to_string()))?;

    let address = match consultation_type {
        ConsultationMode::HomeVisit => {
            let address_fields: [(&str, &Option<String>); 5] = [
                ("address_line1", &request.address_line1),
                ("city", &request.city),
                ("state", &request.state),
                ("country", &request.country),
                ("pin_code", &request.pin_code),
            ];
            let missing: Vec<&str> = address_fields.iter()
                .filter(|(_, v)| is_blank(v))
                .map(|(f, _)| *f)
                .collect();

            if !missing.is_empty() {
                return Err(AppointmentError::ValidationError(
                    format!("Home visits require an address. Missing: {}", missing.join(", ")),
                ));
            }

            Some(PostalAddress {
                address_line1: trimmed(&request.address_line1),
                address_line2: trimmed(&request.address_line2),
                city: trimmed(&request.city),
                state: trimmed(&request.state),
                country: trimmed(&request.country),
                pin_code: trimmed(&request.pin_code),
            })
        }
        ConsultationMode::ClinicVisit if clinic_id.is_none() => {
            return Err(AppointmentError::ValidationError(
                "Clinic visits require clinic_id".to_string(),
            ));
        }
        _ => None,
    };

    Ok(ValidatedBooking {
        patient_id,
        doctor_id,
        caregiver_id,
        clinic_id,
        appointment_date,
        appointment_time,
        consultation_type,
        appointment_type,
        payment_status,
        amount,
        currency,
        address,
    })
}

/// Patients book for themselves; clinics and admins book for anyone.
pub fn authorize_booking(user: &User, patient_id: Uuid) -> Result<(), AppointmentError> {
    match user.app_role() {
        Some(Role::Admin) | Some(Role::Clinic) => Ok(()),
        Some(Role::Patient) if user.id == patient_id.to_string() => Ok(()),
        Some(Role::Patient) => Err(AppointmentError::Unauthorized(
            "Patients can only book appointments for themselves".to_string(),
        )),
        _ => Err(AppointmentError::Unauthorized(
            "Only patients, clinics and admins can book appointments".to_string(),
        )),
    }
}
