use reqwest::Method;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::{Role, User};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, StatusTransition, UpdateStatusRequest};
use crate::services::address::resolve_for_participants;
use crate::services::booking::ACTIVE_SLOT_CONSTRAINT;
use crate::services::contacts::ContactService;
use crate::services::notification::{AppointmentNotice, NotificationService};
use crate::services::validation::{parse_appointment_date, parse_appointment_time};

pub const DEFAULT_RESCHEDULE_REASON: &str = "Rescheduled";

pub fn parse_appointment_id(raw: &str) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppointmentError::ValidationError(format!("Invalid appointment id: {}", raw)))
}

/// Patient, caregiver, doctor, the appointment's clinic, or an admin.
pub fn can_access(user: &User, appointment: &Appointment) -> bool {
    let is = |id: Option<Uuid>| id.is_some_and(|id| id.to_string() == user.id);

    match user.app_role() {
        Some(Role::Admin) => true,
        Some(Role::Patient) => is(Some(appointment.patient_id)),
        Some(Role::Caregiver) => is(appointment.caregiver_id),
        Some(Role::Doctor) => is(Some(appointment.doctor_id)),
        Some(Role::Clinic) => is(appointment.clinic_id),
        None => false,
    }
}

pub struct AppointmentStatusService {
    supabase: SupabaseClient,
    contacts: ContactService,
    notifications: NotificationService,
}

impl AppointmentStatusService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            contacts: ContactService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    pub async fn fetch_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    /// Write a status and its audit row together. Every call is audited, even when
    /// the status does not change.
    #[instrument(skip(self, request, user, auth_token), fields(user_id = %user.id))]
    pub async fn update_appointment_status(
        &self,
        appointment_id: &str,
        request: UpdateStatusRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<StatusTransition, AppointmentError> {
        let appointment_id = parse_appointment_id(appointment_id)?;
        let status: AppointmentStatus = request.status.parse().map_err(AppointmentError::ValidationError)?;

        let (new_date, new_time) = if status == AppointmentStatus::Rescheduled {
            let (Some(date), Some(time)) = (
                request.appointment_date.as_deref().filter(|d| !d.trim().is_empty()),
                request.appointment_time.as_deref().filter(|t| !t.trim().is_empty()),
            ) else {
                return Err(AppointmentError::ValidationError(
                    "Rescheduling requires appointment_date and appointment_time".to_string(),
                ));
            };
            (Some(parse_appointment_date(date)?), Some(parse_appointment_time(time)?))
        } else {
            (None, None)
        };

        let reason = match status {
            AppointmentStatus::Rescheduled => Some(
                request.reason.clone().unwrap_or_else(|| DEFAULT_RESCHEDULE_REASON.to_string()),
            ),
            _ => request.reason.clone(),
        };

        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;
        if !can_access(user, &appointment) {
            return Err(AppointmentError::Unauthorized(
                "Not allowed to change the status of this appointment".to_string(),
            ));
        }

        let result: Result<StatusTransition, SupabaseError> = self.supabase.rpc(
            "update_appointment_status",
            Some(auth_token),
            json!({
                "p_appointment_id": appointment_id,
                "p_status": status,
                "p_changed_by": user.id,
                "p_reason": reason,
                "p_date": new_date.map(|d| d.format("%Y-%m-%d").to_string()),
                "p_time": new_time.map(|t| t.format("%H:%M:%S").to_string()),
            }),
        ).await;

        let transition = match result {
            Ok(t) => t,
            Err(e) if e.is_conflict_on(ACTIVE_SLOT_CONSTRAINT) => return Err(AppointmentError::SlotNotAvailable),
            Err(e) => return Err(e.into()),
        };

        info!("Appointment {} moved from {} to {} by {}",
              appointment_id, transition.previous_status, transition.status, user.id);

        let mut updated = appointment;
        updated.status = transition.status;
        if let (Some(date), Some(time)) = (new_date, new_time) {
            updated.appointment_date = date;
            updated.appointment_time = time;
        }
        self.send_status_notice(&updated, reason.as_deref(), auth_token).await;

        Ok(transition)
    }

    async fn send_status_notice(&self, appointment: &Appointment, reason: Option<&str>, auth_token: &str) {
        if !self.notifications.is_enabled() {
            return;
        }

        let participants = match self.contacts.participants_for(appointment, auth_token).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping status notice for {}: {}", appointment.id, e);
                return;
            }
        };

        let booked = match self.contacts.addresses_by_appointment(&[appointment.id], auth_token).await {
            Ok(mut addresses) => addresses.remove(&appointment.id),
            Err(e) => {
                warn!("No booked address for status notice {}: {}", appointment.id, e);
                None
            }
        };

        let address = resolve_for_participants(appointment.consultation_type, booked.as_ref(), &participants);
        let notice = AppointmentNotice::new(appointment, &participants, address.as_ref());

        self.notifications
            .notify_status_change(appointment.status, &participants, &notice, reason)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    use crate::models::{AppointmentType, ConsultationMode, PaymentStatus};

    fn appointment(clinic_id: Option<Uuid>, caregiver_id: Option<Uuid>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            caregiver_id,
            clinic_id,
            appointment_date: NaiveDate::from_ymd_opt(2030, 3, 5).unwrap(),
            appointment_time: NaiveTime::from_hms_opt(9, 20, 0).unwrap(),
            consultation_type: ConsultationMode::HomeVisit,
            appointment_type: AppointmentType::Paid,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            amount: 500.0,
            currency: "INR".to_string(),
            reminder_sent: false,
            created_at: None,
            updated_at: None,
        }
    }

    fn user(id: Uuid, role: &str) -> User {
        User {
            id: id.to_string(),
            email: None,
            role: Some(role.to_string()),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn participants_and_admins_have_access() {
        let clinic_id = Uuid::new_v4();
        let caregiver_id = Uuid::new_v4();
        let a = appointment(Some(clinic_id), Some(caregiver_id));

        assert!(can_access(&user(a.patient_id, "patient"), &a));
        assert!(can_access(&user(a.doctor_id, "doctor"), &a));
        assert!(can_access(&user(caregiver_id, "caregiver"), &a));
        assert!(can_access(&user(clinic_id, "clinic"), &a));
        assert!(can_access(&user(Uuid::new_v4(), "admin"), &a));
    }

    #[test]
    fn strangers_and_role_mismatches_are_denied() {
        let a = appointment(None, None);

        assert!(!can_access(&user(Uuid::new_v4(), "patient"), &a));
        assert!(!can_access(&user(a.patient_id, "doctor"), &a));
        assert!(!can_access(&user(Uuid::new_v4(), "clinic"), &a));
        assert!(!can_access(&user(Uuid::new_v4(), "caregiver"), &a));
    }
}
