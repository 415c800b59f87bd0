use std::collections::HashMap;

use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentAddress, AppointmentError, ClinicContact, Participants, PostalAddress, UserContact};

const USER_CONTACT_COLUMNS: &str =
    "id,full_name,email,address_line1,address_line2,city,state,country,pin_code";
const CLINIC_CONTACT_COLUMNS: &str =
    "id,name,email,address_line1,address_line2,city,state,country,pin_code";

fn id_list(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
}

/// Batched lookups of the people and places attached to appointments.
pub struct ContactService {
    supabase: SupabaseClient,
}

impl ContactService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn users_by_id(&self, ids: &[Uuid], auth_token: &str) -> Result<HashMap<Uuid, UserContact>, AppointmentError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let path = format!("/rest/v1/users?id=in.({})&select={}", id_list(ids), USER_CONTACT_COLUMNS);
        let rows: Vec<UserContact> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(rows.into_iter().map(|u| (u.id, u)).collect())
    }

    pub async fn clinics_by_id(&self, ids: &[Uuid], auth_token: &str) -> Result<HashMap<Uuid, ClinicContact>, AppointmentError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let path = format!("/rest/v1/clinics?id=in.({})&select={}", id_list(ids), CLINIC_CONTACT_COLUMNS);
        let rows: Vec<ClinicContact> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(rows.into_iter().map(|c| (c.id, c)).collect())
    }

    pub async fn addresses_by_appointment(
        &self,
        appointment_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, PostalAddress>, AppointmentError> {
        if appointment_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let path = format!("/rest/v1/appointment_addresses?appointment_id=in.({})", id_list(appointment_ids));
        let rows: Vec<AppointmentAddress> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(rows.into_iter().map(|a| (a.appointment_id, a.address)).collect())
    }

    /// Patient, doctor, caregiver and clinic of one appointment, in two requests.
    pub async fn participants_for(&self, appointment: &Appointment, auth_token: &str) -> Result<Participants, AppointmentError> {
        let mut user_ids = vec![appointment.patient_id, appointment.doctor_id];
        user_ids.extend(appointment.caregiver_id);

        let users = self.users_by_id(&user_ids, auth_token).await?;
        let mut clinics = self.clinics_by_id(&appointment.clinic_id.into_iter().collect::<Vec<_>>(), auth_token).await?;

        debug!("Loaded {} users and {} clinics for appointment {}", users.len(), clinics.len(), appointment.id);

        Ok(Participants {
            patient: users.get(&appointment.patient_id).cloned(),
            doctor: users.get(&appointment.doctor_id).cloned(),
            caregiver: appointment.caregiver_id.and_then(|id| users.get(&id).cloned()),
            clinic: appointment.clinic_id.and_then(|id| clinics.remove(&id)),
        })
    }
}
