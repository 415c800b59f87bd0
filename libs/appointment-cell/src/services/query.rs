use std::collections::HashMap;

use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, User};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentView, ClinicContact,
    ListAppointmentsQuery, Page, PostalAddress, UserContact, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::services::address::resolve_visit_address;
use crate::services::contacts::ContactService;
use crate::services::status::{can_access, parse_appointment_id};

const LIST_ORDER: &str = "appointment_date.desc,appointment_time.desc";

/// PostgREST filters that restrict a listing to what the user may see.
///
/// Admins may narrow by patient, doctor or clinic. Everyone else is pinned to
/// their own column and the corresponding query parameters are ignored.
pub fn scope_filters(user: &User, query: &ListAppointmentsQuery) -> Result<Vec<String>, AppointmentError> {
    let own = |column: &str| vec![format!("{}=eq.{}", column, user.id)];

    match user.app_role() {
        Some(Role::Patient) => Ok(own("patient_id")),
        Some(Role::Caregiver) => Ok(own("caregiver_id")),
        Some(Role::Doctor) => Ok(own("doctor_id")),
        Some(Role::Clinic) => Ok(own("clinic_id")),
        Some(Role::Admin) => {
            let mut filters = Vec::new();
            if let Some(id) = query.patient_id {
                filters.push(format!("patient_id=eq.{}", id));
            }
            if let Some(id) = query.doctor_id {
                filters.push(format!("doctor_id=eq.{}", id));
            }
            if let Some(id) = query.clinic_id {
                filters.push(format!("clinic_id=eq.{}", id));
            }
            Ok(filters)
        }
        None => Err(AppointmentError::Unauthorized("User has no application role".to_string())),
    }
}

/// Returns (page, limit) with defaults applied.
pub fn page_bounds(query: &ListAppointmentsQuery) -> Result<(i64, i64), AppointmentError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(AppointmentError::ValidationError("page must be at least 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppointmentError::ValidationError(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    Ok((page, limit))
}

pub struct AppointmentQueryService {
    supabase: SupabaseClient,
    contacts: ContactService,
}

impl AppointmentQueryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            contacts: ContactService::new(config),
        }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: &str,
        user: &User,
        auth_token: &str,
    ) -> Result<AppointmentView, AppointmentError> {
        let appointment_id = parse_appointment_id(appointment_id)?;

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        let appointment = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;

        if !can_access(user, &appointment) {
            return Err(AppointmentError::Unauthorized("Not allowed to view this appointment".to_string()));
        }

        let mut views = self.enrich(vec![appointment], auth_token).await?;
        views.pop().ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(
        &self,
        query: ListAppointmentsQuery,
        user: &User,
        auth_token: &str,
    ) -> Result<Page<AppointmentView>, AppointmentError> {
        let (page, limit) = page_bounds(&query)?;
        let mut filters = scope_filters(user, &query)?;

        if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
            let status: AppointmentStatus = status.parse().map_err(AppointmentError::ValidationError)?;
            filters.push(format!("status=eq.{}", status));
        }
        if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
            if from > to {
                return Err(AppointmentError::ValidationError("from_date must not be after to_date".to_string()));
            }
        }
        if let Some(from) = query.from_date {
            filters.push(format!("appointment_date=gte.{}", from));
        }
        if let Some(to) = query.to_date {
            filters.push(format!("appointment_date=lte.{}", to));
        }

        filters.push(format!("order={}", LIST_ORDER));
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", (page - 1) * limit));

        let path = format!("/rest/v1/appointments?{}", filters.join("&"));
        let (rows, total): (Vec<Appointment>, i64) =
            self.supabase.request_with_count(&path, Some(auth_token)).await?;

        debug!("Listed {} of {} appointments for user {}", rows.len(), total, user.id);

        Ok(Page {
            items: self.enrich(rows, auth_token).await?,
            page,
            limit,
            total,
        })
    }

    /// Attach stored and resolved addresses with one lookup per table.
    async fn enrich(&self, appointments: Vec<Appointment>, auth_token: &str) -> Result<Vec<AppointmentView>, AppointmentError> {
        if appointments.is_empty() {
            return Ok(Vec::new());
        }

        let appointment_ids: Vec<Uuid> = appointments.iter().map(|a| a.id).collect();
        let mut user_ids: Vec<Uuid> = appointments
            .iter()
            .flat_map(|a| std::iter::once(a.patient_id).chain(a.caregiver_id))
            .collect();
        user_ids.sort();
        user_ids.dedup();
        let mut clinic_ids: Vec<Uuid> = appointments.iter().filter_map(|a| a.clinic_id).collect();
        clinic_ids.sort();
        clinic_ids.dedup();

        let mut addresses: HashMap<Uuid, PostalAddress> =
            self.contacts.addresses_by_appointment(&appointment_ids, auth_token).await?;
        let users: HashMap<Uuid, UserContact> = self.contacts.users_by_id(&user_ids, auth_token).await?;
        let clinics: HashMap<Uuid, ClinicContact> = self.contacts.clinics_by_id(&clinic_ids, auth_token).await?;

        Ok(appointments
            .into_iter()
            .map(|appointment| {
                let address = addresses.remove(&appointment.id);
                let visit_address = resolve_visit_address(
                    appointment.consultation_type,
                    appointment.clinic_id.and_then(|id| clinics.get(&id)),
                    address.as_ref(),
                    appointment.caregiver_id.and_then(|id| users.get(&id)),
                    users.get(&appointment.patient_id),
                );
                AppointmentView { appointment, address, visit_address }
            })
            .collect())
    }
}
