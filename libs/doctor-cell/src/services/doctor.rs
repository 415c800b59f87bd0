use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityError, DoctorProfile};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Resolve a doctor id to an active user holding the doctor role.
    pub async fn get_active_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<DoctorProfile, AvailabilityError> {
        debug!("Looking up active doctor {}", doctor_id);

        let path = format!(
            "/rest/v1/users?id=eq.{}&role=eq.doctor&is_active=eq.true&select=id,full_name,email,role,is_active",
            doctor_id
        );
        let result: Vec<DoctorProfile> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        result.into_iter().next().ok_or(AvailabilityError::DoctorNotFound)
    }
}

/// Parse a doctor id from a path segment or payload field.
pub fn parse_doctor_id(raw: &str) -> Result<Uuid, AvailabilityError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AvailabilityError::ValidationError(format!("Invalid doctor id: {}", raw)))
}
