use chrono::{Datelike, Local, NaiveDate, NaiveTime};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    hhmm, AvailabilityDay, AvailabilityError, AvailabilityWindow, ConsultationMode, DateSlots,
    DayOfWeek, UpsertAvailabilityRequest, WindowWithSlots,
};
use crate::services::doctor::{parse_doctor_id, DoctorService};
use crate::services::slots::{derive_slots, mark_booked, slots_for_window, validate_availability};

#[derive(Debug, Deserialize)]
struct BookedTime {
    #[serde(deserialize_with = "hhmm::deserialize")]
    appointment_time: NaiveTime,
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    doctors: DoctorService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
        }
    }

    /// Bookable slots for one doctor on one calendar date.
    pub async fn get_slots_for_date(
        &self,
        doctor_id: &str,
        date: Option<&str>,
        clinic_id: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<DateSlots, AvailabilityError> {
        let doctor_id = parse_doctor_id(doctor_id)?;
        let date = resolve_requested_date(date, Local::now().date_naive())?;
        let clinic_id = parse_clinic_id(clinic_id)?;

        self.doctors.get_active_doctor(doctor_id, auth_token).await?;

        let day = DayOfWeek::from(date.weekday());
        let mode = ConsultationMode::for_clinic(clinic_id.as_ref());
        debug!("Fetching {} windows for doctor {} on {} ({})", mode, doctor_id, date, day);

        let windows = self.fetch_windows_for_day(doctor_id, day, mode, clinic_id, auth_token).await?;
        let mut slots = derive_slots(&windows);

        if !slots.is_empty() {
            let booked = self.fetch_booked_times(doctor_id, date, auth_token).await?;
            mark_booked(&mut slots, &booked);
        }

        info!("Derived {} slots for doctor {} on {}", slots.len(), doctor_id, date);

        Ok(DateSlots {
            doctor_id,
            date,
            day,
            consultation_type: mode,
            clinic_id,
            slots,
        })
    }

    /// Replace every window stored under (doctor, day, mode, clinic) with the given ranges.
    pub async fn add_or_update_availability(
        &self,
        doctor_id: &str,
        request: UpsertAvailabilityRequest,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let doctor_id = parse_doctor_id(doctor_id)?;
        let validated = validate_availability(&request)?;

        self.doctors.get_active_doctor(doctor_id, Some(auth_token)).await?;

        let slots: Vec<_> = validated.ranges.iter()
            .map(|(start, end)| json!({
                "start_time": start.format("%H:%M:%S").to_string(),
                "end_time": end.format("%H:%M:%S").to_string(),
            }))
            .collect();

        let windows: Vec<AvailabilityWindow> = self.supabase.rpc(
            "replace_doctor_availability",
            Some(auth_token),
            json!({
                "p_doctor_id": doctor_id,
                "p_day": validated.day.as_str(),
                "p_consultation_type": validated.consultation_type.as_str(),
                "p_clinic_id": request.clinic_id,
                "p_slot_duration": validated.slot_duration,
                "p_slots": slots,
            }),
        ).await?;

        info!("Stored {} {} windows for doctor {} on {}",
              windows.len(), validated.consultation_type, doctor_id, validated.day);

        Ok(windows)
    }

    /// All active windows for a doctor grouped by weekday, each with its derived slots.
    pub async fn get_weekly_availability(
        &self,
        doctor_id: &str,
        clinic_id: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityDay>, AvailabilityError> {
        let doctor_id = parse_doctor_id(doctor_id)?;
        let clinic_id = parse_clinic_id(clinic_id)?;

        self.doctors.get_active_doctor(doctor_id, auth_token).await?;

        let mut path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id
        );
        if let Some(clinic_id) = clinic_id {
            path.push_str(&format!("&clinic_id=eq.{}", clinic_id));
        }

        let windows: Vec<AvailabilityWindow> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        Ok(group_by_day(&windows))
    }

    async fn fetch_windows_for_day(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        mode: ConsultationMode,
        clinic_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let clinic_filter = match clinic_id {
            Some(id) => format!("eq.{}", id),
            None => "is.null".to_string(),
        };

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day=eq.{}&consultation_type=eq.{}&clinic_id={}&is_active=eq.true&order=start_time.asc",
            doctor_id, day, mode, clinic_filter
        );

        let windows: Vec<AvailabilityWindow> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        Ok(windows)
    }

    async fn fetch_booked_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<NaiveTime>, AvailabilityError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&select=appointment_time",
            doctor_id, date
        );

        let rows: Vec<BookedTime> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        Ok(rows.into_iter().map(|r| r.appointment_time).collect())
    }
}

/// Missing date means today; past dates are rejected.
pub fn resolve_requested_date(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate, AvailabilityError> {
    let date = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => return Ok(today),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            AvailabilityError::ValidationError(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
        })?,
    };

    if date < today {
        return Err(AvailabilityError::ValidationError("Date cannot be in the past".to_string()));
    }

    Ok(date)
}

fn parse_clinic_id(raw: Option<&str>) -> Result<Option<Uuid>, AvailabilityError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s)
            .map_err(|_| AvailabilityError::ValidationError(format!("Invalid clinic id: {}", s))))
        .transpose()
}

fn group_by_day(windows: &[AvailabilityWindow]) -> Vec<AvailabilityDay> {
    DayOfWeek::ALL
        .into_iter()
        .filter_map(|day| {
            let day_windows: Vec<WindowWithSlots> = windows.iter()
                .filter(|w| w.day == day)
                .map(|w| WindowWithSlots {
                    id: w.id,
                    consultation_type: w.consultation_type,
                    clinic_id: w.clinic_id,
                    start_time: w.start_time,
                    end_time: w.end_time,
                    slot_duration: w.slot_duration,
                    slots: slots_for_window(w),
                })
                .collect();

            (!day_windows.is_empty()).then_some(AvailabilityDay { day, windows: day_windows })
        })
        .collect()
}
