use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError};
use crate::services::address::resolve_for_participants;
use crate::services::contacts::ContactService;
use crate::services::notification::{AppointmentNotice, NotificationService};

/// Appointments dated `tomorrow` that are still active and not yet reminded.
pub fn due_reminders_path(tomorrow: NaiveDate) -> String {
    format!(
        "/rest/v1/appointments?appointment_date=eq.{}&status=in.{}&reminder_sent=eq.false",
        tomorrow.format("%Y-%m-%d"),
        urlencoding::encode("(pending,confirmed)")
    )
}

/// Day-before reminders. Runs with the service role key since it acts for no user.
pub struct ReminderService {
    supabase: SupabaseClient,
    contacts: ContactService,
    notifications: NotificationService,
    service_key: String,
}

impl ReminderService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            contacts: ContactService::new(config),
            notifications: NotificationService::new(config),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    /// One pass over tomorrow's appointments. Returns how many were marked as reminded.
    pub async fn run_once(&self, today: NaiveDate) -> Result<usize, AppointmentError> {
        if !self.notifications.is_enabled() {
            debug!("Email not configured, skipping reminders");
            return Ok(0);
        }

        let tomorrow = today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppointmentError::ValidationError(format!("No day after {}", today)))?;

        let due: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &due_reminders_path(tomorrow), Some(self.service_key.as_str()), None)
            .await?;

        debug!("{} appointments due a reminder for {}", due.len(), tomorrow);

        let mut reminded = 0;
        for appointment in &due {
            match self.remind(appointment).await {
                Ok(true) => reminded += 1,
                Ok(false) => warn!("Reminder for appointment {} incomplete, will retry", appointment.id),
                Err(e) => warn!("Reminder for appointment {} failed: {}", appointment.id, e),
            }
        }

        if reminded > 0 {
            info!("Sent reminders for {} appointments on {}", reminded, tomorrow);
        }

        Ok(reminded)
    }

    async fn remind(&self, appointment: &Appointment) -> Result<bool, AppointmentError> {
        let participants = self.contacts.participants_for(appointment, &self.service_key).await?;
        let booked = self
            .contacts
            .addresses_by_appointment(&[appointment.id], &self.service_key)
            .await?
            .remove(&appointment.id);

        let address = resolve_for_participants(appointment.consultation_type, booked.as_ref(), &participants);
        let notice = AppointmentNotice::new(appointment, &participants, address.as_ref());

        if !self.notifications.send_reminder(&participants, &notice).await {
            return Ok(false);
        }

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let _: Value = self
            .supabase
            .request(Method::PATCH, &path, Some(self.service_key.as_str()), Some(json!({ "reminder_sent": true })))
            .await?;

        Ok(true)
    }
}

/// Background loop spawned by the server. Never returns under normal operation.
pub async fn run_reminder_loop(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let service = ReminderService::new(&config);
    let minutes = config.reminder_interval_minutes.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));

    info!("Reminder job running every {} minutes", minutes);

    loop {
        interval.tick().await;

        if let Err(e) = service.run_once(Utc::now().date_naive()).await {
            error!("Reminder pass failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_path_filters_on_active_statuses() {
        let path = due_reminders_path(NaiveDate::from_ymd_opt(2030, 3, 5).unwrap());
        assert_eq!(
            path,
            "/rest/v1/appointments?appointment_date=eq.2030-03-05&status=in.%28pending%2Cconfirmed%29&reminder_sent=eq.false"
        );
    }
}
