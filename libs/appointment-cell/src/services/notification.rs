use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, Participants, ResolvedAddress};
use crate::services::address::{format_clock_time, format_long_date};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Patient,
    Doctor,
    Clinic,
}

/// Who hears about a new booking depends on who made it.
pub fn booking_recipients(booked_by: Option<Role>) -> &'static [Recipient] {
    match booked_by {
        Some(Role::Patient) | Some(Role::Admin) => &[Recipient::Patient, Recipient::Doctor, Recipient::Clinic],
        Some(Role::Clinic) => &[Recipient::Patient, Recipient::Doctor],
        _ => &[],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Everything a notice shows about an appointment, already formatted.
#[derive(Debug, Clone)]
pub struct AppointmentNotice {
    pub patient_name: String,
    pub doctor_name: String,
    pub clinic_name: Option<String>,
    pub date_label: String,
    pub time_label: String,
    pub consultation_type: String,
    pub address: Option<String>,
    pub amount: f64,
    pub currency: String,
}

impl AppointmentNotice {
    pub fn new(appointment: &Appointment, participants: &Participants, address: Option<&ResolvedAddress>) -> Self {
        Self {
            patient_name: participants.patient.as_ref().map(|p| p.full_name.clone()).unwrap_or_else(|| "Patient".to_string()),
            doctor_name: participants.doctor.as_ref().map(|d| d.full_name.clone()).unwrap_or_else(|| "Doctor".to_string()),
            clinic_name: participants.clinic.as_ref().map(|c| c.name.clone()),
            date_label: format_long_date(appointment.appointment_date),
            time_label: format_clock_time(appointment.appointment_time),
            consultation_type: appointment.consultation_type.as_str().replace('_', " "),
            address: address.map(|a| a.formatted.clone()),
            amount: appointment.amount,
            currency: appointment.currency.clone(),
        }
    }

    fn summary(&self) -> String {
        let mut lines = vec![
            format!("Patient: {}", self.patient_name),
            format!("Doctor: {}", self.doctor_name),
            format!("Date: {}", self.date_label),
            format!("Time: {}", self.time_label),
            format!("Consultation: {}", self.consultation_type),
        ];
        if let Some(clinic) = &self.clinic_name {
            lines.push(format!("Clinic: {}", clinic));
        }
        if let Some(address) = &self.address {
            lines.push(format!("Address: {}", address));
        }
        lines.push(format!("Amount: {:.2} {}", self.amount, self.currency));
        lines.join("\n")
    }
}

/// JSON email API client. Absent when email is not configured.
pub struct EmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(config: &AppConfig) -> Option<Self> {
        if !config.is_email_configured() {
            return None;
        }

        Some(Self {
            client: Client::new(),
            api_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
        })
    }

    pub fn message(&self, to: &str, subject: &str, text: String) -> EmailMessage {
        EmailMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            text,
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<(), AppointmentError> {
        debug!("Sending '{}' to {}", message.subject, message.to);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(message)
            .send()
            .await
            .map_err(|e| AppointmentError::ExternalServiceError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Email API rejected message to {}: {} - {}", message.to, status, body);
            return Err(AppointmentError::ExternalServiceError(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }

    /// Send every message concurrently. Failures are logged, never returned.
    pub async fn send_all(&self, messages: Vec<EmailMessage>) -> usize {
        let results = join_all(messages.iter().map(|m| self.send(m))).await;

        let mut delivered = 0;
        for (message, result) in messages.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to email {} ('{}'): {}", message.to, message.subject, e),
            }
        }
        delivered
    }
}

pub struct NotificationService {
    email: Option<EmailClient>,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            email: EmailClient::new(config),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.email.is_some()
    }

    pub async fn notify_booking(
        &self,
        booked_by: Option<Role>,
        participants: &Participants,
        notice: &AppointmentNotice,
        invoice_number: &str,
    ) -> usize {
        let Some(email) = &self.email else {
            debug!("Email not configured, skipping booking confirmation");
            return 0;
        };

        let body = format!(
            "Your appointment has been booked.\n\n{}\nInvoice: {}",
            notice.summary(),
            invoice_number
        );

        let messages: Vec<EmailMessage> = booking_recipients(booked_by)
            .iter()
            .filter_map(|recipient| recipient_email(*recipient, participants))
            .map(|to| email.message(&to, "Appointment confirmed", body.clone()))
            .collect();

        let delivered = email.send_all(messages).await;
        info!("Delivered {} booking confirmation emails", delivered);
        delivered
    }

    pub async fn notify_status_change(
        &self,
        status: AppointmentStatus,
        participants: &Participants,
        notice: &AppointmentNotice,
        reason: Option<&str>,
    ) -> usize {
        let Some(email) = &self.email else {
            return 0;
        };

        let mut body = format!("Your appointment is now {}.\n\n{}", status, notice.summary());
        if let Some(reason) = reason {
            body.push_str(&format!("\nReason: {}", reason));
        }
        let subject = format!("Appointment {}", status);

        let messages: Vec<EmailMessage> = [Recipient::Patient, Recipient::Doctor]
            .into_iter()
            .filter_map(|recipient| recipient_email(recipient, participants))
            .map(|to| email.message(&to, &subject, body.clone()))
            .collect();

        email.send_all(messages).await
    }

    /// Returns true only when every addressed recipient received the reminder.
    pub async fn send_reminder(&self, participants: &Participants, notice: &AppointmentNotice) -> bool {
        let Some(email) = &self.email else {
            return false;
        };

        let body = format!("Reminder: you have an appointment tomorrow.\n\n{}", notice.summary());

        let messages: Vec<EmailMessage> = [Recipient::Patient, Recipient::Doctor]
            .into_iter()
            .filter_map(|recipient| recipient_email(recipient, participants))
            .map(|to| email.message(&to, "Appointment reminder", body.clone()))
            .collect();

        let expected = messages.len();
        email.send_all(messages).await == expected
    }
}

fn recipient_email(recipient: Recipient, participants: &Participants) -> Option<String> {
    match recipient {
        Recipient::Patient => participants.patient.as_ref().and_then(|p| p.email.clone()),
        Recipient::Doctor => participants.doctor.as_ref().and_then(|d| d.email.clone()),
        Recipient::Clinic => participants.clinic.as_ref().and_then(|c| c.email.clone()),
    }
    .filter(|e| !e.trim().is_empty())
}
