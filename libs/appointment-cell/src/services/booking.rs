use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use billing_cell::services::invoice::{is_invoice_number_collision, MAX_INVOICE_ATTEMPTS};
use billing_cell::services::InvoiceService;
use doctor_cell::services::DoctorService;
use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::User;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingConfirmation,
    ValidatedBooking,
};
use crate::services::address::resolve_for_participants;
use crate::services::contacts::ContactService;
use crate::services::notification::{AppointmentNotice, NotificationService};
use crate::services::validation::{authorize_booking, validate_booking};

pub const ACTIVE_SLOT_CONSTRAINT: &str = "appointments_active_slot_key";

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    invoices: InvoiceService,
    contacts: ContactService,
    notifications: NotificationService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            invoices: InvoiceService::new(config),
            contacts: ContactService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    /// Validate, then write appointment, visit address and invoice as one unit.
    /// Confirmation emails go out afterwards and cannot fail the booking.
    #[instrument(skip(self, request, user, auth_token), fields(user_id = %user.id))]
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<BookingConfirmation, AppointmentError> {
        let booking = validate_booking(&request)?;
        authorize_booking(user, booking.patient_id)?;

        self.doctors.get_active_doctor(booking.doctor_id, Some(auth_token)).await?;
        if let Some(clinic_id) = booking.clinic_id {
            self.ensure_active_clinic(clinic_id, auth_token).await?;
        }

        let confirmation = self.create_with_invoice(&booking, auth_token).await?;

        info!("Booked appointment {} for patient {} with doctor {} on {} at {}",
              confirmation.appointment_id, booking.patient_id, booking.doctor_id,
              booking.appointment_date, booking.appointment_time);

        self.send_confirmations(&booking, &confirmation, user, auth_token).await;

        Ok(confirmation)
    }

    async fn ensure_active_clinic(&self, clinic_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/clinics?id=eq.{}&is_active=eq.true&select=id", clinic_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        if rows.is_empty() {
            return Err(AppointmentError::ReferenceNotFound("Clinic".to_string()));
        }
        Ok(())
    }

    async fn create_with_invoice(
        &self,
        booking: &ValidatedBooking,
        auth_token: &str,
    ) -> Result<BookingConfirmation, AppointmentError> {
        let appointment = json!({
            "patient_id": booking.patient_id,
            "doctor_id": booking.doctor_id,
            "caregiver_id": booking.caregiver_id,
            "clinic_id": booking.clinic_id,
            "appointment_date": booking.appointment_date.format("%Y-%m-%d").to_string(),
            "appointment_time": booking.appointment_time.format("%H:%M:%S").to_string(),
            "consultation_type": booking.consultation_type,
            "appointment_type": booking.appointment_type,
            "status": AppointmentStatus::Pending,
            "payment_status": booking.payment_status,
            "amount": booking.amount,
            "currency": booking.currency,
        });

        let mut attempt = 1;
        loop {
            let invoice = self.invoices
                .draft_invoice(booking.amount, booking.payment_status, Some(auth_token))
                .await?;

            let result: Result<BookingConfirmation, SupabaseError> = self.supabase.rpc(
                "book_appointment",
                Some(auth_token),
                json!({
                    "p_appointment": appointment,
                    "p_address": booking.address,
                    "p_invoice": invoice,
                }),
            ).await;

            match result {
                Ok(confirmation) => return Ok(confirmation),
                Err(e) if e.is_conflict_on(ACTIVE_SLOT_CONSTRAINT) => {
                    return Err(AppointmentError::SlotNotAvailable);
                }
                Err(e) if is_invoice_number_collision(&e) => {
                    if attempt >= MAX_INVOICE_ATTEMPTS {
                        return Err(AppointmentError::InvoiceNumberExhausted);
                    }
                    warn!("Invoice number {} taken while booking (attempt {}/{}), retrying",
                          invoice.invoice_number, attempt, MAX_INVOICE_ATTEMPTS);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn send_confirmations(
        &self,
        booking: &ValidatedBooking,
        confirmation: &BookingConfirmation,
        user: &User,
        auth_token: &str,
    ) {
        if !self.notifications.is_enabled() {
            return;
        }

        let appointment = booking.to_appointment(confirmation);

        let participants = match self.contacts.participants_for(&appointment, auth_token).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping confirmation emails for {}: {}", confirmation.appointment_id, e);
                return;
            }
        };

        let address = resolve_for_participants(appointment.consultation_type, booking.address.as_ref(), &participants);
        let notice = AppointmentNotice::new(&appointment, &participants, address.as_ref());

        self.notifications
            .notify_booking(user.app_role(), &participants, &notice, &confirmation.invoice_number)
            .await;
    }
}

impl ValidatedBooking {
    /// The row as it was just stored.
    pub fn to_appointment(&self, confirmation: &BookingConfirmation) -> Appointment {
        Appointment {
            id: confirmation.appointment_id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            caregiver_id: self.caregiver_id,
            clinic_id: self.clinic_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            consultation_type: self.consultation_type,
            appointment_type: self.appointment_type,
            status: AppointmentStatus::Pending,
            payment_status: self.payment_status,
            amount: self.amount,
            currency: self.currency.clone(),
            reminder_sent: false,
            created_at: None,
            updated_at: None,
        }
    }
}
