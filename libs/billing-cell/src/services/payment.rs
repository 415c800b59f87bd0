use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, User};

use crate::models::{
    BillableAppointment, BillingError, ChangePaymentStatusRequest, CheckoutSession,
    CheckoutSessionCreated, CheckoutSessionRequest, NewCheckoutSession, PaymentRecord,
    PaymentStatus, PaymentStatusChange, RecordedPayment, VerificationOutcome, WebhookEvent,
};
use crate::services::checkout::{from_minor_units, to_minor_units, CheckoutClient};

pub const CHECKOUT_COMPLETED_EVENT: &str = "checkout.session.completed";

/// Amounts are compared in major units; anything under one minor unit is equal.
const AMOUNT_EPSILON: f64 = 0.005;

#[derive(Debug, Deserialize)]
struct PayerContact {
    full_name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExistingPayment {
    id: Uuid,
}

pub struct PaymentService {
    supabase: SupabaseClient,
    config: AppConfig,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            config: config.clone(),
        }
    }

    pub async fn get_billable_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<BillableAppointment, BillingError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&select=id,patient_id,doctor_id,clinic_id,amount",
            appointment_id
        );

        let rows: Vec<BillableAppointment> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| BillingError::NotFound("Appointment not found".to_string()))
    }

    /// Set an appointment's payment status and mirror it onto its invoice in one transaction.
    #[instrument(skip(self, request, user, auth_token), fields(user_id = %user.id))]
    pub async fn change_payment_status(
        &self,
        appointment_id: &str,
        request: ChangePaymentStatusRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<PaymentStatusChange, BillingError> {
        let appointment_id = Uuid::parse_str(appointment_id)
            .map_err(|_| BillingError::ValidationError(format!("Invalid appointment id: {}", appointment_id)))?;
        let payment_status: PaymentStatus = request.payment_status.parse()
            .map_err(BillingError::ValidationError)?;

        if let Some(amount) = request.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(BillingError::ValidationError("amount must be a non-negative number".to_string()));
            }
        }

        let currency = request.currency
            .as_deref()
            .map(normalize_currency)
            .transpose()?;

        match user.app_role() {
            Some(Role::Admin) | Some(Role::Clinic) => {}
            Some(Role::Doctor) => {
                let appointment = self.get_billable_appointment(appointment_id, auth_token).await?;
                if appointment.doctor_id.to_string() != user.id {
                    return Err(BillingError::NotAuthorized(
                        "Doctors may only update payments for their own appointments".to_string(),
                    ));
                }
            }
            _ => {
                return Err(BillingError::NotAuthorized(
                    "Only admins, clinics and the treating doctor may change payment status".to_string(),
                ));
            }
        }

        let change: PaymentStatusChange = self.supabase.rpc(
            "change_payment_status",
            Some(auth_token),
            json!({
                "p_appointment_id": appointment_id,
                "p_payment_status": payment_status,
                "p_amount": request.amount,
                "p_currency": currency,
            }),
        ).await?;

        info!("Payment status of appointment {} set to {} (invoice {:?})",
              appointment_id, payment_status, change.invoice_id);

        Ok(change)
    }

    /// Open a hosted checkout page for one appointment.
    #[instrument(skip(self, request, user, auth_token), fields(user_id = %user.id))]
    pub async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<CheckoutSessionCreated, BillingError> {
        let mut missing = Vec::new();
        if request.amount.is_none() {
            missing.push("amount");
        }
        if request.appointment_id.is_none() {
            missing.push("appointment_id");
        }
        if request.doctor_id.is_none() {
            missing.push("doctor_id");
        }

        let (Some(amount), Some(appointment_id), Some(doctor_id)) =
            (request.amount, request.appointment_id, request.doctor_id)
        else {
            return Err(BillingError::ValidationError(
                format!("Missing required fields: {}", missing.join(", ")),
            ));
        };

        if !amount.is_finite() || amount <= 0.0 {
            return Err(BillingError::ValidationError("amount must be greater than zero".to_string()));
        }

        let client = CheckoutClient::new(&self.config)?;

        let appointment = self.get_billable_appointment(appointment_id, auth_token).await?;
        if appointment.patient_id.to_string() != user.id {
            return Err(BillingError::NotAuthorized(
                "Patients may only pay for their own appointments".to_string(),
            ));
        }
        if appointment.doctor_id != doctor_id {
            return Err(BillingError::ValidationError("doctor_id does not match the appointment".to_string()));
        }
        if (amount - appointment.amount).abs() > AMOUNT_EPSILON {
            return Err(BillingError::ValidationError(format!(
                "amount {:.2} does not match the {:.2} due for this appointment",
                amount, appointment.amount
            )));
        }

        let payer = self.get_payer_contact(&user.id, auth_token).await?;

        let product_name = payer.as_ref()
            .and_then(|p| p.full_name.clone())
            .or_else(|| user.email.clone())
            .unwrap_or_else(|| "Patient".to_string());

        let session = client.create_session(&NewCheckoutSession {
            product_name,
            unit_amount: to_minor_units(appointment.amount),
            currency: self.config.checkout_currency.clone(),
            customer_email: payer.and_then(|p| p.email).or_else(|| user.email.clone()),
            success_url: self.config.checkout_success_url.clone(),
            cancel_url: self.config.checkout_cancel_url.clone(),
            metadata: vec![
                ("user_id".to_string(), user.id.clone()),
                ("doctor_id".to_string(), doctor_id.to_string()),
                ("appointment_id".to_string(), appointment_id.to_string()),
            ],
        }).await?;

        let session_url = session.url.ok_or_else(|| {
            BillingError::ProviderError("Checkout session has no redirect URL".to_string())
        })?;

        Ok(CheckoutSessionCreated {
            session_id: session.id,
            session_url,
        })
    }

    /// Record a completed checkout. Safe to call any number of times per session.
    #[instrument(skip(self, auth_token))]
    pub async fn verify_session_and_save(
        &self,
        session_id: &str,
        auth_token: &str,
    ) -> Result<VerificationOutcome, BillingError> {
        if session_id.trim().is_empty() {
            return Err(BillingError::ValidationError("session_id is required".to_string()));
        }

        let client = CheckoutClient::new(&self.config)?;
        let session = client.retrieve_session(session_id).await?;

        if !session.is_paid() {
            debug!("Checkout session {} not paid yet ({})", session_id, session.payment_status);
            return Ok(VerificationOutcome::NotCompleted {
                payment_status: session.payment_status,
            });
        }

        let appointment_id = metadata_uuid(&session, "appointment_id")?;

        let payment = match self.find_payment(appointment_id, auth_token).await? {
            Some(existing) => {
                debug!("Payment {} already recorded for appointment {}", existing.id, appointment_id);
                None
            }
            None => {
                let record = self.build_payment_record(&client, &session).await?;
                self.ensure_fully_paid(appointment_id, &record, auth_token).await?;
                Some(record)
            }
        };

        let recorded: RecordedPayment = self.supabase.rpc(
            "record_checkout_payment",
            Some(auth_token),
            json!({
                "p_appointment_id": appointment_id,
                "p_payment": payment,
            }),
        ).await?;

        info!("Checkout session {} reconciled to payment {} (created: {})",
              session_id, recorded.payment_id, recorded.created);

        Ok(VerificationOutcome::Verified {
            payment_id: recorded.payment_id,
            created: recorded.created,
        })
    }

    /// Provider events arrive without a user, so they run with service credentials.
    pub async fn handle_webhook_event(&self, event: &WebhookEvent) -> Result<Option<VerificationOutcome>, BillingError> {
        if event.event_type != CHECKOUT_COMPLETED_EVENT {
            debug!("Ignoring checkout event {} of type {}", event.id, event.event_type);
            return Ok(None);
        }

        let session_id = event.data.object.get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::ValidationError("Event is missing the session id".to_string()))?;

        if self.config.supabase_service_role_key.is_empty() {
            warn!("Cannot reconcile checkout event {}: service role key missing", event.id);
            return Err(BillingError::DatabaseError("Service role key not configured".to_string()));
        }

        let outcome = self.verify_session_and_save(session_id, &self.config.supabase_service_role_key).await?;
        Ok(Some(outcome))
    }

    /// A settlement below the stored amount never marks the appointment paid.
    async fn ensure_fully_paid(
        &self,
        appointment_id: Uuid,
        record: &PaymentRecord,
        auth_token: &str,
    ) -> Result<(), BillingError> {
        let appointment = self.get_billable_appointment(appointment_id, auth_token).await?;

        if record.amount + AMOUNT_EPSILON < appointment.amount {
            warn!("Checkout for appointment {} settled {:.2}, {:.2} is due",
                  appointment_id, record.amount, appointment.amount);
            return Err(BillingError::ValidationError(format!(
                "Settled amount {:.2} is below the {:.2} due for appointment {}",
                record.amount, appointment.amount, appointment_id
            )));
        }
        Ok(())
    }

    async fn get_payer_contact(&self, user_id: &str, auth_token: &str) -> Result<Option<PayerContact>, BillingError> {
        let path = format!("/rest/v1/users?id=eq.{}&select=full_name,email", user_id);

        let rows: Vec<PayerContact> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    async fn find_payment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Option<ExistingPayment>, BillingError> {
        let path = format!("/rest/v1/payments?appointment_id=eq.{}&select=id", appointment_id);

        let rows: Vec<ExistingPayment> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(rows.into_iter().next())
    }

    /// Fetch the intent and its latest charge by id rather than trusting the session body.
    async fn build_payment_record(
        &self,
        client: &CheckoutClient,
        session: &CheckoutSession,
    ) -> Result<PaymentRecord, BillingError> {
        let intent_id = session.payment_intent.as_deref().ok_or_else(|| {
            BillingError::ProviderError(format!("Paid session {} has no payment intent", session.id))
        })?;

        let intent = client.retrieve_payment_intent(intent_id).await?;
        let charge = match intent.latest_charge.as_deref() {
            Some(charge_id) => Some(client.retrieve_charge(charge_id).await?),
            None => None,
        };

        let payment_method = charge.as_ref()
            .and_then(|c| c.payment_method_details.as_ref())
            .map(|d| d.method_type.clone())
            .or_else(|| intent.payment_method_types.first().cloned());

        Ok(PaymentRecord {
            user_id: metadata_uuid(session, "user_id")?,
            doctor_id: metadata_uuid(session, "doctor_id")?,
            amount: from_minor_units(intent.amount),
            currency: intent.currency.to_uppercase(),
            payment_method,
            charge_id: charge.as_ref().map(|c| c.id.clone()),
            payment_intent_id: intent.id.clone(),
            customer_id: intent.customer.clone().or_else(|| session.customer.clone()),
            receipt_url: charge.as_ref().and_then(|c| c.receipt_url.clone()),
            status: charge.map(|c| c.status).unwrap_or(intent.status),
        })
    }
}

fn metadata_uuid(session: &CheckoutSession, key: &str) -> Result<Uuid, BillingError> {
    session.metadata.get(key)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| BillingError::ValidationError(
            format!("Checkout session {} is missing a valid {} in its metadata", session.id, key),
        ))
}

/// ISO 4217 codes are three letters; stored upper-case.
pub fn normalize_currency(raw: &str) -> Result<String, BillingError> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(BillingError::ValidationError(format!("Invalid currency code: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn currency_codes_are_three_letters() {
        assert_eq!(normalize_currency(" inr ").unwrap(), "INR");
        assert!(normalize_currency("RUPEE").is_err());
        assert!(normalize_currency("U5D").is_err());
    }

    #[test]
    fn metadata_ids_must_be_uuids() {
        let appointment_id = Uuid::new_v4();
        let session = CheckoutSession {
            id: "cs_test_1".to_string(),
            url: None,
            payment_status: "paid".to_string(),
            payment_intent: None,
            customer: None,
            metadata: HashMap::from([
                ("appointment_id".to_string(), appointment_id.to_string()),
                ("user_id".to_string(), "not-a-uuid".to_string()),
            ]),
        };

        assert_eq!(metadata_uuid(&session, "appointment_id").unwrap(), appointment_id);
        assert!(metadata_uuid(&session, "user_id").is_err());
        assert!(metadata_uuid(&session, "doctor_id").is_err());
    }
}
