use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};

use crate::models::{BillingError, CreateInvoiceRequest, Invoice, InvoiceDraft, InvoiceStatus, PaymentStatus};

pub const INVOICE_NUMBER_CONSTRAINT: &str = "invoices_invoice_number_key";
pub const INVOICE_APPOINTMENT_CONSTRAINT: &str = "invoices_appointment_id_key";
pub const MAX_INVOICE_ATTEMPTS: u32 = 3;

/// `INV-YYYYMMDD-NNNNN`.
pub fn format_invoice_number(date: NaiveDate, sequence: i64) -> String {
    format!("INV-{}-{:05}", date.format("%Y%m%d"), sequence)
}

/// Another writer took the number between our count and our insert.
pub fn is_invoice_number_collision(error: &SupabaseError) -> bool {
    error.is_conflict_on(INVOICE_NUMBER_CONSTRAINT)
}

pub struct InvoiceService {
    supabase: SupabaseClient,
}

impl InvoiceService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Next number from the current invoice count. Not reserved; callers retry on collision.
    pub async fn next_invoice_number(&self, auth_token: Option<&str>) -> Result<String, BillingError> {
        let existing = self.supabase.count("/rest/v1/invoices?select=id", auth_token).await?;
        let number = format_invoice_number(Utc::now().date_naive(), existing + 1);

        debug!("Drafted invoice number {} from {} existing invoices", number, existing);
        Ok(number)
    }

    pub async fn draft_invoice(
        &self,
        total_amount: f64,
        payment_status: PaymentStatus,
        auth_token: Option<&str>,
    ) -> Result<InvoiceDraft, BillingError> {
        Ok(InvoiceDraft {
            invoice_number: self.next_invoice_number(auth_token).await?,
            total_amount,
            status: InvoiceStatus::initial_for(payment_status),
        })
    }

    #[instrument(skip(self, auth_token), fields(appointment_id = %request.appointment_id))]
    pub async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
        auth_token: Option<&str>,
    ) -> Result<Invoice, BillingError> {
        if !request.total_amount.is_finite() || request.total_amount < 0.0 {
            return Err(BillingError::ValidationError(
                "total_amount must be a non-negative number".to_string(),
            ));
        }

        let mut attempt = 1;
        loop {
            let draft = self.draft_invoice(request.total_amount, request.payment_status, auth_token).await?;

            let result: Result<Vec<Invoice>, SupabaseError> = self.supabase.insert(
                "invoices",
                auth_token,
                json!({
                    "invoice_number": draft.invoice_number,
                    "appointment_id": request.appointment_id,
                    "user_id": request.user_id,
                    "doctor_id": request.doctor_id,
                    "total_amount": draft.total_amount,
                    "status": draft.status,
                }),
            ).await;

            match result {
                Ok(rows) => {
                    let invoice = rows.into_iter().next().ok_or_else(|| {
                        BillingError::DatabaseError("Invoice insert returned no rows".to_string())
                    })?;
                    info!("Created invoice {} for appointment {}", invoice.invoice_number, request.appointment_id);
                    return Ok(invoice);
                }
                Err(e) if is_invoice_number_collision(&e) && attempt < MAX_INVOICE_ATTEMPTS => {
                    warn!("Invoice number {} already taken (attempt {}/{}), recounting",
                          draft.invoice_number, attempt, MAX_INVOICE_ATTEMPTS);
                    attempt += 1;
                }
                Err(e) if e.is_conflict_on(INVOICE_APPOINTMENT_CONSTRAINT) => {
                    return Err(BillingError::Conflict(
                        "Appointment already has an invoice".to_string(),
                    ));
                }
                Err(e) if is_invoice_number_collision(&e) => {
                    return Err(BillingError::Conflict(
                        "Could not allocate a unique invoice number, please retry".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_are_date_stamped_and_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2030, 3, 5).unwrap();
        assert_eq!(format_invoice_number(date, 1), "INV-20300305-00001");
        assert_eq!(format_invoice_number(date, 4211), "INV-20300305-04211");
    }

    #[test]
    fn sequence_wider_than_padding_is_kept_whole() {
        let date = NaiveDate::from_ymd_opt(2030, 12, 31).unwrap();
        assert_eq!(format_invoice_number(date, 123456), "INV-20301231-123456");
    }

    #[test]
    fn only_the_number_constraint_counts_as_collision() {
        let number = SupabaseError::Conflict {
            constraint: Some(INVOICE_NUMBER_CONSTRAINT.to_string()),
            message: "duplicate".to_string(),
        };
        let appointment = SupabaseError::Conflict {
            constraint: Some(INVOICE_APPOINTMENT_CONSTRAINT.to_string()),
            message: "duplicate".to_string(),
        };

        assert!(is_invoice_number_collision(&number));
        assert!(!is_invoice_number_collision(&appointment));
        assert!(!is_invoice_number_collision(&SupabaseError::NotFound("x".to_string())));
    }
}
