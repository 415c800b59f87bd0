use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;

// ==============================================================================
// CLOSED SETS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(PaymentStatus::Paid),
            "unpaid" => Ok(PaymentStatus::Unpaid),
            other => Err(format!("Invalid payment status '{}'. Expected paid or unpaid", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Generated,
    Sent,
    Paid,
    Unpaid,
}

impl InvoiceStatus {
    /// Status a new invoice starts in.
    pub fn initial_for(payment_status: PaymentStatus) -> Self {
        match payment_status {
            PaymentStatus::Paid => InvoiceStatus::Paid,
            PaymentStatus::Unpaid => InvoiceStatus::Generated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Generated => "generated",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Unpaid => "unpaid",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// INVOICES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub appointment_id: Uuid,
    pub user_id: Uuid,
    pub doctor_id: Uuid,
    pub total_amount: f64,
    pub status: InvoiceStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Number and status for an invoice that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub invoice_number: String,
    pub total_amount: f64,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub appointment_id: Uuid,
    pub user_id: Uuid,
    pub doctor_id: Uuid,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
}

// ==============================================================================
// PAYMENT STATUS RECONCILIATION
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePaymentStatusRequest {
    pub payment_status: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusChange {
    pub appointment_id: Uuid,
    pub payment_status: PaymentStatus,
    pub invoice_id: Option<Uuid>,
    pub invoice_status: Option<InvoiceStatus>,
}

/// Appointment columns needed to authorize billing actions.
#[derive(Debug, Clone, Deserialize)]
pub struct BillableAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub amount: f64,
}

// ==============================================================================
// CHECKOUT
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSessionRequest {
    pub amount: Option<f64>,
    pub appointment_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionCreated {
    pub session_id: String,
    pub session_url: String,
}

/// Everything the provider needs to open a hosted checkout page.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub product_name: String,
    pub unit_amount: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: String,
    pub payment_intent: Option<String>,
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub customer: Option<String>,
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeMethodDetails {
    #[serde(rename = "type")]
    pub method_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub receipt_url: Option<String>,
    pub payment_method_details: Option<ChargeMethodDetails>,
}

/// Payment row as handed to `record_checkout_payment`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub user_id: Uuid,
    pub doctor_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub charge_id: Option<String>,
    pub payment_intent_id: String,
    pub customer_id: Option<String>,
    pub receipt_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedPayment {
    pub payment_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified { payment_id: Uuid, created: bool },
    NotCompleted { payment_status: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Checkout provider not configured")]
    NotConfigured,

    #[error("Checkout provider error: {0}")]
    ProviderError(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for BillingError {
    fn from(e: SupabaseError) -> Self {
        match e {
            SupabaseError::NotFound(msg) => BillingError::NotFound(msg),
            SupabaseError::Conflict { message, .. } => BillingError::Conflict(message),
            SupabaseError::MissingReference { message, .. } => BillingError::NotFound(message),
            other => BillingError::DatabaseError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::ProviderError(e.to_string())
    }
}
