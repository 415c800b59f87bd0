use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{BillingError, Charge, CheckoutSession, NewCheckoutSession, PaymentIntent};

/// Convert a major-unit amount to the provider's integer minor units.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn from_minor_units(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Hosted checkout API client (form-encoded requests, bearer secret key).
pub struct CheckoutClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl CheckoutClient {
    pub fn new(config: &AppConfig) -> Result<Self, BillingError> {
        if !config.is_checkout_configured() {
            return Err(BillingError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.checkout_api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.checkout_secret_key.clone(),
        })
    }

    /// POST /checkout/sessions
    pub async fn create_session(&self, session: &NewCheckoutSession) -> Result<CheckoutSession, BillingError> {
        let url = format!("{}/checkout/sessions", self.base_url);

        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), session.success_url.clone()),
            ("cancel_url".to_string(), session.cancel_url.clone()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), session.currency.clone()),
            ("line_items[0][price_data][unit_amount]".to_string(), session.unit_amount.to_string()),
            ("line_items[0][price_data][product_data][name]".to_string(), session.product_name.clone()),
        ];
        if let Some(email) = &session.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }
        for (key, value) in &session.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        debug!("Creating checkout session at {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .form(&form)
            .send()
            .await?;

        let created: CheckoutSession = self.parse_response("create checkout session", response).await?;
        info!("Created checkout session {}", created.id);
        Ok(created)
    }

    /// GET /checkout/sessions/{id}
    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, BillingError> {
        self.get(&format!("checkout/sessions/{}", session_id), "retrieve checkout session").await
    }

    /// GET /payment_intents/{id}
    pub async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, BillingError> {
        self.get(&format!("payment_intents/{}", intent_id), "retrieve payment intent").await
    }

    /// GET /charges/{id}
    pub async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, BillingError> {
        self.get(&format!("charges/{}", charge_id), "retrieve charge").await
    }

    async fn get<T: DeserializeOwned>(&self, resource: &str, operation: &str) -> Result<T, BillingError> {
        let url = format!("{}/{}", self.base_url, resource);
        debug!("Sending {} request to {}", operation, url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .send()
            .await?;

        self.parse_response(operation, response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T, BillingError> {
        let status = response.status();
        let response_text = response.text().await?;

        if status.as_u16() == 404 {
            return Err(BillingError::NotFound(format!("Checkout resource not found ({})", operation)));
        }

        if !status.is_success() {
            error!("Checkout provider {} failed: {} - {}", operation, status, response_text);
            return Err(BillingError::ProviderError(format!("HTTP {}: {}", status, response_text)));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            BillingError::ProviderError(format!("Failed to parse {} response: {}", operation, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_round_to_the_nearest_cent() {
        assert_eq!(to_minor_units(500.0), 50000);
        assert_eq!(to_minor_units(19.99), 1999);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
        assert_eq!(from_minor_units(1999), 19.99);
    }
}
