use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub checkout_api_base_url: String,
    pub checkout_secret_key: String,
    pub checkout_webhook_secret: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub checkout_currency: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub reminder_interval_minutes: u64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, webhook and reminder jobs will be rejected");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            checkout_api_base_url: env::var("CHECKOUT_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            checkout_secret_key: env::var("CHECKOUT_SECRET_KEY")
                .unwrap_or_else(|_| {
                    warn!("CHECKOUT_SECRET_KEY not set, using empty value");
                    String::new()
                }),
            checkout_webhook_secret: env::var("CHECKOUT_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("CHECKOUT_WEBHOOK_SECRET not set, using empty value");
                    String::new()
                }),
            checkout_success_url: env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| {
                    warn!("CHECKOUT_SUCCESS_URL not set, using empty value");
                    String::new()
                }),
            checkout_cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| {
                    warn!("CHECKOUT_CANCEL_URL not set, using empty value");
                    String::new()
                }),
            checkout_currency: env::var("CHECKOUT_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|_| "usd".to_string()),
            email_api_url: env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_API_URL not set, notification emails are disabled");
                    String::new()
                }),
            email_api_key: env::var("EMAIL_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_API_KEY not set, using empty value");
                    String::new()
                }),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@clinicbook.local".to_string()),
            reminder_interval_minutes: env::var("REMINDER_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            server_port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_checkout_configured(&self) -> bool {
        !self.checkout_api_base_url.is_empty()
            && !self.checkout_secret_key.is_empty()
            && !self.checkout_success_url.is_empty()
            && !self.checkout_cancel_url.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_api_url.is_empty() && !self.email_api_key.is_empty()
    }
}
