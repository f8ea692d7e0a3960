use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub payment_gateway_url: String,
    pub payment_key_id: String,
    pub payment_key_secret: String,
    pub admin_api_token: String,
    pub referral_base_url: String,
    pub email_webhook_url: Option<String>,
    pub sms_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            payment_gateway_url: env::var("PAYMENT_GATEWAY_URL")?,
            payment_key_id: env::var("PAYMENT_KEY_ID")?,
            payment_key_secret: env::var("PAYMENT_KEY_SECRET")?,
            admin_api_token: env::var("ADMIN_API_TOKEN")?,
            referral_base_url: env::var("REFERRAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/register".to_string()),
            email_webhook_url: env::var("EMAIL_WEBHOOK_URL").ok(),
            sms_webhook_url: env::var("SMS_WEBHOOK_URL").ok(),
        })
    }
}
