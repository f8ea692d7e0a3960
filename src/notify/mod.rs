//! Outbound user notifications over webhook endpoints.
//!
//! Delivery is fire-and-forget: a notification failure is logged and never
//! fails the money flow that triggered it. Endpoints are optional; when a
//! webhook URL is not configured the send is skipped.

use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    message: &'a str,
}

pub struct Notifier {
    client: Client,
    email_webhook_url: Option<String>,
    sms_webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(email_webhook_url: Option<String>, sms_webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            email_webhook_url,
            sms_webhook_url,
        }
    }

    pub async fn send_email(&self, to: &str, subject: &str, body: &str) {
        let Some(url) = &self.email_webhook_url else {
            tracing::debug!("email webhook not configured, skipping notification");
            return;
        };

        let payload = EmailPayload { to, subject, body };
        if let Err(err) = self.client.post(url).json(&payload).send().await {
            tracing::warn!("email notification to {} failed: {}", to, err);
        }
    }

    pub async fn send_sms(&self, to: &str, message: &str) {
        let Some(url) = &self.sms_webhook_url else {
            tracing::debug!("sms webhook not configured, skipping notification");
            return;
        };

        let payload = SmsPayload { to, message };
        if let Err(err) = self.client.post(url).json(&payload).send().await {
            tracing::warn!("sms notification to {} failed: {}", to, err);
        }
    }

    /// Fire-and-forget email: spawned so callers never wait on delivery.
    pub fn spawn_email(self: &Arc<Self>, to: String, subject: String, body: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.send_email(&to, &subject, &body).await;
        });
    }

    /// Fire-and-forget SMS; skipped when the user has no phone on file.
    pub fn spawn_sms(self: &Arc<Self>, to: Option<String>, message: String) {
        let Some(to) = to else {
            return;
        };

        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.send_sms(&to, &message).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_send_email_posts_payload() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/email")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create();

        let notifier = Notifier::new(Some(format!("{}/email", server.url())), None);
        notifier
            .send_email("user@example.com", "Deposit confirmed", "Your wallet was credited")
            .await;

        mock.assert();
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_skipped() {
        let notifier = Notifier::new(None, None);
        // Must return without attempting any network call.
        notifier.send_email("user@example.com", "subject", "body").await;
        notifier.send_sms("+10000000000", "message").await;
    }
}
