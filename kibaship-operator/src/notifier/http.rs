//! Signed webhook delivery

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use kibaship_core::dto::event::DeploymentEvent;
use reqwest::StatusCode;
use sha2::Sha256;
use std::time::Duration;

use super::{Notifier, NotifyError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Kibaship-Signature";

const MAX_RETRIES: u32 = 5;
const INITIAL_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 10_000;

/// POSTs events as JSON, signed with HMAC-SHA256 over the body
pub struct HttpNotifier {
    client: reqwest::Client,
    target_url: String,
    signing_key: Vec<u8>,
    initial_delay: Duration,
}

impl HttpNotifier {
    pub fn new(target_url: impl Into<String>, signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            target_url: target_url.into(),
            signing_key: signing_key.into(),
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
        }
    }

    #[cfg(test)]
    fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn sign(&self, body: &[u8]) -> Result<String, NotifyError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.signing_key).map_err(|_| NotifyError::InvalidKey)?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(event)?;
        let signature = self.sign(&body)?;

        let mut attempt = 0;
        let mut delay = self.initial_delay;

        loop {
            let result = self
                .client
                .post(&self.target_url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;

            let error = match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) if !is_retryable(response.status()) => {
                    return Err(NotifyError::Rejected(response.status().as_u16()));
                }
                Ok(response) => NotifyError::Rejected(response.status().as_u16()),
                Err(e) => NotifyError::Request(e),
            };

            if attempt >= MAX_RETRIES {
                return Err(error);
            }
            attempt += 1;

            tracing::debug!(
                "Webhook attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                MAX_RETRIES,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_millis(MAX_DELAY_MS));
        }
    }
}
