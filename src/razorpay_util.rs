use std::time::Duration;

use actix_web::rt::time::sleep;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{last_error} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, last_error: String },

    #[error("unreadable gateway response: {0}")]
    InvalidResponse(String),
}

/// Credentials issued by the gateway dashboard. The key id is public and is handed to the
/// browser checkout, the secret signs the checkout callbacks.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub key_id: String,
    pub key_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub payment_capture: u8,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn credentials(&self) -> &GatewayCredentials;

    fn currency(&self) -> &str;

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: initial, 2x, 4x, ... for the attempt that just failed (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

enum AttemptError {
    Retryable(String),
    Permanent(GatewayError),
}

/// Transport failures, rate limiting and server errors may succeed on a later attempt,
/// any other rejection will not.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[derive(Clone)]
pub struct RazorpayHandler {
    credentials: GatewayCredentials,
    currency: String,
    api_base_url: String,
    retry_policy: RetryPolicy,
    http_client: reqwest::Client,
}

impl RazorpayHandler {

    pub fn new(credentials: GatewayCredentials, currency: String, api_base_url: String,
               timeout: Duration, retry_policy: RetryPolicy) -> Result<RazorpayHandler, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(RazorpayHandler {
            credentials,
            currency,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            retry_policy,
            http_client,
        })
    }

    async fn try_create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, AttemptError> {
        let response = self.http_client.post(format!("{}/v1/orders", self.api_base_url))
            .basic_auth(&self.credentials.key_id, Some(&self.credentials.key_secret))
            .json(request)
            .send().await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<GatewayOrder>().await
                .map_err(|e| AttemptError::Permanent(GatewayError::InvalidResponse(e.to_string())));
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<RazorpayErrorBody>(&body) {
            Ok(parsed) => parsed.error.description
                .or(parsed.error.code)
                .unwrap_or_else(|| format!("gateway returned {}", status)),
            Err(_) => format!("gateway returned {}", status),
        };

        if is_retryable_status(status) {
            Err(AttemptError::Retryable(message))
        } else {
            Err(AttemptError::Permanent(GatewayError::Rejected { status: status.as_u16(), message }))
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayHandler {
    fn credentials(&self) -> &GatewayCredentials {
        &self.credentials
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_create_order(request).await {
                Ok(order) => return Ok(order),
                Err(AttemptError::Permanent(e)) => return Err(e),
                Err(AttemptError::Retryable(message)) => {
                    if attempt >= max_attempts {
                        return Err(GatewayError::Exhausted { attempts: attempt, last_error: message });
                    }
                    let backoff = self.retry_policy.backoff_after(attempt);
                    log::warn!("Order creation attempt {}/{} failed: {}. Retrying in {}ms",
                        attempt, max_attempts, message, backoff.as_millis());
                    sleep(backoff).await;
                }
            }
        }
    }
}
