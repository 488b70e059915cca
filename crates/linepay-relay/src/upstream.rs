//! Signed client for the LINE Pay v3 payment endpoints.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::metrics::UPSTREAM_LATENCY;
use crate::nonce::NonceSource;
use crate::signature::sign;

pub const REQUEST_PATH: &str = "/v3/payments/request";
pub const CURRENCY: &str = "TWD";

pub const HEADER_CHANNEL_ID: &str = "X-LINE-ChannelId";
pub const HEADER_NONCE: &str = "X-LINE-Authorization-Nonce";
pub const HEADER_SIGNATURE: &str = "X-LINE-Authorization";

/// Maximum upstream response body size (1 MiB).
const MAX_RESPONSE_BODY_SIZE: usize = 1024 * 1024;

/// Longest transaction id accepted into an upstream path.
const MAX_TRANSACTION_ID_LEN: usize = 64;

/// Reject ids that would not survive as one literal path segment.
///
/// Only `[A-Za-z0-9_-]` is allowed: dot segments are resolved by URL parsing
/// before sending, and percent-encoded dots are treated the same way, so the
/// signed path would differ from the one the gateway sees.
pub fn check_transaction_id(transaction_id: &str) -> Result<(), RelayError> {
    if transaction_id.is_empty() {
        return Err(RelayError::MissingTransactionId);
    }
    if transaction_id.len() > MAX_TRANSACTION_ID_LEN
        || !transaction_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(RelayError::InvalidRequest(format!(
            "transactionId must be 1-{MAX_TRANSACTION_ID_LEN} characters of [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Upstream path for confirming one transaction.
pub fn confirm_path(transaction_id: &str) -> Result<String, RelayError> {
    check_transaction_id(transaction_id)?;
    Ok(format!("/v3/payments/{transaction_id}/confirm"))
}

/// Body sent to the confirm endpoint.
#[derive(Debug, Serialize)]
struct ConfirmBody<'a> {
    amount: &'a serde_json::Number,
    currency: &'static str,
}

/// Authentication headers for one outbound call.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub nonce: String,
    pub signature: String,
}

/// A 2xx response from the gateway, kept byte-for-byte.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Parse the body as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Clone)]
pub struct LinePayClient {
    http: reqwest::Client,
    config: Arc<RelayConfig>,
    nonces: Arc<NonceSource>,
}

impl LinePayClient {
    pub fn new(config: Arc<RelayConfig>) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            nonces: Arc::new(NonceSource::new()),
        })
    }

    /// Fresh nonce plus the signature over `path`, `body` and that nonce.
    pub fn auth_headers(&self, path: &str, body: &[u8]) -> AuthHeaders {
        let nonce = self.nonces.next();
        let signature = sign(&self.config.channel_secret, path, body, &nonce);
        AuthHeaders { nonce, signature }
    }

    /// Relay an opaque payment request to `/v3/payments/request`.
    ///
    /// The payload is serialized exactly once; those bytes are both signed and sent.
    pub async fn request_payment(
        &self,
        payload: &serde_json::Value,
    ) -> Result<UpstreamResponse, RelayError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| RelayError::Internal(format!("failed to serialize payload: {e}")))?;
        self.post_signed("request", REQUEST_PATH, Bytes::from(body))
            .await
    }

    /// Confirm `transaction_id` for `amount` in the fixed currency.
    pub async fn confirm_payment(
        &self,
        transaction_id: &str,
        amount: &serde_json::Number,
    ) -> Result<UpstreamResponse, RelayError> {
        let path = confirm_path(transaction_id)?;
        let body = serde_json::to_vec(&ConfirmBody {
            amount,
            currency: CURRENCY,
        })
        .map_err(|e| RelayError::Internal(format!("failed to serialize payload: {e}")))?;
        self.post_signed("confirm", &path, Bytes::from(body)).await
    }

    /// Sign `body` for `path` and POST it to the gateway.
    ///
    /// Non-2xx answers become [`RelayError::Upstream`] carrying the gateway's
    /// body; anything that prevents a complete answer is [`RelayError::Transport`].
    pub async fn post_signed(
        &self,
        operation: &str,
        path: &str,
        body: Bytes,
    ) -> Result<UpstreamResponse, RelayError> {
        let auth = self.auth_headers(path, &body);
        let url = format!("{}{}", self.config.base_url, path);

        tracing::debug!(operation, path, nonce = %auth.nonce, "relaying signed request");

        let timer = Instant::now();
        let result = self.send(&url, &auth, body).await;
        UPSTREAM_LATENCY
            .with_label_values(&[operation])
            .observe(timer.elapsed().as_secs_f64());

        let response = result?;
        if !(200..300).contains(&response.status) {
            return Err(RelayError::Upstream {
                status: response.status,
                body: error_details(&response.body),
            });
        }
        Ok(response)
    }

    async fn send(
        &self,
        url: &str,
        auth: &AuthHeaders,
        body: Bytes,
    ) -> Result<UpstreamResponse, RelayError> {
        let mut response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_CHANNEL_ID, &self.config.channel_id)
            .header(HEADER_NONCE, &auth.nonce)
            .header(HEADER_SIGNATURE, &auth.signature)
            .body(body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if let Some(cl) = response.content_length() {
            if cl > MAX_RESPONSE_BODY_SIZE as u64 {
                return Err(RelayError::Transport(format!(
                    "upstream response too large: {} bytes (max {})",
                    cl, MAX_RESPONSE_BODY_SIZE
                )));
            }
        }

        // Chunked responses have no Content-Length, so enforce the cap while reading
        let mut body_buf = Vec::with_capacity(
            response
                .content_length()
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(MAX_RESPONSE_BODY_SIZE),
        );
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RelayError::Transport(format!("failed to read upstream response: {e}")))?
        {
            if body_buf.len() + chunk.len() > MAX_RESPONSE_BODY_SIZE {
                return Err(RelayError::Transport(format!(
                    "upstream response too large (max {} bytes)",
                    MAX_RESPONSE_BODY_SIZE
                )));
            }
            body_buf.extend_from_slice(&chunk);
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body: Bytes::from(body_buf),
        })
    }
}

/// Upstream error body as it should appear in `details`.
fn error_details(body: &[u8]) -> serde_json::Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}
