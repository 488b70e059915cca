use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

/// Failures surfaced by the relay handlers.
///
/// Every variant is turned into a response at the handler boundary; nothing
/// here is retried.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Inbound request was malformed (bad JSON, bad amount)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transactionId is required")]
    MissingTransactionId,

    /// Gateway answered with a non-2xx status; `body` is its payload verbatim
    #[error("upstream responded with status {status}")]
    Upstream {
        status: u16,
        body: serde_json::Value,
    },

    /// Gateway unreachable, timed out, or its response could not be read
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body for every relay failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: serde_json::Value,
}

impl RelayError {
    /// Label for the `outcome` dimension of the relay request counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) | RelayError::MissingTransactionId => "client_error",
            RelayError::Upstream { .. } => "upstream_error",
            RelayError::Transport(_) => "transport_error",
            RelayError::Internal(_) => "internal_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let details = match self {
            RelayError::Upstream { body, .. } => body.clone(),
            _ => serde_json::Value::Null,
        };
        ErrorBody {
            error: self.to_string(),
            details,
        }
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) | RelayError::MissingTransactionId => {
                StatusCode::BAD_REQUEST
            }
            // The relay cannot tell whose fault an upstream rejection is
            RelayError::Upstream { .. } | RelayError::Transport(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            RelayError::Upstream { status, .. } => {
                tracing::warn!(upstream_status = *status, "upstream rejected relayed call");
            }
            RelayError::Transport(msg) => {
                tracing::error!("Transport error: {}", msg);
            }
            RelayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
            }
            _ => {}
        }
        HttpResponse::build(self.status_code()).json(self.body())
    }
}
