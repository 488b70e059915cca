//! Signing relay for the LINE Pay v3 payment API.
//!
//! Accepts payment-initiation and payment-confirmation calls from a client
//! application, signs each one with the channel secret, forwards it to the
//! gateway, and relays the answer back.
//!
//! # Routes
//!
//! - `POST /pay` → `POST {base}/v3/payments/request`
//! - `POST /confirm` (or `GET /confirm` with `CONFIRM_INPUT=query`) →
//!   `POST {base}/v3/payments/{transactionId}/confirm`
//! - `GET /`, `GET /health`, `GET /metrics`
//!
//! See [`signature::sign`] for the signature scheme.

pub mod config;
pub mod cors;
pub mod error;
pub mod metrics;
pub mod nonce;
pub mod routes;
pub mod signature;
pub mod state;
pub mod upstream;
pub mod view;

pub use config::{ConfirmInput, ConfirmView, RelayConfig};
pub use error::RelayError;
pub use state::AppState;
pub use upstream::LinePayClient;
