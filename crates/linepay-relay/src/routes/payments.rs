use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::config::{ConfirmInput, ConfirmView};
use crate::error::RelayError;
use crate::metrics::record_outcome;
use crate::state::AppState;
use crate::upstream::{check_transaction_id, UpstreamResponse};
use crate::view::{render_confirmation, render_error};

/// A JSON scalar that may arrive as a number or as a string.
///
/// Query strings only carry text, and JSON callers send transaction ids both ways.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

/// Raw `/confirm` input, from either the JSON body or the query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmParams {
    pub transaction_id: Option<Scalar>,
    pub amount: Option<Scalar>,
}

/// Validated confirmation input.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub transaction_id: String,
    pub amount: serde_json::Number,
}

impl ConfirmParams {
    pub fn validate(self) -> Result<Confirmation, RelayError> {
        let transaction_id = match self.transaction_id {
            Some(Scalar::Number(n)) => n.to_string(),
            Some(Scalar::Text(s)) => s.trim().to_string(),
            None => String::new(),
        };
        check_transaction_id(&transaction_id)?;

        let amount = match self.amount {
            Some(Scalar::Number(n)) => normalize_amount(n),
            Some(Scalar::Text(s)) => serde_json::from_str::<serde_json::Number>(s.trim())
                .map(normalize_amount)
                .map_err(|_| RelayError::InvalidRequest(format!("amount is not numeric: {s}")))?,
            None => return Err(RelayError::InvalidRequest("amount is required".to_string())),
        };

        Ok(Confirmation {
            transaction_id,
            amount,
        })
    }
}

/// Integral floats (`100.0`) go out as integers, matching how JSON callers
/// that do not distinguish the two would serialize them.
fn normalize_amount(amount: serde_json::Number) -> serde_json::Number {
    // Integers above 2^53 are not exactly representable as f64
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    match amount.as_f64() {
        Some(f) if amount.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_EXACT => {
            serde_json::Number::from(f as i64)
        }
        _ => amount,
    }
}

/// Relay a 2xx gateway answer unchanged.
fn relay_response(upstream: UpstreamResponse) -> HttpResponse {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
    HttpResponse::build(status)
        .content_type(
            upstream
                .content_type
                .as_deref()
                .unwrap_or("application/json"),
        )
        .body(upstream.body)
}

fn outcome<T>(result: &Result<T, RelayError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    }
}

async fn initiate(state: &AppState, body: &[u8]) -> Result<UpstreamResponse, RelayError> {
    // An empty body is relayed as an empty object
    let payload: serde_json::Value = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidRequest(format!("body is not valid JSON: {e}")))?
    };

    tracing::info!(
        order_id = payload.get("orderId").and_then(|v| v.as_str()).unwrap_or("-"),
        "relaying payment request"
    );
    state.linepay.request_payment(&payload).await
}

/// POST /pay - relay a payment request to the gateway
pub async fn pay(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, RelayError> {
    let result = initiate(&state, &body).await;
    record_outcome("request", outcome(&result));
    Ok(relay_response(result?))
}

async fn confirm(state: &AppState, params: Result<ConfirmParams, RelayError>) -> HttpResponse {
    let confirmation = params.and_then(ConfirmParams::validate);
    let result = match confirmation {
        Ok(confirmation) => {
            tracing::info!(
                transaction_id = %confirmation.transaction_id,
                amount = %confirmation.amount,
                "relaying payment confirmation"
            );
            state
                .linepay
                .confirm_payment(&confirmation.transaction_id, &confirmation.amount)
                .await
                .map(|upstream| (confirmation, upstream))
        }
        Err(e) => Err(e),
    };
    record_outcome("confirm", outcome(&result));

    match (state.config.confirm_view, result) {
        (ConfirmView::Json, Ok((_, upstream))) => relay_response(upstream),
        (ConfirmView::Json, Err(e)) => e.error_response(),
        (ConfirmView::Html, Ok((confirmation, upstream))) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(render_confirmation(
                &confirmation.transaction_id,
                upstream.json().as_ref(),
            )),
        (ConfirmView::Html, Err(e)) => {
            tracing::warn!(error = %e, "payment confirmation failed");
            HttpResponse::build(e.status_code())
                .content_type("text/html; charset=utf-8")
                .body(render_error(&e))
        }
    }
}

/// POST /confirm - confirmation input in the JSON body
pub async fn confirm_from_body(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(ConfirmParams::default())
    } else {
        serde_json::from_slice::<ConfirmParams>(&body)
            .map_err(|e| RelayError::InvalidRequest(format!("body is not valid JSON: {e}")))
    };
    confirm(&state, params).await
}

/// GET /confirm - confirmation input in the query string
pub async fn confirm_from_query(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let params = web::Query::<ConfirmParams>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .map_err(|e| RelayError::InvalidRequest(e.to_string()));
    confirm(&state, params).await
}

pub fn configure(cfg: &mut web::ServiceConfig, confirm_input: ConfirmInput) {
    cfg.route("/pay", web::post().to(pay));
    match confirm_input {
        ConfirmInput::Body => cfg.route("/confirm", web::post().to(confirm_from_body)),
        ConfirmInput::Query => cfg.route("/confirm", web::get().to(confirm_from_query)),
    };
}
