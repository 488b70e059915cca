//! HTML pages for the `CONFIRM_VIEW=html` presentation of `/confirm`.

use crate::error::RelayError;

/// LINE Pay `returnCode` for success.
const RETURN_CODE_SUCCESS: &str = "0000";

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n</head>\n<body>\n<main>\n<h1>{title}</h1>\n{body}</main>\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

/// Render the gateway's confirm answer.
///
/// A 2xx from the gateway can still carry a business failure in `returnCode`,
/// so the heading follows that code rather than the HTTP status.
pub fn render_confirmation(transaction_id: &str, upstream: Option<&serde_json::Value>) -> String {
    let field = |name: &str| {
        upstream
            .and_then(|v| v.get(name))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    };
    let return_code = field("returnCode");
    let return_message = field("returnMessage");

    let title = match return_code.as_deref() {
        Some(RETURN_CODE_SUCCESS) => "Payment confirmed",
        Some(_) => "Payment not confirmed",
        None => "Confirmation sent",
    };

    let mut body = format!(
        "<p>Transaction: <code>{}</code></p>\n",
        escape_html(transaction_id)
    );
    if let Some(code) = return_code {
        body.push_str(&format!("<p>Return code: <code>{}</code></p>\n", escape_html(&code)));
    }
    if let Some(message) = return_message {
        body.push_str(&format!("<p>{}</p>\n", escape_html(&message)));
    }
    page(title, &body)
}

/// Render a relay failure.
pub fn render_error(err: &RelayError) -> String {
    let mut body = format!("<p>{}</p>\n", escape_html(&err.to_string()));
    let details = err.body().details;
    if !details.is_null() {
        let text = match details {
            serde_json::Value::String(s) => s,
            other => serde_json::to_string_pretty(&other).unwrap_or_default(),
        };
        body.push_str(&format!("<pre>{}</pre>\n", escape_html(&text)));
    }
    page("Payment confirmation failed", &body)
}
