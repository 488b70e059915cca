use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix_web::http::StatusCode;
use actix_web::{test, web, App, HttpRequest, HttpResponse, HttpServer};

use linepay_relay::config::{ConfirmInput, ConfirmView, RelayConfig};
use linepay_relay::routes;
use linepay_relay::signature::{sign, verify};
use linepay_relay::AppState;

const CHANNEL_ID: &str = "1234567890";
const SECRET: &[u8] = b"test-channel-secret";

/// One request as seen by the mock gateway.
#[derive(Debug, Clone)]
struct Captured {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Captured>>>);

impl Recorder {
    fn calls(&self) -> Vec<Captured> {
        self.0.lock().unwrap().clone()
    }
}

/// Start a mock gateway on an ephemeral port that answers every request with
/// `status` and `body`, recording what it received.
fn spawn_upstream(status: u16, body: &'static str) -> (String, Recorder) {
    let recorder = Recorder::default();
    let shared = recorder.clone();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(move || {
        let shared = shared.clone();
        App::new().default_service(web::to(move |req: HttpRequest, payload: web::Bytes| {
            let shared = shared.clone();
            async move {
                let headers = req
                    .headers()
                    .iter()
                    .filter_map(|(k, v)| {
                        v.to_str()
                            .ok()
                            .map(|v| (k.as_str().to_lowercase(), v.to_string()))
                    })
                    .collect();
                shared.0.lock().unwrap().push(Captured {
                    method: req.method().to_string(),
                    path: req.path().to_string(),
                    headers,
                    body: payload.to_vec(),
                });
                HttpResponse::build(StatusCode::from_u16(status).unwrap())
                    .content_type("application/json")
                    .body(body)
            }
        }))
    })
    .workers(1)
    .listen(listener)
    .unwrap()
    .run();
    actix_rt::spawn(server);

    (format!("http://{addr}"), recorder)
}

fn make_state(base_url: &str, input: ConfirmInput, view: ConfirmView) -> web::Data<AppState> {
    let mut config = RelayConfig::new(CHANNEL_ID, SECRET, base_url);
    config.confirm_input = input;
    config.confirm_view = view;
    web::Data::new(AppState::new(config).unwrap())
}

macro_rules! relay_app {
    ($state:expr, $input:expr) => {
        test::init_service(
            App::new()
                .app_data($state)
                .configure(|cfg| routes::payments::configure(cfg, $input)),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_pay_passes_upstream_body_through() {
    let (base, _recorder) = spawn_upstream(200, r#"{"status":"ok","id":"tx123"}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/pay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(r#"{"amount":100,"currency":"TWD","orderId":"A1"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], br#"{"status":"ok","id":"tx123"}"#);
}

#[actix_rt::test]
async fn test_pay_sends_signed_request_to_gateway() {
    let (base, recorder) = spawn_upstream(200, r#"{"returnCode":"0000"}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/pay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(r#"{"amount":100,"currency":"TWD","orderId":"A1"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.method, "POST");
    assert_eq!(call.path, "/v3/payments/request");
    assert_eq!(call.body, br#"{"amount":100,"currency":"TWD","orderId":"A1"}"#);
    assert_eq!(call.headers["content-type"], "application/json");
    assert_eq!(call.headers["x-line-channelid"], CHANNEL_ID);

    let nonce = &call.headers["x-line-authorization-nonce"];
    assert!(nonce.parse::<u64>().is_ok());
    let expected = sign(SECRET, "/v3/payments/request", &call.body, nonce);
    assert_eq!(call.headers["x-line-authorization"], expected);
}

#[actix_rt::test]
async fn test_pay_signs_transmitted_bytes_not_a_reencoding() {
    let (base, recorder) = spawn_upstream(200, "{}");
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/pay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{ \"orderId\": \"A1\",\n  \"amount\": 100, \"currency\": \"TWD\" }")
        .to_request();
    test::call_service(&app, req).await;

    let call = &recorder.calls()[0];
    // Caller key order kept, whitespace dropped
    assert_eq!(call.body, br#"{"orderId":"A1","amount":100,"currency":"TWD"}"#);

    let nonce = &call.headers["x-line-authorization-nonce"];
    let signature = &call.headers["x-line-authorization"];
    assert!(verify(SECRET, "/v3/payments/request", &call.body, nonce, signature));

    let reordered = br#"{"amount":100,"currency":"TWD","orderId":"A1"}"#;
    assert!(!verify(SECRET, "/v3/payments/request", reordered, nonce, signature));
}

#[actix_rt::test]
async fn test_pay_rejects_malformed_json_without_calling_gateway() {
    let (base, recorder) = spawn_upstream(200, "{}");
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/pay")
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["details"].is_null());
    assert!(recorder.calls().is_empty());
}

#[actix_rt::test]
async fn test_pay_transport_failure_has_null_details() {
    // Bind then drop to get a port nothing listens on
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let app = relay_app!(
        make_state(
            &format!("http://127.0.0.1:{port}"),
            ConfirmInput::Body,
            ConfirmView::Json
        ),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/pay")
        .set_payload(r#"{"amount":1}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("upstream request failed"));
    assert!(body["details"].is_null());
}

#[actix_rt::test]
async fn test_confirm_forwards_amount_and_currency() {
    let (base, recorder) = spawn_upstream(200, r#"{"returnCode":"0000","returnMessage":"Success."}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/confirm")
        .set_json(serde_json::json!({"transactionId": "2019049910005496810", "amount": 100}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["returnCode"], "0000");

    let call = &recorder.calls()[0];
    assert_eq!(call.path, "/v3/payments/2019049910005496810/confirm");
    assert_eq!(call.body, br#"{"amount":100,"currency":"TWD"}"#);
    let nonce = &call.headers["x-line-authorization-nonce"];
    assert_eq!(
        call.headers["x-line-authorization"],
        sign(SECRET, "/v3/payments/2019049910005496810/confirm", &call.body, nonce)
    );
}

#[actix_rt::test]
async fn test_confirm_without_transaction_id_never_calls_gateway() {
    let (base, recorder) = spawn_upstream(200, "{}");
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    for payload in [
        serde_json::json!({"amount": 100}),
        serde_json::json!({"transactionId": "", "amount": 100}),
    ] {
        let req = test::TestRequest::post()
            .uri("/confirm")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "transactionId is required");
    }

    let req = test::TestRequest::post().uri("/confirm").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    assert!(recorder.calls().is_empty());
}

#[actix_rt::test]
async fn test_confirm_upstream_rejection_embeds_details() {
    let (base, _recorder) = spawn_upstream(400, r#"{"error":"invalid amount"}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/confirm")
        .set_json(serde_json::json!({"transactionId": "tx1", "amount": -5}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["details"], serde_json::json!({"error": "invalid amount"}));
    assert_eq!(body["error"], "upstream responded with status 400");
}

#[actix_rt::test]
async fn test_confirm_from_query_string() {
    let (base, recorder) = spawn_upstream(200, r#"{"returnCode":"0000"}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Query, ConfirmView::Json),
        ConfirmInput::Query
    );

    let req = test::TestRequest::get()
        .uri("/confirm?transactionId=2019049910005496810&amount=250")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let call = &recorder.calls()[0];
    assert_eq!(call.path, "/v3/payments/2019049910005496810/confirm");
    assert_eq!(call.body, br#"{"amount":250,"currency":"TWD"}"#);

    let req = test::TestRequest::get()
        .uri("/confirm?amount=250")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(recorder.calls().len(), 1);
}

#[actix_rt::test]
async fn test_confirm_html_view() {
    let (base, _recorder) =
        spawn_upstream(200, r#"{"returnCode":"0000","returnMessage":"Success."}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Query, ConfirmView::Html),
        ConfirmInput::Query
    );

    let req = test::TestRequest::get()
        .uri("/confirm?transactionId=tx42&amount=100")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .starts_with("text/html"));
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("Payment confirmed"));
    assert!(body.contains("tx42"));

    let req = test::TestRequest::get()
        .uri("/confirm?amount=100")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("transactionId is required"));
}

#[actix_rt::test]
async fn test_pay_upstream_rejection_embeds_details() {
    let (base, recorder) = spawn_upstream(
        400,
        r#"{"returnCode":"1104","returnMessage":"Non-existent merchant."}"#,
    );
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/pay")
        .set_payload(r#"{"amount":100,"currency":"TWD","orderId":"A1"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "upstream responded with status 400");
    assert_eq!(
        body["details"],
        serde_json::json!({"returnCode": "1104", "returnMessage": "Non-existent merchant."})
    );
    assert_eq!(recorder.calls().len(), 1);
}

#[actix_rt::test]
async fn test_pay_empty_body_relayed_as_empty_object() {
    let (base, recorder) = spawn_upstream(200, "{}");
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post().uri("/pay").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let call = &recorder.calls()[0];
    assert_eq!(call.body, b"{}");
    let nonce = &call.headers["x-line-authorization-nonce"];
    assert!(verify(
        SECRET,
        "/v3/payments/request",
        b"{}",
        nonce,
        &call.headers["x-line-authorization"]
    ));
}

#[actix_rt::test]
async fn test_confirm_rejects_dot_segment_ids_without_calling_gateway() {
    let (base, recorder) = spawn_upstream(200, "{}");
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    for id in [".", "..", "../request", "%2e%2e"] {
        let req = test::TestRequest::post()
            .uri("/confirm")
            .set_json(serde_json::json!({"transactionId": id, "amount": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{id}");
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["details"].is_null());
    }

    assert!(recorder.calls().is_empty());
}

#[actix_rt::test]
async fn test_confirm_integral_float_amount_sent_as_integer() {
    let (base, recorder) = spawn_upstream(200, r#"{"returnCode":"0000"}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Body, ConfirmView::Json),
        ConfirmInput::Body
    );

    let req = test::TestRequest::post()
        .uri("/confirm")
        .set_payload(r#"{"transactionId":"tx1","amount":100.0}"#)
        .insert_header(("Content-Type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let call = &recorder.calls()[0];
    assert_eq!(call.body, br#"{"amount":100,"currency":"TWD"}"#);
}

#[actix_rt::test]
async fn test_confirm_html_view_upstream_rejection() {
    let (base, recorder) = spawn_upstream(400, r#"{"error":"invalid amount"}"#);
    let app = relay_app!(
        make_state(&base, ConfirmInput::Query, ConfirmView::Html),
        ConfirmInput::Query
    );

    let req = test::TestRequest::get()
        .uri("/confirm?transactionId=tx42&amount=100")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .starts_with("text/html"));
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("Payment confirmation failed"));
    assert!(body.contains("upstream responded with status 400"));
    assert!(body.contains("invalid amount"));
    assert_eq!(recorder.calls().len(), 1);
}
