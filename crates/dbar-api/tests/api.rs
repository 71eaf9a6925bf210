//! # Integration Tests for dbar-api
//!
//! Drives the full router with `oneshot`: gateway callbacks on every
//! channel, checkout, progress and the SSE feed, admin auth, and the
//! webhook test-payload generator.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use dbar_api::config::AppConfig;
use dbar_api::state::AppState;
use dbar_core::{Amount, Credential, Progress, TenantId};
use dbar_gateway::test_payload;
use dbar_state::{DonationStore, MemoryStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "admin-token";
const TEST_SECRET: &str = "test-secret";

fn credential() -> Credential {
    Credential::new("3002607", "pwFHCqoQZGmho4w6", "EkRm7iFT261dpevs").unwrap()
}

fn config() -> AppConfig {
    AppConfig {
        base_url: "https://bar.example".into(),
        static_credential: Some(credential()),
        admin_token: Some(ADMIN_TOKEN.into()),
        webhook_test_secret: Some(TEST_SECRET.into()),
        callback_deadline: Duration::from_secs(4),
        ..AppConfig::default()
    }
}

fn test_app_with(config: AppConfig) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone());
    (dbar_api::app(state), store)
}

fn test_app() -> (Router, Arc<MemoryStore>) {
    test_app_with(config())
}

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn form_body(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                dbar_crypto::gateway_encode(k),
                dbar_crypto::gateway_encode(v)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn signed_return_form(trade: &str, amount: &str, tenant: &str) -> String {
    let mut pairs: Vec<(String, String)> = [
        ("MerchantID", "3002607"),
        ("MerchantTradeNo", trade),
        ("RtnCode", "1"),
        ("RtnMsg", "交易成功"),
        ("TradeAmt", amount),
        ("SimulatePaid", "0"),
        ("CustomField1", "小明"),
        ("CustomField2", tenant),
        ("CustomField3", "加油 (test)!"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let mac = dbar_crypto::sign(
        pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        &credential(),
    );
    pairs.push(("CheckMacValue".into(), mac));
    form_body(&pairs)
}

fn post_form(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"));
    match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn paid_webhook(tenant: &TenantId, amount: i64) -> (String, Value) {
    let p = test_payload::build(
        &credential(),
        tenant,
        Amount::new(amount).unwrap(),
        Some("小明"),
        Some("加油"),
        Utc::now(),
    )
    .unwrap();
    (
        p.trade_no.to_string(),
        serde_json::to_value(&p.envelope).unwrap(),
    )
}

async fn progress(app: &Router, uri: &str) -> Progress {
    let resp = app.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    serde_json::from_value(body_json(resp).await).unwrap()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn liveness_and_readiness() {
    let (app, _) = test_app();
    let resp = app.clone().oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ok");

    let resp = app.oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ready");
}

#[tokio::test]
async fn metrics_without_recorder_is_not_found() {
    let (app, _) = test_app();
    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// -- Return / Redirect ---------------------------------------------------------

#[tokio::test]
async fn signed_return_is_applied_once() {
    let (app, _) = test_app();

    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(post_form("/ecpay/return", signed_return_form("DN1", "500", "default")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "1|OK");
    }

    let p = progress(&app, "/progress").await;
    assert_eq!(p.current, 500);
    assert_eq!(p.donation_count, 1);
    assert_eq!(p.recent[0].payer, "小明");
    assert_eq!(p.recent[0].message, "加油 (test)!");
}

#[tokio::test]
async fn forged_return_is_rejected() {
    let (app, store) = test_app();
    let body = signed_return_form("DN2", "500", "default").replace("TradeAmt=500", "TradeAmt=5000");

    let resp = app
        .oneshot(post_form("/ecpay/return", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(resp).await, "0|FAIL");

    let total = store
        .get_running_total(&TenantId::default_tenant())
        .await
        .unwrap();
    assert_eq!(total.total_amount, 0);
}

#[tokio::test]
async fn non_form_return_is_rejected() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(post_json("/ecpay/return", &json!({"RtnCode": 1})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(resp).await, "0|FAIL");
}

#[tokio::test]
async fn redirect_sends_donor_to_donate_page() {
    let (app, _) = test_app();

    let resp = app
        .clone()
        .oneshot(post_form("/ecpay/result", signed_return_form("DN3", "150", "shop")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers()[header::LOCATION],
        "https://bar.example/donate/shop?success=1"
    );
    assert_eq!(progress(&app, "/progress/shop").await.current, 150);

    let forged = signed_return_form("DN4", "150", "shop").replace("DN4", "DN5");
    let resp = app
        .oneshot(post_form("/ecpay/result", forged))
        .await
        .unwrap();
    assert_eq!(
        resp.headers()[header::LOCATION],
        "https://bar.example/donate/shop?success=0"
    );
}

// -- Webhook ----------------------------------------------------------------

#[tokio::test]
async fn json_webhook_is_applied_once() {
    let (app, _) = test_app();
    let shop = TenantId::new("shop").unwrap();
    let (_, envelope) = paid_webhook(&shop, 300);

    for uri in ["/webhook/ecpay/shop", "/webhook/shop"] {
        let resp = app.clone().oneshot(post_json(uri, &envelope)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "1|OK");
    }

    let p = progress(&app, "/progress/shop").await;
    assert_eq!(p.current, 300);
    assert_eq!(p.donation_count, 1);
}

#[tokio::test]
async fn form_encoded_webhook_is_accepted() {
    let (app, _) = test_app();
    let (_, envelope) = paid_webhook(&TenantId::default_tenant(), 120);
    let pairs: Vec<(String, String)> = ["MerchantID", "TransCode", "TransMsg", "Data"]
        .iter()
        .map(|k| {
            let v = match &envelope[*k] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.to_string(), v)
        })
        .collect();

    let resp = app
        .clone()
        .oneshot(post_form("/webhook/ecpay", form_body(&pairs)))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "1|OK");
    assert_eq!(progress(&app, "/progress").await.current, 120);
}

#[tokio::test]
async fn webhook_for_foreign_merchant_is_rejected() {
    let (app, _) = test_app();
    let (_, mut envelope) = paid_webhook(&TenantId::default_tenant(), 100);
    envelope["MerchantID"] = json!("9999999");

    let resp = app
        .oneshot(post_json("/webhook/ecpay", &envelope))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(resp).await, "0|FAIL");
}

#[tokio::test]
async fn undecryptable_webhook_is_acknowledged() {
    let (app, _) = test_app();
    let envelope = json!({"MerchantID": "3002607", "TransCode": 1, "Data": "bm90IGNpcGhlcnRleHQ="});

    let resp = app
        .clone()
        .oneshot(post_json("/webhook/ecpay", &envelope))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "1|OK");
    assert_eq!(progress(&app, "/progress").await.current, 0);
}

#[tokio::test]
async fn malformed_webhook_body_is_rejected() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(post_json("/webhook/ecpay", &json!({"nope": true})))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "0|FAIL");
}

#[tokio::test]
async fn return_and_webhook_for_same_trade_count_once() {
    let (app, _) = test_app();
    let tenant = TenantId::default_tenant();
    let (trade, envelope) = paid_webhook(&tenant, 500);

    let ret = app
        .clone()
        .oneshot(post_form("/ecpay/return", signed_return_form(&trade, "500", "default")));
    let hook = app.clone().oneshot(post_json("/webhook/ecpay", &envelope));
    let (ret, hook) = tokio::join!(ret, hook);
    assert_eq!(body_string(ret.unwrap()).await, "1|OK");
    assert_eq!(body_string(hook.unwrap()).await, "1|OK");

    let p = progress(&app, "/progress").await;
    assert_eq!(p.current, 500);
    assert_eq!(p.donation_count, 1);
}

#[tokio::test]
async fn default_route_webhook_is_credited_to_its_tagged_tenant() {
    let (app, _) = test_app();
    let shop = TenantId::new("shop").unwrap();
    let (trade, envelope) = paid_webhook(&shop, 500);

    let resp = app
        .clone()
        .oneshot(post_form("/ecpay/return", signed_return_form(&trade, "500", "shop")))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "1|OK");
    let resp = app
        .clone()
        .oneshot(post_json("/webhook/ecpay", &envelope))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "1|OK");

    let p = progress(&app, "/progress/shop").await;
    assert_eq!(p.current, 500);
    assert_eq!(p.donation_count, 1);
    assert_eq!(progress(&app, "/progress").await.current, 0);
}

#[tokio::test]
async fn webhook_tagged_for_another_tenant_is_rejected() {
    let (app, _) = test_app();
    let (_, envelope) = paid_webhook(&TenantId::new("shop").unwrap(), 500);

    let resp = app
        .clone()
        .oneshot(post_json("/webhook/ecpay/cafe", &envelope))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "0|FAIL");
    assert_eq!(progress(&app, "/progress/shop").await.current, 0);
    assert_eq!(progress(&app, "/progress/cafe").await.current, 0);
}

// -- Checkout -----------------------------------------------------------------

fn trade_no_in(html: &str) -> String {
    let marker = "name=\"MerchantTradeNo\" value=\"";
    let start = html.find(marker).unwrap() + marker.len();
    let len = html[start..].find('"').unwrap();
    html[start..start + len].to_string()
}

#[tokio::test]
async fn checkout_form_is_signed_and_quoted_amount_enforced() {
    let (app, store) = test_app();
    store
        .save_credential(&TenantId::new("shop").unwrap(), &credential())
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(post_form(
            "/create-order/shop",
            "amount=250&nickname=%E5%B0%8F%E6%98%8E&message=hi".into(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("payment-stage.ecpay.com.tw"));
    assert!(html.contains("name=\"CheckMacValue\""));
    assert!(html.contains("name=\"CustomField2\" value=\"shop\""));
    let trade = trade_no_in(&html);
    assert_eq!(trade.len(), 20);

    let resp = app
        .clone()
        .oneshot(post_form("/ecpay/return", signed_return_form(&trade, "25", "shop")))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "0|FAIL");
    assert_eq!(progress(&app, "/progress/shop").await.current, 0);

    let resp = app
        .clone()
        .oneshot(post_form("/ecpay/return", signed_return_form(&trade, "250", "shop")))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "1|OK");
    assert_eq!(progress(&app, "/progress/shop").await.current, 250);
}

#[tokio::test]
async fn checkout_accepts_json() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(post_json("/create-order", &json!({"amount": 100})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("name=\"CustomField1\" value=\"Anonymous\""));
}

#[tokio::test]
async fn checkout_rejects_bad_amount() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(post_form("/create-order", "amount=-5".into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_fails_closed_without_credential() {
    let (app, _) = test_app_with(AppConfig {
        static_credential: None,
        ..config()
    });
    let resp = app
        .oneshot(post_form("/create-order", "amount=100".into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn checkout_for_unknown_tenant_is_not_found() {
    let (app, store) = test_app();
    let ghost = TenantId::new("ghost").unwrap();
    let resp = app
        .oneshot(post_form("/create-order/ghost", "amount=100".into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(store.find_credential(&ghost).await.unwrap().is_none());
}

#[tokio::test]
async fn checkout_for_explicit_default_tenant_uses_static_credential() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(post_form("/create-order/default", "amount=100".into()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// -- Admin ----------------------------------------------------------------------

#[tokio::test]
async fn admin_requires_bearer_token() {
    let (app, _) = test_app();
    let resp = app.clone().oneshot(get("/admin/default/goal")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/default/goal")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(wrong).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.oneshot(admin("GET", "/admin/default/goal", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["amount"], 1000);
}

#[tokio::test]
async fn admin_disabled_without_token() {
    let (app, _) = test_app_with(AppConfig {
        admin_token: None,
        ..config()
    });
    let resp = app.oneshot(admin("GET", "/admin/default/goal", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_goal_and_reset() {
    let (app, _) = test_app();
    let resp = app
        .clone()
        .oneshot(admin(
            "PUT",
            "/admin/default/goal",
            Some(json!({"title": "新鍵盤", "amount": 2000, "startFrom": 100})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let p: Progress = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!((p.title.as_str(), p.current, p.goal, p.percent), ("新鍵盤", 100, 2000, 5));

    app.clone()
        .oneshot(post_form("/ecpay/return", signed_return_form("DN9", "900", "default")))
        .await
        .unwrap();
    assert_eq!(progress(&app, "/progress").await.percent, 50);

    let resp = app
        .clone()
        .oneshot(admin("GET", "/admin/default/donations?limit=10", None))
        .await
        .unwrap();
    let list = body_json(resp).await;
    assert_eq!(list["total"]["totalAmount"], 900);
    assert_eq!(list["donations"][0]["tradeNo"], "DN9");

    let resp = app
        .clone()
        .oneshot(admin("POST", "/admin/default/reset", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let p = progress(&app, "/progress").await;
    assert_eq!((p.current, p.donation_count), (100, 0));
    assert!(p.recent.is_empty());

    let resp = app
        .oneshot(admin("PUT", "/admin/default/goal", Some(json!({"title": "x", "amount": 0}))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn admin_credential_update_never_echoes_secrets() {
    let (app, store) = test_app_with(AppConfig {
        static_credential: None,
        ..config()
    });
    let body = json!({"merchantId": "2000132", "hashKey": "5294y06JbISpM5x9", "hashIV": "v77hoKGq4kWxNNIS"});
    let resp = app
        .clone()
        .oneshot(admin("PUT", "/admin/shop/credentials", Some(body)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = body_string(resp).await;
    assert!(text.contains("2000132"));
    assert!(!text.contains("5294y06JbISpM5x9"));
    assert!(!text.contains("v77hoKGq4kWxNNIS"));

    let saved = store
        .find_credential(&TenantId::new("shop").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.merchant_id(), "2000132");

    let short = json!({"merchantId": "2000132", "hashKey": "short", "hashIV": "v77hoKGq4kWxNNIS"});
    let resp = app
        .oneshot(admin("PUT", "/admin/shop/credentials", Some(short)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn invalid_tenant_path_is_rejected() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(admin("GET", "/admin/Not_A_Slug/goal", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Test payload generator ------------------------------------------------------

fn test_payload_request(secret: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/ecpay/generate-test-payload/shop")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(s) = secret {
        builder = builder.header("X-Test-Secret", s);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn generated_test_payload_round_trips_through_webhook() {
    let (app, _) = test_app();
    let resp = app
        .clone()
        .oneshot(test_payload_request(
            Some(TEST_SECRET),
            json!({"amount": 200, "nickname": "FullTestUser", "message": "Testing full encryption flow"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["decryptedDataPreview"]["OrderInfo"]["TradeAmt"], "200");
    assert!(body["curlCommand"]
        .as_str()
        .unwrap()
        .contains("https://bar.example/webhook/ecpay/shop"));

    let resp = app
        .clone()
        .oneshot(post_json("/webhook/ecpay/shop", &body["payload"]))
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "1|OK");

    let p = progress(&app, "/progress/shop").await;
    assert_eq!(p.current, 200);
    assert_eq!(p.recent[0].payer, "FullTestUser");
    assert_eq!(p.recent[0].trade_no.as_str(), body["tradeNo"].as_str().unwrap());
}

#[tokio::test]
async fn test_payload_requires_secret() {
    let (app, _) = test_app();
    let resp = app
        .clone()
        .oneshot(test_payload_request(None, json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(test_payload_request(Some("wrong"), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_payload_disabled_without_secret() {
    let (app, _) = test_app_with(AppConfig {
        webhook_test_secret: None,
        ..config()
    });
    let resp = app
        .oneshot(test_payload_request(Some(TEST_SECRET), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// -- Live feed --------------------------------------------------------------------

async fn next_event(body: &mut Body) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("no SSE event within timeout")
        .unwrap()
        .unwrap();
    String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
}

#[tokio::test]
async fn events_stream_progress_after_each_donation() {
    let (app, _) = test_app();
    let resp = app.clone().oneshot(get("/events")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let mut body = resp.into_body();

    let first = next_event(&mut body).await;
    assert!(first.contains("event: progress"));
    assert!(first.contains("\"current\":0"));

    app.clone()
        .oneshot(post_form("/ecpay/return", signed_return_form("DN7", "320", "default")))
        .await
        .unwrap();

    let second = next_event(&mut body).await;
    assert!(second.contains("\"current\":320"));
    assert!(second.contains("\"donationCount\":1"));
}
