use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tessera_api::middleware::Claims;
use tessera_api::state::{AppState, AuthConfig, Repositories, StateParts};
use tessera_api::app;
use tessera_core::identity::ActorRole;
use tessera_core::payment::GatewayPaymentStatus;
use tessera_order::verification::sign;
use tessera_order::MockPaymentGateway;
use tessera_store::app_config::BusinessRules;
use tessera_store::{LogEventProducer, MemoryStore};

const JWT_SECRET: &str = "jwt-test-secret";
const WEBHOOK_SECRET: &str = "whsec_http_tests";

struct TestApp {
    router: Router,
    gateway: Arc<MockPaymentGateway>,
    store: MemoryStore,
}

fn test_app() -> TestApp {
    let store = MemoryStore::new();
    let gateway = Arc::new(MockPaymentGateway::new());
    let state = AppState::new(StateParts {
        repositories: Repositories::memory(&store),
        gateway: gateway.clone(),
        events: Arc::new(LogEventProducer),
        redis: None,
        auth: AuthConfig { secret: JWT_SECRET.to_string() },
        webhook_secret: WEBHOOK_SECRET.to_string(),
        business_rules: BusinessRules::default(),
    })
    .unwrap();

    TestApp { router: app(state), gateway, store }
}

fn token(role: ActorRole) -> String {
    let claims = Claims {
        sub: format!("{:?}-1", role).to_lowercase(),
        role,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    role: Option<ActorRole>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(role) = role {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(role)));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn create_offering(app: &TestApp, capacity: i32) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/v1/offerings",
        Some(ActorRole::Admin),
        Some(json!({
            "kind": "event",
            "code": "SUNBURN",
            "title": "Sunburn Goa",
            "total_capacity": capacity,
            "unit_price": 3500_00,
            "starts_on": "2026-12-28"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["currency"], "INR");
    body["id"].as_str().unwrap().to_string()
}

async fn reserve(app: &TestApp, offering_id: &str, quantity: i32) -> (StatusCode, Value) {
    let attendees: Vec<&str> = ["Neha", "Arjun"].into_iter().take(quantity.max(0) as usize).collect();
    send(
        app,
        "POST",
        "/v1/reservations",
        None,
        Some(json!({
            "offering_id": offering_id,
            "quantity": quantity,
            "buyer_name": "Neha",
            "buyer_email": "neha@example.com",
            "attendees": attendees
        })),
    )
    .await
}

fn confirmation(order_ref: &str, payment_ref: &str) -> Value {
    json!({
        "gateway_order_ref": order_ref,
        "gateway_payment_ref": payment_ref,
        "signature": sign(WEBHOOK_SECRET.as_bytes(), order_ref, payment_ref),
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_reserve_pay_and_check_in() {
    let app = test_app();
    let offering_id = create_offering(&app, 10).await;

    let (status, receipt) = reserve(&app, &offering_id, 2).await;
    assert_eq!(status, StatusCode::CREATED, "{}", receipt);
    assert_eq!(receipt["amount"], 7000_00);
    let order_ref = receipt["gateway_order_ref"].as_str().unwrap().to_string();

    let (_, offering) = send(&app, "GET", &format!("/v1/offerings/{}", offering_id), None, None).await;
    assert_eq!(offering["remaining"], 8);

    app.gateway.settle(&order_ref, "pay_100", 7000_00, GatewayPaymentStatus::Captured);
    let (status, confirmed) = send(&app, "POST", "/v1/webhooks/payments", None, Some(confirmation(&order_ref, "pay_100"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");
    let codes = confirmed["ticket_codes"].as_array().unwrap().clone();
    assert_eq!(codes.len(), 2);

    // gateway retry
    let (status, replay) = send(&app, "POST", "/v1/webhooks/payments", None, Some(confirmation(&order_ref, "pay_100"))).await;
    assert_eq!(status, StatusCode::OK);
    let mut first: Vec<String> = codes.iter().map(|c| c.as_str().unwrap().to_string()).collect();
    let mut second: Vec<String> = replay["ticket_codes"].as_array().unwrap().iter().map(|c| c.as_str().unwrap().to_string()).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
    assert_eq!(app.store.ticket_count(), 2);

    let (status, polled) = send(&app, "GET", &format!("/v1/reservations/{}", order_ref), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["status"], "paid");
    assert!(polled.get("buyer").is_none());

    let code = first[0].clone();
    assert!(code.starts_with("SUNBURN-261228-"));
    let (status, ticket) = send(&app, "GET", &format!("/v1/tickets/{}", code), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["qr_payload"]["ticketId"], code.as_str());
    assert_eq!(ticket["qr_payload"]["offeringOrEventId"], offering_id.as_str());

    let scan = json!({ "ticketId": code, "eventId": offering_id });
    let (status, body) = send(&app, "POST", "/v1/checkins", Some(ActorRole::Staff), Some(scan.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["ticket"]["checked_in_by"], "staff-1");

    let (status, body) = send(&app, "POST", "/v1/checkins", Some(ActorRole::Staff), Some(scan)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_checked_in");

    let wrong_event = json!({ "ticketId": code, "eventId": uuid::Uuid::new_v4() });
    let (status, body) = send(&app, "POST", "/v1/checkins", Some(ActorRole::Staff), Some(wrong_event)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "event_mismatch");

    let unknown = json!({ "ticketId": "NOPE-000000-AAAAAA", "eventId": offering_id });
    let (status, body) = send(&app, "POST", "/v1/checkins", Some(ActorRole::Staff), Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn test_tampered_confirmation_is_rejected() {
    let app = test_app();
    let offering_id = create_offering(&app, 10).await;
    let (_, receipt) = reserve(&app, &offering_id, 1).await;
    let order_ref = receipt["gateway_order_ref"].as_str().unwrap().to_string();
    app.gateway.settle(&order_ref, "pay_1", 3500_00, GatewayPaymentStatus::Captured);

    let mut forged = confirmation(&order_ref, "pay_1");
    forged["gateway_payment_ref"] = json!("pay_2");

    let (status, body) = send(&app, "POST", "/v1/webhooks/payments", None, Some(forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "rejected");
    assert_eq!(app.store.ticket_count(), 0);
    assert_eq!(app.store.rejections()[0].reason, "signature_mismatch");
}

#[tokio::test]
async fn test_gateway_outage_returns_bad_gateway() {
    let app = test_app();
    let offering_id = create_offering(&app, 10).await;

    app.gateway.set_unavailable(true);
    let (status, _) = reserve(&app, &offering_id, 1).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, offering) = send(&app, "GET", &format!("/v1/offerings/{}", offering_id), None, None).await;
    assert_eq!(offering["remaining"], 10);
}

#[tokio::test]
async fn test_sold_out_returns_conflict() {
    let app = test_app();
    let offering_id = create_offering(&app, 2).await;

    let (status, _) = reserve(&app, &offering_id, 2).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = reserve(&app, &offering_id, 1).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Fully booked");
}

#[tokio::test]
async fn test_inactive_offering_cannot_be_reserved() {
    let app = test_app();
    let offering_id = create_offering(&app, 5).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/offerings/{}/active", offering_id),
        Some(ActorRole::Admin),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, _) = reserve(&app, &offering_id, 1).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_operator_routes_require_role() {
    let app = test_app();
    let offering = json!({
        "kind": "package", "code": "GOA", "title": "Goa", "total_capacity": 5, "unit_price": 100
    });

    let (status, _) = send(&app, "POST", "/v1/offerings", None, Some(offering.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, "POST", "/v1/offerings", Some(ActorRole::Staff), Some(offering)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let scan = json!({ "ticketId": "X", "eventId": uuid::Uuid::new_v4() });
    let (status, _) = send(&app, "POST", "/v1/checkins", Some(ActorRole::Customer), Some(scan)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", &format!("/v1/intents/{}/refund", uuid::Uuid::new_v4()), Some(ActorRole::Staff), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_manual_registration_and_refund() {
    let app = test_app();
    let offering_id = create_offering(&app, 3).await;

    let walk_in = json!({ "offering_id": offering_id, "name": "Walk-in", "phone": "+91 99887 76655" });
    let (status, first) = send(&app, "POST", "/v1/tickets", Some(ActorRole::Staff), Some(walk_in.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, again) = send(&app, "POST", "/v1/tickets", Some(ActorRole::Staff), Some(walk_in)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["code"], again["code"]);

    let (_, receipt) = reserve(&app, &offering_id, 1).await;
    let order_ref = receipt["gateway_order_ref"].as_str().unwrap().to_string();
    let intent_id = receipt["intent_id"].as_str().unwrap().to_string();
    app.gateway.settle(&order_ref, "pay_9", 3500_00, GatewayPaymentStatus::Captured);
    send(&app, "POST", "/v1/webhooks/payments", None, Some(confirmation(&order_ref, "pay_9"))).await;

    let (status, body) = send(&app, "POST", &format!("/v1/intents/{}/refund", intent_id), Some(ActorRole::Admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "refunded");

    let (status, _) = send(&app, "POST", &format!("/v1/intents/{}/refund", intent_id), Some(ActorRole::Admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_inquiries_merge_by_phone() {
    let app = test_app();

    let (status, first) = send(
        &app,
        "POST",
        "/v1/inquiries",
        None,
        Some(json!({ "name": "Rohit", "phone": "+91 98200 12345", "source": "website", "tags": ["andaman"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["merged"], false);

    let (status, second) = send(
        &app,
        "POST",
        "/v1/inquiries",
        None,
        Some(json!({ "phone": "9820012345", "message": "Any dates in March?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["merged"], true);
    assert_eq!(second["inquiry_id"], first["inquiry_id"]);
    assert_eq!(second["inquiry_count"], 2);

    let (status, _) = send(&app, "POST", "/v1/inquiries", None, Some(json!({ "phone": "123" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_exposed() {
    let app = test_app();
    let offering_id = create_offering(&app, 1).await;
    reserve(&app, &offering_id, 1).await;
    reserve(&app, &offering_id, 1).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("tessera_reservations_total{outcome=\"created\"} 1"));
    assert!(text.contains("tessera_reservations_total{outcome=\"sold_out\"} 1"));
}
