//! HTTP contract tests for the storefront backend client.

mod common;

use assert_matches::assert_matches;
use common::{http_backend, order_json};
use reqwest::Client;
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_checkout::{
    backend::{BackendApi, CreatePaymentIntentRequest, HttpBackend},
    errors::BackendError,
    models::{
        AuthorizationId, OrderContext, PayerDetails, PaymentStatus, PlanReference, PlanSelection,
    },
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn custom_plan_request() -> CreatePaymentIntentRequest {
    let selection = PlanSelection::new(PlanReference::CustomPlanRequest("C42".into()), dec!(250.50))
        .unwrap()
        .with_service("S7", "Mobile App")
        .with_description("Custom plan for Mobile App");
    let ctx = OrderContext::new(selection, PayerDetails::new("Sam", "sam@example.org")).unwrap();
    CreatePaymentIntentRequest::from(&ctx)
}

fn pi(id: &str) -> AuthorizationId {
    AuthorizationId::parse(id).unwrap()
}

#[tokio::test]
async fn test_create_payment_intent_posts_order_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment/create-payment-intent"))
        .and(header("authorization", "Bearer user-session"))
        .and(body_json(json!({
            "customPlanId": "C42",
            "serviceId": "S7",
            "serviceName": "Mobile App",
            "name": "Sam",
            "email": "sam@example.org",
            "amount": 250.5,
            "description": "Custom plan for Mobile App"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "clientSecret": "pi_9_secret_q" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), Client::new())
        .unwrap()
        .with_api_token("user-session");
    let response = backend.create_payment_intent(&custom_plan_request()).await.unwrap();
    assert_eq!(response.client_secret, "pi_9_secret_q");
}

#[tokio::test]
async fn test_rejection_message_is_extracted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment/create-payment-intent"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Unauthorized access" })),
        )
        .mount(&server)
        .await;

    let err = http_backend(&server)
        .create_payment_intent(&custom_plan_request())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        BackendError::Status { status: 401, message } if message == "Unauthorized access"
    );
}

#[tokio::test]
async fn test_missing_client_secret_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment/create-payment-intent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let err = http_backend(&server)
        .create_payment_intent(&custom_plan_request())
        .await
        .unwrap_err();
    assert_matches!(err, BackendError::Decode(_));
}

#[tokio::test]
async fn test_get_order_not_found_reads_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/get-order"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "Order not found" })),
        )
        .mount(&server)
        .await;

    let order = http_backend(&server).get_order(&pi("pi_1")).await.unwrap();
    assert!(order.is_none());
}

#[tokio::test]
async fn test_get_order_empty_body_reads_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/get-order"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let order = http_backend(&server).get_order(&pi("pi_1")).await.unwrap();
    assert!(order.is_none());
}

#[tokio::test]
async fn test_get_order_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/get-order"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = http_backend(&server).get_order(&pi("pi_1")).await.unwrap_err();
    assert_matches!(err, BackendError::Status { status: 503, .. });
}

#[tokio::test]
async fn test_repeated_lookups_are_read_only_and_stable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/get-order"))
        .and(query_param("payment_intent", "pi_123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(order_json("pi_123", "succeeded", 49.99)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let backend = http_backend(&server);
    let first = backend.get_order(&pi("pi_123")).await.unwrap().unwrap();
    for _ in 0..2 {
        let again = backend.get_order(&pi("pi_123")).await.unwrap().unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(first.payment_status, PaymentStatus::Succeeded);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
}
