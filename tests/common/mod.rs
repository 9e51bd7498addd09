#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use storefront_checkout::{
    backend::HttpBackend,
    gateway::StripeGateway,
    models::{CardField, CardFieldEvent},
    navigation::RecordingNavigator,
    services::{CardAuthorizer, CheckoutFlow, PollPolicy},
};
use wiremock::MockServer;

pub const PUBLISHABLE_KEY: &str = "pk_test_checkout";

/// Short interval so wiremock-backed polling tests finish quickly.
pub fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::new(Duration::from_millis(10), max_attempts)
}

pub fn http_backend(server: &MockServer) -> Arc<HttpBackend> {
    Arc::new(HttpBackend::new(&server.uri(), Client::new()).expect("valid mock server url"))
}

pub fn stripe_gateway(server: &MockServer) -> Arc<StripeGateway> {
    Arc::new(
        StripeGateway::new(&server.uri(), PUBLISHABLE_KEY, Client::new())
            .expect("valid mock server url"),
    )
}

/// Backend and gateway both served by the same mock server, as distinct path prefixes.
pub struct Harness {
    pub server: MockServer,
    pub navigator: Arc<RecordingNavigator>,
    pub flow: CheckoutFlow,
}

impl Harness {
    pub async fn start(policy: PollPolicy) -> Self {
        let server = MockServer::start().await;
        let navigator = Arc::new(RecordingNavigator::default());
        let flow = CheckoutFlow::new(
            http_backend(&server),
            stripe_gateway(&server),
            navigator.clone(),
            policy,
        );
        Self {
            server,
            navigator,
            flow,
        }
    }
}

/// Authorizer with a valid payer and all three card fields complete.
pub fn ready_authorizer() -> CardAuthorizer {
    let authorizer = CardAuthorizer::new();
    authorizer.set_payer_name("Jane Doe");
    authorizer.set_payer_email("jane@example.com");
    for field in [CardField::Number, CardField::Expiry, CardField::Cvc] {
        authorizer.apply_card_event(CardFieldEvent::Changed {
            field,
            complete: true,
        });
    }
    authorizer
}

pub fn order_json(authorization_id: &str, payment_status: &str, price: f64) -> Value {
    json!({
        "order": {
            "_id": format!("order-{}", authorization_id),
            "paymentIntentId": authorization_id,
            "paymentStatus": payment_status,
            "status": "pending",
            "price": price,
            "service": { "title": "Web Development" },
            "plan": { "title": "Starter", "features": ["5 pages"] },
            "user": { "name": "Jane Doe", "email": "jane@example.com" },
            "createdAt": "2025-03-01T10:15:00.000Z"
        }
    })
}

pub fn intent_json(id: &str, status: &str) -> Value {
    json!({ "id": id, "object": "payment_intent", "status": status })
}

pub fn gateway_error_json(
    error_type: &str,
    code: &str,
    decline_code: Option<&str>,
    message: &str,
) -> Value {
    json!({
        "error": {
            "type": error_type,
            "code": code,
            "decline_code": decline_code,
            "message": message
        }
    })
}
