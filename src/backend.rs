//! Storefront backend HTTP surface used by checkout.
//!
//! Two endpoints matter here: intent creation (`POST /payment/create-payment-intent`) and the
//! order lookup (`GET /order/get-order`) that settlement polling hits. The [`BackendApi`]
//! trait lets the services run against a mock in tests.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::CheckoutConfig;
use crate::errors::BackendError;
use crate::models::{AuthorizationId, OrderContext, OrderRecord};

const CREATE_PAYMENT_INTENT_PATH: &str = "payment/create-payment-intent";
const GET_ORDER_PATH: &str = "order/get-order";

/// Body of the intent-creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&OrderContext> for CreatePaymentIntentRequest {
    fn from(ctx: &OrderContext) -> Self {
        let selection = ctx.selection();
        let plan = ctx.plan_reference();
        Self {
            custom_plan_id: plan.custom_plan_request_id().map(str::to_string),
            service_id: selection.service_id.clone(),
            plan_id: plan.plan_id().map(str::to_string),
            service_name: selection.service_name.clone(),
            name: ctx.payer().name.trim().to_string(),
            email: ctx.payer().email.trim().to_string(),
            amount: ctx.amount(),
            description: selection.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct GetOrderResponse {
    #[serde(default)]
    order: Option<OrderRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Opens one authorization at the gateway, via the backend. Not idempotent.
    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntentRequest,
    ) -> Result<CreatePaymentIntentResponse, BackendError>;

    /// Looks up the order written for an authorization. `Ok(None)` means "not yet".
    async fn get_order(
        &self,
        authorization_id: &AuthorizationId,
    ) -> Result<Option<OrderRecord>, BackendError>;
}

/// reqwest-backed [`BackendApi`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, client: Client) -> Result<Self, BackendError> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            api_token: None,
        })
    }

    pub fn from_config(config: &CheckoutConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        let backend = Self::new(&config.api_base_url, client)?;
        Ok(match &config.api_token {
            Some(token) => backend.with_api_token(token.clone()),
            None => backend,
        })
    }

    /// Bearer token of the signed-in user.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntentRequest,
    ) -> Result<CreatePaymentIntentResponse, BackendError> {
        let url = self.endpoint(CREATE_PAYMENT_INTENT_PATH)?;
        let response = self.authorize(self.client.post(url)).json(request).send().await?;

        let response = ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("create-payment-intent: {}", e)))
    }

    #[instrument(skip(self), fields(authorization_id = %authorization_id))]
    async fn get_order(
        &self,
        authorization_id: &AuthorizationId,
    ) -> Result<Option<OrderRecord>, BackendError> {
        let url = self.endpoint(GET_ORDER_PATH)?;
        let response = self
            .authorize(self.client.get(url))
            .query(&[("payment_intent", authorization_id.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("order not written yet");
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let parsed: Option<GetOrderResponse> = serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("get-order: {}", e)))?;
        Ok(parsed.and_then(|r| r.order))
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, BackendError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    warn!(status = status.as_u16(), %message, "backend request rejected");
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}
