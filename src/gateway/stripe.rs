use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::{
    ConfirmationOutcome, GatewayErrorKind, GatewayFailure, NextAction, PaymentGateway,
    PaymentMethodDetails,
};
use crate::config::CheckoutConfig;
use crate::errors::BackendError;
use crate::models::{AuthorizationId, ClientSecret};

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    status: String,
    #[serde(default)]
    next_action: Option<NextActionBody>,
    #[serde(default)]
    last_payment_error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct NextActionBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    redirect_to_url: Option<RedirectBody>,
}

#[derive(Debug, Deserialize)]
struct RedirectBody {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorDetail {
    fn into_failure(self) -> GatewayFailure {
        let message = self
            .message
            .unwrap_or_else(|| "The payment could not be confirmed.".to_string());
        GatewayFailure::classify(
            self.error_type.as_deref(),
            self.code.as_deref(),
            self.decline_code.as_deref(),
            message,
        )
    }
}

/// Confirms payment intents against a Stripe-compatible REST API using the publishable key.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: Url,
    publishable_key: String,
    return_url: Option<String>,
}

impl StripeGateway {
    pub fn new(
        base_url: &str,
        publishable_key: impl Into<String>,
        client: Client,
    ) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(base_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            publishable_key: publishable_key.into(),
            return_url: None,
        })
    }

    /// Returns `Ok(None)` when no publishable key is configured.
    pub fn from_config(config: &CheckoutConfig) -> Result<Option<Self>, BackendError> {
        let Some(key) = config.gateway_publishable_key.as_deref() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        let mut gateway = Self::new(&config.gateway_base_url, key, client)?;
        gateway.return_url = config.gateway_return_url.clone();
        Ok(Some(gateway))
    }

    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    fn form<'a>(
        &'a self,
        client_secret: &'a ClientSecret,
        payment_method: &'a PaymentMethodDetails,
    ) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![
            ("client_secret", client_secret.expose()),
            ("payment_method_data[type]", "card"),
            ("payment_method_data[card][token]", payment_method.token.as_str()),
            (
                "payment_method_data[billing_details][name]",
                payment_method.billing.name.as_str(),
            ),
            (
                "payment_method_data[billing_details][email]",
                payment_method.billing.email.as_str(),
            ),
        ];
        if let Some(return_url) = &self.return_url {
            form.push(("return_url", return_url.as_str()));
        }
        form
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip_all, fields(authorization_id = %client_secret.authorization_id()))]
    async fn confirm(
        &self,
        client_secret: &ClientSecret,
        payment_method: &PaymentMethodDetails,
    ) -> ConfirmationOutcome {
        let path = format!(
            "v1/payment_intents/{}/confirm",
            client_secret.authorization_id()
        );
        let url = match self.base_url.join(&path) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "invalid gateway endpoint");
                return ConfirmationOutcome::Failed {
                    reason: GatewayFailure::network(e.to_string()),
                };
            }
        };

        let response = match self
            .client
            .post(url)
            .bearer_auth(&self.publishable_key)
            .form(&self.form(client_secret, payment_method))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "gateway confirmation request failed");
                return ConfirmationOutcome::Failed {
                    reason: GatewayFailure::network(e.to_string()),
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "gateway response body unreadable");
                return ConfirmationOutcome::Failed {
                    reason: GatewayFailure::network(e.to_string()),
                };
            }
        };

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error)
                .unwrap_or_default();
            let reason = detail.into_failure();
            info!(status = status.as_u16(), kind = %reason.kind, "gateway declined confirmation");
            return ConfirmationOutcome::Failed { reason };
        }

        match serde_json::from_str::<IntentBody>(&body) {
            Ok(intent) => outcome_from_intent(intent),
            Err(e) => {
                error!(error = %e, "unexpected gateway response");
                ConfirmationOutcome::Failed {
                    reason: GatewayFailure::new(
                        GatewayErrorKind::Unknown,
                        "The payment provider returned an unexpected response.",
                    ),
                }
            }
        }
    }
}

fn outcome_from_intent(intent: IntentBody) -> ConfirmationOutcome {
    debug!(status = %intent.status, "gateway intent status");
    let Some(authorization_id) = AuthorizationId::parse(&intent.id) else {
        return ConfirmationOutcome::Failed {
            reason: GatewayFailure::new(
                GatewayErrorKind::Unknown,
                "The payment provider returned an intent without an id.",
            ),
        };
    };

    match intent.status.as_str() {
        "succeeded" => ConfirmationOutcome::Succeeded { authorization_id },
        "requires_action" | "requires_confirmation" | "processing" => {
            ConfirmationOutcome::RequiresAction {
                authorization_id,
                next_action: intent.next_action.map(|a| NextAction {
                    kind: a.kind,
                    redirect_url: a.redirect_to_url.and_then(|r| r.url),
                }),
            }
        }
        "requires_payment_method" => ConfirmationOutcome::Failed {
            reason: intent
                .last_payment_error
                .unwrap_or_default()
                .into_failure(),
        },
        other => ConfirmationOutcome::Failed {
            reason: GatewayFailure::new(
                GatewayErrorKind::Unknown,
                format!("Payment ended in status {}", other),
            ),
        },
    }
}
