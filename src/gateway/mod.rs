//! Payment gateway confirmation protocol.
//!
//! The gateway confirms an authorization client-side using the single-use client secret and a
//! tokenized payment method. Every call resolves to exactly one [`ConfirmationOutcome`];
//! transport problems come back as a `Failed` outcome rather than an error.

pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display};

use crate::models::{AuthorizationId, ClientSecret, PayerDetails};

pub use stripe::StripeGateway;

/// Billing details sent alongside the tokenized card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingDetails {
    pub name: String,
    pub email: String,
}

impl From<&PayerDetails> for BillingDetails {
    fn from(payer: &PayerDetails) -> Self {
        Self {
            name: payer.name.trim().to_string(),
            email: payer.email.trim().to_string(),
        }
    }
}

/// Payment-method token produced by the gateway's card widget, plus billing details.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentMethodDetails {
    pub token: String,
    pub billing: BillingDetails,
}

impl PaymentMethodDetails {
    pub fn new(token: impl Into<String>, billing: BillingDetails) -> Self {
        Self {
            token: token.into(),
            billing,
        }
    }
}

impl fmt::Debug for PaymentMethodDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentMethodDetails")
            .field("token", &"**redacted**")
            .field("billing", &self.billing)
            .finish()
    }
}

/// Out-of-band step the gateway asks the payer to complete (e.g. a 3-D Secure challenge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    CardDeclined,
    InsufficientFunds,
    ExpiredCard,
    IncorrectCvc,
    ProcessingError,
    AuthenticationRequired,
    RateLimited,
    InvalidRequest,
    Network,
    Unknown,
}

/// Why the gateway refused to confirm an authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayFailure {
    pub kind: GatewayErrorKind,
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: String,
}

impl GatewayFailure {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            decline_code: None,
            message: message.into(),
        }
    }

    /// Classifies a gateway error from its `type`, `code` and `decline_code`.
    pub fn classify(
        error_type: Option<&str>,
        code: Option<&str>,
        decline_code: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        let kind = match (decline_code, code) {
            (Some("insufficient_funds"), _) => GatewayErrorKind::InsufficientFunds,
            (_, Some("card_declined")) => GatewayErrorKind::CardDeclined,
            (_, Some("expired_card")) => GatewayErrorKind::ExpiredCard,
            (_, Some("incorrect_cvc" | "invalid_cvc")) => GatewayErrorKind::IncorrectCvc,
            (_, Some("processing_error")) => GatewayErrorKind::ProcessingError,
            (_, Some("authentication_required" | "payment_intent_authentication_failure")) => {
                GatewayErrorKind::AuthenticationRequired
            }
            (_, Some("rate_limit")) => GatewayErrorKind::RateLimited,
            _ => match error_type {
                Some("invalid_request_error") => GatewayErrorKind::InvalidRequest,
                Some("rate_limit_error") => GatewayErrorKind::RateLimited,
                Some("card_error") => GatewayErrorKind::CardDeclined,
                _ => GatewayErrorKind::Unknown,
            },
        };

        Self {
            kind,
            code: code.map(str::to_string),
            decline_code: decline_code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    /// Text safe to show the payer.
    pub fn user_message(&self) -> String {
        match self.kind {
            GatewayErrorKind::CardDeclined
            | GatewayErrorKind::InsufficientFunds
            | GatewayErrorKind::ExpiredCard
            | GatewayErrorKind::IncorrectCvc
            | GatewayErrorKind::AuthenticationRequired
                if !self.message.trim().is_empty() =>
            {
                self.message.clone()
            }
            GatewayErrorKind::Network => {
                "We could not reach the payment provider. Please try again.".to_string()
            }
            GatewayErrorKind::RateLimited => {
                "Too many payment attempts. Please wait a moment and try again.".to_string()
            }
            _ => "Payment failed. Please try again or use a different card.".to_string(),
        }
    }
}

impl fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(decline) = &self.decline_code {
            write!(f, " (decline code {})", decline)?;
        }
        Ok(())
    }
}

/// Result of one confirmation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Succeeded {
        authorization_id: AuthorizationId,
    },
    RequiresAction {
        authorization_id: AuthorizationId,
        next_action: Option<NextAction>,
    },
    Failed {
        reason: GatewayFailure,
    },
}

impl ConfirmationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Succeeded { .. } => "succeeded",
            ConfirmationOutcome::RequiresAction { .. } => "requires_action",
            ConfirmationOutcome::Failed { .. } => "failed",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm(
        &self,
        client_secret: &ClientSecret,
        payment_method: &PaymentMethodDetails,
    ) -> ConfirmationOutcome;
}
