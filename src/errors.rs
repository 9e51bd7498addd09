use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::gateway::GatewayFailure;
use crate::models::AuthorizationId;

/// Failures talking to the storefront backend.
///
/// These never leave the client modules as-is; each component converts them into one of the
/// checkout error kinds below.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Requesting an authorization handle from the backend failed.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum IntentCreationError {
    #[error("could not reach the payment backend: {0}")]
    Network(String),

    #[error("payment backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("payment backend returned a malformed authorization handle: {0}")]
    MalformedHandle(String),
}

impl From<BackendError> for IntentCreationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transport(e) => IntentCreationError::Network(e.to_string()),
            BackendError::Status { status, message } => {
                IntentCreationError::Rejected { status, message }
            }
            BackendError::Decode(msg) => IntentCreationError::MalformedHandle(msg),
            BackendError::Endpoint(e) => IntentCreationError::Network(e.to_string()),
        }
    }
}

/// Coarse classification used for log fields and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    IntentCreation,
    Gateway,
    ReconciliationTimeout,
    ActionRequired,
    Aborted,
    Defect,
    Misuse,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Intent creation error: {0}")]
    IntentCreation(#[from] IntentCreationError),

    #[error("Gateway error: {0}")]
    Gateway(GatewayFailure),

    #[error("Order was not confirmed after {attempts} attempts")]
    ReconciliationTimeout { attempts: u32 },

    #[error("Authorization {0} requires payer action before it can settle")]
    ActionRequired(AuthorizationId),

    #[error("Reconciliation aborted: no authorization id was provided")]
    MissingAuthorization,

    #[error("Authorization mismatch: handle {expected}, gateway confirmed {actual}")]
    AuthorizationMismatch {
        expected: AuthorizationId,
        actual: AuthorizationId,
    },

    #[error("A payment submission is already in flight")]
    SubmissionInFlight,

    #[error("Authorization {0} was already submitted; request a fresh handle")]
    StaleAuthorization(AuthorizationId),

    #[error("This checkout attempt has already finished")]
    AttemptFinished,

    #[error("Cannot restart checkout from state {0}")]
    NotRestartable(String),
}

impl From<validator::ValidationErrors> for CheckoutError {
    fn from(err: validator::ValidationErrors) -> Self {
        CheckoutError::Validation(err.to_string())
    }
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::IntentCreation(_) => ErrorKind::IntentCreation,
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::ReconciliationTimeout { .. } => ErrorKind::ReconciliationTimeout,
            Self::ActionRequired(_) => ErrorKind::ActionRequired,
            Self::MissingAuthorization => ErrorKind::Aborted,
            Self::AuthorizationMismatch { .. } => ErrorKind::Defect,
            Self::SubmissionInFlight
            | Self::StaleAuthorization(_)
            | Self::AttemptFinished
            | Self::NotRestartable(_) => ErrorKind::Misuse,
        }
    }

    /// Message suitable for showing to the payer.
    /// Transport and defect details are replaced with generic text.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::IntentCreation(IntentCreationError::Rejected { message, .. }) => {
                format!("We could not start your payment: {}", message)
            }
            Self::IntentCreation(_) => {
                "We could not start your payment. Please try again.".to_string()
            }
            Self::Gateway(failure) => failure.user_message(),
            Self::ReconciliationTimeout { .. } => {
                "Your payment is being processed but the order is not confirmed yet. \
                 Please check your order history shortly."
                    .to_string()
            }
            Self::ActionRequired(_) => {
                "Your bank needs you to confirm this payment before it can complete.".to_string()
            }
            Self::MissingAuthorization => "Your payment process was not completed.".to_string(),
            Self::AuthorizationMismatch { .. } => {
                "Something went wrong while confirming your payment.".to_string()
            }
            Self::SubmissionInFlight => "Your payment is already being processed.".to_string(),
            Self::StaleAuthorization(_) | Self::AttemptFinished | Self::NotRestartable(_) => {
                "Please start a new payment attempt.".to_string()
            }
        }
    }

    /// Errors that route the payer to the cancellation view.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Gateway | ErrorKind::ReconciliationTimeout | ErrorKind::Aborted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorKind;

    #[test]
    fn backend_status_becomes_rejection() {
        let err = IntentCreationError::from(BackendError::Status {
            status: 401,
            message: "Unauthorized access".into(),
        });
        assert_eq!(
            err,
            IntentCreationError::Rejected {
                status: 401,
                message: "Unauthorized access".into()
            }
        );
    }

    #[test]
    fn user_message_hides_transport_details() {
        let err = CheckoutError::IntentCreation(IntentCreationError::Network(
            "error sending request for url (http://10.0.0.3:5000/payment)".into(),
        ));
        let msg = err.user_message();
        assert!(!msg.contains("10.0.0.3"));
        assert_eq!(msg, "We could not start your payment. Please try again.");
    }

    #[test]
    fn timeout_is_distinct_from_gateway_decline() {
        let timeout = CheckoutError::ReconciliationTimeout { attempts: 10 };
        let declined = CheckoutError::Gateway(GatewayFailure::new(
            GatewayErrorKind::CardDeclined,
            "Your card was declined.",
        ));

        assert_eq!(timeout.kind(), ErrorKind::ReconciliationTimeout);
        assert_eq!(declined.kind(), ErrorKind::Gateway);
        assert!(timeout.is_cancellation());
        assert!(declined.is_cancellation());
        assert_ne!(timeout.user_message(), declined.user_message());
    }

    #[test]
    fn misuse_and_validation_do_not_cancel() {
        assert!(!CheckoutError::SubmissionInFlight.is_cancellation());
        assert!(!CheckoutError::Validation("Name is required".into()).is_cancellation());
        assert_eq!(CheckoutError::AttemptFinished.kind().as_ref(), "misuse");
    }
}
