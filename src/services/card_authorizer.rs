//! Card authorization state machine.
//!
//! Collects payer details and card-widget completion events, decides when a submission is
//! allowed, and drives exactly one gateway confirmation per authorization handle.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use strum::Display;
use tracing::{error, info, instrument, warn};

use crate::errors::CheckoutError;
use crate::gateway::{
    BillingDetails, ConfirmationOutcome, GatewayFailure, NextAction, PaymentGateway,
    PaymentMethodDetails,
};
use crate::models::{
    AuthenticatedUser, AuthorizationHandle, AuthorizationId, CardFieldEvent, CardFieldState,
    FieldMessage, PayerDetails,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthorizerState {
    #[default]
    Idle,
    Editing,
    ReadyToSubmit,
    Submitting,
    Succeeded,
    RequiresAction,
    Failed,
}

impl AuthorizerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuthorizerState::Succeeded | AuthorizerState::RequiresAction | AuthorizerState::Failed
        )
    }

    fn is_editable(self) -> bool {
        matches!(
            self,
            AuthorizerState::Idle | AuthorizerState::Editing | AuthorizerState::ReadyToSubmit
        )
    }
}

/// Authorization the gateway confirmed for the handle that was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedAuthorization {
    pub authorization_id: AuthorizationId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Confirmed(ConfirmedAuthorization),
    /// The payer must complete a gateway challenge; nothing is reconciled yet.
    ActionRequired {
        authorization_id: AuthorizationId,
        next_action: Option<NextAction>,
    },
    Declined(GatewayFailure),
}

#[derive(Debug, Default)]
struct AuthorizerInner {
    state: AuthorizerState,
    payer: PayerDetails,
    card: CardFieldState,
    consumed_secrets: HashSet<String>,
}

impl AuthorizerInner {
    fn ready(&self) -> bool {
        self.payer.is_valid() && self.card.all_complete()
    }

    fn recompute(&mut self) {
        if self.state.is_editable() {
            self.state = if self.ready() {
                AuthorizerState::ReadyToSubmit
            } else {
                AuthorizerState::Editing
            };
        }
    }

    fn submit_messages(&self) -> Vec<FieldMessage> {
        let mut messages = self.payer.messages();
        messages.extend(self.card.missing_messages());
        messages
    }
}

/// One payer's checkout form and its submission lifecycle.
#[derive(Debug, Default)]
pub struct CardAuthorizer {
    inner: Mutex<AuthorizerInner>,
}

impl CardAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AuthorizerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> AuthorizerState {
        self.lock().state
    }

    pub fn payer(&self) -> PayerDetails {
        self.lock().payer.clone()
    }

    pub fn card_state(&self) -> CardFieldState {
        self.lock().card
    }

    /// Copies the signed-in user's name and email into the payer form.
    pub fn prefill(&self, user: &AuthenticatedUser) {
        let mut inner = self.lock();
        inner.payer = PayerDetails::from(user);
        inner.recompute();
    }

    pub fn set_payer_name(&self, name: impl Into<String>) {
        let mut inner = self.lock();
        inner.payer.name = name.into();
        inner.recompute();
    }

    pub fn set_payer_email(&self, email: impl Into<String>) {
        let mut inner = self.lock();
        inner.payer.email = email.into();
        inner.recompute();
    }

    pub fn apply_card_event(&self, event: CardFieldEvent) {
        let mut inner = self.lock();
        inner.card.apply(event);
        inner.recompute();
    }

    pub fn can_submit(&self) -> bool {
        self.lock().state == AuthorizerState::ReadyToSubmit
    }

    /// Payer messages plus messages for card fields the payer visited and left incomplete.
    pub fn validation_messages(&self) -> Vec<FieldMessage> {
        let inner = self.lock();
        let mut messages = inner.payer.messages();
        messages.extend(inner.card.touched_messages());
        messages
    }

    /// Fails with a validation error listing every problem when the form is not ready.
    pub fn ensure_ready(&self) -> Result<(), CheckoutError> {
        let inner = self.lock();
        check_ready(&inner)
    }

    /// Claims the checkout attempt before an authorization handle exists.
    ///
    /// Moves the form to `Submitting`, so a second caller is turned away before it can create
    /// another payment intent. Hand the reservation to [`Submission::submit`], or [`release`] it
    /// if no handle could be obtained.
    ///
    /// [`release`]: Submission::release
    pub fn reserve(&self) -> Result<Submission<'_>, CheckoutError> {
        let mut inner = self.lock();
        match inner.state {
            AuthorizerState::Submitting => return Err(CheckoutError::SubmissionInFlight),
            state if state.is_terminal() => return Err(CheckoutError::AttemptFinished),
            _ => check_ready(&inner)?,
        }
        inner.state = AuthorizerState::Submitting;

        Ok(Submission {
            authorizer: self,
            payer: inner.payer.clone(),
            settled: false,
        })
    }

    /// Confirms the handle at the gateway with the widget's payment-method token.
    ///
    /// The handle is consumed; a second submission needs a fresh one after [`restart`].
    ///
    /// [`restart`]: CardAuthorizer::restart
    pub async fn submit(
        &self,
        handle: AuthorizationHandle,
        payment_method_token: impl Into<String>,
        gateway: &dyn PaymentGateway,
    ) -> Result<AuthorizationOutcome, CheckoutError> {
        self.reserve()?
            .submit(handle, payment_method_token, gateway)
            .await
    }

    /// Begins a new attempt after a decline or an unresolved challenge, keeping the form input.
    pub fn restart(&self) -> Result<(), CheckoutError> {
        let mut inner = self.lock();
        match inner.state {
            AuthorizerState::Failed | AuthorizerState::RequiresAction => {
                inner.state = AuthorizerState::Editing;
                inner.recompute();
                Ok(())
            }
            other => Err(CheckoutError::NotRestartable(other.to_string())),
        }
    }
}

/// A reserved checkout attempt.
///
/// Dropped before it settles (the caller gave up on the future, or never submitted), the
/// attempt is marked `Failed` so the form can be restarted. Consumed secrets stay consumed.
#[derive(Debug)]
pub struct Submission<'a> {
    authorizer: &'a CardAuthorizer,
    payer: PayerDetails,
    settled: bool,
}

impl Submission<'_> {
    /// Payer details captured when the attempt was reserved.
    pub fn payer(&self) -> &PayerDetails {
        &self.payer
    }

    /// Gives the attempt back to the form without contacting the gateway.
    pub fn release(mut self) {
        let mut inner = self.authorizer.lock();
        inner.state = AuthorizerState::Editing;
        inner.recompute();
        self.settled = true;
    }

    #[instrument(skip_all, fields(authorization_id = %handle.authorization_id()))]
    pub async fn submit(
        mut self,
        handle: AuthorizationHandle,
        payment_method_token: impl Into<String>,
        gateway: &dyn PaymentGateway,
    ) -> Result<AuthorizationOutcome, CheckoutError> {
        {
            let mut inner = self.authorizer.lock();
            let secret = handle.client_secret().expose().to_string();
            if inner.consumed_secrets.contains(&secret) {
                warn!("authorization handle already submitted");
                inner.state = AuthorizerState::Editing;
                inner.recompute();
                self.settled = true;
                return Err(CheckoutError::StaleAuthorization(
                    handle.authorization_id().clone(),
                ));
            }
            inner.consumed_secrets.insert(secret);
        }

        let details =
            PaymentMethodDetails::new(payment_method_token, BillingDetails::from(&self.payer));

        info!("confirming authorization with gateway");
        let outcome = gateway.confirm(handle.client_secret(), &details).await;

        let result = settle(&mut self.authorizer.lock(), handle.authorization_id(), outcome);
        self.settled = true;
        result
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.authorizer.lock();
        if inner.state == AuthorizerState::Submitting {
            warn!("submission abandoned before the gateway answered; marking attempt failed");
            inner.state = AuthorizerState::Failed;
        }
    }
}

fn settle(
    inner: &mut AuthorizerInner,
    expected: &AuthorizationId,
    outcome: ConfirmationOutcome,
) -> Result<AuthorizationOutcome, CheckoutError> {
    match outcome {
        ConfirmationOutcome::Succeeded { authorization_id } => {
            if &authorization_id != expected {
                return Err(mismatch(inner, expected, authorization_id));
            }
            inner.state = AuthorizerState::Succeeded;
            info!("authorization confirmed");
            Ok(AuthorizationOutcome::Confirmed(ConfirmedAuthorization {
                authorization_id,
            }))
        }
        ConfirmationOutcome::RequiresAction {
            authorization_id,
            next_action,
        } => {
            if &authorization_id != expected {
                return Err(mismatch(inner, expected, authorization_id));
            }
            inner.state = AuthorizerState::RequiresAction;
            info!(
                next_action = next_action.as_ref().map(|a| a.kind.as_str()).unwrap_or("none"),
                "gateway requires payer action"
            );
            Ok(AuthorizationOutcome::ActionRequired {
                authorization_id,
                next_action,
            })
        }
        ConfirmationOutcome::Failed { reason } => {
            inner.state = AuthorizerState::Failed;
            warn!(kind = %reason.kind, code = ?reason.code, "gateway declined authorization");
            Ok(AuthorizationOutcome::Declined(reason))
        }
    }
}

fn check_ready(inner: &AuthorizerInner) -> Result<(), CheckoutError> {
    if inner.ready() {
        return Ok(());
    }
    let messages = inner
        .submit_messages()
        .into_iter()
        .map(|m| m.message)
        .collect::<Vec<_>>()
        .join("; ");
    Err(CheckoutError::Validation(messages))
}

fn mismatch(
    inner: &mut AuthorizerInner,
    expected: &AuthorizationId,
    actual: AuthorizationId,
) -> CheckoutError {
    error!(%expected, %actual, "gateway confirmed a different authorization than submitted");
    inner.state = AuthorizerState::Failed;
    CheckoutError::AuthorizationMismatch {
        expected: expected.clone(),
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayErrorKind, MockPaymentGateway};
    use crate::models::{CardField, ClientSecret};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::time::Duration;

    fn handle(secret: &str) -> AuthorizationHandle {
        AuthorizationHandle::from_client_secret(secret).unwrap()
    }

    fn ready_authorizer() -> CardAuthorizer {
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

    fn succeeding(id: &'static str) -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_confirm().returning(move |_, _| ConfirmationOutcome::Succeeded {
            authorization_id: AuthorizationId::parse(id).unwrap(),
        });
        gateway
    }

    struct SlowGateway;

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn confirm(
            &self,
            client_secret: &ClientSecret,
            _payment_method: &PaymentMethodDetails,
        ) -> ConfirmationOutcome {
            tokio::time::sleep(Duration::from_secs(1)).await;
            ConfirmationOutcome::Succeeded {
                authorization_id: client_secret.authorization_id().clone(),
            }
        }
    }

    #[test]
    fn moves_through_editing_to_ready() {
        let authorizer = CardAuthorizer::new();
        assert_eq!(authorizer.state(), AuthorizerState::Idle);

        authorizer.set_payer_name("Jane");
        assert_eq!(authorizer.state(), AuthorizerState::Editing);

        let authorizer = ready_authorizer();
        assert_eq!(authorizer.state(), AuthorizerState::ReadyToSubmit);

        authorizer.set_payer_email("not-an-email");
        assert_eq!(authorizer.state(), AuthorizerState::Editing);
        assert!(!authorizer.can_submit());
    }

    #[test]
    fn prefill_uses_identity_user() {
        let authorizer = CardAuthorizer::new();
        authorizer.prefill(&AuthenticatedUser {
            name: Some("Jane".into()),
            email: Some("jane@example.com".into()),
            role: None,
        });
        assert_eq!(authorizer.payer().email, "jane@example.com");
        assert!(authorizer.validation_messages().is_empty());
        assert_eq!(authorizer.state(), AuthorizerState::Editing);
    }

    #[tokio::test]
    async fn not_ready_never_reaches_gateway() {
        let authorizer = CardAuthorizer::new();
        authorizer.set_payer_name("Jane");
        authorizer.set_payer_email("jane@example.com");

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_confirm().never();

        let err = authorizer
            .submit(handle("pi_1_secret_a"), "tok_visa", &gateway)
            .await
            .unwrap_err();
        assert_matches!(
            &err,
            CheckoutError::Validation(msg) if msg.contains("Card number is required")
        );
        assert_eq!(authorizer.state(), AuthorizerState::Editing);
    }

    #[tokio::test]
    async fn confirmed_id_matches_handle() {
        let authorizer = ready_authorizer();
        let outcome = authorizer
            .submit(handle("pi_123_secret_abc"), "tok_visa", &succeeding("pi_123"))
            .await
            .unwrap();

        assert_matches!(
            outcome,
            AuthorizationOutcome::Confirmed(ConfirmedAuthorization { authorization_id })
                if authorization_id.as_str() == "pi_123"
        );
        assert_eq!(authorizer.state(), AuthorizerState::Succeeded);
    }

    #[tokio::test]
    async fn billing_details_come_from_payer_form() {
        let authorizer = ready_authorizer();
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_confirm()
            .withf(|secret, pm| {
                secret.expose() == "pi_5_secret_z"
                    && pm.token == "tok_visa"
                    && pm.billing.name == "Jane Doe"
                    && pm.billing.email == "jane@example.com"
            })
            .times(1)
            .returning(|secret, _| ConfirmationOutcome::Succeeded {
                authorization_id: secret.authorization_id().clone(),
            });

        authorizer
            .submit(handle("pi_5_secret_z"), "tok_visa", &gateway)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mismatched_confirmation_is_a_defect() {
        let authorizer = ready_authorizer();
        let err = authorizer
            .submit(handle("pi_123_secret_abc"), "tok_visa", &succeeding("pi_999"))
            .await
            .unwrap_err();

        assert_matches!(err, CheckoutError::AuthorizationMismatch { .. });
        assert_eq!(authorizer.state(), AuthorizerState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_while_in_flight_is_rejected() {
        let authorizer = ready_authorizer();
        let gateway = SlowGateway;

        let (first, second) = tokio::join!(
            authorizer.submit(handle("pi_1_secret_a"), "tok_visa", &gateway),
            authorizer.submit(handle("pi_2_secret_b"), "tok_visa", &gateway),
        );

        assert_matches!(first, Ok(AuthorizationOutcome::Confirmed(_)));
        assert_matches!(second, Err(CheckoutError::SubmissionInFlight));
    }

    #[tokio::test]
    async fn declined_attempt_restarts_with_fresh_handle_only() {
        let authorizer = ready_authorizer();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_confirm().times(1).returning(|_, _| ConfirmationOutcome::Failed {
            reason: GatewayFailure::new(GatewayErrorKind::CardDeclined, "Your card was declined."),
        });

        let outcome = authorizer
            .submit(handle("pi_7_secret_a"), "tok_visa", &gateway)
            .await
            .unwrap();
        assert_matches!(
            outcome,
            AuthorizationOutcome::Declined(f) if f.kind == GatewayErrorKind::CardDeclined
        );

        assert_matches!(
            authorizer
                .submit(handle("pi_8_secret_b"), "tok_visa", &gateway)
                .await,
            Err(CheckoutError::AttemptFinished)
        );

        authorizer.restart().unwrap();
        assert_eq!(authorizer.state(), AuthorizerState::ReadyToSubmit);

        assert_matches!(
            authorizer
                .submit(handle("pi_7_secret_a"), "tok_visa", &gateway)
                .await,
            Err(CheckoutError::StaleAuthorization(id)) if id.as_str() == "pi_7"
        );
    }

    #[test]
    fn restart_only_after_terminal_failure() {
        let authorizer = ready_authorizer();
        assert_matches!(
            authorizer.restart(),
            Err(CheckoutError::NotRestartable(state)) if state == "ready_to_submit"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submission_can_be_restarted() {
        let authorizer = ready_authorizer();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            authorizer.submit(handle("pi_1_secret_a"), "tok_visa", &SlowGateway),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(authorizer.state(), AuthorizerState::Failed);

        authorizer.restart().unwrap();
        assert_eq!(authorizer.state(), AuthorizerState::ReadyToSubmit);
        assert_matches!(
            authorizer
                .submit(handle("pi_1_secret_a"), "tok_visa", &SlowGateway)
                .await,
            Err(CheckoutError::StaleAuthorization(id)) if id.as_str() == "pi_1"
        );
        assert_matches!(
            authorizer
                .submit(handle("pi_2_secret_b"), "tok_visa", &SlowGateway)
                .await,
            Ok(AuthorizationOutcome::Confirmed(_))
        );
    }

    #[test]
    fn reservation_blocks_until_released() {
        let authorizer = ready_authorizer();
        let submission = authorizer.reserve().unwrap();
        assert_eq!(submission.payer().name, "Jane Doe");
        assert_eq!(authorizer.state(), AuthorizerState::Submitting);
        assert_matches!(authorizer.reserve(), Err(CheckoutError::SubmissionInFlight));

        submission.release();
        assert_eq!(authorizer.state(), AuthorizerState::ReadyToSubmit);
        assert!(authorizer.reserve().is_ok());
    }

    #[test]
    fn unsubmitted_reservation_fails_the_attempt() {
        let authorizer = ready_authorizer();
        drop(authorizer.reserve().unwrap());
        assert_eq!(authorizer.state(), AuthorizerState::Failed);
        assert_matches!(authorizer.reserve(), Err(CheckoutError::AttemptFinished));
    }
}
