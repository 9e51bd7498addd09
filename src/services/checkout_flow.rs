use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::card_authorizer::{AuthorizationOutcome, CardAuthorizer};
use super::intent_request::IntentRequestClient;
use super::settlement_reconciler::{PollPolicy, Reconciliation, SettlementReconciler};
use crate::backend::BackendApi;
use crate::errors::CheckoutError;
use crate::gateway::{GatewayFailure, NextAction, PaymentGateway};
use crate::models::{AuthorizationId, OrderContext, OrderRecord, PlanSelection};
use crate::navigation::{CancelReason, Navigator, Route};

/// How one checkout attempt ended.
#[derive(Debug)]
pub enum CheckoutOutcome {
    Settled {
        authorization_id: AuthorizationId,
        order: OrderRecord,
        attempts: u32,
    },
    Declined(GatewayFailure),
    /// The gateway wants a payer challenge; the form stays open.
    ActionRequired {
        authorization_id: AuthorizationId,
        next_action: Option<NextAction>,
    },
    TimedOut {
        authorization_id: AuthorizationId,
        attempts: u32,
    },
    Aborted,
    /// Validation, intent creation, misuse and defects. None of these navigate.
    Failed(CheckoutError),
}

impl CheckoutOutcome {
    /// The terminal view for this outcome, if any.
    pub fn route(&self) -> Option<Route> {
        match self {
            CheckoutOutcome::Settled {
                authorization_id,
                order,
                ..
            } => Some(Route::Success {
                authorization_id: authorization_id.clone(),
                order: order.clone(),
            }),
            CheckoutOutcome::Declined(failure) => Some(Route::Cancel {
                reason: CancelReason::Declined {
                    failure: failure.clone(),
                },
            }),
            CheckoutOutcome::TimedOut { attempts, .. } => Some(Route::Cancel {
                reason: CancelReason::ReconciliationTimeout {
                    attempts: *attempts,
                },
            }),
            CheckoutOutcome::Aborted => Some(Route::Cancel {
                reason: CancelReason::Aborted,
            }),
            CheckoutOutcome::ActionRequired { .. } | CheckoutOutcome::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<OrderRecord, CheckoutError> {
        match self {
            CheckoutOutcome::Settled { order, .. } => Ok(order),
            CheckoutOutcome::Declined(failure) => Err(CheckoutError::Gateway(failure)),
            CheckoutOutcome::ActionRequired {
                authorization_id, ..
            } => Err(CheckoutError::ActionRequired(authorization_id)),
            CheckoutOutcome::TimedOut { attempts, .. } => {
                Err(CheckoutError::ReconciliationTimeout { attempts })
            }
            CheckoutOutcome::Aborted => Err(CheckoutError::MissingAuthorization),
            CheckoutOutcome::Failed(err) => Err(err),
        }
    }
}

impl From<Reconciliation> for CheckoutOutcome {
    fn from(reconciliation: Reconciliation) -> Self {
        match reconciliation {
            Reconciliation::Done {
                authorization_id,
                order,
                attempts,
            } => CheckoutOutcome::Settled {
                authorization_id,
                order,
                attempts,
            },
            Reconciliation::TimedOut {
                authorization_id,
                attempts,
            } => CheckoutOutcome::TimedOut {
                authorization_id,
                attempts,
            },
            Reconciliation::Aborted | Reconciliation::Stopped { .. } => CheckoutOutcome::Aborted,
        }
    }
}

/// Runs intent creation, gateway confirmation and settlement reconciliation in order.
pub struct CheckoutFlow {
    intents: IntentRequestClient,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: SettlementReconciler,
    navigator: Arc<dyn Navigator>,
}

impl CheckoutFlow {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        gateway: Arc<dyn PaymentGateway>,
        navigator: Arc<dyn Navigator>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            intents: IntentRequestClient::new(Arc::clone(&backend)),
            gateway,
            reconciler: SettlementReconciler::new(backend, policy),
            navigator,
        }
    }

    pub fn reconciler(&self) -> &SettlementReconciler {
        &self.reconciler
    }

    /// One checkout attempt for `selection` with the payer and card state held by `authorizer`.
    #[instrument(skip_all, fields(plan = %selection.plan, amount = %selection.amount))]
    pub async fn run(
        &self,
        selection: &PlanSelection,
        authorizer: &CardAuthorizer,
        payment_method_token: &str,
    ) -> CheckoutOutcome {
        let outcome = self.attempt(selection, authorizer, payment_method_token).await;
        self.finish(outcome)
    }

    /// Reconciles from the success redirect's `payment_intent` query parameter.
    #[instrument(skip(self))]
    pub async fn resume(&self, payment_intent: Option<&str>) -> CheckoutOutcome {
        let authorization_id = payment_intent.and_then(AuthorizationId::parse);
        let reconciliation = self.reconciler.reconcile(authorization_id).await;
        self.finish(CheckoutOutcome::from(reconciliation))
    }

    async fn attempt(
        &self,
        selection: &PlanSelection,
        authorizer: &CardAuthorizer,
        payment_method_token: &str,
    ) -> CheckoutOutcome {
        // Claimed before the intent exists so a finished or in-flight attempt never creates one.
        let submission = match authorizer.reserve() {
            Ok(submission) => submission,
            Err(err) => return CheckoutOutcome::Failed(err),
        };

        let ctx = match OrderContext::new(selection.clone(), submission.payer().clone()) {
            Ok(ctx) => ctx,
            Err(err) => {
                submission.release();
                return CheckoutOutcome::Failed(err);
            }
        };

        let handle = match self.intents.request_authorization(&ctx).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "could not start payment; staying on the form");
                submission.release();
                return CheckoutOutcome::Failed(err.into());
            }
        };

        let confirmed = match submission
            .submit(handle, payment_method_token, self.gateway.as_ref())
            .await
        {
            Ok(AuthorizationOutcome::Confirmed(confirmed)) => confirmed,
            Ok(AuthorizationOutcome::ActionRequired {
                authorization_id,
                next_action,
            }) => {
                return CheckoutOutcome::ActionRequired {
                    authorization_id,
                    next_action,
                }
            }
            Ok(AuthorizationOutcome::Declined(failure)) => {
                return CheckoutOutcome::Declined(failure)
            }
            Err(err) => return CheckoutOutcome::Failed(err),
        };

        let reconciliation = self
            .reconciler
            .reconcile(Some(confirmed.authorization_id))
            .await;
        CheckoutOutcome::from(reconciliation)
    }

    fn finish(&self, outcome: CheckoutOutcome) -> CheckoutOutcome {
        match outcome.route() {
            Some(route) => {
                info!(path = %route.path(), "checkout reached a terminal view");
                self.navigator.navigate(&route);
            }
            None => {
                if let CheckoutOutcome::Failed(err) = &outcome {
                    info!(kind = %err.kind(), "checkout stopped before a terminal view");
                }
            }
        }
        outcome
    }
}
