//! Checkout services: intent creation, card authorization, settlement reconciliation and the
//! flow that runs them in order.

pub mod card_authorizer;
pub mod checkout_flow;
pub mod intent_request;
pub mod settlement_reconciler;

pub use card_authorizer::{
    AuthorizationOutcome, AuthorizerState, CardAuthorizer, ConfirmedAuthorization, Submission,
};
pub use checkout_flow::{CheckoutFlow, CheckoutOutcome};
pub use intent_request::IntentRequestClient;
pub use settlement_reconciler::{
    PollPolicy, Reconciliation, ReconcilerHandle, ReconciliationState, ReconciliationStatus,
    SettlementReconciler,
};
