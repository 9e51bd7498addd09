//! Storefront checkout library
//!
//! Payment authorization against a card gateway and reconciliation of the confirmed payment
//! with the order the storefront backend writes once the gateway's webhook arrives.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod backend;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod navigation;
pub mod services;

pub use backend::{BackendApi, HttpBackend};
pub use config::{load_config, CheckoutConfig};
pub use errors::{CheckoutError, ErrorKind, IntentCreationError};
pub use gateway::{ConfirmationOutcome, GatewayFailure, PaymentGateway, StripeGateway};
pub use navigation::{Navigator, Route, TracingNavigator};
pub use services::{
    CardAuthorizer, CheckoutFlow, CheckoutOutcome, IntentRequestClient, PollPolicy,
    Reconciliation, SettlementReconciler,
};
