//! Checkout domain types.
//!
//! Plain data shared by the authorization, confirmation and settlement components.
//! Nothing in here performs I/O.

pub mod authorization;
pub mod card;
pub mod order_context;
pub mod order_record;
pub mod payer;

pub use authorization::{AuthorizationHandle, AuthorizationId, ClientSecret};
pub use card::{CardField, CardFieldEvent, CardFieldState};
pub use order_context::{OrderContext, PlanReference, PlanSelection};
pub use order_record::{CatalogSummary, OrderRecord, OrderUser, PaymentStatus};
pub use payer::{AuthenticatedUser, FieldMessage, FormField, PayerDetails};
