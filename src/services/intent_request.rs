use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::backend::{BackendApi, CreatePaymentIntentRequest};
use crate::errors::IntentCreationError;
use crate::models::{AuthorizationHandle, OrderContext};

/// Requests authorization handles from the backend, one per checkout attempt.
#[derive(Clone)]
pub struct IntentRequestClient {
    backend: Arc<dyn BackendApi>,
}

impl IntentRequestClient {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }

    /// Issues exactly one intent-creation request. Calling twice opens two authorizations.
    #[instrument(skip(self, ctx), fields(plan = %ctx.plan_reference(), amount = %ctx.amount()))]
    pub async fn request_authorization(
        &self,
        ctx: &OrderContext,
    ) -> Result<AuthorizationHandle, IntentCreationError> {
        let request = CreatePaymentIntentRequest::from(ctx);

        let response = self
            .backend
            .create_payment_intent(&request)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to create payment intent");
                IntentCreationError::from(e)
            })?;

        let handle = AuthorizationHandle::from_client_secret(response.client_secret)?;
        info!(authorization_id = %handle.authorization_id(), "authorization handle issued");
        Ok(handle)
    }
}
