use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use validator::Validate;

use super::payer::PayerDetails;
use crate::errors::CheckoutError;

/// What is being bought: a catalog plan, or a negotiated custom-plan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PlanReference {
    Plan(String),
    CustomPlanRequest(String),
}

impl PlanReference {
    pub fn plan_id(&self) -> Option<&str> {
        match self {
            PlanReference::Plan(id) => Some(id),
            PlanReference::CustomPlanRequest(_) => None,
        }
    }

    pub fn custom_plan_request_id(&self) -> Option<&str> {
        match self {
            PlanReference::CustomPlanRequest(id) => Some(id),
            PlanReference::Plan(_) => None,
        }
    }
}

impl fmt::Display for PlanReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanReference::Plan(id) => write!(f, "plan:{}", id),
            PlanReference::CustomPlanRequest(id) => write!(f, "custom:{}", id),
        }
    }
}

/// The payer's selection from the catalog, made before any payment input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSelection {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub plan: PlanReference,
    /// Authoritative price; a custom plan may supersede the catalog price.
    pub amount: Decimal,
    pub description: Option<String>,
}

impl PlanSelection {
    pub fn new(plan: PlanReference, amount: Decimal) -> Result<Self, CheckoutError> {
        if amount <= Decimal::ZERO {
            return Err(CheckoutError::Validation(format!(
                "amount must be greater than zero, got {}",
                amount
            )));
        }
        Ok(Self {
            service_id: None,
            service_name: None,
            plan,
            amount,
            description: None,
        })
    }

    pub fn with_service(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.service_id = Some(id.into());
        self.service_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything the backend needs to open one authorization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderContext {
    selection: PlanSelection,
    payer: PayerDetails,
}

impl OrderContext {
    pub fn new(selection: PlanSelection, payer: PayerDetails) -> Result<Self, CheckoutError> {
        payer.validate()?;
        if selection.amount <= Decimal::ZERO {
            return Err(CheckoutError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        Ok(Self { selection, payer })
    }

    pub fn selection(&self) -> &PlanSelection {
        &self.selection
    }

    pub fn payer(&self) -> &PayerDetails {
        &self.payer
    }

    pub fn amount(&self) -> Decimal {
        self.selection.amount
    }

    pub fn plan_reference(&self) -> &PlanReference {
        &self.selection.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive_amount() {
        assert_matches!(
            PlanSelection::new(PlanReference::Plan("P1".into()), dec!(0)),
            Err(CheckoutError::Validation(_))
        );
        assert_matches!(
            PlanSelection::new(PlanReference::Plan("P1".into()), dec!(-5.00)),
            Err(CheckoutError::Validation(_))
        );
    }

    #[test]
    fn exactly_one_plan_reference() {
        let plan = PlanReference::Plan("P1".into());
        assert_eq!(plan.plan_id(), Some("P1"));
        assert_eq!(plan.custom_plan_request_id(), None);

        let custom = PlanReference::CustomPlanRequest("C9".into());
        assert_eq!(custom.plan_id(), None);
        assert_eq!(custom.custom_plan_request_id(), Some("C9"));
    }

    #[test]
    fn context_requires_valid_payer() {
        let selection = PlanSelection::new(PlanReference::Plan("P1".into()), dec!(49.99)).unwrap();
        assert_matches!(
            OrderContext::new(selection.clone(), PayerDetails::new("", "jane@example.com")),
            Err(CheckoutError::Validation(_))
        );

        let ctx = OrderContext::new(selection, PayerDetails::new("Jane", "jane@example.com"))
            .unwrap();
        assert_eq!(ctx.amount(), dec!(49.99));
        assert_eq!(ctx.plan_reference().to_string(), "plan:P1");
    }
}
