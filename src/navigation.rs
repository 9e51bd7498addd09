use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

use crate::gateway::GatewayFailure;
use crate::models::{AuthorizationId, OrderRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    Declined { failure: GatewayFailure },
    ReconciliationTimeout { attempts: u32 },
    Aborted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Declined { failure } => write!(f, "declined ({})", failure.kind),
            CancelReason::ReconciliationTimeout { attempts } => {
                write!(f, "reconciliation timed out after {} attempts", attempts)
            }
            CancelReason::Aborted => f.write_str("aborted"),
        }
    }
}

/// Terminal view a checkout attempt ends on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Success {
        authorization_id: AuthorizationId,
        order: OrderRecord,
    },
    Cancel { reason: CancelReason },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Success {
                authorization_id, ..
            } => format!("/success?payment_intent={}", authorization_id),
            Route::Cancel { .. } => "/cancel".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Route::Success { .. })
    }
}

/// Receives terminal routes. Non-terminal states never navigate.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &Route);
}

/// Navigator that only records the route in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: &Route) {
        match route {
            Route::Success { order, .. } => {
                info!(
                    path = %route.path(),
                    order_id = %order.order_id,
                    "navigating to success view"
                )
            }
            Route::Cancel { reason } => {
                info!(path = %route.path(), %reason, "navigating to cancellation view")
            }
        }
    }
}

/// Navigator that keeps every route it was given, in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        match self.routes.lock() {
            Ok(routes) => routes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<Route> {
        self.routes().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &Route) {
        TracingNavigator.navigate(route);
        match self.routes.lock() {
            Ok(mut routes) => routes.push(route.clone()),
            Err(poisoned) => poisoned.into_inner().push(route.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorKind;

    #[test]
    fn paths_match_storefront_views() {
        let cancel = Route::Cancel {
            reason: CancelReason::ReconciliationTimeout { attempts: 10 },
        };
        assert_eq!(cancel.path(), "/cancel");

        let declined = Route::Cancel {
            reason: CancelReason::Declined {
                failure: GatewayFailure::new(GatewayErrorKind::CardDeclined, "declined"),
            },
        };
        assert_eq!(
            serde_json::to_value(&declined).unwrap()["reason"]["kind"],
            serde_json::json!("declined")
        );
        assert!(!declined.is_success());
    }
}
