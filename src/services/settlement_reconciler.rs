//! Settlement reconciliation.
//!
//! After the gateway confirms an authorization, the durable order is written by the backend's
//! webhook consumer at some later point. The reconciler polls the order lookup on a fixed
//! schedule until the order shows `succeeded` or the attempt budget runs out.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn, Instrument};

use crate::backend::BackendApi;
use crate::models::{AuthorizationId, OrderRecord};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed-interval polling budget. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Builds a policy, raising a zero interval to the one-millisecond floor.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Polling,
    Done,
    TimedOut,
    Aborted,
}

impl ReconciliationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReconciliationStatus::Polling)
    }
}

/// Progress snapshot published after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconciliationState {
    pub attempt: u32,
    pub status: ReconciliationStatus,
}

/// Terminal result of one reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Done {
        authorization_id: AuthorizationId,
        order: OrderRecord,
        attempts: u32,
    },
    TimedOut {
        authorization_id: AuthorizationId,
        attempts: u32,
    },
    /// No authorization id to reconcile.
    Aborted,
    /// The handle was stopped before a terminal state.
    Stopped { attempts: u32 },
}

impl Reconciliation {
    pub fn status(&self) -> ReconciliationStatus {
        match self {
            Reconciliation::Done { .. } => ReconciliationStatus::Done,
            Reconciliation::TimedOut { .. } => ReconciliationStatus::TimedOut,
            Reconciliation::Aborted | Reconciliation::Stopped { .. } => {
                ReconciliationStatus::Aborted
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Reconciliation::Done { attempts, .. }
            | Reconciliation::TimedOut { attempts, .. }
            | Reconciliation::Stopped { attempts } => *attempts,
            Reconciliation::Aborted => 0,
        }
    }

    pub fn order(&self) -> Option<&OrderRecord> {
        match self {
            Reconciliation::Done { order, .. } => Some(order),
            _ => None,
        }
    }
}

/// Polls the backend for the order written against a confirmed authorization.
#[derive(Clone)]
pub struct SettlementReconciler {
    backend: Arc<dyn BackendApi>,
    policy: PollPolicy,
}

impl SettlementReconciler {
    pub fn new(backend: Arc<dyn BackendApi>, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Spawns the polling task. Must be called from within a tokio runtime.
    ///
    /// An absent id yields a handle that is already `Aborted` and never fetches.
    pub fn start(&self, authorization_id: Option<AuthorizationId>) -> ReconcilerHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let Some(authorization_id) = authorization_id else {
            warn!("no authorization id to reconcile; aborting");
            let (state_tx, state_rx) = watch::channel(ReconciliationState {
                attempt: 0,
                status: ReconciliationStatus::Aborted,
            });
            drop(state_tx);
            return ReconcilerHandle {
                task: Some(tokio::spawn(async { Reconciliation::Aborted })),
                stop_tx,
                state_rx,
            };
        };

        let (state_tx, state_rx) = watch::channel(ReconciliationState {
            attempt: 0,
            status: ReconciliationStatus::Polling,
        });

        let span = tracing::info_span!("reconcile", authorization_id = %authorization_id);
        let task = tokio::spawn(
            poll_until_settled(
                Arc::clone(&self.backend),
                self.policy,
                authorization_id,
                state_tx,
                stop_rx,
            )
            .instrument(span),
        );

        ReconcilerHandle {
            task: Some(task),
            stop_tx,
            state_rx,
        }
    }

    /// Runs a reconciliation to completion.
    pub async fn reconcile(&self, authorization_id: Option<AuthorizationId>) -> Reconciliation {
        self.start(authorization_id).wait().await
    }
}

/// Owner of a running reconciliation. Dropping it cancels the polling task.
pub struct ReconcilerHandle {
    task: Option<JoinHandle<Reconciliation>>,
    stop_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<ReconciliationState>,
}

impl ReconcilerHandle {
    pub fn subscribe(&self) -> watch::Receiver<ReconciliationState> {
        self.state_rx.clone()
    }

    pub fn state(&self) -> ReconciliationState {
        *self.state_rx.borrow()
    }

    /// Asks the polling task to stop. `wait` then resolves to `Stopped` unless a
    /// terminal state was already reached.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    pub async fn wait(mut self) -> Reconciliation {
        let last_attempt = self.state().attempt;
        match self.task.take() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "reconciliation task ended abnormally");
                    Reconciliation::Stopped {
                        attempts: last_attempt,
                    }
                }
            },
            None => Reconciliation::Stopped {
                attempts: last_attempt,
            },
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[instrument(skip_all, fields(max_attempts = policy.max_attempts))]
async fn poll_until_settled(
    backend: Arc<dyn BackendApi>,
    policy: PollPolicy,
    authorization_id: AuthorizationId,
    state_tx: watch::Sender<ReconciliationState>,
    mut stop_rx: mpsc::Receiver<()>,
) -> Reconciliation {
    info!(interval_ms = policy.interval.as_millis() as u64, "reconciliation started");

    // `interval` panics on a zero period.
    let mut ticker = interval(policy.interval.max(MIN_POLL_INTERVAL));
    // A slow lookup pushes the schedule back instead of bunching up missed ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempt = 0u32;
    loop {
        tokio::select! {
            biased;
            Some(()) = stop_rx.recv() => return stopped(&state_tx, attempt),
            _ = ticker.tick() => {}
        }

        attempt += 1;
        state_tx.send_replace(ReconciliationState {
            attempt,
            status: ReconciliationStatus::Polling,
        });

        let fetched = tokio::select! {
            biased;
            Some(()) = stop_rx.recv() => return stopped(&state_tx, attempt),
            result = backend.get_order(&authorization_id) => result,
        };

        match fetched {
            Ok(Some(order)) if order.is_settled() => {
                info!(attempt, order_id = %order.order_id, "order settled");
                state_tx.send_replace(ReconciliationState {
                    attempt,
                    status: ReconciliationStatus::Done,
                });
                return Reconciliation::Done {
                    authorization_id,
                    order,
                    attempts: attempt,
                };
            }
            Ok(Some(order)) => {
                debug!(attempt, payment_status = %order.payment_status, "order not settled yet");
            }
            Ok(None) => debug!(attempt, "order not written yet"),
            Err(e) => warn!(attempt, error = %e, "order lookup failed; will retry"),
        }

        if attempt >= policy.max_attempts {
            warn!(
                attempts = attempt,
                "order not confirmed within the polling budget; the webhook may still settle it"
            );
            state_tx.send_replace(ReconciliationState {
                attempt,
                status: ReconciliationStatus::TimedOut,
            });
            return Reconciliation::TimedOut {
                authorization_id,
                attempts: attempt,
            };
        }
    }
}

fn stopped(state_tx: &watch::Sender<ReconciliationState>, attempt: u32) -> Reconciliation {
    info!(attempt, "reconciliation stopped");
    state_tx.send_replace(ReconciliationState {
        attempt,
        status: ReconciliationStatus::Aborted,
    });
    Reconciliation::Stopped { attempts: attempt }
}
