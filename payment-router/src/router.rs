//! Failover routing of accepted payments onto a fixed pool of workers.
//!
//! `route` only enqueues. Workers pull pending payments off one bounded
//! channel and run each to completion: primary if its cached health allows,
//! secondary otherwise or on primary failure, then sleep the backoff interval
//! and start over when both refused. A payment reaches the store only after a
//! processor accepted it, and only once.

use crate::config::RouterConfig;
use crate::errors::RouterError;
use crate::health::HealthMonitor;
use crate::metrics_defs::{
    PAYMENT_RETRIES, PAYMENTS_ABANDONED, PAYMENTS_ACCEPTED, PAYMENTS_RECORDED, PAYMENTS_REJECTED,
    QUEUE_DEPTH, STORE_ERRORS, UPSTREAM_FAILURES,
};
use crate::upstream::PaymentProcessor;
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use payment_store::{PaymentRecord, PaymentStore, Route};
use rust_decimal::Decimal;
use shared::{counter, gauge};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A payment accepted by the gateway but not yet taken by a processor.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingPayment {
    pub correlation_id: Uuid,
    pub amount: Decimal,
    pub submitted_at: DateTime<Utc>,
}

impl PendingPayment {
    /// Stamps the payment with the current time at millisecond precision, the
    /// resolution processors receive in `requestedAt`.
    pub fn new(correlation_id: Uuid, amount: Decimal) -> Self {
        PendingPayment {
            correlation_id,
            amount,
            submitted_at: Utc::now().trunc_subsecs(3),
        }
    }

    pub fn into_record(self, route: Route) -> PaymentRecord {
        PaymentRecord {
            correlation_id: self.correlation_id,
            amount: self.amount,
            submitted_at: self.submitted_at,
            route,
        }
    }
}

pub struct Router {
    sender: Mutex<Option<mpsc::Sender<PendingPayment>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    abandoned: Arc<Mutex<HashSet<Uuid>>>,
    shutdown: watch::Sender<bool>,
    enqueue_timeout: Duration,
}

impl Router {
    /// Spawns `config.workers` workers sharing one queue of `config.queue_size`.
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &RouterConfig,
        health: Arc<HealthMonitor>,
        processor: Arc<dyn PaymentProcessor>,
        store: Arc<dyn PaymentStore>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size);
        let (shutdown, _) = watch::channel(false);
        let abandoned = Arc::new(Mutex::new(HashSet::new()));

        let dispatcher = Arc::new(Dispatcher {
            health,
            processor,
            store,
            backoff: config.backoff(),
            max_attempts: config.max_attempts,
            abandoned: abandoned.clone(),
        });

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..config.workers)
            .map(|_| {
                tokio::spawn(run_worker(
                    receiver.clone(),
                    dispatcher.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_size = config.queue_size,
            "Started payment router"
        );

        Router {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            abandoned,
            shutdown,
            enqueue_timeout: config.enqueue_timeout(),
        }
    }

    /// Accepts a payment for asynchronous processing. Returns as soon as the
    /// payment is queued; no upstream call happens on the caller's task.
    pub async fn route(&self, correlation_id: Uuid, amount: Decimal) -> Result<(), RouterError> {
        let payment = PendingPayment::new(correlation_id, amount);

        let sender = self.sender.lock().clone().ok_or(RouterError::Closed)?;

        match sender.send_timeout(payment, self.enqueue_timeout).await {
            Ok(()) => {
                counter!(PAYMENTS_ACCEPTED).increment(1);
                gauge!(QUEUE_DEPTH).increment(1.0);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                counter!(PAYMENTS_REJECTED, "reason" => "saturated").increment(1);
                tracing::warn!(%correlation_id, "Payment queue saturated, rejecting payment");
                Err(RouterError::Saturated)
            }
            Err(SendTimeoutError::Closed(_)) => {
                counter!(PAYMENTS_REJECTED, "reason" => "closed").increment(1);
                Err(RouterError::Closed)
            }
        }
    }

    /// Correlation ids given up on after exhausting `max_attempts`, or left
    /// unprocessed by shutdown.
    pub fn abandoned(&self) -> HashSet<Uuid> {
        self.abandoned.lock().clone()
    }

    /// Forgets every abandoned correlation id. Called when the store is purged.
    pub fn clear_abandoned(&self) {
        self.abandoned.lock().clear();
    }

    /// Stops accepting payments and waits for the workers to drain the queue.
    ///
    /// Queued payments still get one attempt each. Payments waiting out a
    /// backoff are abandoned instead of retried.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        self.shutdown.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Router worker panicked");
            }
        }

        tracing::info!("Payment router stopped");
    }
}

async fn run_worker(
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingPayment>>>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(payment) = next else {
            break;
        };
        gauge!(QUEUE_DEPTH).decrement(1.0);

        dispatcher.process(payment, &mut shutdown).await;
    }
}

struct Dispatcher {
    health: Arc<HealthMonitor>,
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn PaymentStore>,
    backoff: Duration,
    max_attempts: Option<u32>,
    abandoned: Arc<Mutex<HashSet<Uuid>>>,
}

impl Dispatcher {
    async fn process(&self, payment: PendingPayment, shutdown: &mut watch::Receiver<bool>) {
        let correlation_id = payment.correlation_id;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(route) = self.attempt(&payment, attempt).await {
                self.record(payment.into_record(route)).await;
                return;
            }

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                tracing::error!(
                    %correlation_id,
                    attempt,
                    "Both processors refused payment, giving up"
                );
                self.abandon(correlation_id);
                return;
            }

            counter!(PAYMENT_RETRIES).increment(1);
            tracing::debug!(
                %correlation_id,
                attempt,
                backoff = ?self.backoff,
                "Both processors refused payment, backing off"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    tracing::warn!(
                        %correlation_id,
                        attempt,
                        "Router shutting down, abandoning payment"
                    );
                    self.abandon(correlation_id);
                    return;
                }
            }
        }
    }

    /// One pass of the failover policy. Returns the route that accepted the
    /// payment, if any.
    async fn attempt(&self, payment: &PendingPayment, attempt: u32) -> Option<Route> {
        let primary = self.health.check(Route::Primary).await;

        if !primary.failing {
            if self.submit(Route::Primary, payment, attempt).await {
                return Some(Route::Primary);
            }
        } else {
            tracing::debug!(
                correlation_id = %payment.correlation_id,
                "Primary reported failing, skipping to secondary"
            );
        }

        if self.submit(Route::Secondary, payment, attempt).await {
            return Some(Route::Secondary);
        }

        None
    }

    async fn submit(&self, route: Route, payment: &PendingPayment, attempt: u32) -> bool {
        match self.processor.submit(route, payment).await {
            Ok(()) => true,
            Err(e) => {
                counter!(UPSTREAM_FAILURES, "route" => route.as_str()).increment(1);
                tracing::debug!(
                    correlation_id = %payment.correlation_id,
                    %route,
                    attempt,
                    error = %e,
                    "Processor refused payment"
                );
                false
            }
        }
    }

    async fn record(&self, record: PaymentRecord) {
        let correlation_id = record.correlation_id;
        let route = record.route;

        match self.store.record(record).await {
            Ok(()) => {
                counter!(PAYMENTS_RECORDED, "route" => route.as_str()).increment(1);
            }
            Err(e) => {
                // The processor already holds the payment; retrying upstream
                // would charge it twice.
                counter!(STORE_ERRORS).increment(1);
                tracing::error!(
                    %correlation_id,
                    %route,
                    error = %e,
                    "Failed to record processed payment"
                );
            }
        }
    }

    fn abandon(&self, correlation_id: Uuid) {
        counter!(PAYMENTS_ABANDONED).increment(1);
        self.abandoned.lock().insert(correlation_id);
    }
}
