//! Cached processor health with single-flight refresh.
//!
//! Processor health endpoints are rate limited. Every payment consults the
//! primary's health, so a cold cache under load would otherwise fire one probe
//! per in-flight payment. Each upstream gets one cache slot and one refresh
//! lock: the first caller past an expired entry probes, everyone queued behind
//! it re-checks the slot after acquiring the lock and reuses the fresh result.

use crate::errors::UpstreamError;
use crate::metrics_defs::{HEALTH_PROBE_FAILURES, HEALTH_PROBES};
use async_trait::async_trait;
use parking_lot::RwLock;
use payment_store::Route;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};

/// Response time reported for a processor whose probe failed.
pub const UNREACHABLE_RESPONSE_TIME_MS: u64 = u64::MAX;

/// What a processor reports about itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceHealth {
    pub failing: bool,
    pub min_response_time_ms: u64,
}

impl ServiceHealth {
    pub const UNREACHABLE: ServiceHealth = ServiceHealth {
        failing: true,
        min_response_time_ms: UNREACHABLE_RESPONSE_TIME_MS,
    };
}

#[derive(Clone, Copy, Debug)]
pub struct HealthState {
    pub failing: bool,
    pub min_response_time_ms: u64,
    pub expires_at: Instant,
}

impl HealthState {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, route: Route) -> Result<ServiceHealth, UpstreamError>;
}

#[derive(Default)]
struct Slot {
    cached: RwLock<Option<HealthState>>,
    refresh: Mutex<()>,
}

impl Slot {
    fn fresh(&self) -> Option<HealthState> {
        let now = Instant::now();
        let cached = *self.cached.read();
        cached.filter(|state| state.is_fresh(now))
    }
}

pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    ttl: Duration,
    probe_timeout: Duration,
    primary: Slot,
    secondary: Slot,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, ttl: Duration, probe_timeout: Duration) -> Self {
        Self {
            probe,
            ttl,
            probe_timeout,
            primary: Slot::default(),
            secondary: Slot::default(),
        }
    }

    /// Returns the cached health of `route`, probing only when the cached
    /// entry is missing or expired.
    pub async fn check(&self, route: Route) -> HealthState {
        let slot = self.slot(route);

        if let Some(state) = slot.fresh() {
            return state;
        }

        let _guard = slot.refresh.lock().await;

        // Someone else may have refreshed while we waited for the lock
        if let Some(state) = slot.fresh() {
            return state;
        }

        let health = self.probe(route).await;
        let state = HealthState {
            failing: health.failing,
            min_response_time_ms: health.min_response_time_ms,
            expires_at: Instant::now() + self.ttl,
        };
        *slot.cached.write() = Some(state);

        state
    }

    async fn probe(&self, route: Route) -> ServiceHealth {
        counter!(HEALTH_PROBES, "route" => route.as_str()).increment(1);

        let result = timeout(self.probe_timeout, self.probe.probe(route))
            .await
            .unwrap_or(Err(UpstreamError::UpstreamTimeout(route)));

        match result {
            Ok(health) => {
                tracing::debug!(
                    %route,
                    failing = health.failing,
                    min_response_time_ms = health.min_response_time_ms,
                    "Refreshed processor health"
                );
                health
            }
            Err(e) => {
                counter!(HEALTH_PROBE_FAILURES, "route" => route.as_str()).increment(1);
                tracing::warn!(
                    %route,
                    error = %e,
                    "Health probe failed, treating processor as failing"
                );
                ServiceHealth::UNREACHABLE
            }
        }
    }

    fn slot(&self, route: Route) -> &Slot {
        match route {
            Route::Primary => &self.primary,
            Route::Secondary => &self.secondary,
        }
    }
}
