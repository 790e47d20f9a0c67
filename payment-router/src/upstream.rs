//! HTTP calls to the two payment processors.
//!
//! Every call is a single attempt bounded by its own timeout. Retrying and
//! choosing between processors is the router's job; recording the outcome is
//! the store's.

use crate::config::ProcessorsConfig;
use crate::errors::{GatewayError, UpstreamError};
use crate::health::{HealthProbe, ServiceHealth};
use crate::router::PendingPayment;
use async_trait::async_trait;
use chrono::SecondsFormat;
use payment_store::Route;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;
use uuid::Uuid;

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Submits `payment` to the processor behind `route` once.
    async fn submit(&self, route: Route, payment: &PendingPayment) -> Result<(), UpstreamError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessorPaymentRequest {
    correlation_id: Uuid,
    #[serde(serialize_with = "rust_decimal::serde::arbitrary_precision::serialize")]
    amount: Decimal,
    requested_at: String,
}

impl From<&PendingPayment> for ProcessorPaymentRequest {
    fn from(payment: &PendingPayment) -> Self {
        ProcessorPaymentRequest {
            correlation_id: payment.correlation_id,
            amount: payment.amount,
            requested_at: payment
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    failing: bool,
    min_response_time: u64,
}

/// reqwest-backed client for the primary and secondary processors
pub struct ProcessorClient {
    client: reqwest::Client,
    primary: Url,
    secondary: Url,
    submit_timeout: Duration,
    health_timeout: Duration,
}

impl ProcessorClient {
    pub fn new(config: &ProcessorsConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.submit_timeout())
            .build()
            .map_err(|e| GatewayError::HttpClientError(e.to_string()))?;

        Ok(ProcessorClient {
            client,
            primary: config.primary.url.clone(),
            secondary: config.secondary.url.clone(),
            submit_timeout: config.timeouts.submit_timeout(),
            health_timeout: config.timeouts.health_timeout(),
        })
    }

    fn endpoint(&self, route: Route, path: &str) -> Url {
        let base = match route {
            Route::Primary => &self.primary,
            Route::Secondary => &self.secondary,
        };
        join_path(base, path)
    }
}

/// Appends `path` to the base URL's own path.
pub(crate) fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

#[async_trait]
impl PaymentProcessor for ProcessorClient {
    async fn submit(&self, route: Route, payment: &PendingPayment) -> Result<(), UpstreamError> {
        let url = self.endpoint(route, "payments");
        let body = ProcessorPaymentRequest::from(payment);

        let response = timeout(
            self.submit_timeout,
            self.client.post(url).json(&body).send(),
        )
        .await
        .map_err(|_| UpstreamError::UpstreamTimeout(route))?
        .map_err(|e| UpstreamError::UpstreamRequestFailed(route, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::UnexpectedStatus(route, status));
        }

        Ok(())
    }
}

#[async_trait]
impl HealthProbe for ProcessorClient {
    async fn probe(&self, route: Route) -> Result<ServiceHealth, UpstreamError> {
        let url = self.endpoint(route, "payments/service-health");

        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| UpstreamError::UpstreamRequestFailed(route, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::UnexpectedStatus(route, status));
            }

            response
                .json::<HealthResponse>()
                .await
                .map_err(|e| UpstreamError::ResponseBodyError(route, e.to_string()))
        };

        let health = timeout(self.health_timeout, request)
            .await
            .map_err(|_| UpstreamError::UpstreamTimeout(route))??;

        Ok(ServiceHealth {
            failing: health.failing,
            min_response_time_ms: health.min_response_time,
        })
    }
}
