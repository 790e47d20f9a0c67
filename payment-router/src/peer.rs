//! Client for the other gateway instance.

use crate::config::PeerConfig;
use crate::errors::{GatewayError, PeerError};
use crate::upstream::join_path;
use chrono::{DateTime, SecondsFormat, Utc};
use payment_store::{PaymentSummary, TimeWindow};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

#[derive(Clone)]
pub struct PeerClient {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
    check_interval: Duration,
}

impl PeerClient {
    pub fn new(config: &PeerConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::HttpClientError(e.to_string()))?;

        Ok(PeerClient {
            client,
            base: config.url.clone(),
            timeout: config.timeout(),
            check_interval: config.startup_check_interval(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.base
    }

    /// Fetches the peer's own summary for `window`, never its merged one.
    pub async fn local_summary(&self, window: TimeWindow) -> Result<PaymentSummary, PeerError> {
        let url = local_summary_url(&self.base, window);

        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| PeerError::RequestFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(PeerError::UnexpectedStatus(status));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| PeerError::ResponseBodyError(e.to_string()))?;

            serde_json::from_slice(&body).map_err(|e| PeerError::ResponseBodyError(e.to_string()))
        };

        timeout(self.timeout, request)
            .await
            .map_err(|_| PeerError::Timeout)?
    }

    pub async fn check_status(&self) -> Result<(), PeerError> {
        let url = join_path(&self.base, "check-status");

        let response = timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| PeerError::Timeout)?
            .map_err(|e| PeerError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::UnexpectedStatus(status));
        }
        Ok(())
    }

    /// Polls the peer's status endpoint until it answers.
    pub async fn wait_until_reachable(&self) {
        loop {
            match self.check_status().await {
                Ok(()) => {
                    tracing::info!(peer = %self.base, "Peer instance is reachable");
                    return;
                }
                Err(e) => {
                    tracing::info!(
                        peer = %self.base,
                        error = %e,
                        "Peer instance not reachable yet"
                    );
                }
            }
            tokio::time::sleep(self.check_interval).await;
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn local_summary_url(base: &Url, window: TimeWindow) -> Url {
    let mut url = join_path(base, "local-summary");
    {
        let mut query = url.query_pairs_mut();
        if let Some(from) = window.from {
            query.append_pair("from", &format_timestamp(from));
        }
        if let Some(to) = window.to {
            query.append_pair("to", &format_timestamp(to));
        }
    }
    if window.is_unbounded() {
        url.set_query(None);
    }
    url
}
