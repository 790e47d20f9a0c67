//! Fleet-wide summaries: this instance's store merged with the peer's.
//!
//! The local read and the peer request run concurrently. The peer side is
//! bounded by the peer timeout; if it fails for any reason the local summary is
//! returned on its own rather than failing the query.

use crate::metrics_defs::{PEER_SUMMARY_FAILURES, SUMMARY_DURATION};
use crate::peer::PeerClient;
use payment_store::{PaymentStore, PaymentSummary, StoreError, TimeWindow};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

pub struct SummaryAggregator {
    store: Arc<dyn PaymentStore>,
    peer: Option<PeerClient>,
}

impl SummaryAggregator {
    pub fn new(store: Arc<dyn PaymentStore>, peer: Option<PeerClient>) -> Self {
        Self { store, peer }
    }

    pub async fn aggregate(&self, window: TimeWindow) -> Result<PaymentSummary, StoreError> {
        let started = Instant::now();

        let Some(peer) = &self.peer else {
            let local = self.store.summary(window).await?;
            histogram!(SUMMARY_DURATION, "scope" => "local")
                .record(started.elapsed().as_secs_f64());
            return Ok(local);
        };

        let (local, remote) = tokio::join!(
            self.store.summary(window),
            peer.local_summary(window)
        );
        let local = local?;

        let merged = match remote {
            Ok(remote) => match local.try_merge(&remote) {
                Ok(merged) => merged,
                Err(e) => {
                    counter!(PEER_SUMMARY_FAILURES, "reason" => "merge").increment(1);
                    tracing::warn!(
                        peer = %peer.url(),
                        error = %e,
                        "Could not merge peer summary, returning local summary"
                    );
                    local
                }
            },
            Err(e) => {
                counter!(PEER_SUMMARY_FAILURES, "reason" => "unavailable").increment(1);
                tracing::warn!(
                    peer = %peer.url(),
                    error = %e,
                    "Peer summary unavailable, returning local summary"
                );
                local
            }
        };

        histogram!(SUMMARY_DURATION, "scope" => "merged")
            .record(started.elapsed().as_secs_f64());
        Ok(merged)
    }
}
