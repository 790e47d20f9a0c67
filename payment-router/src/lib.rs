pub mod aggregator;
pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics_defs;
pub mod peer;
pub mod router;
pub mod upstream;

#[cfg(test)]
mod testutils;

use crate::aggregator::SummaryAggregator;
use crate::api::{AdminService, GatewayService};
use crate::config::Config;
use crate::errors::GatewayError;
use crate::health::HealthMonitor;
use crate::peer::PeerClient;
use crate::router::Router;
use crate::upstream::ProcessorClient;
use payment_store::{InMemoryStore, PaymentStore};
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Runs one gateway instance until both listeners fail or ctrl-c is received.
pub async fn run(config: Config) -> Result<(), GatewayError> {
    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryStore::new());
    let processors = Arc::new(ProcessorClient::new(&config.processors)?);
    let health = Arc::new(HealthMonitor::new(
        processors.clone(),
        config.health.ttl(),
        config.processors.timeouts.health_timeout(),
    ));
    let router = Arc::new(Router::new(
        &config.router,
        health,
        processors,
        store.clone(),
    ));

    let peer = config.peer.as_ref().map(PeerClient::new).transpose()?;
    let ready = Arc::new(AtomicBool::new(peer.is_none()));
    if let Some(peer) = peer.clone() {
        let ready = ready.clone();
        tokio::spawn(async move {
            peer.wait_until_reachable().await;
            ready.store(true, Ordering::Release);
        });
    }
    let aggregator = Arc::new(SummaryAggregator::new(store.clone(), peer));

    tracing::info!(instance = %config.instance_name, "Starting payment gateway");

    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        GatewayService::new(router.clone(), store, aggregator),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(ready),
    );

    let result = tokio::select! {
        result = async { tokio::try_join!(gateway_task, admin_task).map(|_| ()) } => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received ctrl-c, shutting down");
            Ok(())
        }
    };

    router.shutdown().await;
    result
}
