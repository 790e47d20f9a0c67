use http::StatusCode;
use payment_store::{Route, StoreError};
use thiserror::Error;

/// Errors surfaced by the gateway's own endpoints and startup
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Invalid payment request: {0}")]
    InvalidPayment(String),

    #[error("Invalid timestamp for {0}: {1}")]
    InvalidTimestamp(&'static str, String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single call to a payment processor
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream timeout for {0}")]
    UpstreamTimeout(Route),

    #[error("Upstream request failed for {0}: {1}")]
    UpstreamRequestFailed(Route, String),

    #[error("Upstream {0} answered with status {1}")]
    UnexpectedStatus(Route, StatusCode),

    #[error("Invalid response body from {0}: {1}")]
    ResponseBodyError(Route, String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouterError {
    #[error("payment queue is full")]
    Saturated,

    #[error("router is shut down")]
    Closed,
}

/// Failure to reach or understand the peer gateway instance
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Peer timeout")]
    Timeout,

    #[error("Peer request failed: {0}")]
    RequestFailed(String),

    #[error("Peer answered with status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("Invalid peer response body: {0}")]
    ResponseBodyError(String),
}
