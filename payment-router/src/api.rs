use crate::aggregator::SummaryAggregator;
use crate::errors::{GatewayError, RouterError};
use crate::router::Router;
use chrono::{DateTime, NaiveDateTime, Utc};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use payment_store::{PaymentStore, TimeWindow};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::http::{full_body, make_boxed_error_response, make_empty_response, make_json_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use url::form_urlencoded;
use uuid::Uuid;

type GatewayResponse = Response<BoxBody<Bytes, GatewayError>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    correlation_id: Uuid,
    amount: serde_json::Number,
}

impl PaymentRequest {
    /// The amount exactly as written. Values a decimal cannot hold without
    /// rounding are refused.
    fn amount(&self) -> Result<Decimal, GatewayError> {
        let literal = self.amount.to_string();
        let parsed = if literal.contains(['e', 'E']) {
            Decimal::from_scientific(&literal)
        } else {
            Decimal::from_str_exact(&literal)
        };
        let amount = parsed.map_err(|e| {
            GatewayError::InvalidPayment(format!("amount {literal} is not exact: {e}"))
        })?;

        if amount < Decimal::ZERO {
            return Err(GatewayError::InvalidPayment(format!(
                "amount must not be negative, got {amount}"
            )));
        }
        Ok(amount)
    }
}

/// Public endpoints of one gateway instance.
#[derive(Clone)]
pub struct GatewayService {
    router: Arc<Router>,
    store: Arc<dyn PaymentStore>,
    aggregator: Arc<SummaryAggregator>,
}

impl GatewayService {
    pub fn new(
        router: Arc<Router>,
        store: Arc<dyn PaymentStore>,
        aggregator: Arc<SummaryAggregator>,
    ) -> Self {
        Self {
            router,
            store,
            aggregator,
        }
    }

    pub async fn handle<B>(self, req: Request<B>) -> GatewayResponse
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);

        let result = match (method, path.as_str()) {
            (Method::POST, "/payments") => self.submit_payment(req).await,
            (Method::GET, "/payments-summary") => self.payments_summary(query.as_deref()).await,
            (Method::GET, "/local-summary") => self.local_summary(query.as_deref()).await,
            (Method::POST, "/purge-payments") => self.purge().await,
            (Method::GET, "/check-status") => Ok(Response::new(full_body("ok\n"))),
            _ => Ok(make_boxed_error_response(StatusCode::NOT_FOUND)),
        };

        result.unwrap_or_else(|e| error_response(&path, e))
    }

    async fn submit_payment<B>(&self, req: Request<B>) -> Result<GatewayResponse, GatewayError>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let body = req
            .into_body()
            .collect()
            .await
            .map_err(|e| GatewayError::RequestBodyError(e.to_string()))?
            .to_bytes();

        let payment: PaymentRequest = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::InvalidPayment(e.to_string()))?;

        let amount = payment.amount()?;

        self.router.route(payment.correlation_id, amount).await?;

        Ok(make_empty_response(StatusCode::ACCEPTED))
    }

    async fn payments_summary(&self, query: Option<&str>) -> Result<GatewayResponse, GatewayError> {
        let window = parse_window(query)?;
        let summary = self.aggregator.aggregate(window).await?;
        Ok(make_json_response(StatusCode::OK, &summary))
    }

    async fn local_summary(&self, query: Option<&str>) -> Result<GatewayResponse, GatewayError> {
        let window = parse_window(query)?;
        let summary = self.store.summary(window).await?;
        Ok(make_json_response(StatusCode::OK, &summary))
    }

    async fn purge(&self) -> Result<GatewayResponse, GatewayError> {
        self.store.purge().await?;
        self.router.clear_abandoned();
        Ok(make_empty_response(StatusCode::OK))
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = GatewayResponse;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

fn error_response(path: &str, error: GatewayError) -> GatewayResponse {
    let status = match &error {
        GatewayError::RequestBodyError(_)
        | GatewayError::InvalidPayment(_)
        | GatewayError::InvalidTimestamp(..) => {
            tracing::debug!(path, error = %error, "Rejected malformed request");
            StatusCode::BAD_REQUEST
        }
        GatewayError::Router(RouterError::Saturated | RouterError::Closed) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GatewayError::Store(_) | GatewayError::HttpClientError(_) | GatewayError::Io(_) => {
            tracing::error!(path, error = %error, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    make_boxed_error_response(status)
}

/// Reads the optional `from`/`to` bounds. Empty values count as absent.
fn parse_window(query: Option<&str>) -> Result<TimeWindow, GatewayError> {
    let mut window = TimeWindow::UNBOUNDED;

    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "from" => window.from = Some(parse_timestamp("from", &value)?),
            "to" => window.to = Some(parse_timestamp("to", &value)?),
            _ => {}
        }
    }

    Ok(window)
}

/// Accepts RFC 3339, or a timestamp without offset which is taken as UTC.
fn parse_timestamp(name: &'static str, value: &str) -> Result<DateTime<Utc>, GatewayError> {
    // An unescaped `+` in the offset arrives form-decoded as a space
    let value = value.trim().replace(' ', "+");

    if let Ok(at) = DateTime::parse_from_rfc3339(&value) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| GatewayError::InvalidTimestamp(name, format!("{value}: {e}")))
}

/// Liveness and readiness probes, served on the admin listener.
pub struct AdminService {
    ready: Arc<AtomicBool>,
}

impl AdminService {
    pub fn new(ready: Arc<AtomicBool>) -> Self {
        Self { ready }
    }
}

impl Service<Request<Incoming>> for AdminService {
    type Response = GatewayResponse;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let is_ready = self.ready.load(Ordering::Acquire);

        Box::pin(async move { Ok(admin_response(req.uri().path(), is_ready)) })
    }
}

fn admin_response(path: &str, is_ready: bool) -> GatewayResponse {
    match path {
        "/health" => Response::new(full_body("ok\n")),
        "/ready" => match is_ready {
            true => Response::new(full_body("ok\n")),
            false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
        },
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}
