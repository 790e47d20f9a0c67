use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "Listening");
    let service_arc = Arc::new(service);

    loop {
        let (stream, _peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(error = %e, "Connection closed with error");
            }
        });
    }
}

/// Wraps a complete body into the boxed body type used by all services.
pub fn full_body<E>(bytes: impl Into<Bytes>) -> BoxBody<Bytes, E> {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}

/// Builds a plain-text response carrying the canonical reason of the status.
pub fn make_boxed_error_response<E>(status_code: StatusCode) -> Response<BoxBody<Bytes, E>> {
    let message = status_code
        .canonical_reason()
        .unwrap_or("an error occurred");

    let mut response = Response::new(full_body(format!("{message}\n")));
    *response.status_mut() = status_code;
    response
}

/// Builds an empty-bodied response with the given status.
pub fn make_empty_response<E>(status_code: StatusCode) -> Response<BoxBody<Bytes, E>> {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = status_code;
    response
}

/// Serializes `value` as the JSON body of a response.
///
/// Serialization failures turn into a 500 rather than an error, since the
/// caller has nothing better to return at that point.
pub fn make_json_response<T, E>(status_code: StatusCode, value: &T) -> Response<BoxBody<Bytes, E>>
where
    T: Serialize,
{
    match serde_json::to_vec(value) {
        Ok(json) => {
            let mut response = Response::new(full_body(json));
            *response.status_mut() = status_code;
            response.headers_mut().insert(
                CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
