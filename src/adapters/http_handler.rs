use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body as AxumBody,
    http::{StatusCode, header},
};
use hyper::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::core::{
    error::GatewayError,
    exchange::Exchange,
    handler::{GatewayHandler, HandleOutcome},
};

/// HTTP glue between axum and the gateway pipeline.
#[derive(Clone)]
pub struct HttpHandler {
    gateway: Arc<GatewayHandler>,
    shutdown: CancellationToken,
}

impl HttpHandler {
    /// `shutdown` is the parent of every request's cancellation token.
    pub fn new(gateway: Arc<GatewayHandler>, shutdown: CancellationToken) -> Self {
        Self { gateway, shutdown }
    }

    /// Route one request and turn the outcome into an HTTP response.
    ///
    /// Dropping the returned future (the client went away) cancels the
    /// request's token, which in-flight filters observe.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        tracing::debug!("Handling {} request to {}", method, path);

        let token = self.shutdown.child_token();
        let guard = token.clone().drop_guard();

        let mut exchange = Exchange::new(req).with_cancellation(token);
        if let Some(addr) = client_addr {
            exchange = exchange.with_client_addr(addr);
        }

        let result = self.gateway.handle(exchange).await;
        guard.disarm();

        match result {
            Ok(HandleOutcome::Routed(response)) => response,
            Ok(HandleOutcome::NoRoute) => {
                tracing::debug!("No route for {} {}", method, path);
                plain_response(StatusCode::NOT_FOUND, "No route found")
            }
            Err(err) => error_response(&err),
        }
    }
}

fn error_response(err: &GatewayError) -> Response<AxumBody> {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!("Request handling error: {}", err);
    } else {
        tracing::warn!("Request rejected: {}", err);
    }
    let reason = status.canonical_reason().unwrap_or("Error");
    plain_response(status, reason)
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
