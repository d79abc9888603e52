use std::{convert::Infallible, sync::Arc};

use async_trait::async_trait;
use axum::{Json, Router, body::Body as AxumBody, extract::State, routing::get};
use hyper::{Request, Response};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{
    core::{error::GatewayResult, route_table::RouteTable},
    ports::local_dispatcher::LocalDispatcher,
};

/// In-process endpoints reachable through `forward:` routes.
///
/// * `GET /health` - liveness plus the size of the active route table
/// * `GET /routes` - the compiled route table
pub struct RouterDispatcher {
    router: Router,
}

impl RouterDispatcher {
    pub fn new(table: Arc<RouteTable>) -> Self {
        let router = Router::new()
            .route("/health", get(health))
            .route("/routes", get(routes))
            .with_state(table);
        Self { router }
    }

    /// Serve a caller-supplied router instead of the built-in endpoints.
    pub fn from_router(router: Router) -> Self {
        Self { router }
    }

    /// The endpoints as a standalone router, e.g. for the management listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn health(State(table): State<Arc<RouteTable>>) -> Json<Value> {
    Json(json!({
        "status": "UP",
        "routes": table.snapshot().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn routes(State(table): State<Arc<RouteTable>>) -> Json<Value> {
    Json(json!(table.snapshot().summaries()))
}

#[async_trait]
impl LocalDispatcher for RouterDispatcher {
    async fn dispatch(&self, req: Request<AxumBody>) -> GatewayResult<Response<AxumBody>> {
        tracing::debug!(method = %req.method(), path = req.uri().path(), "Local dispatch");
        let response: Result<Response<AxumBody>, Infallible> =
            self.router.clone().oneshot(req).await;
        match response {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}
