use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};

use crate::core::error::GatewayResult;

/// Re-entry point for requests forwarded to in-process endpoints.
///
/// Receives the request exactly as it stands at the end of the pre-phase
/// (rewritten path included) and answers it without leaving the process.
#[async_trait]
pub trait LocalDispatcher: Send + Sync + 'static {
    async fn dispatch(&self, req: Request<AxumBody>) -> GatewayResult<Response<AxumBody>>;
}
