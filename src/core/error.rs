//! Error taxonomy of the routing core.
//!
//! * [`RouteCompileError`]: configuration-fatal for one route, never for the table.
//! * [`GatewayError`]: request-time failures propagated through the filter chain.
//! * [`NoRouteFound`]: the normal "nothing matched" outcome, not a failure.
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::ports::{counter_store::CounterStoreError, http_client::HttpClientError};

/// Which registry table a factory lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactoryKind {
    Predicate,
    Filter,
}

impl std::fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactoryKind::Predicate => write!(f, "predicate"),
            FactoryKind::Filter => write!(f, "filter"),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("unable to find {kind} factory with name '{name}'")]
    UnknownFactory { kind: FactoryKind, name: String },
}

/// Argument binding or factory construction failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid argument for '{factory}': {message}")]
pub struct InvalidArgument {
    pub factory: String,
    pub message: String,
}

impl InvalidArgument {
    pub fn new(factory: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            message: message.into(),
        }
    }
}

/// Rejection of a single route definition during compilation.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RouteCompileError {
    #[error("route '{route_id}': unable to find predicate factory '{name}'")]
    UnresolvedPredicate { route_id: String, name: String },

    #[error("route '{route_id}': unable to find filter factory '{name}'")]
    UnresolvedFilter { route_id: String, name: String },

    #[error("route '{route_id}': {source}")]
    InvalidArgument {
        route_id: String,
        #[source]
        source: InvalidArgument,
    },

    #[error("route '{route_id}' declares no predicates")]
    EmptyPredicates { route_id: String },

    #[error("route id '{route_id}' is already in use")]
    DuplicateId { route_id: String },
}

impl RouteCompileError {
    pub fn route_id(&self) -> &str {
        match self {
            RouteCompileError::UnresolvedPredicate { route_id, .. }
            | RouteCompileError::UnresolvedFilter { route_id, .. }
            | RouteCompileError::InvalidArgument { route_id, .. }
            | RouteCompileError::EmptyPredicates { route_id }
            | RouteCompileError::DuplicateId { route_id } => route_id,
        }
    }
}

/// Request-time failure.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("predicate of route '{route_id}' failed: {message}")]
    PredicateEvaluation { route_id: String, message: String },

    #[error("filter '{filter}' failed: {message}")]
    Filter { filter: String, message: String },

    #[error("upstream request failed: {0}")]
    Upstream(#[from] HttpClientError),

    #[error("no instance available for service '{0}'")]
    ServiceUnavailable(String),

    #[error("local dispatch failed: {0}")]
    Dispatch(String),

    #[error("rate limiter store failed: {0}")]
    RateLimiterStore(#[from] CounterStoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid rate limit for bucket '{bucket}': {message}")]
    InvalidRateLimit { bucket: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn filter(filter: impl Into<String>, message: impl std::fmt::Display) -> Self {
        GatewayError::Filter {
            filter: filter.into(),
            message: message.to_string(),
        }
    }

    /// Status code reported to the client when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Upstream(HttpClientError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceUnavailable(_) | GatewayError::RateLimiterStore(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// No compiled route accepted the request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no route found")]
pub struct NoRouteFound;
