//! Compiled, immutable routes.
use serde::Serialize;
use url::Url;

use crate::core::{
    error::GatewayResult,
    exchange::Exchange,
    filter::OrderedFilter,
    predicate::SharedPredicate,
};

/// A route ready to serve traffic: match condition, target and filter chain.
///
/// Built once per definition by the compiler and never mutated; a route table
/// refresh replaces routes wholesale.
pub struct Route {
    id: String,
    uri: Url,
    order: i32,
    predicate: SharedPredicate,
    filters: Vec<OrderedFilter>,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        uri: Url,
        order: i32,
        predicate: SharedPredicate,
        filters: Vec<OrderedFilter>,
    ) -> Self {
        Self {
            id: id.into(),
            uri,
            order,
            predicate,
            filters,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// Filters sorted by final execution order.
    pub fn filters(&self) -> &[OrderedFilter] {
        &self.filters
    }

    /// Evaluate the combined predicate.
    pub async fn matches(&self, exchange: &mut Exchange) -> GatewayResult<bool> {
        self.predicate.test(exchange).await
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            id: self.id.clone(),
            uri: self.uri.to_string(),
            order: self.order,
            filters: self
                .filters
                .iter()
                .map(|f| FilterSummary {
                    name: f.name().to_string(),
                    order: f.order(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("uri", &self.uri.as_str())
            .field("order", &self.order)
            .field("filters", &self.filters)
            .finish()
    }
}

/// Serializable view of a route for diagnostics endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub id: String,
    pub uri: String,
    pub order: i32,
    pub filters: Vec<FilterSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterSummary {
    pub name: String,
    pub order: i32,
}
