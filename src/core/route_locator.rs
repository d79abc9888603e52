//! Builds route table snapshots from a definition source.
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::StreamExt;

use crate::{
    core::{
        compiler::{CompiledRoutes, RouteCompiler},
        definition::{FilterDefinition, RouteDefinition},
        error::RouteCompileError,
        route_table::{RouteSnapshot, RouteTable},
    },
    ports::route_definition_locator::RouteDefinitionLocator,
};

/// Outcome of a refresh.
#[derive(Debug)]
pub struct RefreshReport {
    /// Number of routes in the published snapshot.
    pub published: usize,
    pub rejected: Vec<RouteCompileError>,
}

pub struct RouteDefinitionRouteLocator {
    locator: Arc<dyn RouteDefinitionLocator>,
    compiler: RouteCompiler,
    default_filters: ArcSwap<Vec<FilterDefinition>>,
}

impl RouteDefinitionRouteLocator {
    pub fn new(
        locator: Arc<dyn RouteDefinitionLocator>,
        compiler: RouteCompiler,
        default_filters: Vec<FilterDefinition>,
    ) -> Self {
        Self {
            locator,
            compiler,
            default_filters: ArcSwap::from_pointee(default_filters),
        }
    }

    /// Replace the gateway-wide filters used by later compilations.
    pub fn set_default_filters(&self, default_filters: Vec<FilterDefinition>) {
        self.default_filters.store(Arc::new(default_filters));
    }

    /// Query the source and compile every definition it yields.
    pub async fn compile_routes(&self) -> CompiledRoutes {
        let definitions: Vec<RouteDefinition> = self.locator.route_definitions().collect().await;
        let default_filters = self.default_filters.load();
        self.compiler.compile_all(definitions, &default_filters)
    }

    /// Recompile and atomically publish the result to `table`. Definitions
    /// that fail to compile are left out; the others are published.
    pub async fn refresh(&self, table: &RouteTable) -> RefreshReport {
        let CompiledRoutes { routes, rejected } = self.compile_routes().await;
        let snapshot = RouteSnapshot::new(routes);
        let published = snapshot.len();
        table.publish(snapshot);
        if !rejected.is_empty() {
            tracing::warn!(
                rejected = rejected.len(),
                published,
                "Route refresh left out invalid definitions"
            );
        }
        RefreshReport {
            published,
            rejected,
        }
    }
}
