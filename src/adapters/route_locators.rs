//! Route definition sources.
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::{
    config::models::GatewayConfig,
    core::definition::RouteDefinition,
    ports::route_definition_locator::RouteDefinitionLocator,
};

/// Routes declared in the gateway configuration. Follows configuration
/// reloads: each query yields the routes of the latest published config.
pub struct PropertiesRouteDefinitionLocator {
    config: Arc<ArcSwap<GatewayConfig>>,
}

impl PropertiesRouteDefinitionLocator {
    pub fn new(config: Arc<ArcSwap<GatewayConfig>>) -> Self {
        Self { config }
    }
}

impl RouteDefinitionLocator for PropertiesRouteDefinitionLocator {
    fn route_definitions(&self) -> BoxStream<'static, RouteDefinition> {
        let routes = self.config.load().routes.clone();
        stream::iter(routes).boxed()
    }
}

/// Mutable, process-local route definitions.
#[derive(Default)]
pub struct InMemoryRouteDefinitionLocator {
    routes: RwLock<Vec<RouteDefinition>>,
}

impl InMemoryRouteDefinitionLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace (by id) a definition.
    pub fn save(&self, definition: RouteDefinition) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        match routes.iter_mut().find(|r| r.id == definition.id) {
            Some(existing) => *existing = definition,
            None => routes.push(definition),
        }
    }

    /// Remove a definition; returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        let before = routes.len();
        routes.retain(|r| r.id != id);
        routes.len() != before
    }
}

impl RouteDefinitionLocator for InMemoryRouteDefinitionLocator {
    fn route_definitions(&self) -> BoxStream<'static, RouteDefinition> {
        let routes = self
            .routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        stream::iter(routes).boxed()
    }
}

/// Concatenation of several locators, in registration order.
pub struct CompositeRouteDefinitionLocator {
    delegates: Vec<Arc<dyn RouteDefinitionLocator>>,
}

impl CompositeRouteDefinitionLocator {
    pub fn new(delegates: Vec<Arc<dyn RouteDefinitionLocator>>) -> Self {
        Self { delegates }
    }
}

impl RouteDefinitionLocator for CompositeRouteDefinitionLocator {
    fn route_definitions(&self) -> BoxStream<'static, RouteDefinition> {
        let streams: Vec<_> = self
            .delegates
            .iter()
            .map(|locator| locator.route_definitions())
            .collect();
        stream::iter(streams).flatten().boxed()
    }
}
