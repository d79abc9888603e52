//! Turns route definitions into executable routes.
use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::{
    definition::{Args, FilterDefinition, RouteDefinition},
    error::{FactoryKind, RouteCompileError},
    filter::{OrderedFilter, sort_filters},
    predicate::{self, SharedPredicate},
    registry::FactoryRegistry,
    route::Route,
};

/// Published after each successful argument binding.
#[derive(Debug, Clone, Serialize)]
pub struct ArgsEvent {
    pub route_id: String,
    pub kind: FactoryKind,
    pub factory: String,
    /// The bound configuration, as the factory serializes it.
    pub properties: serde_json::Value,
}

/// Outcome of compiling a batch of definitions.
#[derive(Debug, Default)]
pub struct CompiledRoutes {
    pub routes: Vec<Route>,
    pub rejected: Vec<RouteCompileError>,
}

#[derive(Clone)]
pub struct RouteCompiler {
    registry: Arc<FactoryRegistry>,
    events: Option<broadcast::Sender<ArgsEvent>>,
}

impl RouteCompiler {
    pub fn new(registry: Arc<FactoryRegistry>) -> Self {
        Self {
            registry,
            events: None,
        }
    }

    /// Publish an [`ArgsEvent`] per binding on `sender`. Having no receiver
    /// is fine.
    pub fn with_events(mut self, sender: broadcast::Sender<ArgsEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn registry(&self) -> &Arc<FactoryRegistry> {
        &self.registry
    }

    /// Compile one definition. `default_filters` are prepended to the route's
    /// own filters before ordering.
    pub fn compile(
        &self,
        definition: &RouteDefinition,
        default_filters: &[FilterDefinition],
    ) -> Result<Route, RouteCompileError> {
        let predicate = self.combine_predicates(definition)?;
        let filters = self.load_filters(
            &definition.id,
            default_filters.iter().chain(definition.filters.iter()),
        )?;

        tracing::debug!(
            route_id = %definition.id,
            filters = filters.len(),
            "compiled route"
        );
        Ok(Route::new(
            definition.id.clone(),
            definition.uri.clone(),
            definition.order,
            predicate,
            filters,
        ))
    }

    /// Compile every definition. Failing definitions are logged and reported
    /// in [`CompiledRoutes::rejected`]; they never affect the others. A
    /// definition reusing an id already compiled is rejected.
    pub fn compile_all<I>(&self, definitions: I, default_filters: &[FilterDefinition]) -> CompiledRoutes
    where
        I: IntoIterator<Item = RouteDefinition>,
    {
        let mut compiled = CompiledRoutes::default();
        let mut seen = HashSet::new();
        for definition in definitions {
            if seen.contains(&definition.id) {
                let err = RouteCompileError::DuplicateId {
                    route_id: definition.id.clone(),
                };
                tracing::error!("Rejected route definition: {}", err);
                compiled.rejected.push(err);
                continue;
            }
            match self.compile(&definition, default_filters) {
                Ok(route) => {
                    seen.insert(definition.id);
                    compiled.routes.push(route);
                }
                Err(err) => {
                    tracing::error!("Rejected route definition: {}", err);
                    compiled.rejected.push(err);
                }
            }
        }
        compiled
    }

    /// Fold the predicate definitions into one short-circuiting conjunction,
    /// left to right.
    fn combine_predicates(
        &self,
        definition: &RouteDefinition,
    ) -> Result<SharedPredicate, RouteCompileError> {
        let mut definitions = definition.predicates.iter();
        let first = definitions
            .next()
            .ok_or_else(|| RouteCompileError::EmptyPredicates {
                route_id: definition.id.clone(),
            })?;
        let mut combined = self.lookup_predicate(&definition.id, &first.name, &first.args)?;
        for next in definitions {
            let right = self.lookup_predicate(&definition.id, &next.name, &next.args)?;
            combined = predicate::and(combined, right);
        }
        Ok(combined)
    }

    fn lookup_predicate(
        &self,
        route_id: &str,
        name: &str,
        args: &Args,
    ) -> Result<SharedPredicate, RouteCompileError> {
        let factory = self.registry.resolve_predicate(name).map_err(|_| {
            RouteCompileError::UnresolvedPredicate {
                route_id: route_id.to_string(),
                name: name.to_string(),
            }
        })?;
        tracing::debug!("RouteDefinition {} applying {:?} to {}", route_id, args, name);
        let applied = factory
            .apply(args)
            .map_err(|source| RouteCompileError::InvalidArgument {
                route_id: route_id.to_string(),
                source,
            })?;
        self.publish(route_id, FactoryKind::Predicate, name, applied.properties);
        Ok(applied.value)
    }

    /// Resolve filters and assign final orders: a declared order wins,
    /// otherwise the 1-based position in `definitions`. Sorted stably.
    fn load_filters<'a, I>(
        &self,
        route_id: &str,
        definitions: I,
    ) -> Result<Vec<OrderedFilter>, RouteCompileError>
    where
        I: Iterator<Item = &'a FilterDefinition>,
    {
        let mut filters = Vec::new();
        for (position, definition) in definitions.enumerate() {
            let factory = self.registry.resolve_filter(&definition.name).map_err(|_| {
                RouteCompileError::UnresolvedFilter {
                    route_id: route_id.to_string(),
                    name: definition.name.clone(),
                }
            })?;
            tracing::debug!(
                "RouteDefinition {} applying filter {:?} to {}",
                route_id,
                definition.args,
                definition.name
            );
            let applied = factory
                .apply(&definition.args)
                .map_err(|source| RouteCompileError::InvalidArgument {
                    route_id: route_id.to_string(),
                    source,
                })?;
            self.publish(route_id, FactoryKind::Filter, &definition.name, applied.properties);
            let fallback = i32::try_from(position + 1).unwrap_or(i32::MAX);
            filters.push(OrderedFilter::declared_or(applied.value, fallback));
        }
        sort_filters(&mut filters);
        Ok(filters)
    }

    fn publish(&self, route_id: &str, kind: FactoryKind, factory: &str, properties: serde_json::Value) {
        if let Some(events) = &self.events {
            // Err only means nobody is listening
            let _ = events.send(ArgsEvent {
                route_id: route_id.to_string(),
                kind,
                factory: factory.to_string(),
                properties,
            });
        }
    }
}
