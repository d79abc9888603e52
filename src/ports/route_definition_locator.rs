use futures_util::stream::BoxStream;

use crate::core::definition::RouteDefinition;

/// Source of route definitions.
///
/// Each call yields a fresh, lazily produced sequence, so the same locator can
/// be queried again whenever the route table is rebuilt.
pub trait RouteDefinitionLocator: Send + Sync + 'static {
    fn route_definitions(&self) -> BoxStream<'static, RouteDefinition>;
}
