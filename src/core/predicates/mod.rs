//! Built-in predicate factories.
mod datetime;
mod path;
mod request;

pub use datetime::{
    AfterRoutePredicateFactory, BeforeRoutePredicateFactory, BetweenRoutePredicateFactory,
    DateTimeConfig, DateTimeRangeConfig,
};
pub use path::{PathConfig, PathRoutePredicateFactory};
pub use request::{
    HeaderConfig, HeaderRoutePredicateFactory, HostConfig, HostRoutePredicateFactory,
    MethodConfig, MethodRoutePredicateFactory,
};

use crate::core::registry::FactoryRegistry;

pub fn register_builtin_predicates(registry: &mut FactoryRegistry) {
    registry.register_predicate(AfterRoutePredicateFactory);
    registry.register_predicate(BeforeRoutePredicateFactory);
    registry.register_predicate(BetweenRoutePredicateFactory);
    registry.register_predicate(PathRoutePredicateFactory);
    registry.register_predicate(MethodRoutePredicateFactory);
    registry.register_predicate(HeaderRoutePredicateFactory);
    registry.register_predicate(HostRoutePredicateFactory);
}
