pub mod compiler;
pub mod definition;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod filters;
pub mod handler;
pub mod load_balancer;
pub mod matcher;
pub mod pattern;
pub mod predicate;
pub mod predicates;
pub mod rate_limiter;
pub mod registry;
pub mod route;
pub mod route_locator;
pub mod route_table;

pub use compiler::{CompiledRoutes, RouteCompiler};
pub use definition::{Args, FilterDefinition, PredicateDefinition, RouteDefinition};
pub use error::{GatewayError, GatewayResult, RouteCompileError};
pub use exchange::Exchange;
pub use filter::{FilterChain, GatewayFilter, OrderedFilter, TerminalAction};
pub use handler::{GatewayHandler, HandleOutcome};
pub use load_balancer::{LoadBalancerFactory, ServiceInstances};
pub use rate_limiter::{DistributedRateLimiter, FailurePolicy};
pub use registry::FactoryRegistry;
pub use route::Route;
pub use route_locator::RouteDefinitionRouteLocator;
pub use route_table::{RouteSnapshot, RouteTable};
