//! Built-in gateway filter factories, global filters and the proxy terminal.
mod global;
mod headers;
mod path;
mod proxy;
mod redirect_to;
mod request_rate_limiter;

use std::sync::Arc;

pub use global::{
    FORWARD_ROUTING_FILTER_ORDER, FORWARD_SCHEME, ForwardRoutingFilter, LB_SCHEME,
    LOAD_BALANCER_CLIENT_FILTER_ORDER, LoadBalancerClientFilter, ROUTE_TO_URL_FILTER_ORDER,
    RouteToRequestUrlFilter, global_filters,
};
pub use headers::{
    AddRequestHeaderGatewayFilterFactory, AddResponseHeaderGatewayFilterFactory, NameValueConfig,
};
use http::StatusCode;
pub use path::{
    PrefixPathConfig, PrefixPathGatewayFilterFactory, RewritePathConfig, RewritePathFilter,
    RewritePathGatewayFilterFactory,
};
pub use proxy::ProxyRoutingAction;
pub use redirect_to::{RedirectToConfig, RedirectToGatewayFilterFactory};
pub use request_rate_limiter::{
    BURST_CAPACITY_HEADER, KeyResolver, MissingKeyPolicy, REMAINING_HEADER,
    REPLENISH_RATE_HEADER, REQUESTED_TOKENS_HEADER, RequestRateLimiterConfig,
    RequestRateLimiterGatewayFilterFactory,
};

use crate::core::{rate_limiter::DistributedRateLimiter, registry::FactoryRegistry};

/// Register every built-in filter factory. `RequestRateLimiter` filters share
/// `limiter` and answer throttled requests with `deny_status` unless a route
/// overrides it.
pub fn register_builtin_filters(
    registry: &mut FactoryRegistry,
    limiter: Arc<DistributedRateLimiter>,
    deny_status: StatusCode,
) {
    registry.register_filter(RewritePathGatewayFilterFactory);
    registry.register_filter(PrefixPathGatewayFilterFactory);
    registry.register_filter(AddRequestHeaderGatewayFilterFactory);
    registry.register_filter(AddResponseHeaderGatewayFilterFactory);
    registry.register_filter(RedirectToGatewayFilterFactory);
    registry.register_filter(
        RequestRateLimiterGatewayFilterFactory::new(limiter).with_deny_status(deny_status),
    );
}
