//! Global filters applied to every routed request.
//!
//! They carry explicit orders so they interleave with route filters by
//! priority: `RouteToRequestUrl` resolves the downstream URL after route
//! filters have rewritten the path, `LoadBalancerClient` replaces `lb://`
//! targets with a concrete instance, and `ForwardRouting` runs last.
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use url::Url;

use crate::{
    core::{
        error::{GatewayError, GatewayResult},
        exchange::Exchange,
        filter::{FilterChain, GatewayFilter, OrderedFilter},
        load_balancer::ServiceInstances,
    },
    ports::local_dispatcher::LocalDispatcher,
};

pub const ROUTE_TO_URL_FILTER_ORDER: i32 = 10000;
pub const LOAD_BALANCER_CLIENT_FILTER_ORDER: i32 = 10100;
pub const FORWARD_ROUTING_FILTER_ORDER: i32 = i32::MAX;

pub const LB_SCHEME: &str = "lb";
pub const FORWARD_SCHEME: &str = "forward";

/// Copy `path` and `query` of the current request onto `base`.
fn merge_request_target(mut base: Url, exchange: &Exchange) -> Url {
    let uri = exchange.request().uri();
    base.set_path(uri.path());
    base.set_query(uri.query());
    base
}

/// Computes the request URL from the matched route's URI and the current
/// (possibly rewritten) request path.
pub struct RouteToRequestUrlFilter;

#[async_trait]
impl GatewayFilter for RouteToRequestUrlFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        let Some(route) = exchange.attributes().route().cloned() else {
            return chain.proceed(exchange).await;
        };
        let url = merge_request_target(route.uri().clone(), exchange);
        tracing::trace!(route_id = route.id(), url = %url, "resolved request url");
        exchange.attributes_mut().set_request_url(url);
        chain.proceed(exchange).await
    }

    fn order(&self) -> Option<i32> {
        Some(ROUTE_TO_URL_FILTER_ORDER)
    }

    fn name(&self) -> &'static str {
        "RouteToRequestUrl"
    }
}

/// Swaps an `lb://service` request URL for one of the service's instances.
///
/// The instance table is read per request, so a configuration reload that
/// stores new instances applies to the next request.
pub struct LoadBalancerClientFilter {
    services: Arc<ArcSwap<ServiceInstances>>,
}

impl LoadBalancerClientFilter {
    pub fn new(services: Arc<ArcSwap<ServiceInstances>>) -> Self {
        Self { services }
    }

    fn choose(&self, url: &Url) -> GatewayResult<Url> {
        let service_id = url.host_str().unwrap_or_default();
        let mut instance = self
            .services
            .load()
            .choose(service_id)
            .ok_or_else(|| GatewayError::ServiceUnavailable(service_id.to_string()))?;
        instance.set_path(url.path());
        instance.set_query(url.query());
        Ok(instance)
    }
}

#[async_trait]
impl GatewayFilter for LoadBalancerClientFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        let Some(url) = exchange.attributes().request_url() else {
            return chain.proceed(exchange).await;
        };
        if url.scheme() != LB_SCHEME {
            return chain.proceed(exchange).await;
        }

        let instance = self.choose(url)?;
        tracing::debug!(service = url.host_str().unwrap_or_default(), instance = %instance, "load balancer chose instance");
        exchange.attributes_mut().set_request_url(instance);
        chain.proceed(exchange).await
    }

    fn order(&self) -> Option<i32> {
        Some(LOAD_BALANCER_CLIENT_FILTER_ORDER)
    }

    fn name(&self) -> &'static str {
        "LoadBalancerClient"
    }
}

/// Re-dispatches `forward:` requests to the in-process endpoints.
///
/// Acts at most once per exchange: the routed marker is checked and set
/// before dispatching, and a request that was already routed passes through.
pub struct ForwardRoutingFilter {
    dispatcher: Arc<dyn LocalDispatcher>,
}

impl ForwardRoutingFilter {
    pub fn new(dispatcher: Arc<dyn LocalDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl GatewayFilter for ForwardRoutingFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        let is_forward = exchange
            .attributes()
            .request_url()
            .is_some_and(|url| url.scheme() == FORWARD_SCHEME);
        if !is_forward || !exchange.attributes_mut().mark_routed() {
            return chain.proceed(exchange).await;
        }

        let request = exchange.take_request();
        tracing::debug!(path = request.uri().path(), "forwarding to local dispatcher");
        let response = self.dispatcher.dispatch(request).await?;
        exchange.response_mut().commit_with(response);
        Ok(())
    }

    fn order(&self) -> Option<i32> {
        Some(FORWARD_ROUTING_FILTER_ORDER)
    }

    fn name(&self) -> &'static str {
        "ForwardRouting"
    }
}

/// The global filters in their declared orders.
pub fn global_filters(
    services: Arc<ArcSwap<ServiceInstances>>,
    dispatcher: Arc<dyn LocalDispatcher>,
) -> Vec<OrderedFilter> {
    vec![
        OrderedFilter::declared_or(Arc::new(RouteToRequestUrlFilter), ROUTE_TO_URL_FILTER_ORDER),
        OrderedFilter::declared_or(
            Arc::new(LoadBalancerClientFilter::new(services)),
            LOAD_BALANCER_CLIENT_FILTER_ORDER,
        ),
        OrderedFilter::declared_or(
            Arc::new(ForwardRoutingFilter::new(dispatcher)),
            FORWARD_ROUTING_FILTER_ORDER,
        ),
    ]
}
