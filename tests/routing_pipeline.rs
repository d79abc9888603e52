// End-to-end request handling: route matching, route and default filters,
// global filters and the terminal proxy, driven through the HTTP handler.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, Request, Response, StatusCode, Uri};
use http_body_util::BodyExt;
use switchyard::{
    adapters::{HttpHandler, InMemoryCounterStore, InMemoryRouteDefinitionLocator, RouterDispatcher},
    config::models::LoadBalanceStrategy,
    core::{
        DistributedRateLimiter, FactoryRegistry, FilterDefinition, GatewayHandler,
        PredicateDefinition, RouteCompiler, RouteDefinition, RouteDefinitionRouteLocator,
        RouteTable, ServiceInstances,
        filters::{ProxyRoutingAction, global_filters, register_builtin_filters},
        predicates::register_builtin_predicates,
    },
    ports::http_client::{HttpClient, HttpClientResult},
};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upstream stand-in that records what it received.
#[derive(Default)]
struct RecordingUpstream {
    seen: Mutex<Vec<(Uri, HeaderMap)>>,
}

impl RecordingUpstream {
    fn last(&self) -> (Uri, HeaderMap) {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }

    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for RecordingUpstream {
    async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
        self.seen
            .lock()
            .unwrap()
            .push((req.uri().clone(), req.headers().clone()));
        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("upstream"))
            .unwrap())
    }
}

struct Gateway {
    handler: HttpHandler,
    upstream: Arc<RecordingUpstream>,
}

fn route(id: &str, uri: &str, predicates: &[&str], filters: &[&str]) -> RouteDefinition {
    let mut definition = RouteDefinition::new(id, uri.parse::<Url>().unwrap());
    for p in predicates {
        definition = definition.predicate(p.parse::<PredicateDefinition>().unwrap());
    }
    for f in filters {
        definition = definition.filter(f.parse::<FilterDefinition>().unwrap());
    }
    definition
}

async fn gateway(routes: Vec<RouteDefinition>, default_filters: &[&str]) -> Gateway {
    let limiter = Arc::new(DistributedRateLimiter::new(Arc::new(
        InMemoryCounterStore::new(),
    )));
    let mut registry = FactoryRegistry::new();
    register_builtin_predicates(&mut registry);
    register_builtin_filters(&mut registry, limiter, StatusCode::TOO_MANY_REQUESTS);

    let definitions = Arc::new(InMemoryRouteDefinitionLocator::new());
    for definition in routes {
        definitions.save(definition);
    }
    let default_filters = default_filters
        .iter()
        .map(|f| f.parse::<FilterDefinition>().unwrap())
        .collect();
    let route_locator = RouteDefinitionRouteLocator::new(
        definitions,
        RouteCompiler::new(Arc::new(registry)),
        default_filters,
    );
    let table = Arc::new(RouteTable::empty());
    let report = route_locator.refresh(&table).await;
    assert!(report.rejected.is_empty(), "{:?}", report.rejected);

    let mut instances = HashMap::new();
    instances.insert(
        "users".to_string(),
        vec![
            "http://10.0.0.1:8081".parse().unwrap(),
            "http://10.0.0.2:8081".parse().unwrap(),
        ],
    );
    let services = Arc::new(ArcSwap::from_pointee(ServiceInstances::new(
        &instances,
        &LoadBalanceStrategy::RoundRobin,
    )));

    let upstream = Arc::new(RecordingUpstream::default());
    let dispatcher = Arc::new(RouterDispatcher::new(table.clone()));
    let handler = GatewayHandler::new(
        table,
        global_filters(services, dispatcher),
        Arc::new(ProxyRoutingAction::new(upstream.clone())),
    );
    Gateway {
        handler: HttpHandler::new(Arc::new(handler), CancellationToken::new()),
        upstream,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("host", "gateway.local:8080")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_proxied_request_gets_rewritten_and_decorated() {
    let gw = gateway(
        vec![route(
            "api",
            "http://backend:9000",
            &["Path=/api/**"],
            &[
                "RewritePath=/api/(?<rest>.*), /$\\{rest}",
                "AddRequestHeader=X-Gateway, switchyard",
            ],
        )],
        &["AddResponseHeader=X-Served-By, switchyard"],
    )
    .await;

    let response = gw.handler.handle_request(get("/api/users?page=2"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-by"], "switchyard");

    let (uri, headers) = gw.upstream.last();
    assert_eq!(uri.to_string(), "http://backend:9000/users?page=2");
    assert_eq!(headers["x-gateway"], "switchyard");
    assert_eq!(headers["x-forwarded-host"], "gateway.local:8080");
}

#[tokio::test]
async fn test_lower_order_route_wins() {
    let gw = gateway(
        vec![
            route("catch-all", "http://fallback:80", &["Path=/**"], &[])
                .order(10),
            route("orders", "http://orders:80", &["Path=/orders/**"], &[]).order(1),
        ],
        &[],
    )
    .await;

    gw.handler.handle_request(get("/orders/7"), None).await;
    assert_eq!(gw.upstream.last().0.to_string(), "http://orders/orders/7");

    gw.handler.handle_request(get("/other"), None).await;
    assert_eq!(gw.upstream.last().0.to_string(), "http://fallback/other");
}

#[tokio::test]
async fn test_lb_route_rotates_between_instances() {
    let gw = gateway(
        vec![route("users", "lb://users", &["Path=/users/**"], &[])],
        &[],
    )
    .await;

    gw.handler.handle_request(get("/users/1"), None).await;
    let first = gw.upstream.last().0;
    gw.handler.handle_request(get("/users/1"), None).await;
    let second = gw.upstream.last().0;

    assert_ne!(first.authority(), second.authority());
    assert_eq!(first.path(), "/users/1");
    assert_eq!(second.path(), "/users/1");
}

#[tokio::test]
async fn test_forward_route_is_answered_locally() {
    let gw = gateway(
        vec![route(
            "gateway",
            "forward:/",
            &["Path=/gateway/**"],
            &["RewritePath=/gateway/(?<rest>.*), /$\\{rest}"],
        )],
        &[],
    )
    .await;

    let response = gw.handler.handle_request(get("/gateway/health"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "UP");
    assert_eq!(gw.upstream.count(), 0);
}

#[tokio::test]
async fn test_redirect_only_route() {
    let gw = gateway(
        vec![route(
            "moved",
            "no://op",
            &["Path=/old"],
            &["RedirectTo=301, https://example.org/new"],
        )],
        &[],
    )
    .await;

    let response = gw.handler.handle_request(get("/old"), None).await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "https://example.org/new");
    assert_eq!(gw.upstream.count(), 0);
}

#[tokio::test]
async fn test_unmatched_request_is_404() {
    let gw = gateway(
        vec![route("api", "http://backend:9000", &["Path=/api/**"], &[])],
        &[],
    )
    .await;

    let response = gw.handler.handle_request(get("/nothing"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(gw.upstream.count(), 0);
}

#[tokio::test]
async fn test_host_and_method_predicates_combine() {
    let gw = gateway(
        vec![route(
            "writes",
            "http://writer:80",
            &["Host=**.example.org", "Method=POST,PUT"],
            &[],
        )],
        &[],
    )
    .await;

    let post = Request::post("/items")
        .header("host", "api.example.org")
        .body(Body::empty())
        .unwrap();
    let response = gw.handler.handle_request(post, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let wrong_method = Request::get("/items")
        .header("host", "api.example.org")
        .body(Body::empty())
        .unwrap();
    let response = gw.handler.handle_request(wrong_method, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
