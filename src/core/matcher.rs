//! Per-request route selection.
use std::sync::Arc;

use crate::core::{
    error::NoRouteFound, exchange::Exchange, route::Route, route_table::RouteSnapshot,
};

/// Select the first route, in ascending order, whose predicate accepts the
/// request.
///
/// While a route is being tested its id is exposed through
/// [`predicate_route_id`](crate::core::exchange::ExchangeAttributes::predicate_route_id);
/// the attribute is cleared after every test. A predicate that fails only
/// removes its own route from consideration. On a match the route is stored
/// on the exchange and no later route is evaluated.
pub async fn lookup_route(
    exchange: &mut Exchange,
    snapshot: &RouteSnapshot,
) -> Result<Arc<Route>, NoRouteFound> {
    for route in snapshot.routes() {
        exchange
            .attributes_mut()
            .set_predicate_route_id(Some(route.id().to_string()));
        let outcome = route.matches(exchange).await;
        exchange.attributes_mut().set_predicate_route_id(None);

        match outcome {
            Ok(true) => {
                tracing::debug!(route_id = route.id(), "Route matched");
                exchange.attributes_mut().set_route(route.clone());
                return Ok(route.clone());
            }
            Ok(false) => {
                tracing::trace!(route_id = route.id(), "Route did not match");
            }
            Err(e) => {
                tracing::error!(route_id = route.id(), error = %e, "Error applying predicate for route");
            }
        }
    }
    tracing::trace!(path = exchange.request().uri().path(), "No route found");
    Err(NoRouteFound)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use axum::body::Body;
    use http::Request;

    use super::*;
    use crate::core::{
        error::{GatewayError, GatewayResult},
        predicate::{RoutePredicate, SharedPredicate},
    };

    struct Scripted {
        result: GatewayResult<bool>,
        calls: Arc<AtomicUsize>,
        seen_ids: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl RoutePredicate for Scripted {
        async fn test(&self, exchange: &mut Exchange) -> GatewayResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_ids.lock().unwrap().push(
                exchange
                    .attributes()
                    .predicate_route_id()
                    .map(str::to_string),
            );
            match &self.result {
                Ok(v) => Ok(*v),
                Err(_) => Err(GatewayError::PredicateEvaluation {
                    route_id: "broken".to_string(),
                    message: "boom".to_string(),
                }),
            }
        }
    }

    struct Fixture {
        seen_ids: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                seen_ids: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn route(&self, id: &str, order: i32, result: GatewayResult<bool>) -> (Route, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let predicate: SharedPredicate = Arc::new(Scripted {
                result,
                calls: calls.clone(),
                seen_ids: self.seen_ids.clone(),
            });
            (
                Route::new(id, "http://localhost".parse().unwrap(), order, predicate, Vec::new()),
                calls,
            )
        }
    }

    fn exchange() -> Exchange {
        Exchange::new(Request::get("/").body(Body::empty()).unwrap())
    }

    #[tokio::test]
    async fn test_lowest_order_wins_and_later_routes_untouched() {
        let f = Fixture::new();
        let (late, late_calls) = f.route("late", 5, Ok(true));
        let (early, _) = f.route("early", 1, Ok(true));
        let (miss, _) = f.route("miss", 0, Ok(false));
        let snapshot = RouteSnapshot::new(vec![late, early, miss]);

        let mut ex = exchange();
        let route = lookup_route(&mut ex, &snapshot).await.unwrap();

        assert_eq!(route.id(), "early");
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ex.attributes().route().map(|r| r.id()), Some("early"));
    }

    #[tokio::test]
    async fn test_failing_predicate_is_skipped() {
        let f = Fixture::new();
        let (broken, _) = f.route("broken", 0, Err(GatewayError::Cancelled));
        let (fallback, _) = f.route("fallback", 1, Ok(true));
        let snapshot = RouteSnapshot::new(vec![broken, fallback]);

        let mut ex = exchange();
        let route = lookup_route(&mut ex, &snapshot).await.unwrap();
        assert_eq!(route.id(), "fallback");
    }

    #[tokio::test]
    async fn test_predicate_route_id_tracks_route_under_test() {
        let f = Fixture::new();
        let (a, _) = f.route("a", 0, Ok(false));
        let (b, _) = f.route("b", 1, Ok(false));
        let snapshot = RouteSnapshot::new(vec![a, b]);

        let mut ex = exchange();
        assert!(matches!(lookup_route(&mut ex, &snapshot).await, Err(NoRouteFound)));
        assert_eq!(
            *f.seen_ids.lock().unwrap(),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
        assert!(ex.attributes().predicate_route_id().is_none());
        assert!(ex.attributes().route().is_none());
    }

    #[tokio::test]
    async fn test_empty_table_finds_nothing() {
        let mut ex = exchange();
        assert!(matches!(
            lookup_route(&mut ex, &RouteSnapshot::default()).await,
            Err(NoRouteFound)
        ));
    }
}
