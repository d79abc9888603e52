//! Published route table.
//!
//! Request handling loads the current [`RouteSnapshot`] once and matches
//! against it for the rest of the request. A refresh builds a complete new
//! snapshot and swaps it in atomically, so a request sees either the old
//! table or the new one in full.
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::core::route::{Route, RouteSummary};

/// Immutable, order-sorted set of compiled routes.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    routes: Vec<Arc<Route>>,
}

impl RouteSnapshot {
    /// Sort `routes` by ascending order. Routes with equal order keep their
    /// relative position.
    pub fn new(routes: Vec<Route>) -> Self {
        let mut routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        routes.sort_by_key(|r| r.order());
        Self { routes }
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.routes.iter().map(|r| r.summary()).collect()
    }
}

pub struct RouteTable {
    current: ArcSwap<RouteSnapshot>,
}

impl RouteTable {
    pub fn new(snapshot: RouteSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn empty() -> Self {
        Self::new(RouteSnapshot::default())
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.current.load_full()
    }

    /// Replace the table, returning the previous snapshot.
    pub fn publish(&self, snapshot: RouteSnapshot) -> Arc<RouteSnapshot> {
        let previous = self.current.swap(Arc::new(snapshot));
        tracing::info!(
            "Route table updated: {} routes (previously {})",
            self.current.load().len(),
            previous.len()
        );
        previous
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::predicate;

    fn route(id: &str, order: i32) -> Route {
        Route::new(
            id,
            "http://localhost".parse().unwrap(),
            order,
            predicate::from_fn(|_| true),
            Vec::new(),
        )
    }

    #[test]
    fn test_snapshot_sorted_by_order_stably() {
        let snapshot = RouteSnapshot::new(vec![route("c", 2), route("a", 0), route("b", 2), route("z", -1)]);
        let ids: Vec<_> = snapshot.routes().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["z", "a", "c", "b"]);
        assert!(snapshot.get("b").is_some());
    }

    #[test]
    fn test_old_snapshot_stays_consistent_after_publish() {
        let table = RouteTable::new(RouteSnapshot::new(vec![route("old-1", 0), route("old-2", 1)]));
        let in_flight = table.snapshot();

        let previous = table.publish(RouteSnapshot::new(vec![route("new", 0)]));

        assert!(Arc::ptr_eq(&previous, &in_flight));
        let held: Vec<_> = in_flight.routes().iter().map(|r| r.id()).collect();
        assert_eq!(held, vec!["old-1", "old-2"]);
        let fresh: Vec<_> = table.snapshot().routes().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(fresh, vec!["new"]);
    }
}
