//! Filter contract and the index-based filter chain.
//!
//! A chain is an ordered slice of filters plus a terminal action. Invoking
//! [`FilterChain::proceed`] either hands the exchange to the filter at the
//! current index (with a chain positioned one step further as its
//! continuation) or, past the last filter, runs the terminal action. Filters
//! therefore run their pre-phase in ascending order and their post-phase in
//! reverse order, and may short-circuit by never calling `proceed`.
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{
    error::{GatewayError, GatewayResult},
    exchange::Exchange,
};

/// Interceptor around the downstream call.
#[async_trait]
pub trait GatewayFilter: Send + Sync + 'static {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()>;

    /// Explicit priority. Filters without one are ordered by position.
    fn order(&self) -> Option<i32> {
        None
    }

    fn name(&self) -> &'static str;
}

pub type SharedFilter = Arc<dyn GatewayFilter>;

/// A filter with its final execution order.
#[derive(Clone)]
pub struct OrderedFilter {
    order: i32,
    filter: SharedFilter,
}

impl OrderedFilter {
    pub fn new(order: i32, filter: SharedFilter) -> Self {
        Self { order, filter }
    }

    /// Use the filter's declared order, or `fallback` when it declares none.
    pub fn declared_or(filter: SharedFilter, fallback: i32) -> Self {
        let order = filter.order().unwrap_or(fallback);
        Self { order, filter }
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn filter(&self) -> &SharedFilter {
        &self.filter
    }

    pub fn name(&self) -> &'static str {
        self.filter.name()
    }
}

impl std::fmt::Debug for OrderedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedFilter")
            .field("name", &self.name())
            .field("order", &self.order)
            .finish()
    }
}

/// Stable ascending sort by execution order.
pub fn sort_filters(filters: &mut [OrderedFilter]) {
    filters.sort_by_key(OrderedFilter::order);
}

/// Action run once every filter has delegated.
#[async_trait]
pub trait TerminalAction: Send + Sync + 'static {
    async fn execute(&self, exchange: &mut Exchange) -> GatewayResult<()>;
}

/// Terminal action that does nothing.
pub struct NoopTerminal;

#[async_trait]
impl TerminalAction for NoopTerminal {
    async fn execute(&self, _exchange: &mut Exchange) -> GatewayResult<()> {
        Ok(())
    }
}

/// Continuation handed to each filter: "run the remaining filters, then the
/// terminal action".
pub struct FilterChain<'a> {
    filters: &'a [OrderedFilter],
    index: usize,
    terminal: &'a dyn TerminalAction,
}

impl<'a> FilterChain<'a> {
    pub fn new(filters: &'a [OrderedFilter], terminal: &'a dyn TerminalAction) -> Self {
        Self {
            filters,
            index: 0,
            terminal,
        }
    }

    /// Number of filters still ahead of the terminal action.
    pub fn remaining(&self) -> usize {
        self.filters.len().saturating_sub(self.index)
    }

    pub async fn proceed(self, exchange: &mut Exchange) -> GatewayResult<()> {
        if exchange.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        match self.filters.get(self.index) {
            Some(current) => {
                tracing::trace!(
                    filter = current.name(),
                    order = current.order(),
                    "applying filter"
                );
                let next = FilterChain {
                    filters: self.filters,
                    index: self.index + 1,
                    terminal: self.terminal,
                };
                current.filter().filter(exchange, next).await
            }
            None => self.terminal.execute(exchange).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use http::{Request, StatusCode};

    use super::*;

    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl GatewayFilter for Recording {
        async fn filter(
            &self,
            exchange: &mut Exchange,
            chain: FilterChain<'_>,
        ) -> GatewayResult<()> {
            self.log.lock().unwrap().push(format!("pre:{}", self.label));
            chain.proceed(exchange).await?;
            self.log.lock().unwrap().push(format!("post:{}", self.label));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Recording"
        }
    }

    struct Answering;

    #[async_trait]
    impl GatewayFilter for Answering {
        async fn filter(
            &self,
            exchange: &mut Exchange,
            _chain: FilterChain<'_>,
        ) -> GatewayResult<()> {
            exchange.response_mut().set_status(StatusCode::NO_CONTENT);
            exchange.response_mut().complete();
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Answering"
        }
    }

    struct RecordingTerminal(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl TerminalAction for RecordingTerminal {
        async fn execute(&self, _exchange: &mut Exchange) -> GatewayResult<()> {
            self.0.lock().unwrap().push("terminal".to_string());
            Ok(())
        }
    }

    fn recording(label: &'static str, order: i32, log: &Arc<Mutex<Vec<String>>>) -> OrderedFilter {
        OrderedFilter::new(
            order,
            Arc::new(Recording {
                label,
                log: log.clone(),
            }),
        )
    }

    #[tokio::test]
    async fn test_post_phase_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = vec![
            recording("A", 1, &log),
            recording("B", 2, &log),
            recording("C", 3, &log),
        ];
        let terminal = RecordingTerminal(log.clone());
        let mut ex = Exchange::new(Request::new(Body::empty()));

        FilterChain::new(&filters, &terminal)
            .proceed(&mut ex)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "pre:A", "pre:B", "pre:C", "terminal", "post:C", "post:B", "post:A"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest_of_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = vec![
            recording("A", 1, &log),
            OrderedFilter::new(2, Arc::new(Answering)),
            recording("C", 3, &log),
        ];
        let terminal = RecordingTerminal(log.clone());
        let mut ex = Exchange::new(Request::new(Body::empty()));

        FilterChain::new(&filters, &terminal)
            .proceed(&mut ex)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["pre:A", "post:A"]);
        assert_eq!(ex.response().status(), Some(StatusCode::NO_CONTENT));
    }

    #[tokio::test]
    async fn test_cancelled_exchange_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let filters = vec![recording("A", 1, &log)];
        let terminal = RecordingTerminal(log.clone());
        let mut ex = Exchange::new(Request::new(Body::empty()));
        ex.cancellation().cancel();

        let result = FilterChain::new(&filters, &terminal).proceed(&mut ex).await;
        assert!(matches!(result, Err(GatewayError::Cancelled)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let x = recording("x", 2, &log);
        let y = recording("y", 1, &log);
        let z = recording("z", 2, &log);
        let mut filters = vec![x.clone(), y.clone(), z.clone()];
        sort_filters(&mut filters);

        assert!(Arc::ptr_eq(filters[0].filter(), y.filter()));
        assert!(Arc::ptr_eq(filters[1].filter(), x.filter()));
        assert!(Arc::ptr_eq(filters[2].filter(), z.filter()));
    }
}
