//! Per-request pipeline: match a route, then run its filters and the global
//! filters around the terminal action.
use std::sync::Arc;

use axum::body::Body;
use http::{Request, Response, header};

use crate::core::{
    error::GatewayResult,
    exchange::Exchange,
    filter::{FilterChain, OrderedFilter, TerminalAction, sort_filters},
    matcher::lookup_route,
    route_table::RouteTable,
};

/// Result of handling one request.
#[derive(Debug)]
pub enum HandleOutcome {
    /// A route matched and its chain ran to completion.
    Routed(Response<Body>),
    /// No route accepted the request.
    NoRoute,
}

pub struct GatewayHandler {
    table: Arc<RouteTable>,
    global_filters: Vec<OrderedFilter>,
    terminal: Arc<dyn TerminalAction>,
    management_port: Option<u16>,
}

impl GatewayHandler {
    pub fn new(
        table: Arc<RouteTable>,
        global_filters: Vec<OrderedFilter>,
        terminal: Arc<dyn TerminalAction>,
    ) -> Self {
        Self {
            table,
            global_filters,
            terminal,
            management_port: None,
        }
    }

    /// Requests addressed to this port are never routed.
    pub fn with_management_port(mut self, port: Option<u16>) -> Self {
        self.management_port = port;
        self
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    fn request_port(request: &Request<Body>) -> Option<u16> {
        request.uri().port_u16().or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|host| host.to_str().ok())
                .and_then(|host| host.rsplit_once(':'))
                .and_then(|(_, port)| port.parse().ok())
        })
    }

    /// Route `exchange` against the current table snapshot.
    ///
    /// The snapshot is loaded once, so a concurrent refresh never changes the
    /// routes this request sees.
    pub async fn handle(&self, mut exchange: Exchange) -> GatewayResult<HandleOutcome> {
        if self.management_port.is_some()
            && Self::request_port(exchange.request()) == self.management_port
        {
            return Ok(HandleOutcome::NoRoute);
        }

        let snapshot = self.table.snapshot();
        let Ok(route) = lookup_route(&mut exchange, &snapshot).await else {
            return Ok(HandleOutcome::NoRoute);
        };

        let mut filters: Vec<OrderedFilter> = route
            .filters()
            .iter()
            .chain(self.global_filters.iter())
            .cloned()
            .collect();
        sort_filters(&mut filters);
        tracing::trace!(route_id = route.id(), filters = ?filters, "sorted gateway filters");

        FilterChain::new(&filters, self.terminal.as_ref())
            .proceed(&mut exchange)
            .await?;
        Ok(HandleOutcome::Routed(exchange.into_response()))
    }
}
