//! Header mutation filters: `AddRequestHeader`, `AddResponseHeader`.
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::core::{
    error::{GatewayResult, InvalidArgument},
    exchange::Exchange,
    filter::{FilterChain, GatewayFilter, SharedFilter},
    registry::GatewayFilterFactory,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameValueConfig {
    pub name: String,
    pub value: String,
}

fn parse_header(factory: &str, config: &NameValueConfig) -> Result<(HeaderName, HeaderValue), InvalidArgument> {
    let name = HeaderName::from_bytes(config.name.trim().as_bytes())
        .map_err(|e| InvalidArgument::new(factory, format!("header name '{}': {e}", config.name)))?;
    let value = HeaderValue::from_str(&config.value)
        .map_err(|e| InvalidArgument::new(factory, format!("header value '{}': {e}", config.value)))?;
    Ok((name, value))
}

pub struct AddRequestHeaderGatewayFilterFactory;

impl GatewayFilterFactory for AddRequestHeaderGatewayFilterFactory {
    type Config = NameValueConfig;

    fn name(&self) -> &'static str {
        "AddRequestHeader"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["name", "value"]
    }

    fn build(&self, config: NameValueConfig) -> Result<SharedFilter, InvalidArgument> {
        let (name, value) = parse_header(self.name(), &config)?;
        Ok(Arc::new(AddRequestHeaderFilter { name, value }))
    }
}

/// Appends a header to the outgoing request; existing values are kept.
pub struct AddRequestHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

#[async_trait]
impl GatewayFilter for AddRequestHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        exchange.mutate_request(|parts| {
            parts.headers.append(self.name.clone(), self.value.clone());
        });
        chain.proceed(exchange).await
    }

    fn name(&self) -> &'static str {
        "AddRequestHeader"
    }
}

pub struct AddResponseHeaderGatewayFilterFactory;

impl GatewayFilterFactory for AddResponseHeaderGatewayFilterFactory {
    type Config = NameValueConfig;

    fn name(&self) -> &'static str {
        "AddResponseHeader"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["name", "value"]
    }

    fn build(&self, config: NameValueConfig) -> Result<SharedFilter, InvalidArgument> {
        let (name, value) = parse_header(self.name(), &config)?;
        Ok(Arc::new(AddResponseHeaderFilter { name, value }))
    }
}

/// Appends a header to the response before the downstream call, so it
/// survives whatever the downstream commits.
pub struct AddResponseHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

#[async_trait]
impl GatewayFilter for AddResponseHeaderFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        exchange
            .response_mut()
            .append_header(self.name.clone(), self.value.clone());
        chain.proceed(exchange).await
    }

    fn name(&self) -> &'static str {
        "AddResponseHeader"
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, Response};

    use super::*;
    use crate::core::{
        definition::Args,
        filter::{OrderedFilter, TerminalAction},
        registry::ErasedFilterFactory,
    };

    struct Upstream;

    #[async_trait]
    impl TerminalAction for Upstream {
        async fn execute(&self, exchange: &mut Exchange) -> GatewayResult<()> {
            let response = Response::builder()
                .header("x-upstream", "yes")
                .body(Body::empty())
                .unwrap();
            exchange.response_mut().commit_with(response);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_request_header_is_appended_not_replaced() {
        let filter = AddRequestHeaderGatewayFilterFactory
            .apply(&Args::positional(["X-Tag", "second"]))
            .unwrap()
            .value;
        let filters = vec![OrderedFilter::new(1, filter)];
        let mut ex = Exchange::new(
            Request::get("/")
                .header("x-tag", "first")
                .body(Body::empty())
                .unwrap(),
        );
        FilterChain::new(&filters, &Upstream)
            .proceed(&mut ex)
            .await
            .unwrap();

        let values: Vec<_> = ex.request().headers().get_all("x-tag").iter().collect();
        assert_eq!(values, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_response_header_survives_commit() {
        let filter = AddResponseHeaderGatewayFilterFactory
            .apply(&Args::positional(["X-Served-By", "gateway"]))
            .unwrap()
            .value;
        let filters = vec![OrderedFilter::new(1, filter)];
        let mut ex = Exchange::new(Request::get("/").body(Body::empty()).unwrap());
        FilterChain::new(&filters, &Upstream)
            .proceed(&mut ex)
            .await
            .unwrap();

        let response = ex.into_response();
        assert_eq!(response.headers()["x-served-by"], "gateway");
        assert_eq!(response.headers()["x-upstream"], "yes");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let err = AddRequestHeaderGatewayFilterFactory
            .apply(&Args::positional(["bad header", "v"]))
            .err()
            .unwrap();
        assert_eq!(err.factory, "AddRequestHeader");
    }
}
