use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::core::{
    error::{GatewayResult, InvalidArgument},
    exchange::Exchange,
    filter::{FilterChain, GatewayFilter, SharedFilter},
    registry::GatewayFilterFactory,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedirectToConfig {
    pub status: String,
    pub url: String,
}

pub struct RedirectToGatewayFilterFactory;

impl GatewayFilterFactory for RedirectToGatewayFilterFactory {
    type Config = RedirectToConfig;

    fn name(&self) -> &'static str {
        "RedirectTo"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["status", "url"]
    }

    fn build(&self, config: RedirectToConfig) -> Result<SharedFilter, InvalidArgument> {
        let status = config
            .status
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| {
                InvalidArgument::new(self.name(), format!("invalid status '{}'", config.status))
            })?;
        if !status.is_redirection() {
            return Err(InvalidArgument::new(
                self.name(),
                format!("status must be a 3xx code, but was {}", config.status),
            ));
        }
        let invalid_url = || InvalidArgument::new(self.name(), format!("invalid url '{}'", config.url));
        config.url.parse::<http::Uri>().map_err(|_| invalid_url())?;
        // Sent exactly as configured.
        let location = HeaderValue::from_str(&config.url).map_err(|_| invalid_url())?;
        Ok(Arc::new(RedirectToFilter { status, location }))
    }
}

/// Answers with a redirect once the downstream chain has run, unless the
/// response was already committed.
pub struct RedirectToFilter {
    status: StatusCode,
    location: HeaderValue,
}

#[async_trait]
impl GatewayFilter for RedirectToFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        chain.proceed(exchange).await?;

        let response = exchange.response_mut();
        if !response.is_committed() {
            response.set_status(self.status);
            response.set_header(header::LOCATION, self.location.clone());
            response.set_body(Body::empty());
            response.complete();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RedirectTo"
    }
}
