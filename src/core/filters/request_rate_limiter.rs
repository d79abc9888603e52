//! `RequestRateLimiter`: token bucket throttling per route and request key.
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::{
    error::{GatewayResult, InvalidArgument},
    exchange::Exchange,
    filter::{FilterChain, GatewayFilter, SharedFilter},
    rate_limiter::{BucketLimits, DistributedRateLimiter},
    registry::GatewayFilterFactory,
};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const REPLENISH_RATE_HEADER: &str = "x-ratelimit-replenish-rate";
pub const BURST_CAPACITY_HEADER: &str = "x-ratelimit-burst-capacity";
pub const REQUESTED_TOKENS_HEADER: &str = "x-ratelimit-requested-tokens";

/// Behaviour when the request key cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    Allow,
    #[default]
    Deny,
}

/// How requests are grouped into buckets within a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolver {
    /// One bucket for the whole route.
    Route,
    /// One bucket per client IP.
    ClientIp,
    /// One bucket per value of a request header.
    Header(HeaderName),
}

impl KeyResolver {
    /// Parse `route`, `ip` or `header:<name>`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        match spec.to_ascii_lowercase().as_str() {
            "route" => Ok(KeyResolver::Route),
            "ip" => Ok(KeyResolver::ClientIp),
            _ => {
                let name = spec
                    .split_once(':')
                    .filter(|(kind, _)| kind.eq_ignore_ascii_case("header"))
                    .map(|(_, name)| name.trim())
                    .ok_or_else(|| format!("unknown key resolver '{spec}'"))?;
                HeaderName::from_bytes(name.as_bytes())
                    .map(KeyResolver::Header)
                    .map_err(|e| format!("invalid header name '{name}': {e}"))
            }
        }
    }

    pub fn resolve(&self, exchange: &Exchange) -> Option<String> {
        match self {
            KeyResolver::Route => Some("*".to_string()),
            KeyResolver::ClientIp => exchange.client_addr().map(|addr| addr.ip().to_string()),
            KeyResolver::Header(name) => exchange
                .request()
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRateLimiterConfig {
    pub replenish_rate: u32,
    pub burst_capacity: u32,
    pub requested_tokens: u32,
    pub key_resolver: String,
    pub on_missing_key: MissingKeyPolicy,
    pub empty_key_status: u16,
    /// Status for throttled requests; the gateway default when absent.
    pub status: Option<u16>,
    pub include_headers: bool,
}

impl Default for RequestRateLimiterConfig {
    fn default() -> Self {
        Self {
            replenish_rate: 0,
            burst_capacity: 0,
            requested_tokens: 1,
            key_resolver: "route".to_string(),
            on_missing_key: MissingKeyPolicy::Deny,
            empty_key_status: StatusCode::FORBIDDEN.as_u16(),
            status: None,
            include_headers: true,
        }
    }
}

pub struct RequestRateLimiterGatewayFilterFactory {
    limiter: Arc<DistributedRateLimiter>,
    deny_status: StatusCode,
}

impl RequestRateLimiterGatewayFilterFactory {
    pub fn new(limiter: Arc<DistributedRateLimiter>) -> Self {
        Self {
            limiter,
            deny_status: StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn with_deny_status(mut self, status: StatusCode) -> Self {
        self.deny_status = status;
        self
    }
}

impl GatewayFilterFactory for RequestRateLimiterGatewayFilterFactory {
    type Config = RequestRateLimiterConfig;

    fn name(&self) -> &'static str {
        "RequestRateLimiter"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["replenish_rate", "burst_capacity", "key_resolver"]
    }

    fn build(&self, config: RequestRateLimiterConfig) -> Result<SharedFilter, InvalidArgument> {
        let invalid = |message: String| InvalidArgument::new("RequestRateLimiter", message);

        let limits = BucketLimits::new(config.replenish_rate, config.burst_capacity)
            .with_requested_tokens(config.requested_tokens);
        limits.validate().map_err(invalid)?;

        let resolver = KeyResolver::parse(&config.key_resolver).map_err(invalid)?;
        let status = match config.status {
            Some(code) => StatusCode::from_u16(code).map_err(|e| invalid(e.to_string()))?,
            None => self.deny_status,
        };
        let empty_key_status =
            StatusCode::from_u16(config.empty_key_status).map_err(|e| invalid(e.to_string()))?;

        Ok(Arc::new(RequestRateLimiterFilter {
            limiter: self.limiter.clone(),
            limits,
            resolver,
            on_missing_key: config.on_missing_key,
            empty_key_status,
            status,
            include_headers: config.include_headers,
        }))
    }
}

pub struct RequestRateLimiterFilter {
    limiter: Arc<DistributedRateLimiter>,
    limits: BucketLimits,
    resolver: KeyResolver,
    on_missing_key: MissingKeyPolicy,
    empty_key_status: StatusCode,
    status: StatusCode,
    include_headers: bool,
}

impl RequestRateLimiterFilter {
    fn reject(exchange: &mut Exchange, status: StatusCode) {
        let response = exchange.response_mut();
        response.set_status(status);
        response.complete();
    }

    fn set_headers(&self, exchange: &mut Exchange, remaining: i64) {
        let response = exchange.response_mut();
        let pairs = [
            (REMAINING_HEADER, remaining),
            (REPLENISH_RATE_HEADER, i64::from(self.limits.replenish_rate)),
            (BURST_CAPACITY_HEADER, i64::from(self.limits.burst_capacity)),
            (REQUESTED_TOKENS_HEADER, i64::from(self.limits.requested_tokens)),
        ];
        for (name, value) in pairs {
            response.set_header(HeaderName::from_static(name), HeaderValue::from(value));
        }
    }
}

#[async_trait]
impl GatewayFilter for RequestRateLimiterFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        let Some(key) = self.resolver.resolve(exchange) else {
            return match self.on_missing_key {
                MissingKeyPolicy::Allow => chain.proceed(exchange).await,
                MissingKeyPolicy::Deny => {
                    tracing::debug!(resolver = ?self.resolver, "rate limit key missing, rejecting");
                    Self::reject(exchange, self.empty_key_status);
                    Ok(())
                }
            };
        };

        let route_id = exchange
            .attributes()
            .route()
            .map_or_else(String::new, |r| r.id().to_string());
        let bucket = format!("{route_id}.{key}");
        let cancellation = exchange.cancellation().clone();
        let decision = self.limiter.check(&bucket, &self.limits, &cancellation).await?;

        if self.include_headers {
            self.set_headers(exchange, decision.tokens_remaining);
        }

        if decision.allowed {
            chain.proceed(exchange).await
        } else {
            tracing::debug!(bucket = %bucket, "rate limit exceeded");
            Self::reject(exchange, self.status);
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "RequestRateLimiter"
    }
}
