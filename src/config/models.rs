//! Configuration data structures for Switchyard.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! serde-friendly and include defaults so that minimal configs remain concise.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{
    definition::{FilterDefinition, RouteDefinition},
    rate_limiter::FailurePolicy,
};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_deny_status() -> u16 {
    429
}

fn default_timeout() -> String {
    "30s".to_string()
}

/// Load balancing strategy for `lb://` targets
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[serde(rename = "round_robin")]
    #[default]
    RoundRobin,
    #[serde(rename = "random")]
    Random,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub strategy: LoadBalanceStrategy,
}

/// Settings shared by every `RequestRateLimiter` filter.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Redis connection URL. When absent, buckets live in process memory.
    pub redis_url: Option<String>,
    /// What to do when the counter store cannot be reached
    pub failure_policy: FailurePolicy,
    /// Let an in-flight bucket update finish after the request is cancelled
    pub complete_on_cancel: bool,
    /// Status answered to throttled requests unless a route overrides it
    #[serde(default = "default_deny_status")]
    pub deny_status: u16,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            failure_policy: FailurePolicy::default(),
            complete_on_cancel: false,
            deny_status: default_deny_status(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Upstream response timeout, parsed by humantime, e.g. "500ms", "30s"
    pub timeout: String,
}

impl HttpClientConfig {
    pub fn timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Requests whose port equals this one are never routed.
    #[serde(default)]
    pub management_port: Option<u16>,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
    /// Filters prepended to every route's own filters.
    #[serde(default)]
    pub default_filters: Vec<FilterDefinition>,
    /// Service id to instance URLs, for `lb://` route targets.
    #[serde(default)]
    pub services: HashMap<String, Vec<Url>>,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterSettings,
    #[serde(default)]
    pub http_client: HttpClientConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            management_port: None,
            routes: Vec::new(),
            default_filters: Vec::new(),
            services: HashMap::new(),
            load_balancer: LoadBalancerConfig::default(),
            rate_limiter: RateLimiterSettings::default(),
            http_client: HttpClientConfig::default(),
        }
    }
}

/// Builder for GatewayConfig, mostly for embedding and tests
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn management_port(mut self, port: u16) -> Self {
        self.config.management_port = Some(port);
        self
    }

    /// Add a route definition
    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.config.routes.push(route);
        self
    }

    /// Add a filter applied to every route
    pub fn default_filter(mut self, filter: FilterDefinition) -> Self {
        self.config.default_filters.push(filter);
        self
    }

    /// Register the instances of a load balanced service
    pub fn service(mut self, name: impl Into<String>, instances: Vec<Url>) -> Self {
        self.config.services.insert(name.into(), instances);
        self
    }

    pub fn load_balance_strategy(mut self, strategy: LoadBalanceStrategy) -> Self {
        self.config.load_balancer.strategy = strategy;
        self
    }

    pub fn rate_limiter(mut self, settings: RateLimiterSettings) -> Self {
        self.config.rate_limiter = settings;
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.config.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"routes": [{"id": "a", "uri": "http://backend:80", "predicates": ["Path=/a/**"]}]}"#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.routes[0].order, 0);
        assert_eq!(config.rate_limiter.deny_status, 429);
        assert_eq!(config.rate_limiter.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.load_balancer.strategy, LoadBalanceStrategy::RoundRobin);
        assert_eq!(config.http_client.timeout().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder_requires_routes() {
        assert!(GatewayConfig::builder().build().is_err());

        let route = RouteDefinition::new("a", "http://backend:80".parse().unwrap())
            .predicate("Path=/a".parse().unwrap());
        let config = GatewayConfig::builder()
            .listen_addr("0.0.0.0:9000")
            .route(route)
            .build()
            .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_strategy_names() {
        let strategy: LoadBalanceStrategy = serde_json::from_str(r#""random""#).unwrap();
        assert_eq!(strategy, LoadBalanceStrategy::Random);
    }
}
