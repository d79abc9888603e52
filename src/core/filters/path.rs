//! Path rewriting filters: `RewritePath`, `PrefixPath`.
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{
    error::{GatewayError, GatewayResult, InvalidArgument},
    exchange::{Exchange, uri_with_path},
    filter::{FilterChain, GatewayFilter, SharedFilter},
    registry::GatewayFilterFactory,
};

/// Record the current URI as an original request URL, then swap in `path`.
fn replace_path(exchange: &mut Exchange, filter: &str, path: &str) -> GatewayResult<()> {
    let original = exchange.request().uri().clone();
    let rewritten = uri_with_path(&original, path).map_err(|e| GatewayError::filter(filter, e))?;
    exchange.attributes_mut().add_original_request_url(original);
    exchange.mutate_request(|parts| parts.uri = rewritten);
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewritePathConfig {
    pub regexp: String,
    pub replacement: String,
}

pub struct RewritePathGatewayFilterFactory;

impl GatewayFilterFactory for RewritePathGatewayFilterFactory {
    type Config = RewritePathConfig;

    fn name(&self) -> &'static str {
        "RewritePath"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["regexp", "replacement"]
    }

    fn build(&self, config: RewritePathConfig) -> Result<SharedFilter, InvalidArgument> {
        let regex = Regex::new(&config.regexp)
            .map_err(|e| InvalidArgument::new(self.name(), e.to_string()))?;
        // `$\` stands in for `$` where the latter clashes with config syntax
        let replacement = config.replacement.replace("$\\", "$");
        Ok(Arc::new(RewritePathFilter { regex, replacement }))
    }
}

/// Rewrites the request path with a regex substitution. Query and authority
/// are untouched.
pub struct RewritePathFilter {
    regex: Regex,
    replacement: String,
}

impl RewritePathFilter {
    pub fn rewrite(&self, path: &str) -> String {
        self.regex
            .replace_all(path, self.replacement.as_str())
            .into_owned()
    }
}

#[async_trait]
impl GatewayFilter for RewritePathFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        let path = self.rewrite(exchange.request().uri().path());
        replace_path(exchange, self.name(), &path)?;
        chain.proceed(exchange).await
    }

    fn name(&self) -> &'static str {
        "RewritePath"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefixPathConfig {
    pub prefix: String,
}

pub struct PrefixPathGatewayFilterFactory;

impl GatewayFilterFactory for PrefixPathGatewayFilterFactory {
    type Config = PrefixPathConfig;

    fn name(&self) -> &'static str {
        "PrefixPath"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["prefix"]
    }

    fn build(&self, config: PrefixPathConfig) -> Result<SharedFilter, InvalidArgument> {
        if !config.prefix.starts_with('/') {
            return Err(InvalidArgument::new(
                self.name(),
                format!("prefix '{}' must start with '/'", config.prefix),
            ));
        }
        Ok(Arc::new(PrefixPathFilter {
            prefix: config.prefix.trim_end_matches('/').to_string(),
        }))
    }
}

/// Prepends a fixed prefix to the request path.
pub struct PrefixPathFilter {
    prefix: String,
}

#[async_trait]
impl GatewayFilter for PrefixPathFilter {
    async fn filter(&self, exchange: &mut Exchange, chain: FilterChain<'_>) -> GatewayResult<()> {
        let path = format!("{}{}", self.prefix, exchange.request().uri().path());
        replace_path(exchange, self.name(), &path)?;
        chain.proceed(exchange).await
    }

    fn name(&self) -> &'static str {
        "PrefixPath"
    }
}
