//! Predicates over the request line and headers: `Method`, `Header`, `Host`.
use http::{Method, header};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{
    error::InvalidArgument,
    pattern::{SegmentPattern, strip_port},
    predicate::{self, SharedPredicate},
    registry::{PredicateFactory, ShortcutType},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodConfig {
    pub methods: Vec<String>,
}

pub struct MethodRoutePredicateFactory;

impl PredicateFactory for MethodRoutePredicateFactory {
    type Config = MethodConfig;

    fn name(&self) -> &'static str {
        "Method"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["methods"]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn build(&self, config: MethodConfig) -> Result<SharedPredicate, InvalidArgument> {
        if config.methods.is_empty() {
            return Err(InvalidArgument::new(self.name(), "at least one method is required"));
        }
        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| InvalidArgument::new(self.name(), format!("invalid method '{m}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(predicate::from_fn(move |exchange| {
            methods.contains(exchange.request().method())
        }))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub header: String,
    pub regexp: Option<String>,
}

/// Matches when the header is present and, if a regexp is given, any of its
/// values fully matches it.
pub struct HeaderRoutePredicateFactory;

impl PredicateFactory for HeaderRoutePredicateFactory {
    type Config = HeaderConfig;

    fn name(&self) -> &'static str {
        "Header"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["header", "regexp"]
    }

    fn build(&self, config: HeaderConfig) -> Result<SharedPredicate, InvalidArgument> {
        let name = header::HeaderName::from_bytes(config.header.trim().as_bytes())
            .map_err(|e| InvalidArgument::new(self.name(), e.to_string()))?;
        let regex = config
            .regexp
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|r| Regex::new(&format!("^(?:{r})$")))
            .transpose()
            .map_err(|e| InvalidArgument::new(self.name(), e.to_string()))?;

        Ok(predicate::from_fn(move |exchange| {
            let mut values = exchange.request().headers().get_all(&name).iter().peekable();
            match &regex {
                None => values.peek().is_some(),
                Some(regex) => values.any(|v| v.to_str().is_ok_and(|v| regex.is_match(v))),
            }
        }))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    pub patterns: Vec<String>,
}

/// Matches the `Host` header (port ignored) against host patterns. Captured
/// variables are published as URI template variables.
pub struct HostRoutePredicateFactory;

impl PredicateFactory for HostRoutePredicateFactory {
    type Config = HostConfig;

    fn name(&self) -> &'static str {
        "Host"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["patterns"]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn build(&self, config: HostConfig) -> Result<SharedPredicate, InvalidArgument> {
        if config.patterns.is_empty() {
            return Err(InvalidArgument::new(self.name(), "at least one pattern is required"));
        }
        let patterns = config
            .patterns
            .iter()
            .map(|p| SegmentPattern::host(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| InvalidArgument::new(self.name(), e.to_string()))?;

        Ok(predicate::from_fn(move |exchange| {
            let host = exchange
                .request()
                .headers()
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .or_else(|| exchange.request().uri().host())
                .map(|h| strip_port(h).to_string());
            let Some(host) = host else {
                return false;
            };
            let Some(vars) = patterns.iter().find_map(|p| p.matches(&host)) else {
                return false;
            };
            exchange.attributes_mut().put_uri_template_variables(vars);
            true
        }))
    }
}
