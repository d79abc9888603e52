use std::{collections::HashSet, net::SocketAddr};

use http::StatusCode;
use url::Url;

use crate::{
    config::models::{GatewayConfig, HttpClientConfig, RateLimiterSettings},
    core::{
        definition::RouteDefinition,
        filters::LB_SCHEME,
    },
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, reporting every problem at once
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        }
        for route in &config.routes {
            if let Err(mut route_errors) = Self::validate_route(route, config) {
                errors.append(&mut route_errors);
            }
        }
        if let Err(mut conflicts) = Self::check_route_conflicts(&config.routes) {
            errors.append(&mut conflicts);
        }

        for (service, instances) in &config.services {
            if let Err(mut service_errors) = Self::validate_service(service, instances) {
                errors.append(&mut service_errors);
            }
        }

        if let Err(mut limiter_errors) = Self::validate_rate_limiter(&config.rate_limiter) {
            errors.append(&mut limiter_errors);
        }
        if let Err(e) = Self::validate_http_client(&config.http_client) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single route definition
    fn validate_route(
        route: &RouteDefinition,
        config: &GatewayConfig,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let field = |name: &str| format!("route '{}' {name}", route.id);

        if route.id.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "route id".to_string(),
            });
        }

        if route.predicates.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: field("predicates"),
                message: "At least one predicate is required".to_string(),
            });
        }

        match route.uri.scheme() {
            "http" | "https" => {
                if route.uri.host_str().is_none() {
                    errors.push(ValidationError::InvalidField {
                        field: field("uri"),
                        message: "HTTP targets must have a host".to_string(),
                    });
                }
            }
            LB_SCHEME => match route.uri.host_str() {
                None => errors.push(ValidationError::InvalidField {
                    field: field("uri"),
                    message: "lb:// targets must name a service".to_string(),
                }),
                Some(service)
                    if !config
                        .services
                        .keys()
                        .any(|name| name.eq_ignore_ascii_case(service)) =>
                {
                    errors.push(ValidationError::InvalidField {
                        field: field("uri"),
                        message: format!("Service '{service}' is not configured in 'services'"),
                    });
                }
                Some(_) => {}
            },
            // `forward:` takes its path from the request; any other scheme is
            // routed nowhere (e.g. redirect-only routes).
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Route ids must be unique
    fn check_route_conflicts(routes: &[RouteDefinition]) -> Result<(), Vec<ValidationError>> {
        let mut seen = HashSet::new();
        let errors: Vec<_> = routes
            .iter()
            .filter(|route| !seen.insert(route.id.as_str()))
            .map(|route| ValidationError::RouteConflict {
                message: format!("Duplicate route id '{}'", route.id),
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_service(service: &str, instances: &[Url]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if instances.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("service '{service}'"),
                message: "At least one instance is required".to_string(),
            });
        }
        for instance in instances {
            if !matches!(instance.scheme(), "http" | "https") || instance.host_str().is_none() {
                errors.push(ValidationError::InvalidField {
                    field: format!("service '{service}' instance"),
                    message: format!("'{instance}' must be an http(s) URL with a host"),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_rate_limiter(settings: &RateLimiterSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if StatusCode::from_u16(settings.deny_status).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "rate_limiter.deny_status".to_string(),
                message: format!("{} is not an HTTP status code", settings.deny_status),
            });
        }

        if let Some(redis_url) = &settings.redis_url {
            match Url::parse(redis_url) {
                Ok(url) if matches!(url.scheme(), "redis" | "rediss" | "redis+unix") => {}
                Ok(url) => errors.push(ValidationError::InvalidField {
                    field: "rate_limiter.redis_url".to_string(),
                    message: format!("Unsupported scheme '{}'", url.scheme()),
                }),
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: "rate_limiter.redis_url".to_string(),
                    message: e.to_string(),
                }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_http_client(config: &HttpClientConfig) -> ValidationResult<()> {
        config
            .timeout()
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidField {
                field: "http_client.timeout".to_string(),
                message: e.to_string(),
            })
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::PredicateDefinition;

    fn route(id: &str, uri: &str) -> RouteDefinition {
        RouteDefinition::new(id, uri.parse().unwrap())
            .predicate(PredicateDefinition::new("Path", Default::default()))
    }

    fn minimal_valid_config() -> GatewayConfig {
        GatewayConfig {
            routes: vec![route("api", "http://localhost:3000")],
            ..GatewayConfig::default()
        }
    }

    fn message(config: &GatewayConfig) -> String {
        match GatewayConfigValidator::validate(config) {
            Err(ValidationError::ValidationFailed { message }) => message,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(GatewayConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut config = minimal_valid_config();
        config.listen_addr = "localhost".to_string();
        assert!(message(&config).contains("Invalid listen address"));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut config = minimal_valid_config();
        config.routes.push(route("api", "http://localhost:3001"));
        config
            .routes
            .push(RouteDefinition::new("bare", "http://localhost:3002".parse().unwrap()));
        config.rate_limiter.deny_status = 1000;

        let message = message(&config);
        assert!(message.starts_with("Found 3 validation errors"), "{message}");
        assert!(message.contains("Duplicate route id 'api'"));
        assert!(message.contains("route 'bare' predicates"));
        assert!(message.contains("rate_limiter.deny_status"));
    }

    #[test]
    fn test_lb_route_requires_configured_service() {
        let mut config = minimal_valid_config();
        config.routes.push(route("orders", "lb://orders"));
        assert!(message(&config).contains("Service 'orders' is not configured"));

        config.services.insert(
            "Orders".to_string(),
            vec!["http://10.0.0.1:8080".parse().unwrap()],
        );
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_other_schemes_are_accepted() {
        let mut config = minimal_valid_config();
        config.routes.push(route("local", "forward:/health"));
        config.routes.push(route("redirect", "no://op"));
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_bad_redis_url_and_timeout() {
        let mut config = minimal_valid_config();
        config.rate_limiter.redis_url = Some("http://cache:6379".to_string());
        config.http_client.timeout = "soon".to_string();

        let message = message(&config);
        assert!(message.contains("Unsupported scheme 'http'"));
        assert!(message.contains("http_client.timeout"));
    }
}
