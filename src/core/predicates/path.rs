use serde::{Deserialize, Serialize};

use crate::core::{
    error::InvalidArgument,
    pattern::SegmentPattern,
    predicate::{self, SharedPredicate},
    registry::{PredicateFactory, ShortcutType},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub patterns: Vec<String>,
    pub match_trailing_slash: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            match_trailing_slash: true,
        }
    }
}

/// Matches the request path against any of several patterns. Captured
/// variables are published as URI template variables.
pub struct PathRoutePredicateFactory;

impl PredicateFactory for PathRoutePredicateFactory {
    type Config = PathConfig;

    fn name(&self) -> &'static str {
        "Path"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["patterns", "match_trailing_slash"]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn build(&self, config: PathConfig) -> Result<SharedPredicate, InvalidArgument> {
        if config.patterns.is_empty() {
            return Err(InvalidArgument::new(self.name(), "at least one pattern is required"));
        }
        let patterns = config
            .patterns
            .iter()
            .map(|p| SegmentPattern::path(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| InvalidArgument::new(self.name(), e.to_string()))?;
        let match_trailing_slash = config.match_trailing_slash;

        Ok(predicate::from_fn(move |exchange| {
            let path = exchange.request().uri().path();
            if !match_trailing_slash && path.len() > 1 && path.ends_with('/') {
                return false;
            }
            let Some(vars) = patterns.iter().find_map(|p| p.matches(path)) else {
                return false;
            };
            exchange.attributes_mut().put_uri_template_variables(vars);
            true
        }))
    }
}
