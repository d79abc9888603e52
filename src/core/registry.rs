//! Name-keyed registry of predicate and filter factories.
//!
//! A factory declares a typed, serde-friendly configuration struct. Binding
//! turns a definition's string arguments into that struct: positional
//! arguments are mapped onto the factory's shortcut field order, named keys
//! are taken as-is (`camelCase` keys are accepted and folded to
//! `snake_case`), and scalar strings are coerced using the field types of the
//! factory's default configuration as hints.
use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::core::{
    definition::{Args, generated_key_index},
    error::{FactoryKind, InvalidArgument, RegistryError},
    filter::SharedFilter,
    predicate::SharedPredicate,
};

/// How positional arguments are bound to configuration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortcutType {
    /// The n-th positional argument binds to the n-th declared field.
    #[default]
    Default,
    /// All positional arguments are gathered into a list bound to the first
    /// declared field.
    GatherList,
}

/// Factory for one kind of predicate.
pub trait PredicateFactory: Send + Sync + 'static {
    type Config: Serialize + DeserializeOwned + Default + Send;

    /// Registry key, e.g. `Path`.
    fn name(&self) -> &'static str;

    /// Field order used for positional arguments.
    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &[]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::Default
    }

    fn new_config(&self) -> Self::Config {
        Self::Config::default()
    }

    fn bind(&self, args: &Args) -> Result<Self::Config, InvalidArgument> {
        bind_config(
            self.name(),
            self.shortcut_type(),
            self.shortcut_field_order(),
            self.new_config(),
            args,
        )
    }

    fn build(&self, config: Self::Config) -> Result<SharedPredicate, InvalidArgument>;
}

/// Factory for one kind of route filter.
pub trait GatewayFilterFactory: Send + Sync + 'static {
    type Config: Serialize + DeserializeOwned + Default + Send;

    fn name(&self) -> &'static str;

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &[]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::Default
    }

    fn new_config(&self) -> Self::Config {
        Self::Config::default()
    }

    fn bind(&self, args: &Args) -> Result<Self::Config, InvalidArgument> {
        bind_config(
            self.name(),
            self.shortcut_type(),
            self.shortcut_field_order(),
            self.new_config(),
            args,
        )
    }

    fn build(&self, config: Self::Config) -> Result<SharedFilter, InvalidArgument>;
}

/// Output of applying a factory: the built value plus the bound properties.
pub struct Applied<T> {
    pub value: T,
    pub properties: Value,
}

/// Object-safe view of a [`PredicateFactory`].
pub trait ErasedPredicateFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, args: &Args) -> Result<Applied<SharedPredicate>, InvalidArgument>;
}

impl<F: PredicateFactory> ErasedPredicateFactory for F {
    fn name(&self) -> &'static str {
        PredicateFactory::name(self)
    }

    fn apply(&self, args: &Args) -> Result<Applied<SharedPredicate>, InvalidArgument> {
        let config = self.bind(args)?;
        let properties = serde_json::to_value(&config).unwrap_or(Value::Null);
        let value = self.build(config)?;
        Ok(Applied { value, properties })
    }
}

/// Object-safe view of a [`GatewayFilterFactory`].
pub trait ErasedFilterFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, args: &Args) -> Result<Applied<SharedFilter>, InvalidArgument>;
}

impl<F: GatewayFilterFactory> ErasedFilterFactory for F {
    fn name(&self) -> &'static str {
        GatewayFilterFactory::name(self)
    }

    fn apply(&self, args: &Args) -> Result<Applied<SharedFilter>, InvalidArgument> {
        let config = self.bind(args)?;
        let properties = serde_json::to_value(&config).unwrap_or(Value::Null);
        let value = self.build(config)?;
        Ok(Applied { value, properties })
    }
}

/// Reported when a registration replaces an existing factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryCollision {
    pub kind: FactoryKind,
    pub name: String,
}

#[derive(Default, Clone)]
pub struct FactoryRegistry {
    predicates: HashMap<String, Arc<dyn ErasedPredicateFactory>>,
    filters: HashMap<String, Arc<dyn ErasedFilterFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate factory. On a name collision the new factory wins
    /// and the collision is returned.
    pub fn register_predicate<F: PredicateFactory>(
        &mut self,
        factory: F,
    ) -> Option<FactoryCollision> {
        let name = PredicateFactory::name(&factory).to_string();
        let replaced = self
            .predicates
            .insert(name.clone(), Arc::new(factory))
            .is_some();
        Self::report(FactoryKind::Predicate, name, replaced)
    }

    /// Register a filter factory. On a name collision the new factory wins
    /// and the collision is returned.
    pub fn register_filter<F: GatewayFilterFactory>(
        &mut self,
        factory: F,
    ) -> Option<FactoryCollision> {
        let name = GatewayFilterFactory::name(&factory).to_string();
        let replaced = self.filters.insert(name.clone(), Arc::new(factory)).is_some();
        Self::report(FactoryKind::Filter, name, replaced)
    }

    fn report(kind: FactoryKind, name: String, replaced: bool) -> Option<FactoryCollision> {
        if replaced {
            tracing::warn!(
                "A {} factory named {} already exists. It will be overwritten.",
                kind,
                name
            );
            Some(FactoryCollision { kind, name })
        } else {
            tracing::info!("Loaded {} factory [{}]", kind, name);
            None
        }
    }

    pub fn resolve_predicate(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ErasedPredicateFactory>, RegistryError> {
        self.predicates
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownFactory {
                kind: FactoryKind::Predicate,
                name: name.to_string(),
            })
    }

    pub fn resolve_filter(&self, name: &str) -> Result<Arc<dyn ErasedFilterFactory>, RegistryError> {
        self.filters
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownFactory {
                kind: FactoryKind::Filter,
                name: name.to_string(),
            })
    }

    pub fn predicate_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn filter_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

enum Property {
    Single(String),
    List(Vec<String>),
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Exact field match, else a match ignoring case and underscores
/// (`replenishrate` binds `replenish_rate`).
fn resolve_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    if object.contains_key(key) {
        return Some(key.to_string());
    }
    let folded = |s: &str| s.replace('_', "").to_ascii_lowercase();
    let wanted = folded(key);
    object.keys().find(|field| folded(field) == wanted).cloned()
}

/// Resolve argument keys to configuration field names.
fn normalize(
    factory: &str,
    shortcut_type: ShortcutType,
    field_order: &[&str],
    args: &Args,
) -> Result<Vec<(String, Property)>, InvalidArgument> {
    let mut positional: Vec<(usize, &str)> = Vec::new();
    let mut properties = Vec::new();
    for (key, value) in args.iter() {
        match generated_key_index(key) {
            Some(index) => positional.push((index, value)),
            None => properties.push((snake_case(key), Property::Single(value.to_string()))),
        }
    }
    positional.sort_by_key(|(index, _)| *index);

    match shortcut_type {
        ShortcutType::Default => {
            if positional.len() > field_order.len() {
                return Err(InvalidArgument::new(
                    factory,
                    format!(
                        "expected at most {} positional arguments, got {}",
                        field_order.len(),
                        positional.len()
                    ),
                ));
            }
            for (field, (_, value)) in field_order.iter().zip(positional) {
                properties.push(((*field).to_string(), Property::Single(value.to_string())));
            }
        }
        ShortcutType::GatherList => {
            if !positional.is_empty() {
                let field = field_order.first().ok_or_else(|| {
                    InvalidArgument::new(factory, "no field declared for positional arguments")
                })?;
                let values = positional.into_iter().map(|(_, v)| v.to_string()).collect();
                properties.push(((*field).to_string(), Property::List(values)));
            }
        }
    }
    Ok(properties)
}

fn coerce(
    factory: &str,
    key: &str,
    property: Property,
    hint: &Value,
) -> Result<Value, InvalidArgument> {
    let mismatch = |expected: &str, raw: &str| {
        InvalidArgument::new(
            factory,
            format!("argument '{key}' expects {expected}, got '{raw}'"),
        )
    };
    match (property, hint) {
        (Property::List(values), _) => Ok(Value::Array(
            values.into_iter().map(Value::String).collect(),
        )),
        (Property::Single(raw), Value::Number(_)) => {
            let trimmed = raw.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Value::from(i))
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| mismatch("a number", &raw))
            }
        }
        (Property::Single(raw), Value::Bool(_)) => raw
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| mismatch("a boolean", &raw)),
        (Property::Single(raw), Value::Array(_)) => Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )),
        (Property::Single(raw), _) => Ok(Value::String(raw)),
    }
}

/// Bind `args` onto `prototype`, a factory's default configuration.
pub fn bind_config<C>(
    factory: &str,
    shortcut_type: ShortcutType,
    field_order: &[&str],
    prototype: C,
    args: &Args,
) -> Result<C, InvalidArgument>
where
    C: Serialize + DeserializeOwned,
{
    let mut object: Map<String, Value> = match serde_json::to_value(&prototype) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(InvalidArgument::new(
                factory,
                "configuration type is not a struct",
            ));
        }
        Err(e) => return Err(InvalidArgument::new(factory, e.to_string())),
    };

    // Keys whose default is `null` (optional fields) carry no type hint.
    let mut untyped = Vec::new();
    for (key, property) in normalize(factory, shortcut_type, field_order, args)? {
        let key = resolve_field(&object, &key)
            .ok_or_else(|| InvalidArgument::new(factory, format!("unknown argument '{key}'")))?;
        let hint = &object[&key];
        if hint.is_null() {
            untyped.push(key.clone());
        }
        let value = coerce(factory, &key, property, hint)?;
        object.insert(key, value);
    }

    let first_attempt = serde_json::from_value(Value::Object(object.clone()));
    match first_attempt {
        Ok(config) => Ok(config),
        Err(e) if untyped.is_empty() => Err(InvalidArgument::new(factory, e.to_string())),
        Err(e) => {
            // Retry with scalar inference on each subset of the untyped keys.
            let raw: Vec<(String, String)> = untyped
                .iter()
                .take(MAX_UNTYPED_RETRY)
                .filter_map(|k| match object.get(k) {
                    Some(Value::String(s)) => Some((k.clone(), s.clone())),
                    _ => None,
                })
                .collect();
            for mask in 1..(1usize << raw.len()) {
                let mut candidate = object.clone();
                for (bit, (key, value)) in raw.iter().enumerate() {
                    if mask & (1 << bit) != 0 {
                        candidate.insert(key.clone(), infer_scalar(value));
                    }
                }
                if let Ok(config) = serde_json::from_value(Value::Object(candidate)) {
                    return Ok(config);
                }
            }
            Err(InvalidArgument::new(factory, e.to_string()))
        }
    }
}

const MAX_UNTYPED_RETRY: usize = 6;

fn infer_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(b) = trimmed.parse::<bool>() {
        return Value::Bool(b);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| Value::String(raw.to_string()), Value::Number)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::core::predicate;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct SampleConfig {
        name: String,
        count: u32,
        enabled: bool,
        tags: Vec<String>,
    }

    const ORDER: &[&str] = &["name", "count"];

    #[test]
    fn test_positional_binding_follows_field_order() {
        let args = Args::positional(["alpha", "5"]);
        let config: SampleConfig =
            bind_config("Sample", ShortcutType::Default, ORDER, SampleConfig::default(), &args)
                .unwrap();
        assert_eq!(config.name, "alpha");
        assert_eq!(config.count, 5);
    }

    #[test]
    fn test_named_keys_accept_camel_case() {
        let args = Args::new().with("name", "beta").with("isEnabled", "true");
        let result: Result<SampleConfig, _> =
            bind_config("Sample", ShortcutType::Default, ORDER, SampleConfig::default(), &args);
        // `is_enabled` is not a field
        assert!(result.is_err());

        let args = Args::new().with("Enabled", "true").with("tags", "a, b");
        let config: SampleConfig =
            bind_config("Sample", ShortcutType::Default, ORDER, SampleConfig::default(), &args)
                .unwrap();
        assert!(config.enabled);
        assert_eq!(config.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_lowercased_keys_still_bind() {
        let args = Args::new().with("NAME", "gamma").with("count", "3");
        let config: SampleConfig =
            bind_config("Sample", ShortcutType::Default, ORDER, SampleConfig::default(), &args)
                .unwrap();
        assert_eq!(config.name, "gamma");
        assert_eq!(config.count, 3);
    }

    #[test]
    fn test_too_many_positional_arguments() {
        let args = Args::positional(["a", "1", "extra"]);
        let result: Result<SampleConfig, _> =
            bind_config("Sample", ShortcutType::Default, ORDER, SampleConfig::default(), &args);
        assert!(result.unwrap_err().message.contains("at most 2"));
    }

    #[test]
    fn test_type_mismatch_is_invalid_argument() {
        let args = Args::positional(["a", "many"]);
        let err = bind_config::<SampleConfig>(
            "Sample",
            ShortcutType::Default,
            ORDER,
            SampleConfig::default(),
            &args,
        )
        .unwrap_err();
        assert_eq!(err.factory, "Sample");
        assert!(err.message.contains("count"));
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct OptionalConfig {
        label: Option<String>,
        limit: Option<u32>,
    }

    #[test]
    fn test_optional_fields_infer_scalars() {
        let args = Args::new().with("label", "42").with("limit", "7");
        let config: OptionalConfig = bind_config(
            "Optional",
            ShortcutType::Default,
            &[],
            OptionalConfig::default(),
            &args,
        )
        .unwrap();
        assert_eq!(config.label.as_deref(), Some("42"));
        assert_eq!(config.limit, Some(7));

        let bad = Args::new().with("limit", "lots");
        assert!(
            bind_config::<OptionalConfig>(
                "Optional",
                ShortcutType::Default,
                &[],
                OptionalConfig::default(),
                &bad,
            )
            .is_err()
        );
    }

    #[test]
    fn test_gather_list_collects_positionals() {
        let args = Args::positional(["x", "y", "z"]);
        let config: SampleConfig = bind_config(
            "Sample",
            ShortcutType::GatherList,
            &["tags"],
            SampleConfig::default(),
            &args,
        )
        .unwrap();
        assert_eq!(config.tags, vec!["x", "y", "z"]);
    }

    struct Always;

    impl PredicateFactory for Always {
        type Config = SampleConfig;

        fn name(&self) -> &'static str {
            "Always"
        }

        fn build(&self, _config: SampleConfig) -> Result<SharedPredicate, InvalidArgument> {
            Ok(predicate::from_fn(|_| true))
        }
    }

    #[test]
    fn test_registration_collision_last_wins() {
        let mut registry = FactoryRegistry::new();
        assert!(registry.register_predicate(Always).is_none());
        let collision = registry.register_predicate(Always).unwrap();
        assert_eq!(collision.kind, FactoryKind::Predicate);
        assert_eq!(collision.name, "Always");
        assert_eq!(registry.predicate_names(), vec!["Always"]);
    }

    #[test]
    fn test_resolve_unknown_factory() {
        let registry = FactoryRegistry::new();
        let err = registry.resolve_filter("Nope").err().unwrap();
        assert!(matches!(
            err,
            RegistryError::UnknownFactory {
                kind: FactoryKind::Filter,
                ..
            }
        ));
    }
}
