//! Declarative route definitions.
//!
//! These types are the uncompiled form of a route as it arrives from a route
//! source (configuration file, in-memory repository, ...). A definition names
//! its predicates and filters by factory key and carries their arguments as an
//! ordered string map; the [`RouteCompiler`](crate::core::RouteCompiler) turns
//! it into an executable [`Route`](crate::core::Route).
//!
//! Predicate and filter definitions accept two spellings:
//! * shortcut text: `Path=/foo/**, /bar/**` (positional arguments receive the
//!   generated keys `_genkey_0`, `_genkey_1`, ...)
//! * expanded map: `{ name = "Path", args = { patterns = "/foo/**" } }`
use std::{fmt, str::FromStr};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use thiserror::Error;
use url::Url;

/// Prefix of the keys assigned to positional (shortcut) arguments.
pub const GENERATED_KEY_PREFIX: &str = "_genkey_";

/// Key used for the `index`-th positional argument.
pub fn generated_key(index: usize) -> String {
    format!("{GENERATED_KEY_PREFIX}{index}")
}

/// Position of a generated key, `None` for named keys.
pub fn generated_key_index(key: &str) -> Option<usize> {
    key.strip_prefix(GENERATED_KEY_PREFIX)?.parse().ok()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unable to parse definition text '{text}': {reason}")]
pub struct DefinitionParseError {
    pub text: String,
    pub reason: String,
}

/// Ordered key/value arguments of a predicate or filter definition.
///
/// Insertion order is preserved; inserting an existing key replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<(String, String)>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build arguments from positional values using generated keys.
    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (generated_key(i), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder-style variant of [`Args::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Args {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Scalar argument values are accepted as written and kept as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArgValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl From<ArgValue> for String {
    fn from(value: ArgValue) -> Self {
        match value {
            ArgValue::Text(s) => s,
            ArgValue::Integer(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::Flag(b) => b.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Args {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgsVisitor;

        impl<'de> Visitor<'de> for ArgsVisitor {
            type Value = Args;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of argument names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Args, A::Error> {
                let mut args = Args::new();
                while let Some((key, value)) = access.next_entry::<String, ArgValue>()? {
                    args.insert(key, String::from(value));
                }
                Ok(args)
            }
        }

        deserializer.deserialize_map(ArgsVisitor)
    }
}

/// Split `Name=a, b, c` into its name and positional arguments.
fn parse_shortcut(text: &str) -> Result<(String, Args), DefinitionParseError> {
    let (name, raw_args) = text.split_once('=').ok_or_else(|| DefinitionParseError {
        text: text.to_string(),
        reason: "expected 'Name=arguments'".to_string(),
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(DefinitionParseError {
            text: text.to_string(),
            reason: "missing factory name".to_string(),
        });
    }
    let values = raw_args
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty());
    Ok((name.to_string(), Args::positional(values)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionRepr {
    Shortcut(String),
    Expanded {
        name: String,
        #[serde(default)]
        args: Args,
    },
}

macro_rules! definition_type {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
        pub struct $ty {
            /// Factory key in the registry.
            pub name: String,
            pub args: Args,
        }

        impl $ty {
            pub fn new(name: impl Into<String>, args: Args) -> Self {
                Self { name: name.into(), args }
            }
        }

        impl FromStr for $ty {
            type Err = DefinitionParseError;

            fn from_str(text: &str) -> Result<Self, Self::Err> {
                let (name, args) = parse_shortcut(text)?;
                Ok(Self { name, args })
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match DefinitionRepr::deserialize(deserializer)? {
                    DefinitionRepr::Shortcut(text) => {
                        text.parse().map_err(serde::de::Error::custom)
                    }
                    DefinitionRepr::Expanded { name, args } => Ok(Self { name, args }),
                }
            }
        }
    };
}

definition_type!(
    /// Reference to a predicate factory plus its arguments.
    PredicateDefinition
);

definition_type!(
    /// Reference to a filter factory plus its arguments.
    FilterDefinition
);

fn default_order() -> i32 {
    0
}

/// Uncompiled description of one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Unique within the active route set.
    pub id: String,
    /// Target; the scheme selects downstream handling (`http(s)`, `lb`, `forward`).
    pub uri: Url,
    /// Lower sorts first.
    #[serde(default = "default_order")]
    pub order: i32,
    /// Must be non-empty.
    pub predicates: Vec<PredicateDefinition>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

impl RouteDefinition {
    pub fn new(id: impl Into<String>, uri: Url) -> Self {
        Self {
            id: id.into(),
            uri,
            order: 0,
            predicates: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn predicate(mut self, predicate: PredicateDefinition) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }
}
