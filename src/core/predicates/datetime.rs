//! Time window predicates: `After`, `Before`, `Between`.
//!
//! Datetimes are RFC 3339. A trailing zone id in brackets, as in
//! `2017-01-20T17:42:47.789-07:00[America/Denver]`, is accepted and ignored;
//! the offset is authoritative.
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    error::InvalidArgument,
    predicate::{self, SharedPredicate},
    registry::PredicateFactory,
};

fn parse_datetime(factory: &str, raw: &str) -> Result<DateTime<FixedOffset>, InvalidArgument> {
    let trimmed = raw.trim();
    let without_zone = match trimmed.find('[') {
        Some(idx) if trimmed.ends_with(']') => &trimmed[..idx],
        _ => trimmed,
    };
    DateTime::parse_from_rfc3339(without_zone)
        .map_err(|e| InvalidArgument::new(factory, format!("invalid datetime '{raw}': {e}")))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateTimeConfig {
    pub datetime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateTimeRangeConfig {
    pub datetime1: String,
    pub datetime2: String,
}

/// Matches requests arriving after a point in time.
pub struct AfterRoutePredicateFactory;

impl PredicateFactory for AfterRoutePredicateFactory {
    type Config = DateTimeConfig;

    fn name(&self) -> &'static str {
        "After"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["datetime"]
    }

    fn build(&self, config: DateTimeConfig) -> Result<SharedPredicate, InvalidArgument> {
        let after = parse_datetime(self.name(), &config.datetime)?;
        Ok(predicate::from_fn(move |_| Utc::now() > after))
    }
}

/// Matches requests arriving before a point in time.
pub struct BeforeRoutePredicateFactory;

impl PredicateFactory for BeforeRoutePredicateFactory {
    type Config = DateTimeConfig;

    fn name(&self) -> &'static str {
        "Before"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["datetime"]
    }

    fn build(&self, config: DateTimeConfig) -> Result<SharedPredicate, InvalidArgument> {
        let before = parse_datetime(self.name(), &config.datetime)?;
        Ok(predicate::from_fn(move |_| Utc::now() < before))
    }
}

/// Matches requests arriving strictly between two points in time.
pub struct BetweenRoutePredicateFactory;

impl PredicateFactory for BetweenRoutePredicateFactory {
    type Config = DateTimeRangeConfig;

    fn name(&self) -> &'static str {
        "Between"
    }

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["datetime1", "datetime2"]
    }

    fn build(&self, config: DateTimeRangeConfig) -> Result<SharedPredicate, InvalidArgument> {
        let start = parse_datetime(self.name(), &config.datetime1)?;
        let end = parse_datetime(self.name(), &config.datetime2)?;
        if start >= end {
            return Err(InvalidArgument::new(
                self.name(),
                format!("{} must be before {}", config.datetime1, config.datetime2),
            ));
        }
        Ok(predicate::from_fn(move |_| {
            let now = Utc::now();
            now > start && now < end
        }))
    }
}
