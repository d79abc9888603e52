//! Separator-delimited wildcard patterns shared by the `Path` and `Host`
//! predicates.
//!
//! Supported segment forms:
//! * `literal` matches itself
//! * `*` matches exactly one segment
//! * `**` matches zero or more segments (at most once per pattern)
//! * `{name}` matches one segment and captures it
//! * `{*name}` matches the remaining segments and captures them (last only)
//! * mixed forms such as `file-*.json` or `{id:[0-9]+}.txt` match within one
//!   segment
use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Any,
    Rest,
    Capture(String),
    CaptureRest(String),
    Partial { regex: Regex, names: Vec<String> },
}

/// A compiled pattern.
#[derive(Debug, Clone)]
pub struct SegmentPattern {
    source: String,
    separator: char,
    case_insensitive: bool,
    segments: Vec<Segment>,
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SegmentPattern {
    /// Pattern over `/`-separated request paths.
    pub fn path(pattern: &str) -> Result<Self, PatternError> {
        Self::compile(pattern, '/', false)
    }

    /// Case-insensitive pattern over `.`-separated host names.
    pub fn host(pattern: &str) -> Result<Self, PatternError> {
        Self::compile(&pattern.to_ascii_lowercase(), '.', true)
    }

    fn compile(pattern: &str, separator: char, case_insensitive: bool) -> Result<Self, PatternError> {
        let error = |reason: String| PatternError {
            pattern: pattern.to_string(),
            reason,
        };

        let raw: Vec<&str> = pattern.split(separator).filter(|s| !s.is_empty()).collect();
        let mut segments: Vec<Segment> = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = match *part {
                "**" if matches!(segments.last(), Some(Segment::Rest)) => continue,
                "**" if segments.iter().any(|s| matches!(s, Segment::Rest)) => {
                    return Err(error("only one '**' is allowed".to_string()));
                }
                "**" => Segment::Rest,
                "*" => Segment::Any,
                _ if part.starts_with("{*") && part.ends_with('}') => {
                    let name = &part[2..part.len() - 1];
                    if !valid_name(name) {
                        return Err(error(format!("invalid variable name '{name}'")));
                    }
                    if i + 1 != raw.len() {
                        return Err(error(format!("'{{*{name}}}' must be the last segment")));
                    }
                    Segment::CaptureRest(name.to_string())
                }
                _ if part.starts_with('{')
                    && part.ends_with('}')
                    && part[1..].find(['{', '}']) == Some(part.len() - 2) =>
                {
                    let name = &part[1..part.len() - 1];
                    if valid_name(name) {
                        Segment::Capture(name.to_string())
                    } else {
                        Self::partial(part, &error)?
                    }
                }
                _ if part.contains(['*', '?', '{']) => Self::partial(part, &error)?,
                _ => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            separator,
            case_insensitive,
            segments,
        })
    }

    /// Compile a segment mixing literals, wildcards and captures into a regex.
    fn partial(
        part: &str,
        error: &dyn Fn(String) -> PatternError,
    ) -> Result<Segment, PatternError> {
        let mut expr = String::from("^");
        let mut names = Vec::new();
        let mut rest = part;
        while let Some(c) = rest.chars().next() {
            match c {
                '*' => {
                    expr.push_str(".*");
                    rest = &rest[1..];
                }
                '?' => {
                    expr.push('.');
                    rest = &rest[1..];
                }
                '{' => {
                    let end = rest
                        .find('}')
                        .ok_or_else(|| error("unclosed '{'".to_string()))?;
                    let inner = &rest[1..end];
                    let (name, constraint) = match inner.split_once(':') {
                        Some((name, constraint)) => (name, constraint),
                        None => (inner, ".+?"),
                    };
                    if !valid_name(name) {
                        return Err(error(format!("invalid variable name '{name}'")));
                    }
                    expr.push_str(&format!("(?P<{name}>{constraint})"));
                    names.push(name.to_string());
                    rest = &rest[end + 1..];
                }
                _ => {
                    let end = rest.find(['*', '?', '{']).unwrap_or(rest.len());
                    expr.push_str(&regex::escape(&rest[..end]));
                    rest = &rest[end..];
                }
            }
        }
        expr.push('$');
        let regex = Regex::new(&expr).map_err(|e| error(e.to_string()))?;
        Ok(Segment::Partial { regex, names })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `input`, returning captured variables on success.
    pub fn matches(&self, input: &str) -> Option<HashMap<String, String>> {
        let input = if self.case_insensitive {
            input.to_ascii_lowercase()
        } else {
            input.to_string()
        };
        let parts: Vec<&str> = input
            .split(self.separator)
            .filter(|s| !s.is_empty())
            .collect();
        let mut vars = HashMap::new();
        self.match_from(0, &parts, 0, &mut vars).then_some(vars)
    }

    fn match_from(
        &self,
        si: usize,
        parts: &[&str],
        pi: usize,
        vars: &mut HashMap<String, String>,
    ) -> bool {
        let Some(segment) = self.segments.get(si) else {
            return pi == parts.len();
        };
        match segment {
            Segment::Rest => {
                for next in pi..=parts.len() {
                    let mut attempt = vars.clone();
                    if self.match_from(si + 1, parts, next, &mut attempt) {
                        *vars = attempt;
                        return true;
                    }
                }
                false
            }
            Segment::CaptureRest(name) => {
                let sep = self.separator.to_string();
                let joined = parts[pi.min(parts.len())..].join(&sep);
                vars.insert(name.clone(), format!("{sep}{joined}"));
                true
            }
            _ if pi >= parts.len() => false,
            Segment::Literal(literal) => {
                literal == parts[pi] && self.match_from(si + 1, parts, pi + 1, vars)
            }
            Segment::Any => self.match_from(si + 1, parts, pi + 1, vars),
            Segment::Capture(name) => {
                vars.insert(name.clone(), parts[pi].to_string());
                self.match_from(si + 1, parts, pi + 1, vars)
            }
            Segment::Partial { regex, names } => {
                let Some(captures) = regex.captures(parts[pi]) else {
                    return false;
                };
                for name in names {
                    if let Some(value) = captures.name(name) {
                        vars.insert(name.clone(), value.as_str().to_string());
                    }
                }
                self.match_from(si + 1, parts, pi + 1, vars)
            }
        }
    }
}

/// Strip a `:port` suffix from a `Host` header value.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_trailing_slash() {
        let p = SegmentPattern::path("/foo/bar").unwrap();
        assert!(p.matches("/foo/bar").is_some());
        assert!(p.matches("/foo/bar/").is_some());
        assert!(p.matches("/foo/baz").is_none());
        assert!(p.matches("/foo").is_none());
    }

    #[test]
    fn test_double_wildcard_matches_any_depth() {
        let p = SegmentPattern::path("/foo/**").unwrap();
        assert!(p.matches("/foo").is_some());
        assert!(p.matches("/foo/a/b/c").is_some());
        assert!(p.matches("/bar/a").is_none());

        let middle = SegmentPattern::path("/a/**/z").unwrap();
        assert!(middle.matches("/a/z").is_some());
        assert!(middle.matches("/a/b/c/z").is_some());
        assert!(middle.matches("/a/b/c").is_none());
    }

    #[test]
    fn test_double_wildcard_at_most_once() {
        let merged = SegmentPattern::path("/a/**/**/z").unwrap();
        assert!(merged.matches("/a/z").is_some());
        assert!(merged.matches("/a/b/c/z").is_some());

        assert!(SegmentPattern::path("/**/a/**").is_err());
        assert!(SegmentPattern::host("**.example.**").is_err());
    }

    #[test]
    fn test_single_wildcard_matches_one_segment() {
        let p = SegmentPattern::path("/foo/*").unwrap();
        assert!(p.matches("/foo/a").is_some());
        assert!(p.matches("/foo/a/b").is_none());
    }

    #[test]
    fn test_captures_are_returned() {
        let p = SegmentPattern::path("/users/{id}/orders/{order}").unwrap();
        let vars = p.matches("/users/42/orders/7").unwrap();
        assert_eq!(vars["id"], "42");
        assert_eq!(vars["order"], "7");

        let rest = SegmentPattern::path("/static/{*file}").unwrap();
        let vars = rest.matches("/static/css/site.css").unwrap();
        assert_eq!(vars["file"], "/css/site.css");
    }

    #[test]
    fn test_partial_segments() {
        let p = SegmentPattern::path("/files/{name}.json").unwrap();
        let vars = p.matches("/files/report.json").unwrap();
        assert_eq!(vars["name"], "report");
        assert!(p.matches("/files/report.xml").is_none());

        let constrained = SegmentPattern::path("/items/{id:[0-9]+}").unwrap();
        assert!(constrained.matches("/items/12").is_some());
        assert!(constrained.matches("/items/ab").is_none());

        let glob = SegmentPattern::path("/img/*.png").unwrap();
        assert!(glob.matches("/img/logo.png").is_some());
    }

    #[test]
    fn test_capture_rest_must_be_last() {
        assert!(SegmentPattern::path("/{*rest}/x").is_err());
        assert!(SegmentPattern::path("/{bad-name}x").is_err());
    }

    #[test]
    fn test_host_patterns() {
        let p = SegmentPattern::host("{sub}.example.com").unwrap();
        let vars = p.matches("API.Example.com").unwrap();
        assert_eq!(vars["sub"], "api");

        let any = SegmentPattern::host("**.example.org").unwrap();
        assert!(any.matches("a.b.example.org").is_some());
        assert!(any.matches("example.org").is_some());
        assert!(any.matches("example.com").is_none());
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:80"), "[::1]");
    }
}
