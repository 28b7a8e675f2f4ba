//! Shared helpers for resolving configuration values from a key lookup.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an optional value, treating an empty string as unset.
pub(crate) fn optional_var<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// Parse an optional value, falling back to `default` when unset.
pub(crate) fn parse_optional<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(default),
    }
}

/// Parse an optional boolean. Accepts `true/false`, `1/0`, `yes/no`.
pub(crate) fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = optional_var(lookup, key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false', got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_value_is_unset() {
        let lookup = lookup_from(&[("A", "  ")]);
        assert_eq!(optional_var(&lookup, "A"), None);
        assert_eq!(parse_optional(&lookup, "A", 7u64).unwrap(), 7);
    }

    #[test]
    fn test_parse_optional_reports_key() {
        let lookup = lookup_from(&[("PORT", "abc")]);
        let err = parse_optional(&lookup, "PORT", 1u16).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_parse_bool_variants() {
        let lookup = lookup_from(&[("A", "YES"), ("B", "0"), ("C", "maybe")]);
        assert!(parse_bool(&lookup, "A", false).unwrap());
        assert!(!parse_bool(&lookup, "B", true).unwrap());
        assert!(parse_bool(&lookup, "C", false).is_err());
        assert!(parse_bool(&lookup, "MISSING", true).unwrap());
    }
}
