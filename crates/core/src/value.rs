//! Typed property values
//!
//! Properties are plain key/value pairs read from configuration and the command line,
//! or set by hooks at run time. Values keep the scalar type they were given so that
//! templates can compare them without string juggling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A property value
///
/// Deserializes untagged, so `port = 8080` in TOML becomes `Integer(8080)` and
/// `name = "web"` becomes `String("web")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    /// Parse a value given on the command line (`-D key=value`)
    ///
    /// `true`/`false` and numbers keep their type; everything else is a string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        }
        if raw.contains('.')
            && let Ok(f) = raw.parse::<f64>()
        {
            return Self::Float(f);
        }
        Self::String(raw.to_string())
    }

    /// Get the value as a string slice, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a JSON value for template contexts
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_scalar_types() {
        assert_eq!(PropertyValue::parse("true"), PropertyValue::Bool(true));
        assert_eq!(PropertyValue::parse("42"), PropertyValue::Integer(42));
        assert_eq!(PropertyValue::parse("1.5"), PropertyValue::Float(1.5));
        assert_eq!(
            PropertyValue::parse("xyz"),
            PropertyValue::String("xyz".into())
        );
    }

    #[test]
    fn test_display_is_raw() {
        assert_eq!(PropertyValue::from("test").to_string(), "test");
        assert_eq!(PropertyValue::Integer(7).to_string(), "7");
    }
}
