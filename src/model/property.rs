use std::fmt;

use serde::Serialize;

use crate::error::{ObrError, Result};
use crate::version::VersionRange;

/// One typed value of a capability property.
///
/// Properties are always value *lists* on the capability, even single-valued
/// ones; this type is one element of such a list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Number(i64),
    Version(VersionRange),
    Set(Vec<String>),
}

impl PropertyValue {
    /// Parse from the wire form: the optional `t` attribute of a `<p>` tag
    /// plus its value text. Unknown type tags fall back to plain text.
    pub fn parse_typed(tag: Option<&str>, value: &str) -> Result<Self> {
        match tag {
            Some("version") => Ok(Self::Version(VersionRange::parse(value)?)),
            Some("number") => value
                .trim()
                .parse::<i64>()
                .map(Self::Number)
                .map_err(|_| ObrError::XmlParse(format!("invalid number property: {value}"))),
            Some("set") => Ok(Self::Set(
                value.split(',').map(|t| t.trim().to_string()).collect(),
            )),
            _ => Ok(Self::Text(value.to_string())),
        }
    }

    /// The `t` attribute this value serializes with; None for plain text.
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            Self::Text(_) => None,
            Self::Number(_) => Some("number"),
            Self::Version(_) => Some("version"),
            Self::Set(_) => Some("set"),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Version(r) => write!(f, "{r}"),
            Self::Set(elems) => f.write_str(&elems.join(",")),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<VersionRange> for PropertyValue {
    fn from(value: VersionRange) -> Self {
        Self::Version(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed() {
        assert_eq!(
            PropertyValue::parse_typed(None, "org.foo").unwrap(),
            PropertyValue::Text("org.foo".into())
        );
        assert_eq!(
            PropertyValue::parse_typed(Some("number"), " 42 ").unwrap(),
            PropertyValue::Number(42)
        );
        assert_eq!(
            PropertyValue::parse_typed(Some("set"), "a, b,c").unwrap(),
            PropertyValue::Set(vec!["a".into(), "b".into(), "c".into()])
        );
        let version = PropertyValue::parse_typed(Some("version"), "[1.0,2.0)").unwrap();
        assert_eq!(version.to_string(), "[1.0,2.0)");
        assert_eq!(version.type_tag(), Some("version"));

        assert!(PropertyValue::parse_typed(Some("number"), "forty-two").is_err());
        assert!(PropertyValue::parse_typed(Some("version"), "not-a-version").is_err());
        // Unknown tags degrade to text
        assert_eq!(
            PropertyValue::parse_typed(Some("uri"), "http://x").unwrap(),
            PropertyValue::Text("http://x".into())
        );
    }

    #[test]
    fn test_display_round_trips_wire_form() {
        let set = PropertyValue::Set(vec!["x".into(), "y".into()]);
        assert_eq!(set.to_string(), "x,y");
        assert_eq!(PropertyValue::Number(7).to_string(), "7");
    }
}
