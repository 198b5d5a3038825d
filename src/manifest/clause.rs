//! OSGi header clause syntax.
//!
//! A header value is a list of clauses separated by `,`. Each clause is a
//! list of parts separated by `;`: one or more names, `name=value`
//! attributes and `name:=value` directives. Values may be quoted, in which
//! case `,` and `;` inside the quotes do not split. A clause that lists
//! several names shares its attributes and directives across all of them:
//! `a;b;version=1` yields two clauses with the same `version` attribute.

use indexmap::IndexMap;

use crate::error::{ObrError, Result};
use crate::version::VersionRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    name: String,
    attributes: IndexMap<String, String>,
    directives: IndexMap<String, String>,
}

impl Clause {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn directives(&self) -> &IndexMap<String, String> {
        &self.directives
    }

    /// Version range of the clause: the `version` attribute, the deprecated
    /// `specification-version` attribute, or the `"0"` floor.
    pub fn version_range(&self) -> Result<VersionRange> {
        match self
            .attribute("version")
            .or_else(|| self.attribute("specification-version"))
        {
            Some(value) => VersionRange::parse(value),
            None => Ok(VersionRange::default()),
        }
    }
}

/// Parses a complete header value into clauses.
pub fn parse_header(value: &str) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for chunk in split_quoted(value, ',') {
        if chunk.trim().is_empty() {
            continue;
        }
        let mut names: Vec<String> = Vec::new();
        let mut attributes: IndexMap<String, String> = IndexMap::new();
        let mut directives: IndexMap<String, String> = IndexMap::new();
        for part in split_quoted(&chunk, ';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) => {
                    let value = unquote(value.trim()).to_string();
                    match key.trim().strip_suffix(':') {
                        Some(directive) => {
                            directives.insert(directive.trim().to_string(), value);
                        }
                        None => {
                            attributes.insert(key.trim().to_string(), value);
                        }
                    }
                }
                None => names.push(part.to_string()),
            }
        }
        if names.is_empty() {
            return Err(ObrError::InvalidManifest(format!(
                "clause without a name: {chunk}"
            )));
        }
        for name in names {
            clauses.push(Clause {
                name,
                attributes: attributes.clone(),
                directives: directives.clone(),
            });
        }
    }
    Ok(clauses)
}

/// Splits on `separator`, ignoring separators inside double quotes.
fn split_quoted(value: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in value.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch == separator && !in_quotes {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_clause() {
        let clauses = parse_header("org.foo.bar").unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].name(), "org.foo.bar");
        assert!(clauses[0].attributes().is_empty());
    }

    #[test]
    fn test_attributes_and_directives() {
        let clauses =
            parse_header("org.foo;version=\"[1.0,2.0)\";resolution:=optional").unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].attribute("version"), Some("[1.0,2.0)"));
        assert_eq!(clauses[0].directive("resolution"), Some("optional"));
        assert_eq!(clauses[0].attribute("resolution"), None);
    }

    #[test]
    fn test_quoted_comma_does_not_split() {
        let clauses = parse_header("org.foo;version=\"[1.0,2.0)\",org.bar").unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].name(), "org.foo");
        assert_eq!(clauses[1].name(), "org.bar");
    }

    #[test]
    fn test_shared_attributes_across_names() {
        let clauses = parse_header("org.a;org.b;version=1.5").unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].name(), "org.a");
        assert_eq!(clauses[1].name(), "org.b");
        assert_eq!(clauses[0].attribute("version"), Some("1.5"));
        assert_eq!(clauses[1].attribute("version"), Some("1.5"));
    }

    #[test]
    fn test_version_range_fallbacks() {
        let clauses = parse_header("a;specification-version=2.0,b").unwrap();
        let range = clauses[0].version_range().unwrap();
        assert_eq!(range.to_string(), "2.0");
        let floor = clauses[1].version_range().unwrap();
        assert_eq!(floor.to_string(), "0");
    }

    #[test]
    fn test_empty_parts_skipped() {
        let clauses = parse_header("org.foo;,org.bar,").unwrap();
        assert_eq!(clauses.len(), 2);
    }
}
