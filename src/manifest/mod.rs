pub mod clause;

pub use clause::{parse_header, Clause};

use indexmap::IndexMap;

use crate::error::{ObrError, Result};

/// Parsed `META-INF/MANIFEST.MF` main section.
///
/// The JAR format wraps long values over continuation lines beginning with a
/// single space; those are joined back here. Header names are looked up
/// case-insensitively. Everything after the first blank line (per-entry
/// sections) is ignored.
#[derive(Debug, Clone)]
pub struct Manifest {
    headers: IndexMap<String, String>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(bytes);
        let mut headers: IndexMap<String, String> = IndexMap::new();
        let mut current: Option<(String, String)> = None;

        for raw_line in text.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                match &mut current {
                    Some((_, value)) => value.push_str(continuation),
                    None => {
                        return Err(ObrError::InvalidManifest(
                            "continuation line before any header".into(),
                        ))
                    }
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                headers.insert(name, value);
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ObrError::InvalidManifest(format!("malformed header line: {line}"))
            })?;
            let value = value.strip_prefix(' ').unwrap_or(value);
            current = Some((name.trim().to_string(), value.to_string()));
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if headers.is_empty() {
            return Err(ObrError::InvalidManifest("manifest has no headers".into()));
        }

        Ok(Self { headers })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Clauses of one header; a missing header is the empty list.
    pub fn clauses(&self, name: &str) -> Result<Vec<Clause>> {
        match self.header(name) {
            Some(value) => parse_header(value),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_continuations() {
        let bytes = b"Manifest-Version: 1.0\r\n\
Bundle-SymbolicName: org.foo.bundle\r\n\
Import-Package: org.foo,\r\n org.bar;version=\"[1.0,2\r\n .0)\"\r\n\
\r\n\
Name: some/entry\r\nSHA1-Digest: xxx\r\n";
        let manifest = Manifest::parse(bytes).unwrap();
        assert_eq!(manifest.header("Bundle-SymbolicName"), Some("org.foo.bundle"));
        assert_eq!(
            manifest.header("Import-Package"),
            Some("org.foo,org.bar;version=\"[1.0,2.0)\"")
        );
        // Per-entry sections after the blank line are not headers
        assert_eq!(manifest.header("SHA1-Digest"), None);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let manifest = Manifest::parse(b"Bundle-Version: 1.2.3\n").unwrap();
        assert_eq!(manifest.header("bundle-version"), Some("1.2.3"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Manifest::parse(b"no colon here\n").is_err());
        assert!(Manifest::parse(b" starts with continuation\n").is_err());
        assert!(Manifest::parse(b"\n").is_err());
    }
}
