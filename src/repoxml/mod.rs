//! Repository documents: loading (two dialects, referral-following) and
//! writing.

pub mod oscar;
pub mod parser;
pub mod writer;

use std::collections::HashSet;

use indexmap::IndexSet;
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ObrError, Result};
use crate::fetch::Fetcher;
use crate::model::Resource;

/// One parsed repository document before it is merged into a [`Repository`].
pub(crate) struct Document {
    pub name: Option<String>,
    pub last_modified: Option<String>,
    pub resources: Vec<Resource>,
    pub referrals: Vec<String>,
}

/// A set of resources loaded from one repository URL, following referrals.
///
/// `refresh` is a full re-sync: it clears the set, re-fetches every document
/// and re-visits every referral. Failures are recorded on the repository
/// rather than propagated.
pub struct Repository {
    url: Url,
    name: Option<String>,
    document_name: Option<String>,
    last_modified: Option<String>,
    resources: IndexSet<Resource>,
    last_error: Option<ObrError>,
}

impl Repository {
    pub const DEFAULT_NAME: &'static str = "Untitled";

    pub fn new(url: Url) -> Self {
        Self {
            url,
            name: None,
            document_name: None,
            last_modified: None,
            resources: IndexSet::new(),
            last_error: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// A caller-assigned name wins over whatever the root document declares.
    pub fn name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.document_name.as_deref())
            .unwrap_or(Self::DEFAULT_NAME)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn resources(&self) -> &IndexSet<Resource> {
        &self.resources
    }

    /// Adds a resource, keeping the first one seen per identity.
    pub fn add_resource(&mut self, resource: Resource) -> bool {
        self.resources.insert(resource)
    }

    /// The error that failed the last `refresh`, if it failed.
    pub fn last_error(&self) -> Option<&ObrError> {
        self.last_error.as_ref()
    }

    /// Clears the resource set and re-parses from the repository URL,
    /// following referrals. Returns whether the refresh succeeded; on
    /// failure the cause is retained for [`Repository::last_error`].
    pub fn refresh(&mut self, fetcher: &Fetcher) -> bool {
        self.resources.clear();
        self.document_name = None;
        self.last_modified = None;
        self.last_error = None;
        let mut visited = HashSet::new();
        match self.load(fetcher, self.url.clone(), &mut visited) {
            Ok(()) => true,
            Err(err) => {
                warn!(url = %self.url, error = %err, "repository refresh failed");
                self.last_error = Some(err);
                false
            }
        }
    }

    fn load(&mut self, fetcher: &Fetcher, url: Url, visited: &mut HashSet<Url>) -> Result<()> {
        if !visited.insert(url.clone()) {
            debug!(url = %url, "already visited, skipping");
            return Ok(());
        }
        let bytes = fetcher.fetch_document(&url)?;
        let document = parse_document(&bytes, &url)?;
        if self.document_name.is_none() {
            self.document_name = document.name;
        }
        if self.last_modified.is_none() {
            self.last_modified = document.last_modified;
        }
        for resource in document.resources {
            self.resources.insert(resource);
        }
        for referral in document.referrals {
            let resolved = match url.join(&referral) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(referral = %referral, error = %err, "skipping unresolvable referral");
                    continue;
                }
            };
            if let Err(err) = self.load(fetcher, resolved.clone(), visited) {
                warn!(referral = %resolved, error = %err, "skipping failed referral");
            }
        }
        Ok(())
    }
}

/// Parses one document in whichever dialect its root element announces:
/// `<repository>` for the current schema, `<bundles>` for the legacy Oscar
/// schema.
pub(crate) fn parse_document(bytes: &[u8], url: &Url) -> Result<Document> {
    match root_element(bytes)?.as_str() {
        "repository" => parser::parse(bytes, url),
        "bundles" => oscar::parse(bytes, url),
        other => Err(ObrError::XmlParse(format!(
            "unknown repository root element: {other}"
        ))),
    }
}

/// Replacement text of an entity reference in element content. The reader
/// reports references as their own events, splitting the surrounding text;
/// the predefined five and numeric character references are resolved here.
pub(crate) fn entity_text(decoder: quick_xml::Decoder, e: &BytesRef) -> Result<String> {
    if let Some(ch) = e
        .resolve_char_ref()
        .map_err(|err| ObrError::XmlParse(format!("bad character reference: {err}")))?
    {
        return Ok(ch.to_string());
    }
    let name = decoder
        .decode(e)
        .map_err(|err| ObrError::XmlParse(format!("bad entity reference: {err}")))?;
    match name.as_ref() {
        "amp" => Ok("&".to_string()),
        "lt" => Ok("<".to_string()),
        "gt" => Ok(">".to_string()),
        "quot" => Ok("\"".to_string()),
        "apos" => Ok("'".to_string()),
        other => Err(ObrError::XmlParse(format!(
            "unknown entity reference: &{other};"
        ))),
    }
}

fn root_element(bytes: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).to_string());
            }
            Ok(Event::Eof) => {
                return Err(ObrError::XmlParse("empty repository document".to_string()));
            }
            Err(e) => {
                return Err(ObrError::XmlParse(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_element_dispatch() {
        assert_eq!(
            root_element(b"<?xml version=\"1.0\"?>\n<repository name=\"x\"/>").unwrap(),
            "repository"
        );
        assert_eq!(root_element(b"<!-- legacy -->\n<bundles/>").unwrap(), "bundles");
        assert!(root_element(b"  ").is_err());

        let url = Url::parse("http://example.com/repository.xml").unwrap();
        assert!(parse_document(b"<other/>", &url).is_err());
    }
}
