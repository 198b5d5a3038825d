use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::Serialize;
use url::Url;

use crate::model::{Capability, Requirement};
use crate::version::VersionRange;

/// One versioned deployable unit: identity, metadata, and everything it
/// declares. Identity is the `(symbolic_name, version)` pair; two resources
/// with the same pair are the same resource no matter what else differs.
///
/// Built incrementally by the manifest translator or an XML parser, then
/// treated as immutable.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    symbolic_name: String,
    version: VersionRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    presentation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<String>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    properties: IndexMap<String, String>,
}

impl Resource {
    pub const DESCRIPTION: &'static str = "description";
    pub const LICENSE_URL: &'static str = "license";
    pub const COPYRIGHT: &'static str = "copyright";
    pub const DOCUMENTATION_URL: &'static str = "documentation";
    pub const SOURCE_URL: &'static str = "source";

    /// New resource with the degenerate "0" floor version.
    pub fn new(symbolic_name: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: VersionRange::default(),
            presentation_name: None,
            url: None,
            size: None,
            categories: Vec::new(),
            capabilities: Vec::new(),
            requirements: Vec::new(),
            properties: IndexMap::new(),
        }
    }

    /// `name/version`, the derived string id.
    pub fn id(&self) -> String {
        format!("{}/{}", self.symbolic_name, self.version)
    }

    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn version(&self) -> &VersionRange {
        &self.version
    }

    pub fn set_version(&mut self, version: VersionRange) {
        self.version = version;
    }

    pub fn presentation_name(&self) -> Option<&str> {
        self.presentation_name.as_deref()
    }

    pub fn set_presentation_name(&mut self, name: impl Into<String>) {
        self.presentation_name = Some(name.into());
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = Some(url);
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn add_category(&mut self, category: impl Into<String>) {
        self.categories.push(category.into());
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn add_capability(&mut self, capability: Capability) {
        self.capabilities.push(capability);
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Mutable access, needed because satisfaction tests compile filters in
    /// place.
    pub fn requirements_mut(&mut self) -> &mut [Requirement] {
        &mut self.requirements
    }

    pub fn add_requirement(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    /// Free-text properties: description, license, copyright, documentation,
    /// source, and anything else a repository document carries.
    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn put_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.symbolic_name == other.symbolic_name && self.version == other.version
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbolic_name.hash(state);
        self.version.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let mut a = Resource::new("org.foo.bundle");
        a.set_version(VersionRange::parse("1.0.0").unwrap());
        let mut b = Resource::new("org.foo.bundle");
        b.set_version(VersionRange::parse("1.0.0").unwrap());
        b.set_size(12345);
        b.add_category("test");
        assert_eq!(a, b);
        assert_eq!(a.id(), "org.foo.bundle/1.0.0");

        b.set_version(VersionRange::parse("1.0.1").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_version_defaults_to_zero_floor() {
        let resource = Resource::new("org.foo.bundle");
        assert_eq!(resource.version().to_string(), "0");
        assert_eq!(resource.id(), "org.foo.bundle/0");
    }
}
