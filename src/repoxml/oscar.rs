//! Parser for the legacy Oscar `<bundles>` dialect.
//!
//! Bundles are flat tag lists (`<bundle-name>`, `<bundle-version>`, ...)
//! rather than attribute-driven resources. `bundle-name` doubles as symbolic
//! and presentation name. Package dependencies come as
//! `<import-package package=".." specification-version=".."/>` and
//! `<export-package .../>` tags. Referrals hide under
//! `<repository><extern-repositories><url>..</url></extern-repositories></repository>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use crate::bundle::append_version;
use crate::error::{ObrError, Result};
use crate::model::{Capability, Requirement, Resource};
use crate::repoxml::Document;
use crate::version::VersionRange;

pub(crate) fn parse(bytes: &[u8], url: &Url) -> Result<Document> {
    let mut reader = Reader::from_reader(bytes);

    let mut document = Document {
        name: None,
        last_modified: None,
        resources: Vec::new(),
        referrals: Vec::new(),
    };
    let mut bundle: Option<OscarBundle> = None;
    let mut in_extern_repositories = false;
    let mut element: Option<String> = None;
    let mut text = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "bundles" | "repository" => {}
                    "bundle" => bundle = Some(OscarBundle::default()),
                    "extern-repositories" => in_extern_repositories = true,
                    "import-package" => {
                        if let Some(bundle) = bundle.as_mut() {
                            bundle.requirements.push(import_requirement(e)?);
                        }
                    }
                    "export-package" => {
                        if let Some(bundle) = bundle.as_mut() {
                            bundle.capabilities.push(export_capability(e)?);
                        }
                    }
                    _ => {
                        element = Some(name);
                        text.clear();
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let decoded = reader.decoder().decode(e.as_ref()).unwrap_or_default();
                text.push_str(&decoded);
            }
            // Entities split the surrounding text into separate events
            Ok(Event::GeneralRef(ref e)) => {
                text.push_str(&crate::repoxml::entity_text(reader.decoder(), e)?);
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "bundle" => {
                        if let Some(taken) = bundle.take() {
                            document.resources.push(taken.into_resource(url)?);
                        }
                    }
                    "extern-repositories" => in_extern_repositories = false,
                    "url" if in_extern_repositories => {
                        let referral = text.trim();
                        if !referral.is_empty() {
                            document.referrals.push(referral.to_string());
                        }
                    }
                    _ => {
                        if let (Some(bundle), Some(tag)) = (bundle.as_mut(), element.take()) {
                            if tag == name {
                                bundle.set_tag(&tag, text.trim());
                            }
                        }
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ObrError::XmlParse(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(document)
}

#[derive(Default)]
struct OscarBundle {
    name: Option<String>,
    version: Option<String>,
    update_location: Option<String>,
    categories: Vec<String>,
    properties: Vec<(String, String)>,
    requirements: Vec<Requirement>,
    capabilities: Vec<Capability>,
}

impl OscarBundle {
    fn set_tag(&mut self, tag: &str, value: &str) {
        match tag {
            "bundle-name" => self.name = Some(value.to_string()),
            "bundle-version" => self.version = Some(value.to_string()),
            "bundle-updatelocation" => self.update_location = Some(value.to_string()),
            "bundle-category" => self.categories.push(value.to_string()),
            "bundle-description" => {
                self.properties
                    .push((Resource::DESCRIPTION.to_string(), value.to_string()));
            }
            "bundle-docurl" => {
                self.properties
                    .push((Resource::DOCUMENTATION_URL.to_string(), value.to_string()));
            }
            "bundle-sourceurl" => {
                self.properties
                    .push((Resource::SOURCE_URL.to_string(), value.to_string()));
            }
            _ => self.properties.push((tag.to_string(), value.to_string())),
        }
    }

    fn into_resource(self, url: &Url) -> Result<Resource> {
        let name = self
            .name
            .ok_or_else(|| ObrError::XmlParse("bundle entry without a bundle-name".to_string()))?;
        let mut resource = Resource::new(name.clone());
        resource.set_presentation_name(name);
        if let Some(version) = self.version {
            resource.set_version(VersionRange::parse(&version)?);
        }
        if let Some(location) = self.update_location {
            resource.set_url(url.join(&location)?);
        }
        for category in self.categories {
            resource.add_category(category);
        }
        for (key, value) in self.properties {
            resource.put_property(key, value);
        }
        for requirement in self.requirements {
            resource.add_requirement(requirement);
        }
        for capability in self.capabilities {
            resource.add_capability(capability);
        }
        Ok(resource)
    }
}

fn package_attributes(e: &BytesStart) -> Result<(String, VersionRange)> {
    let mut package = String::new();
    let mut version = VersionRange::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ObrError::XmlParse(format!("attribute error: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ObrError::XmlParse(format!("attribute value error: {}", e)))?;
        match attr.key.as_ref() {
            b"package" => package = value.to_string(),
            b"specification-version" => version = VersionRange::parse(&value)?,
            _ => {}
        }
    }
    if package.is_empty() {
        return Err(ObrError::XmlParse(
            "package element without a package attribute".to_string(),
        ));
    }
    Ok((package, version))
}

fn import_requirement(e: &BytesStart) -> Result<Requirement> {
    let (package, version) = package_attributes(e)?;
    let mut filter = format!("(&(package={package})");
    append_version(&mut filter, &version);
    filter.push(')');
    let mut requirement = Requirement::new("package", filter);
    requirement.set_comment(format!("Import package {package}"));
    Ok(requirement)
}

fn export_capability(e: &BytesStart) -> Result<Capability> {
    let (package, version) = package_attributes(e)?;
    let mut capability = Capability::new("package").with_property("package", package);
    capability.add_property("version", version);
    Ok(capability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyValue;

    fn base() -> Url {
        Url::parse("http://example.com/oscar/repository.xml").unwrap()
    }

    #[test]
    fn test_parse_oscar_bundle() {
        let xml = r#"<?xml version="1.0"?>
        <bundles>
          <dtd-version>1.0</dtd-version>
          <bundle>
            <bundle-name>Log Service</bundle-name>
            <bundle-version>1.2.0</bundle-version>
            <bundle-description>A log service</bundle-description>
            <bundle-docurl>http://example.com/doc</bundle-docurl>
            <bundle-category>osgi</bundle-category>
            <bundle-updatelocation>bundles/log-1.2.0.jar</bundle-updatelocation>
            <import-package package="org.osgi.framework" specification-version="1.1"/>
            <export-package package="org.osgi.service.log" specification-version="1.2"/>
            <author>Someone</author>
          </bundle>
        </bundles>"#;

        let document = parse(xml.as_bytes(), &base()).unwrap();
        assert_eq!(document.resources.len(), 1);

        let resource = &document.resources[0];
        assert_eq!(resource.symbolic_name(), "Log Service");
        assert_eq!(resource.presentation_name(), Some("Log Service"));
        assert_eq!(resource.version().to_string(), "1.2.0");
        assert_eq!(
            resource.url().map(|u| u.as_str()),
            Some("http://example.com/oscar/bundles/log-1.2.0.jar")
        );
        assert_eq!(resource.categories(), ["osgi".to_string()]);
        assert_eq!(resource.property("description"), Some("A log service"));
        assert_eq!(resource.property("documentation"), Some("http://example.com/doc"));
        // Unrecognized flat tags become string properties
        assert_eq!(resource.property("author"), Some("Someone"));

        let requirement = &resource.requirements()[0];
        assert_eq!(requirement.name(), "package");
        assert_eq!(
            requirement.filter(),
            "(&(package=org.osgi.framework)(version>=1.1))"
        );

        let capability = &resource.capabilities()[0];
        assert_eq!(capability.name(), "package");
        assert!(matches!(
            capability.property("version"),
            Some([PropertyValue::Version(_)])
        ));
    }

    #[test]
    fn test_extern_repositories_referral() {
        let xml = r#"<bundles>
          <repository>
            <extern-repositories>
              <url>http://example.com/other/repository.xml</url>
            </extern-repositories>
          </repository>
        </bundles>"#;
        let document = parse(xml.as_bytes(), &base()).unwrap();
        assert_eq!(
            document.referrals,
            vec!["http://example.com/other/repository.xml".to_string()]
        );
    }

    #[test]
    fn test_entity_references_in_text() {
        let xml = r#"<bundles>
          <bundle>
            <bundle-name>Log &amp; Trace</bundle-name>
            <bundle-description>Less &lt;, more &gt;</bundle-description>
          </bundle>
        </bundles>"#;
        let document = parse(xml.as_bytes(), &base()).unwrap();
        let resource = &document.resources[0];
        assert_eq!(resource.symbolic_name(), "Log & Trace");
        assert_eq!(resource.property("description"), Some("Less <, more >"));
    }

    #[test]
    fn test_bundle_without_name_aborts() {
        let xml = r#"<bundles>
          <bundle><bundle-version>1.0</bundle-version></bundle>
        </bundles>"#;
        assert!(parse(xml.as_bytes(), &base()).is_err());
    }
}
