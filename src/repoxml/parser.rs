//! Parser for the current `<repository>` dialect.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;
use url::Url;

use crate::error::{ObrError, Result};
use crate::model::{Capability, PropertyValue, Requirement, Resource};
use crate::repoxml::Document;
use crate::version::VersionRange;

pub(crate) fn parse(bytes: &[u8], url: &Url) -> Result<Document> {
    let mut reader = Reader::from_reader(bytes);
    let mut builder = DocumentBuilder::new(url);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => builder.open(e)?,
            Ok(Event::Empty(ref e)) => {
                builder.open(e)?;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                builder.close(&name);
            }
            Ok(Event::Text(ref e)) => {
                let decoded = reader.decoder().decode(e.as_ref()).unwrap_or_default();
                builder.text.push_str(&decoded);
            }
            // Entities split the surrounding text into separate events
            Ok(Event::GeneralRef(ref e)) => {
                builder
                    .text
                    .push_str(&crate::repoxml::entity_text(reader.decoder(), e)?);
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                builder.close(&name);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ObrError::XmlParse(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(builder.document)
}

struct DocumentBuilder<'a> {
    url: &'a Url,
    document: Document,
    resource: Option<Resource>,
    capability: Option<Capability>,
    requirement: Option<Requirement>,
    /// Unknown child element of `<resource>`, captured as a string property
    /// when it closes.
    property_element: Option<String>,
    text: String,
}

impl<'a> DocumentBuilder<'a> {
    fn new(url: &'a Url) -> Self {
        Self {
            url,
            document: Document {
                name: None,
                last_modified: None,
                resources: Vec::new(),
                referrals: Vec::new(),
            },
            resource: None,
            capability: None,
            requirement: None,
            property_element: None,
            text: String::new(),
        }
    }

    fn open(&mut self, e: &BytesStart) -> Result<()> {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
        match name.as_str() {
            "repository" => {
                for (key, value) in attributes(e)? {
                    match key.as_str() {
                        "name" => self.document.name = Some(value),
                        "lastmodified" => self.document.last_modified = Some(value),
                        _ => {}
                    }
                }
            }
            // A depth attribute, when present, is accepted and ignored
            "referral" => {
                for (key, value) in attributes(e)? {
                    if key == "url" {
                        self.document.referrals.push(value);
                    }
                }
            }
            "resource" => {
                self.resource = Some(parse_resource_tag(e, self.url)?);
            }
            "category" => {
                if let Some(resource) = self.resource.as_mut() {
                    for (key, value) in attributes(e)? {
                        if key == "id" {
                            resource.add_category(value);
                        }
                    }
                }
            }
            "require" => {
                if self.resource.is_some() {
                    self.requirement = Some(parse_require_tag(e)?);
                    self.text.clear();
                }
            }
            "capability" => {
                if self.resource.is_some() {
                    let mut capability_name = String::new();
                    for (key, value) in attributes(e)? {
                        if key == "name" {
                            capability_name = value;
                        }
                    }
                    self.capability = Some(Capability::new(capability_name));
                }
            }
            "p" => {
                if let Some(capability) = self.capability.as_mut() {
                    add_capability_property(capability, e)?;
                }
            }
            _ => {
                if self.resource.is_some() {
                    self.property_element = Some(name);
                    self.text.clear();
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        match name {
            "resource" => {
                if let Some(resource) = self.resource.take() {
                    self.document.resources.push(resource);
                }
            }
            "require" => {
                if let (Some(resource), Some(mut requirement)) =
                    (self.resource.as_mut(), self.requirement.take())
                {
                    let comment = self.text.trim();
                    if !comment.is_empty() {
                        requirement.set_comment(comment);
                    }
                    resource.add_requirement(requirement);
                }
            }
            "capability" => {
                if let (Some(resource), Some(capability)) =
                    (self.resource.as_mut(), self.capability.take())
                {
                    resource.add_capability(capability);
                }
            }
            _ => {
                if let (Some(resource), Some(element)) =
                    (self.resource.as_mut(), self.property_element.take())
                {
                    if element == name {
                        set_resource_property(resource, &element, &self.text);
                    }
                }
            }
        }
        self.text.clear();
    }
}

/// Decoded, unescaped attributes of one tag.
fn attributes(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ObrError::XmlParse(format!("attribute error: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| ObrError::XmlParse(format!("attribute value error: {}", e)))?
            .to_string();
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn parse_resource_tag(e: &BytesStart, url: &Url) -> Result<Resource> {
    let mut symbolic_name = String::new();
    let mut presentation_name = None;
    let mut version = None;
    let mut uri = None;
    for (key, value) in attributes(e)? {
        match key.as_str() {
            "symbolicname" => symbolic_name = value,
            "presentationname" => presentation_name = Some(value),
            "version" => version = Some(VersionRange::parse(&value)?),
            "uri" => uri = Some(value),
            // identity is derived, the id attribute is write-only
            "id" => {}
            _ => {}
        }
    }
    if symbolic_name.is_empty() {
        return Err(ObrError::XmlParse(
            "resource element without a symbolicname".to_string(),
        ));
    }
    let mut resource = Resource::new(symbolic_name);
    if let Some(version) = version {
        resource.set_version(version);
    }
    if let Some(name) = presentation_name {
        resource.set_presentation_name(name);
    }
    if let Some(uri) = uri {
        resource.set_url(url.join(&uri)?);
    }
    Ok(resource)
}

fn parse_require_tag(e: &BytesStart) -> Result<Requirement> {
    let mut name = String::new();
    let mut filter = String::new();
    let mut optional = false;
    let mut multiple = false;
    let mut extend = false;
    for (key, value) in attributes(e)? {
        match key.as_str() {
            "name" => name = value,
            "filter" => filter = value,
            "optional" => optional = is_true(&value),
            "multiple" => multiple = is_true(&value),
            "extend" => extend = is_true(&value),
            _ => {}
        }
    }
    let mut requirement = Requirement::new(name, filter);
    requirement.set_optional(optional);
    requirement.set_multiple(multiple);
    requirement.set_extend(extend);
    Ok(requirement)
}

fn add_capability_property(capability: &mut Capability, e: &BytesStart) -> Result<()> {
    let mut name = String::new();
    let mut value = String::new();
    let mut tag = None;
    for (key, attribute_value) in attributes(e)? {
        match key.as_str() {
            "n" => name = attribute_value,
            "v" => value = attribute_value,
            "t" => tag = Some(attribute_value),
            _ => {}
        }
    }
    let value = PropertyValue::parse_typed(tag.as_deref(), &value)?;
    capability.add_property(name, value);
    Ok(())
}

fn set_resource_property(resource: &mut Resource, element: &str, text: &str) {
    let text = text.trim();
    if element == "size" {
        match text.parse::<u64>() {
            Ok(size) => resource.set_size(size),
            Err(_) => {
                warn!(size = %text, "ignoring unparsable resource size");
            }
        }
    } else {
        resource.put_property(element, text);
    }
}

fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.com/obr/repository.xml").unwrap()
    }

    #[test]
    fn test_parse_full_document() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
        <repository lastmodified="20250101120000.000" name="Test Repository">
          <resource id="org.foo/1.0" symbolicname="org.foo" presentationname="Foo" uri="bundles/foo-1.0.jar" version="1.0">
            <description>A test bundle</description>
            <size>1234</size>
            <category id="test"/>
            <capability name="bundle">
              <p n="symbolicname" v="org.foo"/>
              <p n="version" t="version" v="1.0"/>
              <p n="manifestversion" v="2"/>
            </capability>
            <capability name="package">
              <p n="package" v="org.foo.api"/>
              <p n="version" t="version" v="1.0"/>
            </capability>
            <require name="package" filter="(&amp;(package=org.log)(version&gt;=1.0))" optional="false" multiple="false" extend="false">Import package org.log</require>
          </resource>
          <referral url="other.xml"/>
        </repository>"#;

        let document = parse(xml.as_bytes(), &base()).unwrap();
        assert_eq!(document.name.as_deref(), Some("Test Repository"));
        assert_eq!(document.last_modified.as_deref(), Some("20250101120000.000"));
        assert_eq!(document.referrals, vec!["other.xml".to_string()]);
        assert_eq!(document.resources.len(), 1);

        let resource = &document.resources[0];
        assert_eq!(resource.symbolic_name(), "org.foo");
        assert_eq!(resource.presentation_name(), Some("Foo"));
        assert_eq!(resource.id(), "org.foo/1.0");
        assert_eq!(
            resource.url().map(|u| u.as_str()),
            Some("http://example.com/obr/bundles/foo-1.0.jar")
        );
        assert_eq!(resource.size(), Some(1234));
        assert_eq!(resource.property("description"), Some("A test bundle"));
        assert_eq!(resource.categories(), ["test".to_string()]);
        assert_eq!(resource.capabilities().len(), 2);
        assert_eq!(resource.requirements().len(), 1);

        let requirement = &resource.requirements()[0];
        assert_eq!(requirement.filter(), "(&(package=org.log)(version>=1.0))");
        assert_eq!(requirement.comment(), Some("Import package org.log"));

        let bundle = &resource.capabilities()[0];
        assert!(matches!(
            bundle.property("version"),
            Some([PropertyValue::Version(_)])
        ));
    }

    #[test]
    fn test_self_closing_elements() {
        let xml = r#"<repository>
          <resource symbolicname="org.empty" version="1.0"/>
          <resource symbolicname="org.other" version="2.0">
            <require name="ee" filter="(ee=J2SE-1.5)" optional="false" multiple="false" extend="false"/>
          </resource>
        </repository>"#;
        let document = parse(xml.as_bytes(), &base()).unwrap();
        assert_eq!(document.resources.len(), 2);
        assert_eq!(document.resources[0].symbolic_name(), "org.empty");
        assert_eq!(document.resources[1].requirements().len(), 1);
        assert_eq!(document.resources[1].requirements()[0].comment(), None);
    }

    #[test]
    fn test_typed_property_values() {
        let xml = r#"<repository>
          <resource symbolicname="org.x" version="2.0">
            <capability name="other">
              <p n="count" t="number" v="42"/>
              <p n="flags" t="set" v="a, b, c"/>
              <p n="plain" v="text"/>
            </capability>
          </resource>
        </repository>"#;
        let document = parse(xml.as_bytes(), &base()).unwrap();
        let capability = &document.resources[0].capabilities()[0];
        assert_eq!(
            capability.property("count"),
            Some(&[PropertyValue::Number(42)][..])
        );
        assert_eq!(
            capability.property("flags"),
            Some(&[PropertyValue::Set(vec!["a".into(), "b".into(), "c".into()])][..])
        );
        assert_eq!(
            capability.property("plain"),
            Some(&[PropertyValue::Text("text".into())][..])
        );
    }

    #[test]
    fn test_entity_references_in_text() {
        let xml = r#"<repository>
          <resource symbolicname="org.x" version="1.0">
            <description>A demo &amp; more &lt;here&gt;, grade &#65;</description>
            <require name="package" filter="(package=org.foo)" optional="false" multiple="false" extend="false">Import &amp; use org.foo</require>
          </resource>
        </repository>"#;
        let document = parse(xml.as_bytes(), &base()).unwrap();
        let resource = &document.resources[0];
        assert_eq!(
            resource.property("description"),
            Some("A demo & more <here>, grade A")
        );
        assert_eq!(
            resource.requirements()[0].comment(),
            Some("Import & use org.foo")
        );
    }

    #[test]
    fn test_malformed_version_aborts() {
        let xml = r#"<repository>
          <resource symbolicname="org.x" version="abc"/>
        </repository>"#;
        assert!(parse(xml.as_bytes(), &base()).is_err());
    }

    #[test]
    fn test_resource_without_symbolicname_aborts() {
        let xml = r#"<repository><resource version="1.0"/></repository>"#;
        assert!(parse(xml.as_bytes(), &base()).is_err());
    }
}
