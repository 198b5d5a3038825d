//! Writer for the current `<repository>` dialect.

use std::io::Cursor;
use std::io::Write;

use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use url::Url;

use crate::error::{ObrError, Result};
use crate::model::{Capability, Requirement, Resource};
use crate::repoxml::Repository;

/// Timestamp format of the `lastmodified` attribute.
const LASTMODIFIED_FORMAT: &str = "%Y%m%d%H%M%S%.3f";

/// Serializes a repository to current-dialect XML with a fresh
/// `lastmodified` stamp. Resource URIs under `base` are written relative to
/// it.
pub fn write_repository(repository: &Repository, base: Option<&Url>) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new("repository");
    root.push_attribute(("name", repository.name()));
    let stamp = Utc::now().format(LASTMODIFIED_FORMAT).to_string();
    root.push_attribute(("lastmodified", stamp.as_str()));
    writer.write_event(Event::Start(root)).map_err(xml_err)?;

    for resource in repository.resources() {
        write_resource_into(&mut writer, resource, base)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("repository")))
        .map_err(xml_err)?;

    finish(buffer)
}

/// Serializes one resource element on its own.
pub fn write_resource(resource: &Resource, base: Option<&Url>) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
    write_resource_into(&mut writer, resource, base)?;
    finish(buffer)
}

fn finish(buffer: Cursor<Vec<u8>>) -> Result<String> {
    let mut output = buffer.into_inner();
    output.push(b'\n');
    String::from_utf8(output)
        .map_err(|e| ObrError::XmlParse(format!("generated invalid UTF-8: {e}")))
}

fn write_resource_into<W: Write>(
    writer: &mut Writer<W>,
    resource: &Resource,
    base: Option<&Url>,
) -> Result<()> {
    let mut tag = BytesStart::new("resource");
    let id = resource.id();
    tag.push_attribute(("id", id.as_str()));
    tag.push_attribute(("symbolicname", resource.symbolic_name()));
    if let Some(name) = resource.presentation_name() {
        tag.push_attribute(("presentationname", name));
    }
    if let Some(url) = resource.url() {
        let uri = relativize(url, base);
        tag.push_attribute(("uri", uri.as_str()));
    }
    let version = resource.version().to_string();
    tag.push_attribute(("version", version.as_str()));

    let has_children = !resource.properties().is_empty()
        || resource.size().is_some()
        || !resource.categories().is_empty()
        || !resource.capabilities().is_empty()
        || !resource.requirements().is_empty();
    if !has_children {
        writer.write_event(Event::Empty(tag)).map_err(xml_err)?;
        return Ok(());
    }
    writer.write_event(Event::Start(tag)).map_err(xml_err)?;

    for (key, value) in resource.properties() {
        write_text_element(writer, key, value)?;
    }
    if let Some(size) = resource.size() {
        write_text_element(writer, "size", &size.to_string())?;
    }
    for category in resource.categories() {
        let mut tag = BytesStart::new("category");
        tag.push_attribute(("id", category.as_str()));
        writer.write_event(Event::Empty(tag)).map_err(xml_err)?;
    }
    for capability in resource.capabilities() {
        write_capability_into(writer, capability)?;
    }
    for requirement in resource.requirements() {
        write_requirement_into(writer, requirement)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("resource")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_capability_into<W: Write>(writer: &mut Writer<W>, capability: &Capability) -> Result<()> {
    let mut tag = BytesStart::new("capability");
    tag.push_attribute(("name", capability.name()));
    if capability.properties().is_empty() {
        writer.write_event(Event::Empty(tag)).map_err(xml_err)?;
        return Ok(());
    }
    writer.write_event(Event::Start(tag)).map_err(xml_err)?;
    for (key, values) in capability.properties() {
        for value in values {
            let mut p = BytesStart::new("p");
            p.push_attribute(("n", key.as_str()));
            let text = value.to_string();
            p.push_attribute(("v", text.as_str()));
            if let Some(type_tag) = value.type_tag() {
                p.push_attribute(("t", type_tag));
            }
            writer.write_event(Event::Empty(p)).map_err(xml_err)?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new("capability")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_requirement_into<W: Write>(
    writer: &mut Writer<W>,
    requirement: &Requirement,
) -> Result<()> {
    let mut tag = BytesStart::new("require");
    tag.push_attribute(("name", requirement.name()));
    tag.push_attribute(("filter", requirement.filter()));
    tag.push_attribute(("extend", bool_str(requirement.is_extend())));
    tag.push_attribute(("multiple", bool_str(requirement.is_multiple())));
    tag.push_attribute(("optional", bool_str(requirement.is_optional())));
    match requirement.comment() {
        Some(comment) => {
            writer.write_event(Event::Start(tag)).map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(comment)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("require")))
                .map_err(xml_err)?;
        }
        None => {
            writer.write_event(Event::Empty(tag)).map_err(xml_err)?;
        }
    }
    Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn relativize(url: &Url, base: Option<&Url>) -> String {
    if let Some(base) = base {
        if let Some(relative) = base.make_relative(url) {
            if !relative.is_empty() && !relative.starts_with("..") {
                return relative;
            }
        }
    }
    url.to_string()
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn xml_err<E: std::fmt::Display>(e: E) -> ObrError {
    ObrError::XmlParse(format!("XML write error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyValue;
    use crate::repoxml::parser;
    use crate::version::VersionRange;

    fn sample_resource(base: &Url) -> Resource {
        let mut resource = Resource::new("org.demo.bundle");
        resource.set_version(VersionRange::parse("1.2.0").unwrap());
        resource.set_presentation_name("Demo Bundle");
        resource.set_url(base.join("bundles/demo-1.2.0.jar").unwrap());
        resource.set_size(4321);
        resource.add_category("demo");
        resource.put_property(Resource::DESCRIPTION, "A demo & more");

        let mut bundle = Capability::new("bundle");
        bundle.add_property("symbolicname", "org.demo.bundle");
        bundle.add_property(
            "version",
            PropertyValue::Version(VersionRange::parse("1.2.0").unwrap()),
        );
        bundle.add_property("manifestversion", "2");
        resource.add_capability(bundle);

        let mut export = Capability::new("package");
        export.add_property("package", "org.demo.api");
        export.add_property(
            "version",
            PropertyValue::Version(VersionRange::parse("1.2").unwrap()),
        );
        export.add_property(
            "mandatory",
            PropertyValue::Set(vec!["company".into(), "security".into()]),
        );
        resource.add_capability(export);

        let mut import = Requirement::new(
            "package",
            "(&(package=org.log)(version>=1.0)(!(version>=2.0)))",
        );
        import.set_comment("Import package org.log");
        resource.add_requirement(import);

        let mut host = Requirement::new("bundle", "(&(symbolicname=org.host))");
        host.set_extend(true);
        host.set_optional(true);
        resource.add_requirement(host);

        resource
    }

    #[test]
    fn test_round_trip_preserves_resource() {
        let base = Url::parse("http://example.com/obr/repository.xml").unwrap();
        let original = sample_resource(&base);

        let mut repository = Repository::new(base.clone());
        repository.set_name("Demo Repository");
        repository.add_resource(original.clone());

        let xml = write_repository(&repository, Some(&base)).unwrap();
        assert!(xml.contains("uri=\"bundles/demo-1.2.0.jar\""));

        let document = parser::parse(xml.as_bytes(), &base).unwrap();
        assert_eq!(document.name.as_deref(), Some("Demo Repository"));
        assert_eq!(document.resources.len(), 1);

        let parsed = &document.resources[0];
        assert_eq!(parsed.symbolic_name(), original.symbolic_name());
        assert_eq!(parsed.version(), original.version());
        assert_eq!(parsed.presentation_name(), original.presentation_name());
        assert_eq!(parsed.url(), original.url());
        assert_eq!(parsed.size(), original.size());
        assert_eq!(parsed.categories(), original.categories());
        assert_eq!(parsed.properties(), original.properties());
        assert_eq!(parsed.capabilities(), original.capabilities());
        assert_eq!(parsed.requirements(), original.requirements());
        assert_eq!(
            parsed.requirements()[0].comment(),
            original.requirements()[0].comment()
        );
        assert!(parsed.requirements()[1].is_extend());
        assert!(parsed.requirements()[1].is_optional());
        assert!(!parsed.requirements()[1].is_multiple());
    }

    #[test]
    fn test_uri_relativization() {
        let base = Url::parse("http://example.com/obr/repository.xml").unwrap();
        let inside = Url::parse("http://example.com/obr/bundles/a.jar").unwrap();
        let outside = Url::parse("http://elsewhere.org/a.jar").unwrap();
        let above = Url::parse("http://example.com/other/a.jar").unwrap();

        assert_eq!(relativize(&inside, Some(&base)), "bundles/a.jar");
        assert_eq!(relativize(&outside, Some(&base)), "http://elsewhere.org/a.jar");
        assert_eq!(relativize(&above, Some(&base)), "http://example.com/other/a.jar");
        assert_eq!(relativize(&inside, None), "http://example.com/obr/bundles/a.jar");
    }

    #[test]
    fn test_lastmodified_stamp_format() {
        let base = Url::parse("file:///tmp/repository.xml").unwrap();
        let repository = Repository::new(base.clone());
        let xml = write_repository(&repository, None).unwrap();
        let document = parser::parse(xml.as_bytes(), &base).unwrap();
        let stamp = document.last_modified.unwrap();
        // yyyyMMddHHmmss.SSS
        assert_eq!(stamp.len(), 18);
        assert_eq!(&stamp[14..15], ".");
    }
}
