//! Translation from a bundle manifest to a [`Resource`].
//!
//! A [`BundleInfo`] is constructed from a JAR on disk (only the manifest and
//! the localization entry are read) or from an in-memory [`Manifest`], then
//! consumed by [`BundleInfo::build`], which runs a fixed sequence of
//! extraction steps. Each step tolerates its own header being missing or
//! malformed: a bad `Bundle-License` value is logged and skipped without
//! aborting the rest of the translation. Only a manifest with neither
//! `Bundle-SymbolicName` nor `Bundle-Name` fails the whole build.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::warn;
use url::Url;
use zip::ZipArchive;

use crate::error::{ObrError, Result};
use crate::manifest::{Clause, Manifest};
use crate::model::{Capability, Requirement, Resource};
use crate::version::VersionRange;

pub struct BundleInfo {
    manifest: Manifest,
    jar: Option<ZipArchive<File>>,
    /// `jar:<file-url>!/` prefix used to resolve relative reference URLs.
    location: Option<String>,
    url: Option<Url>,
    size: Option<u64>,
    localization: Option<HashMap<String, String>>,
}

impl BundleInfo {
    /// Opens a bundle JAR and reads its `META-INF/MANIFEST.MF`.
    pub fn from_jar(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut jar = ZipArchive::new(file)?;
        let mut bytes = Vec::new();
        {
            let mut entry = jar.by_name("META-INF/MANIFEST.MF").map_err(|_| {
                ObrError::InvalidManifest(format!("no manifest in {}", path.display()))
            })?;
            entry.read_to_end(&mut bytes)?;
        }
        let manifest = Manifest::parse(&bytes)?;
        let absolute = path.canonicalize()?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| ObrError::InvalidPath(absolute.display().to_string()))?;
        Ok(Self {
            manifest,
            jar: Some(jar),
            location: Some(format!("jar:{url}!/")),
            url: Some(url),
            size: (size > 0).then_some(size),
            localization: None,
        })
    }

    /// Wraps an already-parsed manifest; no JAR means no size, no URL and no
    /// localization lookups.
    pub fn from_manifest(manifest: Manifest) -> Self {
        Self {
            manifest,
            jar: None,
            location: None,
            url: None,
            size: None,
            localization: None,
        }
    }

    /// Runs the translation. Consuming `self` closes the backing JAR whether
    /// the build succeeds or fails.
    pub fn build(mut self) -> Result<Resource> {
        let symbolic_name = self.symbolic_name()?;
        let mut resource = Resource::new(symbolic_name);
        resource.set_version(self.bundle_version());
        if let Some(url) = self.url.clone() {
            resource.set_url(url);
        }
        self.update_location(&mut resource);
        self.references(&mut resource);
        if let Some(size) = self.size {
            resource.set_size(size);
        }
        self.categories(&mut resource);
        self.services(&mut resource);
        self.declarative_services();
        let host = self.fragment_host(&mut resource);
        self.required_bundles(&mut resource);
        self.execution_environment(&mut resource);
        self.package_imports(&mut resource);
        self.bundle_capability(&mut resource, host.as_ref());
        self.package_exports(&mut resource);
        Ok(resource)
    }

    fn symbolic_name(&self) -> Result<String> {
        match self.manifest.clauses("Bundle-SymbolicName") {
            Ok(clauses) => {
                if let Some(clause) = clauses.first() {
                    return Ok(clause.name().to_string());
                }
            }
            Err(err) => {
                warn!(header = "Bundle-SymbolicName", error = %err, "skipping unparsable header");
            }
        }
        match self
            .manifest
            .header("Bundle-Name")
            .and_then(|name| name.split_whitespace().next())
        {
            Some(token) => Ok(token.to_string()),
            None => Err(ObrError::InvalidManifest(
                "bundle has neither Bundle-SymbolicName nor Bundle-Name".into(),
            )),
        }
    }

    fn bundle_version(&self) -> VersionRange {
        let Some(value) = self.manifest.header("Bundle-Version") else {
            return VersionRange::default();
        };
        match VersionRange::parse(value.trim()) {
            Ok(version) => version,
            Err(err) => {
                warn!(header = "Bundle-Version", error = %err, "falling back to version 0");
                VersionRange::default()
            }
        }
    }

    fn update_location(&self, resource: &mut Resource) {
        let Some(value) = self.manifest.header("Bundle-UpdateLocation") else {
            return;
        };
        match Url::parse(value.trim()) {
            Ok(url) => resource.set_url(url),
            Err(err) => {
                warn!(header = "Bundle-UpdateLocation", error = %err, "skipping unparsable header");
            }
        }
    }

    /// Presentation name and the free-text reference properties. URL-valued
    /// properties are resolved against the bundle's `jar:` location.
    fn references(&mut self, resource: &mut Resource) {
        if let Some(name) = self.translated_header("Bundle-Name") {
            resource.set_presentation_name(name);
        }
        if let Some(license) = self.translated_header("Bundle-License") {
            let resolved = self.resolve_reference(&license);
            resource.put_property(Resource::LICENSE_URL, resolved);
        }
        if let Some(description) = self.translated_header("Bundle-Description") {
            resource.put_property(Resource::DESCRIPTION, description);
        }
        if let Some(copyright) = self.translated_header("Bundle-Copyright") {
            resource.put_property(Resource::COPYRIGHT, copyright);
        }
        if let Some(documentation) = self.translated_header("Bundle-DocURL") {
            let resolved = self.resolve_reference(&documentation);
            resource.put_property(Resource::DOCUMENTATION_URL, resolved);
        }
        if let Some(source) = self.manifest.header("Bundle-Source").map(str::to_string) {
            let resolved = self.resolve_reference(&source);
            resource.put_property(Resource::SOURCE_URL, resolved);
        }
    }

    fn categories(&self, resource: &mut Resource) {
        match self.manifest.clauses("Bundle-Category") {
            Ok(clauses) => {
                for clause in clauses {
                    resource.add_category(clause.name());
                }
            }
            Err(err) => {
                warn!(header = "Bundle-Category", error = %err, "skipping unparsable header");
            }
        }
    }

    fn services(&self, resource: &mut Resource) {
        match self.manifest.clauses("Import-Service") {
            Ok(clauses) => {
                for clause in clauses {
                    let mut requirement = Requirement::new("service", service_filter(&clause));
                    requirement.set_comment(format!("Import Service {}", clause.name()));
                    requirement.set_optional(has_directive(&clause, "availability", "optional"));
                    requirement.set_multiple(true);
                    resource.add_requirement(requirement);
                }
            }
            Err(err) => {
                warn!(header = "Import-Service", error = %err, "skipping unparsable header");
            }
        }
        match self.manifest.clauses("Export-Service") {
            Ok(clauses) => {
                for clause in clauses {
                    let capability =
                        Capability::new("service").with_property("service", clause.name());
                    resource.add_capability(capability);
                }
            }
            Err(err) => {
                warn!(header = "Export-Service", error = %err, "skipping unparsable header");
            }
        }
    }

    /// Declarative Services descriptors are checked for presence in the JAR,
    /// nothing more; they contribute nothing to the resource.
    fn declarative_services(&mut self) {
        let clauses = match self.manifest.clauses("Service-Component") {
            Ok(clauses) => clauses,
            Err(err) => {
                warn!(header = "Service-Component", error = %err, "skipping unparsable header");
                return;
            }
        };
        let Some(jar) = &mut self.jar else {
            return;
        };
        for clause in clauses {
            if jar.by_name(clause.name()).is_err() {
                warn!(
                    entry = clause.name(),
                    "Service-Component descriptor missing from bundle"
                );
            }
        }
    }

    /// A fragment emits a `bundle` requirement on its host plus a `fragment`
    /// capability. Returns the host so the bundle capability can repeat it.
    fn fragment_host(&self, resource: &mut Resource) -> Option<(String, Option<VersionRange>)> {
        let clauses = match self.manifest.clauses("Fragment-Host") {
            Ok(clauses) => clauses,
            Err(err) => {
                warn!(header = "Fragment-Host", error = %err, "skipping unparsable header");
                return None;
            }
        };
        let clause = clauses.first()?;
        let range = match clause.attribute("bundle-version") {
            Some(value) => match VersionRange::parse(value) {
                Ok(range) => Some(range),
                Err(err) => {
                    warn!(
                        header = "Fragment-Host",
                        host = clause.name(),
                        error = %err,
                        "ignoring invalid host version"
                    );
                    None
                }
            },
            None => None,
        };

        let mut filter = format!("(&(symbolicname={})", clause.name());
        if let Some(range) = &range {
            append_version(&mut filter, range);
        }
        filter.push(')');
        let mut requirement = Requirement::new("bundle", filter);
        requirement.set_comment(format!("Required Host {}", clause.name()));
        requirement.set_extend(true);
        resource.add_requirement(requirement);

        let mut capability = Capability::new("fragment").with_property("host", clause.name());
        if let Some(range) = &range {
            capability.add_property("version", range.clone());
        }
        resource.add_capability(capability);

        Some((clause.name().to_string(), range))
    }

    fn required_bundles(&self, resource: &mut Resource) {
        let clauses = match self.manifest.clauses("Require-Bundle") {
            Ok(clauses) => clauses,
            Err(err) => {
                warn!(header = "Require-Bundle", error = %err, "skipping unparsable header");
                return;
            }
        };
        for clause in clauses {
            let range = match clause.attribute("bundle-version") {
                Some(value) => match VersionRange::parse(value) {
                    Ok(range) => range,
                    Err(err) => {
                        warn!(
                            header = "Require-Bundle",
                            bundle = clause.name(),
                            error = %err,
                            "skipping entry with invalid version"
                        );
                        continue;
                    }
                },
                None => VersionRange::default(),
            };
            let mut filter = format!("(&(symbolicname={})", clause.name());
            append_version(&mut filter, &range);
            filter.push(')');
            let mut requirement = Requirement::new("bundle", filter);
            requirement.set_comment(format!("Require Bundle {}; {}", clause.name(), range));
            requirement.set_optional(has_directive(&clause, "resolution", "optional"));
            resource.add_requirement(requirement);
        }
    }

    fn execution_environment(&self, resource: &mut Resource) {
        let clauses = match self.manifest.clauses("Bundle-RequiredExecutionEnvironment") {
            Ok(clauses) => clauses,
            Err(err) => {
                warn!(
                    header = "Bundle-RequiredExecutionEnvironment",
                    error = %err,
                    "skipping unparsable header"
                );
                return;
            }
        };
        if clauses.is_empty() {
            return;
        }
        let mut filter = String::from("(|");
        for clause in &clauses {
            filter.push_str(&format!("(ee={})", clause.name()));
        }
        filter.push(')');
        let names: Vec<&str> = clauses.iter().map(Clause::name).collect();
        let mut requirement = Requirement::new("ee", filter);
        requirement.set_comment(format!(
            "Required execution environment {}",
            names.join(", ")
        ));
        resource.add_requirement(requirement);
    }

    fn package_imports(&self, resource: &mut Resource) {
        let clauses = match self.manifest.clauses("Import-Package") {
            Ok(clauses) => clauses,
            Err(err) => {
                warn!(header = "Import-Package", error = %err, "skipping unparsable header");
                return;
            }
        };
        for clause in clauses {
            let range = match clause.version_range() {
                Ok(range) => range,
                Err(err) => {
                    warn!(
                        header = "Import-Package",
                        package = clause.name(),
                        error = %err,
                        "skipping import with invalid version"
                    );
                    continue;
                }
            };
            let mut filter = format!("(&(package={})", clause.name());
            append_version(&mut filter, &range);
            // Attributes beyond the version feed both the filter and the
            // mandatory subset check; a capability that marks an attribute
            // mandatory only matches importers that assert it.
            let mut asserted: Vec<&str> = Vec::new();
            for (key, value) in clause.attributes() {
                if is_version_attribute(key) {
                    continue;
                }
                filter.push_str(&format!("({key}={value})"));
                asserted.push(key);
            }
            if !asserted.is_empty() {
                filter.push_str(&format!("(mandatory:<*{})", asserted.join(", ")));
            }
            filter.push(')');
            let mut requirement = Requirement::new("package", filter);
            requirement.set_comment(format!("Import package {}", clause.name()));
            requirement.set_optional(has_directive(&clause, "resolution", "optional"));
            resource.add_requirement(requirement);
        }
    }

    fn bundle_capability(
        &self,
        resource: &mut Resource,
        host: Option<&(String, Option<VersionRange>)>,
    ) {
        let mut capability = Capability::new("bundle");
        capability.add_property("symbolicname", resource.symbolic_name());
        if let Some(name) = resource.presentation_name() {
            capability.add_property("presentationname", name);
        }
        capability.add_property("version", resource.version().clone());
        let manifest_version = self
            .manifest
            .header("Bundle-ManifestVersion")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("1");
        capability.add_property("manifestversion", manifest_version);
        if let Some((host_name, host_range)) = host {
            capability.add_property("host", host_name.as_str());
            if let Some(range) = host_range {
                capability.add_property("version", range.clone());
            }
        }
        resource.add_capability(capability);
    }

    fn package_exports(&self, resource: &mut Resource) {
        let clauses = match self.manifest.clauses("Export-Package") {
            Ok(clauses) => clauses,
            Err(err) => {
                warn!(header = "Export-Package", error = %err, "skipping unparsable header");
                return;
            }
        };
        for clause in clauses {
            let range = match clause.version_range() {
                Ok(range) => range,
                Err(err) => {
                    warn!(
                        header = "Export-Package",
                        package = clause.name(),
                        error = %err,
                        "skipping export with invalid version"
                    );
                    continue;
                }
            };
            let mut capability = Capability::new("package").with_property("package", clause.name());
            capability.add_property("version", range);
            for (key, value) in clause.attributes() {
                if is_version_attribute(key) {
                    continue;
                }
                capability.add_property(key.clone(), value.clone());
            }
            for (key, value) in clause.directives() {
                capability.add_property(format!("{key}:"), value.clone());
            }
            resource.add_capability(capability);
        }
    }

    fn translated_header(&mut self, name: &str) -> Option<String> {
        let value = self.manifest.header(name)?.to_string();
        Some(self.translate(&value))
    }

    /// Resolves `%key` header values against the bundle's localization
    /// properties, loaded at most once. Unresolved keys fall back to the raw
    /// key string.
    fn translate(&mut self, raw: &str) -> String {
        let Some(key) = raw.strip_prefix('%') else {
            return raw.to_string();
        };
        if self.localization.is_none() {
            self.localization = Some(self.load_localization());
        }
        self.localization
            .as_ref()
            .and_then(|table| table.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    fn load_localization(&mut self) -> HashMap<String, String> {
        let base = self
            .manifest
            .header("Bundle-Localization")
            .unwrap_or("OSGI-INF/l10n/bundle")
            .trim()
            .to_string();
        let mut table = HashMap::new();
        let Some(jar) = &mut self.jar else {
            return table;
        };
        let path = format!("{base}.properties");
        let mut text = String::new();
        match jar.by_name(&path) {
            Ok(mut entry) => {
                if let Err(err) = entry.read_to_string(&mut text) {
                    warn!(entry = %path, error = %err, "cannot read localization entry");
                    return table;
                }
            }
            Err(_) => return table,
        }
        parse_properties(&text, &mut table);
        table
    }

    fn resolve_reference(&self, value: &str) -> String {
        if Url::parse(value).is_ok() {
            return value.to_string();
        }
        match &self.location {
            Some(location) => format!("{location}{value}"),
            None => value.to_string(),
        }
    }
}

fn service_filter(clause: &Clause) -> String {
    match clause.attribute("filter") {
        Some(extra) => format!("(&(service={}){extra})", clause.name()),
        None => format!("(service={})", clause.name()),
    }
}

fn has_directive(clause: &Clause, name: &str, value: &str) -> bool {
    clause
        .directive(name)
        .is_some_and(|actual| actual.eq_ignore_ascii_case(value))
}

fn is_version_attribute(key: &str) -> bool {
    key.eq_ignore_ascii_case("version") || key.eq_ignore_ascii_case("specification-version")
}

/// Expands a version range into filter terms over the `version` attribute.
/// Exclusive bounds have no strict operator in the filter grammar and are
/// written as negations. The degenerate `"0"` floor adds nothing.
pub(crate) fn append_version(filter: &mut String, range: &VersionRange) {
    if range.is_range() {
        if range.include_low() {
            filter.push_str(&format!("(version>={})", range.low()));
        } else {
            filter.push_str(&format!("(!(version<={}))", range.low()));
        }
        if let Some(high) = range.high() {
            if range.include_high() {
                filter.push_str(&format!("(version<={high})"));
            } else {
                filter.push_str(&format!("(!(version>={high}))"));
            }
        }
    } else if *range != VersionRange::default() {
        filter.push_str(&format!("(version>={})", range.low()));
    }
}

/// Minimal java-properties reader: `key=value` or `key: value` lines, `#`
/// and `!` comments.
fn parse_properties(text: &str, table: &mut HashMap<String, String>) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once(['=', ':']) {
            table.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
}
