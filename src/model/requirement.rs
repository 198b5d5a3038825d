use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::filter::Filter;
use crate::model::Capability;

/// A named filter expression that some capability must satisfy.
///
/// The filter is kept as text until the first satisfaction test compiles it;
/// `set_filter` drops back to the text-only state, so a malformed filter only
/// surfaces when it is actually evaluated.
#[derive(Debug, Clone, Serialize)]
pub struct Requirement {
    name: String,
    #[serde(rename = "filter", serialize_with = "filter_text")]
    filter: FilterSlot,
    optional: bool,
    multiple: bool,
    extend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

#[derive(Debug, Clone)]
enum FilterSlot {
    Text(String),
    Compiled { text: String, filter: Filter },
}

impl FilterSlot {
    fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Compiled { text, .. } => text,
        }
    }
}

fn filter_text<S: Serializer>(
    slot: &FilterSlot,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(slot.text())
}

impl Requirement {
    pub fn new(name: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: FilterSlot::Text(filter.into()),
            optional: false,
            multiple: false,
            extend: false,
            comment: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &str {
        self.filter.text()
    }

    /// Replace the filter text; a previously compiled form is discarded.
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = FilterSlot::Text(filter.into());
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = Some(comment.into());
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.set_comment(comment);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn set_multiple(&mut self, multiple: bool) {
        self.multiple = multiple;
    }

    pub fn with_multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn is_extend(&self) -> bool {
        self.extend
    }

    pub fn set_extend(&mut self, extend: bool) {
        self.extend = extend;
    }

    pub fn with_extend(mut self, extend: bool) -> Self {
        self.extend = extend;
        self
    }

    /// Compile the filter if still in text form, then evaluate it against the
    /// capability's properties. Compilation errors surface here.
    pub fn is_satisfied(&mut self, capability: &Capability) -> Result<bool> {
        let slot = std::mem::replace(&mut self.filter, FilterSlot::Text(String::new()));
        let (text, filter) = match slot {
            FilterSlot::Compiled { text, filter } => (text, filter),
            FilterSlot::Text(text) => match Filter::parse(&text) {
                Ok(filter) => (text, filter),
                Err(err) => {
                    self.filter = FilterSlot::Text(text);
                    return Err(err);
                }
            },
        };
        let satisfied = filter.matches(capability.properties());
        self.filter = FilterSlot::Compiled { text, filter };
        Ok(satisfied)
    }
}

// Structural equality: name plus filter text. Flags and comment are
// presentation, not identity.
impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.filter.text() == other.filter.text()
    }
}

impl Eq for Requirement {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Requirement::new("package", "(package=org.foo)");
        let b = Requirement::new("package", "(package=org.foo)").with_optional(true);
        assert_eq!(a, b);
        let c = Requirement::new("package", "(package=org.bar)");
        assert_ne!(a, c);
    }

    #[test]
    fn test_satisfaction() {
        let mut requirement =
            Requirement::new("package", "(&(package=org.foo)(version>=1.0.0))");
        let capability = Capability::new("package")
            .with_property("package", "org.foo")
            .with_property(
                "version",
                crate::version::VersionRange::parse("1.2.0").unwrap(),
            );
        assert!(requirement.is_satisfied(&capability).unwrap());

        let too_old = Capability::new("package")
            .with_property("package", "org.foo")
            .with_property(
                "version",
                crate::version::VersionRange::parse("0.9.0").unwrap(),
            );
        assert!(!requirement.is_satisfied(&too_old).unwrap());
    }

    #[test]
    fn test_bad_filter_fails_at_evaluation() {
        let capability = Capability::new("package").with_property("package", "org.foo");

        let mut requirement = Requirement::new("package", "(package=org.foo)");
        assert!(requirement.is_satisfied(&capability).unwrap());

        // Setting a malformed filter is accepted silently and only fails once
        // a satisfaction test forces compilation.
        requirement.set_filter("(package=org.foo");
        assert!(requirement.is_satisfied(&capability).is_err());

        requirement.set_filter("(package=org.foo)");
        assert!(requirement.is_satisfied(&capability).unwrap());
    }
}
