//! Element matchers: the subset of CSS selectors the page heuristics rely on,
//! expressed as data.

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// `tag`
    Tag(String),
    /// `.class`
    HasClass(String),
    /// `[class*="needle"]`
    ClassContains(String),
    /// `[name]`
    AttrPresent(String),
    /// `[name="value"]`
    AttrEquals { name: String, value: String },
    /// `[name*="needle"]`
    AttrContains { name: String, needle: String },
    /// Compound selector: every part must match.
    All(Vec<Matcher>),
    /// Selector list: any part may match.
    Any(Vec<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    pub fn tag(tag: &str) -> Self {
        Matcher::Tag(tag.to_ascii_lowercase())
    }

    pub fn has_class(class: &str) -> Self {
        Matcher::HasClass(class.to_string())
    }

    pub fn class_contains(needle: &str) -> Self {
        Matcher::ClassContains(needle.to_string())
    }

    pub fn attr_present(name: &str) -> Self {
        Matcher::AttrPresent(name.to_string())
    }

    pub fn attr_eq(name: &str, value: &str) -> Self {
        Matcher::AttrEquals {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn attr_contains(name: &str, needle: &str) -> Self {
        Matcher::AttrContains {
            name: name.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn tags(tags: &[&str]) -> Self {
        Matcher::Any(tags.iter().map(|t| Matcher::tag(t)).collect())
    }

    pub fn and(self, other: Matcher) -> Self {
        match self {
            Matcher::All(mut parts) => {
                parts.push(other);
                Matcher::All(parts)
            }
            first => Matcher::All(vec![first, other]),
        }
    }

    pub fn not(inner: Matcher) -> Self {
        Matcher::Not(Box::new(inner))
    }

    /// Text nodes never match.
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(element) = doc.element(id) else {
            return false;
        };
        match self {
            Matcher::Tag(tag) => element.tag == *tag,
            Matcher::HasClass(class) => element.has_class(class),
            Matcher::ClassContains(needle) => element.class_name().contains(needle.as_str()),
            Matcher::AttrPresent(name) => element.attr(name).is_some(),
            Matcher::AttrEquals { name, value } => element.attr(name) == Some(value.as_str()),
            Matcher::AttrContains { name, needle } => element
                .attr(name)
                .is_some_and(|v| v.contains(needle.as_str())),
            Matcher::All(parts) => parts.iter().all(|m| m.matches(doc, id)),
            Matcher::Any(parts) => parts.iter().any(|m| m.matches(doc, id)),
            Matcher::Not(inner) => !inner.matches(doc, id),
        }
    }
}

/// A matcher optionally scoped by a descendant combinator:
/// `ancestor target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub ancestor: Option<Matcher>,
    pub target: Matcher,
}

impl Selector {
    pub fn new(target: Matcher) -> Self {
        Self {
            ancestor: None,
            target,
        }
    }

    pub fn within(ancestor: Matcher, target: Matcher) -> Self {
        Self {
            ancestor: Some(ancestor),
            target,
        }
    }

    /// Every match in the document, in document order.
    pub fn select_all(&self, doc: &Document) -> Vec<NodeId> {
        let root = doc.root();
        doc.descendants(root)
            .filter(|id| self.target.matches(doc, *id))
            .filter(|id| match &self.ancestor {
                None => true,
                Some(ancestor) => doc
                    .parent(*id)
                    .and_then(|parent| doc.closest(parent, ancestor))
                    .is_some(),
            })
            .collect()
    }
}
