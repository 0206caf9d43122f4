//! Owned snapshot of a page's DOM.
//!
//! A [`Document`] is an arena of nodes captured at one instant. [`NodeId`]s
//! index into that arena and mean nothing in another snapshot. Identity that
//! survives across snapshots is carried by [`ElementHandle`], which the page
//! assigns: stable elements keep theirs, virtualized message nodes get a fresh
//! one whenever they are re-rendered.
//!
//! [`Markup`] is the serializable form of a subtree, used by page fixtures and
//! tests to build documents.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::selector::Matcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Page-assigned identity of a live element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// Geometry and computed visibility of an element at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Bounding rect top, relative to the viewport.
    pub top: f64,
    pub height: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    /// `display: none`, `visibility: hidden` or `opacity: 0`.
    pub hidden: bool,
}

impl Layout {
    /// How far the content overflows the visible box.
    pub fn overflow(&self) -> f64 {
        self.scroll_height - self.client_height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    attrs: Vec<(String, String)>,
    pub handle: Option<ElementHandle>,
    pub layout: Option<Layout>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            handle: None,
            layout: None,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_handle(mut self, handle: ElementHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The raw `class` attribute, empty when absent.
    pub fn class_name(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_name().split_whitespace().any(|c| c == class)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    /// Mirrors `document.title`.
    pub title: String,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Element(root),
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
            title: String::new(),
        }
    }

    /// Build a document whose root is the given markup. Bare text is wrapped
    /// in a `#fragment` element.
    pub fn from_markup(markup: &Markup) -> Self {
        match markup {
            Markup::Text(_) => {
                let mut doc = Document::new(Element::new("#fragment"));
                let root = doc.root();
                doc.append_markup(root, markup);
                doc
            }
            Markup::Element {
                tag,
                attrs,
                children,
            } => {
                let mut element = Element::new(tag.as_str());
                for (name, value) in attrs {
                    element.set_attr(name.as_str(), value.as_str());
                }
                let mut doc = Document::new(element);
                let root = doc.root();
                for child in children {
                    doc.append_markup(root, child);
                }
                doc
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn append(&mut self, parent: NodeId, element: Element) -> NodeId {
        self.push(parent, NodeKind::Element(element))
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.push(parent, NodeKind::Text(text.into()))
    }

    pub fn append_markup(&mut self, parent: NodeId, markup: &Markup) -> NodeId {
        match markup {
            Markup::Text(text) => self.append_text(parent, text.as_str()),
            Markup::Element {
                tag,
                attrs,
                children,
            } => {
                let mut element = Element::new(tag.as_str());
                for (name, value) in attrs {
                    element.set_attr(name.as_str(), value.as_str());
                }
                let id = self.append(parent, element);
                for child in children {
                    self.append_markup(id, child);
                }
                id
            }
        }
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.element(*child).is_some())
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.children(parent)
            .iter()
            .copied()
            .skip_while(|child| *child != id)
            .skip(1)
            .find(|child| self.element(*child).is_some())
    }

    /// Pre-order walk of everything below `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Element(_) => {
                let mut out = String::new();
                for node in self.descendants(id) {
                    if let NodeKind::Text(text) = self.kind(node) {
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }

    /// Whether the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn find_by_handle(&self, handle: ElementHandle) -> Option<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|id| self.element(*id).and_then(|e| e.handle) == Some(handle))
    }

    pub fn contains_handle(&self, handle: ElementHandle) -> bool {
        self.find_by_handle(handle).is_some()
    }

    pub fn matches(&self, id: NodeId, matcher: &Matcher) -> bool {
        matcher.matches(self, id)
    }

    /// Nearest element, starting with `id` itself, that matches.
    pub fn closest(&self, id: NodeId, matcher: &Matcher) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if matcher.matches(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Matching descendants of `scope` in document order.
    pub fn query_all(&self, scope: NodeId, matcher: &Matcher) -> Vec<NodeId> {
        self.descendants(scope)
            .filter(|id| matcher.matches(self, *id))
            .collect()
    }

    pub fn query_first(&self, scope: NodeId, matcher: &Matcher) -> Option<NodeId> {
        self.descendants(scope).find(|id| matcher.matches(self, *id))
    }

    /// Child-index path from the root; detached nodes get the path within
    /// their own detached tree.
    fn path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let index = self
                .children(parent)
                .iter()
                .position(|child| *child == current)
                .unwrap_or(usize::MAX);
            path.push(index);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Document-order comparison. An ancestor sorts before its descendants.
    pub fn compare_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.path(a).cmp(&self.path(b))
    }

    /// Detached deep copy of the subtree at `id`.
    pub fn clone_subtree(&self, id: NodeId) -> Document {
        let mut copy = match self.kind(id) {
            NodeKind::Element(element) => Document::new(element.clone()),
            NodeKind::Text(text) => {
                let mut doc = Document::new(Element::new("#fragment"));
                let root = doc.root();
                doc.append_text(root, text.as_str());
                doc.title = self.title.clone();
                return doc;
            }
        };
        copy.title = self.title.clone();
        let root = copy.root();
        for child in self.children(id) {
            self.copy_into(*child, &mut copy, root);
        }
        copy
    }

    fn copy_into(&self, id: NodeId, target: &mut Document, parent: NodeId) {
        let new_id = target.push(parent, self.kind(id).clone());
        for child in self.children(id) {
            self.copy_into(*child, target, new_id);
        }
    }

    /// Unlink a subtree from its parent. The root cannot be detached.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(next).iter().rev().copied());
        Some(next)
    }
}

/// Serializable subtree: either bare text or an element with attributes and
/// children. In JSON a text node is a plain string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Markup {
    Text(String),
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attrs: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<Markup>,
    },
}

impl Markup {
    pub fn text(text: impl Into<String>) -> Self {
        Markup::Text(text.into())
    }

    pub fn el(tag: impl Into<String>) -> Self {
        Markup::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute; no-op on text.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Markup::Element { attrs, .. } = &mut self {
            attrs.insert(name.into(), value.into());
        }
        self
    }

    /// Append a child; no-op on text.
    pub fn child(mut self, child: Markup) -> Self {
        if let Markup::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    pub fn children(self, items: impl IntoIterator<Item = Markup>) -> Self {
        items.into_iter().fold(self, Markup::child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::from_markup(
            &Markup::el("div")
                .child(Markup::el("p").child(Markup::text("one")))
                .child(
                    Markup::el("section")
                        .attr("class", "a b")
                        .child(Markup::el("span").child(Markup::text("two")))
                        .child(Markup::text(" three")),
                ),
        )
    }

    #[test]
    fn text_content_concatenates_in_order() {
        let doc = sample();
        assert_eq!(doc.text_content(doc.root()), "onetwo three");
    }

    #[test]
    fn descendants_are_preorder() {
        let doc = sample();
        let tags: Vec<_> = doc
            .descendants(doc.root())
            .filter_map(|id| doc.tag(id))
            .collect();
        assert_eq!(tags, vec!["p", "section", "span"]);
    }

    #[test]
    fn compare_order_follows_tree_not_arena() {
        let mut doc = Document::new(Element::new("body"));
        let root = doc.root();
        let first = doc.append(root, Element::new("div"));
        let second = doc.append(root, Element::new("div"));
        // Appended later in the arena, but lives inside `first`.
        let nested = doc.append(first, Element::new("span"));

        assert_eq!(doc.compare_order(nested, second), Ordering::Less);
        assert_eq!(doc.compare_order(first, nested), Ordering::Less);
        assert_eq!(doc.compare_order(second, first), Ordering::Greater);
        assert_eq!(doc.compare_order(second, second), Ordering::Equal);
    }

    #[test]
    fn detach_hides_subtree_from_traversal() {
        let mut doc = sample();
        let section = doc.query_first(doc.root(), &Matcher::tag("section")).unwrap();
        doc.detach(section);
        assert_eq!(doc.text_content(doc.root()), "one");
        assert!(!doc.is_attached(section));
    }

    #[test]
    fn clone_subtree_is_independent() {
        let doc = sample();
        let section = doc.query_first(doc.root(), &Matcher::tag("section")).unwrap();
        let mut copy = doc.clone_subtree(section);
        assert!(copy.element(copy.root()).unwrap().has_class("b"));

        let span = copy.query_first(copy.root(), &Matcher::tag("span")).unwrap();
        copy.detach(span);
        assert_eq!(copy.text_content(copy.root()), " three");
        assert_eq!(doc.text_content(section), "two three");
    }

    #[test]
    fn closest_includes_self() {
        let doc = sample();
        let span = doc.query_first(doc.root(), &Matcher::tag("span")).unwrap();
        assert_eq!(doc.closest(span, &Matcher::tag("span")), Some(span));
        let section = doc.closest(span, &Matcher::has_class("a"));
        assert_eq!(doc.tag(section.unwrap()), Some("section"));
        assert_eq!(doc.closest(span, &Matcher::tag("ul")), None);
    }

    #[test]
    fn markup_round_trips_through_json() {
        let json = r#"{"tag":"p","attrs":{"class":"x"},"children":["hi",{"tag":"b","children":["there"]}]}"#;
        let markup: Markup = serde_json::from_str(json).unwrap();
        let doc = Document::from_markup(&markup);
        assert_eq!(doc.text_content(doc.root()), "hithere");
        assert_eq!(doc.element(doc.root()).unwrap().attr("class"), Some("x"));
    }

    #[test]
    fn find_by_handle_locates_element() {
        let mut doc = Document::new(Element::new("body"));
        let root = doc.root();
        let el = doc.append(root, Element::new("div").with_handle(ElementHandle(7)));
        assert_eq!(doc.find_by_handle(ElementHandle(7)), Some(el));
        assert!(!doc.contains_handle(ElementHandle(8)));
    }
}
