//! Finding the element that actually scrolls the conversation.

use serde::Serialize;
use tracing::{debug, warn};

use crate::classify::{ASSISTANT_TAG, USER_TAG};
use crate::dom::{Document, ElementHandle, NodeId};
use crate::host::ScrollTarget;
use crate::selector::Matcher;

/// Overflow a non-primary candidate needs before it counts as scrollable.
pub const OVERFLOW_SLACK: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocateStrategy {
    ChatHistory,
    InfiniteScroller,
    OverflowingAncestor,
    DocumentRoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub target: ScrollTarget,
    pub strategy: LocateStrategy,
}

fn overflow(doc: &Document, id: NodeId) -> f64 {
    doc.element(id)
        .and_then(|e| e.layout)
        .map(|l| l.overflow())
        .unwrap_or(0.0)
}

fn handle(doc: &Document, id: NodeId) -> Option<ElementHandle> {
    doc.element(id).and_then(|e| e.handle)
}

fn found(handle: ElementHandle, strategy: LocateStrategy) -> Located {
    debug!(?handle, ?strategy, "scroll container located");
    Located {
        target: ScrollTarget::Element(handle),
        strategy,
    }
}

/// Ordered fallback, first success wins. Never fails: the document root is
/// the last resort.
pub fn locate(doc: &Document) -> Located {
    let root = doc.root();
    let scroller = Matcher::tag("infinite-scroller");

    let chat_history = scroller.clone().and(Matcher::has_class("chat-history"));
    if let Some(id) = doc.query_first(root, &chat_history) {
        if overflow(doc, id) > 0.0 {
            if let Some(h) = handle(doc, id) {
                return found(h, LocateStrategy::ChatHistory);
            }
        }
    }

    for id in doc.query_all(root, &scroller) {
        if overflow(doc, id) > OVERFLOW_SLACK {
            if let Some(h) = handle(doc, id) {
                return found(h, LocateStrategy::InfiniteScroller);
            }
        }
    }

    let holds_messages = Matcher::Any(vec![
        Matcher::tag(USER_TAG),
        Matcher::tag(ASSISTANT_TAG),
        Matcher::has_class("conversation-container"),
    ]);
    let overflowing = std::iter::once(root).chain(doc.descendants(root));
    for id in overflowing {
        if overflow(doc, id) > OVERFLOW_SLACK && doc.query_first(id, &holds_messages).is_some() {
            if let Some(h) = handle(doc, id) {
                return found(h, LocateStrategy::OverflowingAncestor);
            }
        }
    }

    warn!("no scrollable conversation container, scrolling the document");
    Located {
        target: ScrollTarget::Root,
        strategy: LocateStrategy::DocumentRoot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Element, Layout};

    fn scrolling(tag: &str, scroll_height: f64, client_height: f64) -> Element {
        Element::new(tag).with_layout(Layout {
            scroll_height,
            client_height,
            ..Layout::default()
        })
    }

    #[test]
    fn prefers_chat_history() {
        let mut doc = Document::new(Element::new("body"));
        let root = doc.root();
        doc.append(
            root,
            scrolling("infinite-scroller", 5000.0, 500.0).with_handle(ElementHandle(1)),
        );
        doc.append(
            root,
            scrolling("infinite-scroller", 900.0, 500.0)
                .with_attr("class", "chat-history")
                .with_handle(ElementHandle(2)),
        );
        let located = locate(&doc);
        assert_eq!(located.target, ScrollTarget::Element(ElementHandle(2)));
        assert_eq!(located.strategy, LocateStrategy::ChatHistory);
    }

    #[test]
    fn generic_scroller_needs_slack() {
        let mut doc = Document::new(Element::new("body"));
        let root = doc.root();
        doc.append(
            root,
            scrolling("infinite-scroller", 550.0, 500.0).with_handle(ElementHandle(1)),
        );
        doc.append(
            root,
            scrolling("infinite-scroller", 700.0, 500.0).with_handle(ElementHandle(2)),
        );
        assert_eq!(
            locate(&doc).target,
            ScrollTarget::Element(ElementHandle(2))
        );
    }

    #[test]
    fn overflowing_ancestor_with_messages() {
        let mut doc = Document::new(Element::new("body"));
        let root = doc.root();
        doc.append(root, scrolling("div", 3000.0, 400.0).with_handle(ElementHandle(3)));
        let main = doc.append(root, scrolling("main", 3000.0, 400.0).with_handle(ElementHandle(4)));
        doc.append(main, Element::new("user-query"));

        let located = locate(&doc);
        assert_eq!(located.target, ScrollTarget::Element(ElementHandle(4)));
        assert_eq!(located.strategy, LocateStrategy::OverflowingAncestor);
    }

    #[test]
    fn falls_back_to_root() {
        let doc = Document::new(Element::new("body"));
        assert_eq!(locate(&doc).target, ScrollTarget::Root);
    }
}
