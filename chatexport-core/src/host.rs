//! Seams between the export engine and the page it runs against.
//!
//! The engine never touches a live page directly. It reads DOM snapshots,
//! writes scroll offsets and dispatches UI events through these traits:
//! - [`Page`]: the tab as a whole (URL, document, scroll hosts)
//! - [`ScrollHost`]: one scrollable container
//! - [`UiDriver`]: synthetic user input for batch delete
//!
//! [`crate::simulate::VirtualPage`] implements all three.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, ElementHandle, NodeId};

/// What the collector scrolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollTarget {
    Element(ElementHandle),
    /// The document's scrolling element.
    Root,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

/// A document snapshot plus the node in it that corresponds to the host.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub document: Document,
    pub scope: NodeId,
}

#[async_trait]
pub trait ScrollHost: Send + Sync {
    async fn metrics(&self) -> ScrollMetrics;

    /// Request a scroll offset. The host clamps it; read `metrics` afterwards
    /// for the offset actually applied.
    async fn scroll_to(&self, top: f64);

    async fn snapshot(&self) -> HostSnapshot;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> String;

    async fn document(&self) -> Document;

    async fn scroll_host(&self, target: ScrollTarget) -> Box<dyn ScrollHost>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    MouseEnter,
    MouseOver,
    Click,
    /// Escape key, sent to the document.
    Escape,
}

#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn document(&self) -> Document;

    async fn dispatch(&self, target: ElementHandle, event: UiEvent);
}

/// Whether the URL belongs to the chat application.
pub fn is_supported_url(url: &str) -> bool {
    url.contains("gemini.google.com") || (url.contains("google.com") && url.contains("/app/gemini"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_urls() {
        assert!(is_supported_url("https://gemini.google.com/app/abc123"));
        assert!(is_supported_url("https://www.google.com/app/gemini/xyz"));
        assert!(!is_supported_url("https://www.google.com/search?q=gemini"));
        assert!(!is_supported_url("https://example.com/"));
    }
}
