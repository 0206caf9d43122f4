//! Message body to Markdown.
//!
//! The extractor works on a detached copy of the message subtree so the
//! snapshot the collector iterates over is never touched. Page chrome
//! (buttons, decorative icons) is stripped from the copy first.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::dom::{Document, NodeId, NodeKind};
use crate::selector::Matcher;

/// Deeper trees than this are treated as malformed.
pub const MAX_TRAVERSAL_DEPTH: usize = 150;

static LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"language-(\w+)").expect("language regex"));
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

#[derive(Debug, Error)]
enum ConvertError {
    #[error("markup nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

type ConvertResult<T> = std::result::Result<T, ConvertError>;

fn chrome_matchers() -> Vec<Matcher> {
    vec![
        Matcher::tag("button"),
        Matcher::attr_eq("role", "button"),
        Matcher::has_class("action-button"),
        Matcher::class_contains("button"),
        Matcher::tag("svg").and(Matcher::not(Matcher::class_contains("code"))),
    ]
}

#[derive(Debug, Clone)]
pub struct MessageExtractor {
    strip: Vec<Matcher>,
    max_depth: usize,
}

impl Default for MessageExtractor {
    fn default() -> Self {
        Self {
            strip: chrome_matchers(),
            max_depth: MAX_TRAVERSAL_DEPTH,
        }
    }
}

impl MessageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Markdown for the message rooted at `id`. Falls back to the node's
    /// flattened text when conversion fails.
    pub fn extract(&self, doc: &Document, id: NodeId) -> String {
        match self.try_extract(doc, id) {
            Ok(markdown) => markdown,
            Err(err) => {
                warn!(error = %err, "markdown conversion failed, using plain text");
                doc.text_content(id)
            }
        }
    }

    fn try_extract(&self, doc: &Document, id: NodeId) -> ConvertResult<String> {
        let mut copy = doc.clone_subtree(id);
        let root = copy.root();
        for matcher in &self.strip {
            for node in copy.query_all(root, matcher) {
                copy.detach(node);
            }
        }

        let mut out = String::new();
        self.convert_children(&copy, root, 0, 0, &mut out)?;
        Ok(BLANK_RUN_RE.replace_all(&out, "\n\n").trim().to_string())
    }

    fn check_depth(&self, level: usize) -> ConvertResult<()> {
        if level > self.max_depth {
            return Err(ConvertError::TooDeep {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn convert_children(
        &self,
        doc: &Document,
        id: NodeId,
        list_depth: usize,
        level: usize,
        out: &mut String,
    ) -> ConvertResult<()> {
        self.check_depth(level)?;
        for &child in doc.children(id) {
            let element = match doc.kind(child) {
                NodeKind::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                NodeKind::Element(element) => element,
            };

            match element.tag.as_str() {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let hashes = "#".repeat(heading_level(&element.tag));
                    let text = doc.text_content(child);
                    out.push_str(&format!("\n\n{hashes} {}\n\n", text.trim()));
                }
                "ul" | "ol" => {
                    out.push('\n');
                    let list = self.convert_list(doc, child, list_depth, level + 1)?;
                    out.push_str(&list);
                }
                "p" => {
                    self.convert_children(doc, child, list_depth, level + 1, out)?;
                    out.push_str("\n\n");
                }
                "br" => out.push('\n'),
                "strong" | "b" => {
                    out.push_str(&format!("**{}**", doc.text_content(child).trim()));
                }
                "em" | "i" => {
                    out.push_str(&format!("*{}*", doc.text_content(child).trim()));
                }
                "code" => {
                    let text = doc.text_content(child);
                    if doc.parent(child).and_then(|p| doc.tag(p)) == Some("pre") {
                        out.push_str(&text);
                    } else {
                        out.push_str(&format!("`{text}`"));
                    }
                }
                "pre" => {
                    let code = doc.query_first(child, &Matcher::tag("code"));
                    let body = doc.text_content(code.unwrap_or(child));
                    let language = code
                        .and_then(|c| doc.element(c))
                        .and_then(|c| LANGUAGE_RE.captures(c.class_name()))
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str())
                        .unwrap_or("");
                    out.push_str(&format!("\n```{language}\n{body}\n```\n\n"));
                }
                _ => self.convert_children(doc, child, list_depth, level + 1, out)?,
            }
        }
        Ok(())
    }

    /// Items of one list, each `indent bullet content`. Lists nested in an
    /// item are rendered one level deeper and spliced in where they sat.
    fn convert_list(
        &self,
        doc: &Document,
        list: NodeId,
        list_depth: usize,
        level: usize,
    ) -> ConvertResult<String> {
        self.check_depth(level)?;
        let numbered = doc.tag(list) == Some("ol");
        let indent = "  ".repeat(list_depth);
        let mut result = String::new();

        let items = doc
            .element_children(list)
            .filter(|id| doc.tag(*id) == Some("li"));
        for (index, item) in items.enumerate() {
            let bullet = if numbered {
                format!("{}.", index + 1)
            } else {
                "-".to_string()
            };

            let mut nested = Vec::new();
            let mut text = String::new();
            collect_item_text(doc, item, &mut nested, &mut text);

            let mut content = text.trim().to_string();
            for (i, sublist) in nested.into_iter().enumerate() {
                let rendered = self.convert_list(doc, sublist, list_depth + 1, level + 1)?;
                content = content.replacen(
                    &placeholder(i),
                    &format!("\n{rendered}"),
                    1,
                );
            }

            result.push_str(&format!("{indent}{bullet} {content}\n"));
        }
        Ok(result)
    }
}

fn heading_level(tag: &str) -> usize {
    tag[1..].parse().unwrap_or(1)
}

fn placeholder(index: usize) -> String {
    format!("__NESTED_LIST_{index}__")
}

/// Flattened text of a list item with each outermost nested list replaced by
/// a numbered placeholder.
fn collect_item_text(doc: &Document, id: NodeId, nested: &mut Vec<NodeId>, out: &mut String) {
    for &child in doc.children(id) {
        match doc.kind(child) {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(element) if element.tag == "ul" || element.tag == "ol" => {
                out.push_str(&placeholder(nested.len()));
                nested.push(child);
            }
            NodeKind::Element(_) => collect_item_text(doc, child, nested, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Markup;

    fn extract(markup: Markup) -> String {
        let doc = Document::from_markup(&markup);
        MessageExtractor::new().extract(&doc, doc.root())
    }

    fn p(text: &str) -> Markup {
        Markup::el("p").child(Markup::text(text))
    }

    #[test]
    fn paragraphs_and_inline_styles() {
        let markup = Markup::el("model-response")
            .child(
                Markup::el("p")
                    .child(Markup::text("This is "))
                    .child(Markup::el("strong").child(Markup::text(" bold ")))
                    .child(Markup::text(" and "))
                    .child(Markup::el("em").child(Markup::text("soft")))
                    .child(Markup::text(" with "))
                    .child(Markup::el("code").child(Markup::text("x + 1"))),
            )
            .child(p("Second."));
        assert_eq!(
            extract(markup),
            "This is **bold** and *soft* with `x + 1`\n\nSecond."
        );
    }

    #[test]
    fn fenced_code_keeps_language() {
        let markup = Markup::el("div").child(
            Markup::el("pre").child(
                Markup::el("code")
                    .attr("class", "hljs language-rust")
                    .child(Markup::text("fn main() {}")),
            ),
        );
        assert_eq!(extract(markup), "```rust\nfn main() {}\n```");
    }

    #[test]
    fn headings_and_breaks() {
        let markup = Markup::el("div")
            .child(Markup::el("h2").child(Markup::text("  Title ")))
            .child(Markup::text("line one"))
            .child(Markup::el("br"))
            .child(Markup::text("line two"));
        assert_eq!(extract(markup), "## Title\n\nline one\nline two");
    }

    #[test]
    fn nested_lists_are_indented() {
        let markup = Markup::el("div").child(
            Markup::el("ul")
                .child(Markup::el("li").child(Markup::text("alpha")))
                .child(
                    Markup::el("li").child(Markup::text("beta")).child(
                        Markup::el("ol")
                            .child(Markup::el("li").child(Markup::text("one")))
                            .child(Markup::el("li").child(Markup::text("two"))),
                    ),
                ),
        );
        assert_eq!(
            extract(markup),
            "- alpha\n- beta\n  1. one\n  2. two"
        );
    }

    #[test]
    fn chrome_is_stripped_from_copy_only() {
        let markup = Markup::el("model-response")
            .child(p("Answer text"))
            .child(Markup::el("button").child(Markup::text("Copy")))
            .child(Markup::el("div").attr("class", "mat-button-wrapper").child(Markup::text("Share")))
            .child(Markup::el("svg").child(Markup::text("icon")))
            .child(Markup::el("svg").attr("class", "code-glyph").child(Markup::text("{}")));
        let doc = Document::from_markup(&markup);
        let out = MessageExtractor::new().extract(&doc, doc.root());
        assert_eq!(out, "Answer text\n\n{}");
        assert!(doc.text_content(doc.root()).contains("Copy"));
    }

    #[test]
    fn blank_runs_collapse() {
        let markup = Markup::el("div")
            .child(p("a"))
            .child(Markup::el("br"))
            .child(Markup::el("br"))
            .child(p("b"));
        assert_eq!(extract(markup), "a\n\nb");
    }

    #[test]
    fn too_deep_falls_back_to_text() {
        let mut markup = Markup::el("span").child(Markup::text("deep"));
        for _ in 0..10 {
            markup = Markup::el("div").child(markup);
        }
        let doc = Document::from_markup(&Markup::el("div").child(Markup::el("b").child(Markup::text("x"))).child(markup));
        let shallow = MessageExtractor::new().with_max_depth(3);
        assert_eq!(shallow.extract(&doc, doc.root()), "xdeep");
        assert_eq!(MessageExtractor::new().extract(&doc, doc.root()), "**x**deep");
    }
}
