//! Conversation title detection, most specific source first:
//! the header element, then the document title, then the first question,
//! then a timestamp.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::classify::USER_TAG;
use crate::dom::{Document, NodeId};
use crate::message::collapse_whitespace;
use crate::selector::Matcher;

const FIRST_QUESTION_CHARS: usize = 60;

static APP_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[-–—|:]\s*Gemini.*$").expect("suffix regex"));
static APP_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Gemini\s*[-–—|:]\s*").expect("prefix regex"));

/// Where a header title may live.
enum HeaderSource {
    First(Matcher),
    Within { container: Matcher, target: Matcher },
}

impl HeaderSource {
    fn find(&self, doc: &Document) -> Option<NodeId> {
        let root = doc.root();
        match self {
            HeaderSource::First(matcher) => doc.query_first(root, matcher),
            HeaderSource::Within { container, target } => doc
                .query_first(root, container)
                .and_then(|c| doc.query_first(c, target)),
        }
    }
}

fn header_sources() -> Vec<HeaderSource> {
    vec![
        HeaderSource::First(Matcher::has_class("conversation-title")),
        HeaderSource::First(Matcher::class_contains("conversation-title")),
        HeaderSource::First(Matcher::has_class("gds-title-m")),
        HeaderSource::First(Matcher::tag("span").and(Matcher::has_class("gds-title-m"))),
        HeaderSource::Within {
            container: Matcher::has_class("conversation-title-container"),
            target: Matcher::tag("span"),
        },
    ]
}

pub fn conversation_title(doc: &Document) -> String {
    conversation_title_at(doc, Utc::now())
}

pub fn conversation_title_at(doc: &Document, now: DateTime<Utc>) -> String {
    if let Some(title) = from_header(doc) {
        return title;
    }
    if let Some(title) = from_document_title(&doc.title) {
        debug!(%title, "title from document title");
        return title;
    }
    if let Some(title) = from_first_question(doc) {
        debug!(%title, "title from first question");
        return title;
    }
    format!("gemini-chat-{}", now.format("%Y-%m-%d-%H:%M"))
}

fn from_header(doc: &Document) -> Option<String> {
    header_sources().iter().find_map(|source| {
        let text = doc.text_content(source.find(doc)?).trim().to_string();
        (text.chars().count() >= 2).then(|| {
            debug!(%text, "title from header");
            text
        })
    })
}

fn from_document_title(title: &str) -> Option<String> {
    if title.is_empty() || title == "Gemini" {
        return None;
    }
    let stripped = APP_SUFFIX_RE.replace(title, "");
    let stripped = APP_PREFIX_RE.replace(&stripped, "");
    let stripped = stripped.trim();
    (stripped.chars().count() >= 2 && stripped.to_lowercase() != "gemini")
        .then(|| stripped.to_string())
}

fn from_first_question(doc: &Document) -> Option<String> {
    let node = doc.query_first(doc.root(), &Matcher::tag(USER_TAG))?;
    let text = collapse_whitespace(&doc.text_content(node));
    let len = text.chars().count();
    if len <= 3 {
        return None;
    }
    let mut title: String = text.chars().take(FIRST_QUESTION_CHARS).collect();
    if len > FIRST_QUESTION_CHARS {
        title.push_str("...");
    }
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Markup;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap()
    }

    fn doc(markup: Markup, title: &str) -> Document {
        let mut doc = Document::from_markup(&markup);
        doc.title = title.to_string();
        doc
    }

    #[test]
    fn header_element_wins() {
        let d = doc(
            Markup::el("body").child(
                Markup::el("span")
                    .attr("class", "conversation-title gds-title-m")
                    .child(Markup::text(" 平台型公司讨论 ")),
            ),
            "Something - Gemini",
        );
        assert_eq!(conversation_title_at(&d, now()), "平台型公司讨论");
    }

    #[test]
    fn short_header_is_skipped() {
        let d = doc(
            Markup::el("body")
                .child(Markup::el("div").attr("class", "conversation-title").child(Markup::text("x")))
                .child(
                    Markup::el("div")
                        .attr("class", "conversation-title-container")
                        .child(Markup::el("span").child(Markup::text("Trip plans"))),
                ),
            "",
        );
        assert_eq!(conversation_title_at(&d, now()), "Trip plans");
    }

    #[test]
    fn document_title_is_stripped() {
        let body = Markup::el("body");
        assert_eq!(
            conversation_title_at(&doc(body.clone(), "Rust lifetimes - Gemini"), now()),
            "Rust lifetimes"
        );
        assert_eq!(
            conversation_title_at(&doc(body.clone(), "Gemini | Rust lifetimes"), now()),
            "Rust lifetimes"
        );
        assert_eq!(
            conversation_title_at(&doc(body, "Gemini"), now()),
            "gemini-chat-2025-03-09-14:05"
        );
    }

    #[test]
    fn first_question_is_cut() {
        let question = "word ".repeat(20);
        let d = doc(
            Markup::el("body").child(Markup::el("user-query").child(Markup::text(question))),
            "",
        );
        let title = conversation_title_at(&d, now());
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 63);
    }

    #[test]
    fn falls_back_to_timestamp() {
        let d = doc(
            Markup::el("body").child(Markup::el("user-query").child(Markup::text(" hi "))),
            "",
        );
        assert_eq!(conversation_title_at(&d, now()), "gemini-chat-2025-03-09-14:05");
    }
}
