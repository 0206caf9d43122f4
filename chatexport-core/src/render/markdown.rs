use std::fmt::Write;

use super::RenderContext;
use crate::message::Message;

pub fn render_markdown(messages: &[Message], ctx: &RenderContext) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "# {}\n\nExported: {}\n\nTotal messages: {}\n\n---\n\n",
        ctx.title,
        ctx.exported_label(),
        messages.len()
    );
    for message in messages {
        let _ = write!(
            out,
            "## {}\n\n{}\n\n---\n\n",
            ctx.label_for(message.author),
            message.content
        );
    }
    out
}

/// Used when no turns could be collected: the page's visible text under a
/// generic heading, so the export is never empty.
pub fn render_page_dump(page_text: &str, ctx: &RenderContext) -> String {
    format!(
        "# Gemini Chat History\n\nExported: {}\n\n---\n\n## Gemini Chat\n\n{}\n\n---\n\n",
        ctx.exported_label(),
        page_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Author, DedupKey, DedupStrategy};
    use chrono::{Local, TimeZone};

    fn ctx() -> RenderContext {
        RenderContext {
            title: "Borrowing".to_string(),
            exported_at: Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap(),
            assistant_label: "Gemini".to_string(),
        }
    }

    fn message(author: Author, content: &str) -> Message {
        Message {
            author,
            content: content.to_string(),
            dedup_key: DedupKey::new(content, DedupStrategy::PrefixLength),
            position: 0.0,
        }
    }

    #[test]
    fn renders_header_and_turns() {
        let messages = vec![
            message(Author::User, "Why does this move?"),
            message(Author::Assistant, "Because **ownership**.\n\n```rust\nlet b = a;\n```"),
        ];
        let md = render_markdown(&messages, &ctx());
        assert!(md.starts_with(
            "# Borrowing\n\nExported: 3/9/2025, 2:05:07 PM\n\nTotal messages: 2\n\n---\n\n"
        ));
        assert!(md.contains("## User\n\nWhy does this move?\n\n---\n\n"));
        assert!(md.ends_with("## Gemini\n\nBecause **ownership**.\n\n```rust\nlet b = a;\n```\n\n---\n\n"));
    }

    #[test]
    fn page_dump_has_generic_heading() {
        let md = render_page_dump("raw page text", &ctx());
        assert!(md.starts_with("# Gemini Chat History\n\n"));
        assert!(md.contains("## Gemini Chat\n\nraw page text\n\n---"));
    }
}
