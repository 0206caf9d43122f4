//! Self-contained, printable HTML export.
//!
//! Message content is Markdown produced by the extractor. It is escaped first
//! and then a handful of constructs are turned back into tags. Fenced code is
//! cut out before any inline rule runs, so code bodies are escaped exactly
//! once and never pick up `<em>`, `<strong>` or `<br>`.

use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{count_authors, RenderContext};
use crate::message::Message;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("fence regex"));
static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("code regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex"));
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("italic regex"));
static HEADING_RES: Lazy<Vec<(usize, Regex)>> = Lazy::new(|| {
    (1..=6)
        .rev()
        .map(|level| {
            let re = Regex::new(&format!(r"(?m)^#{{{level}}}\s+(.+)$")).expect("heading regex");
            (level, re)
        })
        .collect()
});

/// Escape text for element content.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `*x*` to `<em>x</em>`, skipping runs that touch another `*` on either
/// side so unbalanced `**` markup is left alone.
fn italicize(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut start = 0;
    while let Some(m) = ITALIC_RE.find_at(text, start) {
        let star_before = m.start() > 0 && bytes[m.start() - 1] == b'*';
        let star_after = bytes.get(m.end()) == Some(&b'*');
        if star_before || star_after {
            start = m.start() + 1;
            continue;
        }
        out.push_str(&text[last..m.start()]);
        let _ = write!(out, "<em>{}</em>", &text[m.start() + 1..m.end() - 1]);
        last = m.end();
        start = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Inline rules for escaped text outside code blocks.
fn format_prose(escaped: &str) -> String {
    let mut text = INLINE_CODE_RE
        .replace_all(escaped, "<code>$1</code>")
        .into_owned();
    text = BOLD_RE.replace_all(&text, "<strong>$1</strong>").into_owned();
    text = italicize(&text);
    for (level, re) in HEADING_RES.iter() {
        text = re
            .replace_all(&text, format!("<h{level}>${{1}}</h{level}>").as_str())
            .into_owned();
    }
    text.replace('\n', "<br>\n")
}

/// Markdown message body to HTML fragment.
pub fn format_content(markdown: &str) -> String {
    let escaped = escape_html(markdown);
    let mut out = String::new();
    let mut last = 0;
    for caps in FENCE_RE.captures_iter(&escaped) {
        let (Some(whole), Some(lang), Some(code)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        out.push_str(&format_prose(&escaped[last..whole.start()]));
        let lang = if lang.as_str().is_empty() { "text" } else { lang.as_str() };
        let _ = write!(
            out,
            "<pre><code class=\"language-{lang}\">{}</code></pre>",
            code.as_str()
        );
        last = whole.end();
    }
    out.push_str(&format_prose(&escaped[last..]));
    out
}

pub fn render_html(messages: &[Message], ctx: &RenderContext) -> String {
    let (users, assistants) = count_authors(messages);
    let title = escape_html(&ctx.title);
    let label = escape_html(&ctx.assistant_label);
    let exported = ctx.exported_label();

    let mut body = String::new();
    for message in messages {
        let (class, who) = if message.author.is_user() {
            ("user", "👤 You".to_string())
        } else {
            ("assistant", format!("✨ {label}"))
        };
        let _ = write!(
            body,
            "\n      <div class=\"message {class}\">\n        <div class=\"author\">{who}</div>\n        <div class=\"content\">{}</div>\n      </div>",
            format_content(&message.content)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>{STYLE}</style>
</head>
<body>
  <div class="page">
    <div class="header">
      <h1>{title}</h1>
      <div class="meta">
        <span>📅 {exported}</span>
        <span>💬 {total} messages</span>
        <span>👤 {users} user</span>
        <span>✨ {assistants} {label}</span>
      </div>
    </div>
    {body}
    <div class="footer">
      Exported by chatexport &middot; {exported}
    </div>
  </div>
  <button class="print-banner no-print" onclick="window.print()">🖨️ Print / Save as PDF</button>
</body>
</html>"#,
        total = messages.len(),
    )
}

const STYLE: &str = r#"
    *, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
    html { font-size: 15px; }
    body {
      font-family: 'Segoe UI', -apple-system, BlinkMacSystemFont, 'Helvetica Neue', Arial, sans-serif;
      line-height: 1.7;
      color: #1a1a2e;
      background: #f0f2f5;
    }
    .page { max-width: 820px; margin: 0 auto; background: #fff; min-height: 100vh; padding: 48px 56px; }
    .header { text-align: center; padding-bottom: 28px; margin-bottom: 32px; border-bottom: 2px solid #e8eaed; }
    .header h1 { font-size: 1.65rem; font-weight: 700; margin-bottom: 8px; }
    .header .meta {
      font-size: 0.82rem;
      color: #5f6368;
      display: flex;
      justify-content: center;
      gap: 18px;
      flex-wrap: wrap;
    }
    .header .meta span { white-space: nowrap; }
    .message { margin-bottom: 20px; padding: 16px 20px; border-radius: 12px; page-break-inside: avoid; }
    .message.user { background: #e8f0fe; border-left: 4px solid #4285f4; }
    .message.assistant { background: #f8f9fa; border-left: 4px solid #34a853; }
    .author {
      font-size: 0.82rem;
      font-weight: 700;
      text-transform: uppercase;
      letter-spacing: 0.5px;
      margin-bottom: 8px;
    }
    .message.user .author { color: #1967d2; }
    .message.assistant .author { color: #188038; }
    .content { font-size: 0.95rem; line-height: 1.75; overflow-wrap: break-word; }
    .content h1, .content h2, .content h3,
    .content h4, .content h5, .content h6 { margin-top: 12px; margin-bottom: 6px; line-height: 1.3; }
    .content h1 { font-size: 1.35rem; }
    .content h2 { font-size: 1.2rem; }
    .content h3 { font-size: 1.1rem; }
    code {
      font-family: 'Cascadia Code', 'Fira Code', Consolas, monospace;
      font-size: 0.88em;
      background: #e8eaed;
      padding: 2px 6px;
      border-radius: 4px;
    }
    pre {
      background: #1e1e2e;
      color: #cdd6f4;
      padding: 16px 20px;
      border-radius: 8px;
      overflow-x: auto;
      margin: 12px 0;
      line-height: 1.5;
      white-space: pre;
    }
    pre code { background: none; padding: 0; color: inherit; font-size: 0.85rem; }
    .footer {
      margin-top: 40px;
      padding-top: 20px;
      border-top: 2px solid #e8eaed;
      text-align: center;
      font-size: 0.78rem;
      color: #9aa0a6;
    }
    .print-banner {
      position: fixed;
      bottom: 20px;
      right: 20px;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      color: #fff;
      padding: 12px 24px;
      border: none;
      border-radius: 10px;
      font-family: inherit;
      font-size: 14px;
      font-weight: 600;
      cursor: pointer;
      box-shadow: 0 4px 16px rgba(0,0,0,0.25);
    }
    @media print {
      html { font-size: 12px; }
      body { background: #fff; }
      .page { padding: 0; max-width: 100%; }
      .no-print { display: none !important; }
      .message { break-inside: avoid; }
      pre { white-space: pre-wrap; overflow-wrap: break-word; }
    }
  "#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Author, DedupKey, DedupStrategy};
    use chrono::{Local, TimeZone};

    #[test]
    fn code_blocks_are_escaped_once_and_left_alone() {
        let html = format_content("Use **this**:\n```rust\nif a < b && *p* {}\n```\ndone");
        assert_eq!(
            html,
            "Use <strong>this</strong>:<br>\n<pre><code class=\"language-rust\">if a &lt; b &amp;&amp; *p* {}\n</code></pre><br>\ndone"
        );
    }

    #[test]
    fn fence_without_language_is_text() {
        assert_eq!(
            format_content("```\nx\n```"),
            "<pre><code class=\"language-text\">x\n</code></pre>"
        );
    }

    #[test]
    fn inline_rules() {
        assert_eq!(
            format_content("## Plan\n*soft* and `a<b`"),
            "<h2>Plan</h2><br>\n<em>soft</em> and <code>a&lt;b</code>"
        );
    }

    #[test]
    fn unbalanced_stars_are_left_alone() {
        assert_eq!(format_content("use **a*b** here"), "use **a*b** here");
        assert_eq!(format_content("ends with *six**"), "ends with *six**");
        assert_eq!(format_content("*one* and **two*"), "<em>one</em> and **two*");
    }

    #[test]
    fn document_counts_and_escapes_title() {
        let messages: Vec<Message> = [(Author::User, "hello there"), (Author::Assistant, "hi, human")]
            .into_iter()
            .map(|(author, content)| Message {
                author,
                content: content.to_string(),
                dedup_key: DedupKey::new(content, DedupStrategy::PrefixLength),
                position: 0.0,
            })
            .collect();
        let ctx = RenderContext {
            title: "a <b> title".to_string(),
            exported_at: Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap(),
            assistant_label: "Gemini".to_string(),
        };
        let html = render_html(&messages, &ctx);
        assert!(html.contains("<title>a &lt;b&gt; title</title>"));
        assert!(html.contains("💬 2 messages"));
        assert!(html.contains("👤 1 user"));
        assert!(html.contains("✨ 1 Gemini"));
        assert!(html.contains("<div class=\"message assistant\">"));
        assert!(html.contains("✨ Gemini</div>"));
    }
}
