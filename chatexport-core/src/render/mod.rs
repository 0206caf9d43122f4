//! Output documents for a collected conversation.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::message::{Author, Message};

pub mod html;
pub mod markdown;

pub use html::render_html;
pub use markdown::{render_markdown, render_page_dump};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[serde(alias = "md")]
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => ".md",
            ExportFormat::Html => ".html",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown;charset=utf-8",
            ExportFormat::Html => "text/html",
        }
    }
}

/// Everything a renderer needs besides the messages.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub title: String,
    pub exported_at: DateTime<Local>,
    /// Heading for assistant turns, e.g. "Gemini".
    pub assistant_label: String,
}

impl RenderContext {
    pub fn new(title: impl Into<String>, assistant_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            exported_at: Local::now(),
            assistant_label: assistant_label.into(),
        }
    }

    /// Export timestamp the way a US-locale browser prints it,
    /// e.g. `3/9/2025, 2:05:07 PM`.
    pub fn exported_label(&self) -> String {
        self.exported_at.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
    }

    pub fn label_for(&self, author: Author) -> &str {
        match author {
            Author::User => "User",
            Author::Assistant => &self.assistant_label,
        }
    }
}

pub(crate) fn count_authors(messages: &[Message]) -> (usize, usize) {
    let users = messages.iter().filter(|m| m.author.is_user()).count();
    (users, messages.len() - users)
}
