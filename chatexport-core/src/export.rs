//! One export: page check, title, container, collection, rendering.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::collector::{CollectOutcome, Collector};
use crate::config::ExportConfig;
use crate::dom::Document;
use crate::error::{ExportError, Result};
use crate::filename::sanitize_filename;
use crate::host::{is_supported_url, Page};
use crate::locate::locate;
use crate::message::Message;
use crate::progress::{CancelToken, ProgressEvent, ProgressSink};
use crate::render::{
    count_authors, render_html, render_markdown, render_page_dump, ExportFormat, RenderContext,
};
use crate::selector::Matcher;
use crate::title::conversation_title;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub message_count: usize,
    pub user_count: usize,
    pub assistant_count: usize,
    pub filename: String,
    pub elapsed_secs: u64,
}

/// The rendered file, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime: &'static str,
    pub body: String,
}

impl ExportArtifact {
    /// Write into `dir`, creating it if needed. Returns the full path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.body)?;
        info!(path = %path.display(), bytes = self.body.len(), "export written");
        Ok(path)
    }
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub summary: ExportSummary,
    pub messages: Vec<Message>,
    pub artifact: ExportArtifact,
}

/// Runs exports one at a time.
pub struct Exporter {
    config: ExportConfig,
    active: AtomicBool,
}

/// Clears the active flag however the export ends.
struct SessionGuard<'a>(&'a AtomicBool);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    #[instrument(skip_all, fields(format = ?format))]
    pub async fn export(
        &self,
        page: &dyn Page,
        format: ExportFormat,
        cancel: CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<ExportResult> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(ExportError::SessionActive);
        }
        let _guard = SessionGuard(&self.active);
        let started = Instant::now();

        let url = page.url().await;
        if !is_supported_url(&url) {
            return Err(ExportError::unsupported_page(url));
        }

        progress.report(ProgressEvent::new("Starting export...", "Initializing", 0, 0));
        let document = page.document().await;
        let title = conversation_title(&document);
        let located = locate(&document);
        info!(%title, strategy = ?located.strategy, "export started");

        let host = page.scroll_host(located.target).await;
        let mut collector = Collector::new(self.config.scroll.clone());
        let messages = match collector.collect(host.as_ref(), &cancel, progress).await? {
            CollectOutcome::Completed(messages) => messages,
            CollectOutcome::Cancelled => return Err(ExportError::Cancelled),
        };

        let (user_count, assistant_count) = count_authors(&messages);
        info!(
            total = messages.len(),
            user_count, assistant_count, "messages collected"
        );

        let detail = match format {
            ExportFormat::Markdown => "Creating markdown",
            ExportFormat::Html => "Creating printable HTML",
        };
        progress.report(ProgressEvent::new(
            "Generating file...",
            detail,
            95,
            messages.len(),
        ));

        let ctx = RenderContext::new(title.as_str(), self.config.output.assistant_label.as_str());
        let body = match format {
            ExportFormat::Markdown if messages.is_empty() => {
                warn!("no messages found, exporting page text instead");
                let latest = page.document().await;
                render_page_dump(&page_text(&latest), &ctx)
            }
            ExportFormat::Markdown => render_markdown(&messages, &ctx),
            ExportFormat::Html => render_html(&messages, &ctx),
        };
        let filename = format!("{}{}", sanitize_filename(&title), format.extension());

        progress.report(ProgressEvent::new(
            "Complete!",
            "File ready",
            100,
            messages.len(),
        ));

        let summary = ExportSummary {
            message_count: messages.len(),
            user_count,
            assistant_count,
            filename: filename.clone(),
            elapsed_secs: started.elapsed().as_secs_f64().round() as u64,
        };
        Ok(ExportResult {
            summary,
            messages,
            artifact: ExportArtifact {
                filename,
                mime: format.mime(),
                body,
            },
        })
    }
}

/// Visible text of the main region, or of the whole page.
fn page_text(doc: &Document) -> String {
    let root = doc.root();
    let main = doc.query_first(root, &Matcher::attr_eq("role", "main"));
    doc.text_content(main.unwrap_or(root))
}
