//! Two-phase scroll collector for virtualized chat lists.
//!
//! The list only materializes the turns near the viewport and recycles nodes
//! as it scrolls, so a single snapshot never holds the whole conversation and
//! node identity means nothing across snapshots.
//!
//! Phase 1 walks from the bottom to the top so the application fetches all
//! older history. Phase 2 walks back down in overlapping windows, extracting
//! every turn it sees. Each message is keyed by its content and stamped with
//! its absolute offset (viewport top + scroll top) at first sight; the final
//! order comes from sorting on that offset, never from observation order.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::classify::{AuthorClassifier, ASSISTANT_TAG, USER_TAG};
use crate::config::{ms, ScrollConfig};
use crate::dom::{Document, NodeId};
use crate::error::{ExportError, Result};
use crate::extract::MessageExtractor;
use crate::host::ScrollHost;
use crate::message::{meets_min_length, DedupKey, Message, MessageLog};
use crate::progress::{band_percent, CancelToken, ProgressEvent, ProgressSink};
use crate::selector::Matcher;

const LOAD_PHASE: &str = "Phase 1/2: Loading content";
const COLLECT_PHASE: &str = "Phase 2/2: Collecting messages";

/// Report progress every this many steps.
const PROGRESS_EVERY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Collecting,
    Completed,
    Cancelled,
}

impl SessionState {
    fn can_enter(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Collecting)
                | (Collecting, Completed)
                | (Loading, Cancelled)
                | (Collecting, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Collecting => "collecting",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Cancellation is an outcome, distinct from an empty conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectOutcome {
    Completed(Vec<Message>),
    Cancelled,
}

/// Collects one conversation. Single use: a finished collector refuses to
/// run again.
pub struct Collector {
    config: ScrollConfig,
    extractor: MessageExtractor,
    classifier: AuthorClassifier,
    state: SessionState,
}

impl Collector {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            extractor: MessageExtractor::new(),
            classifier: AuthorClassifier::new(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_enter(next) {
            return Err(ExportError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "collector transition");
        self.state = next;
        Ok(())
    }

    fn cancelled(&mut self, phase: &str) -> Result<CollectOutcome> {
        info!(phase, "collection cancelled");
        self.enter(SessionState::Cancelled)?;
        Ok(CollectOutcome::Cancelled)
    }

    #[instrument(skip_all)]
    pub async fn collect(
        &mut self,
        host: &dyn ScrollHost,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<CollectOutcome> {
        self.enter(SessionState::Loading)?;
        let viewport = self.load_history(host, cancel, progress).await;
        if cancel.is_cancelled() {
            return self.cancelled("load");
        }

        self.enter(SessionState::Collecting)?;
        let Some(log) = self.collect_in_order(host, viewport, cancel, progress).await else {
            return self.cancelled("collect");
        };

        self.enter(SessionState::Completed)?;
        info!(messages = log.len(), "collection complete");
        Ok(CollectOutcome::Completed(log.into_sorted()))
    }

    /// Phase 1. Returns the viewport height used for stepping. Stops early,
    /// without error, when cancelled.
    async fn load_history(
        &self,
        host: &dyn ScrollHost,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> f64 {
        let cfg = &self.config;
        progress.report(ProgressEvent::new(LOAD_PHASE, "Scrolling to bottom...", 5, 0));

        let metrics = host.metrics().await;
        let viewport = if metrics.client_height > 0.0 {
            metrics.client_height
        } else {
            cfg.fallback_viewport
        };
        let step = viewport * cfg.load_step_factor;
        let mut total = metrics.scroll_height;
        info!(total, viewport, step, "loading history");

        host.scroll_to(metrics.scroll_height).await;
        pause(cfg.settle_ms).await;
        self.wait_for_loading(host, ms(cfg.initial_loading_wait_ms)).await;

        let mut pos = host.metrics().await.scroll_top;
        let mut steps = 0;
        while pos > 0.0 && steps < cfg.max_steps {
            if cancel.is_cancelled() {
                return viewport;
            }
            host.scroll_to((pos - step).max(0.0)).await;
            pause(cfg.load_step_ms).await;
            steps += 1;

            // The host may clamp or anchor; trust what it reports.
            let now = host.metrics().await;
            pos = now.scroll_top;
            total = total.max(now.scroll_height);

            if steps % PROGRESS_EVERY == 0 {
                let percent = band_percent(5, 40.0, total - pos, total);
                progress.report(ProgressEvent::new(
                    LOAD_PHASE,
                    format!("Fast-scanning history (Step {steps})"),
                    percent,
                    0,
                ));
            }
        }
        if pos > 0.0 && !cancel.is_cancelled() {
            warn!(steps, pos, "history loading stopped at step bound");
        }
        if cancel.is_cancelled() {
            return viewport;
        }

        self.wait_for_loading(host, ms(cfg.loading_wait_ms)).await;
        progress.report(ProgressEvent::new(
            "Phase 1/2: Complete",
            "All content loaded",
            45,
            0,
        ));
        viewport
    }

    /// Phase 2. `None` when cancelled.
    async fn collect_in_order(
        &self,
        host: &dyn ScrollHost,
        viewport: f64,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Option<MessageLog> {
        let cfg = &self.config;
        progress.report(ProgressEvent::new(COLLECT_PHASE, "Starting from top...", 50, 0));

        host.scroll_to(0.0).await;
        pause(cfg.settle_ms).await;

        let mut log = MessageLog::new();
        let step = viewport * cfg.collect_step_factor;
        let mut total = host.metrics().await.scroll_height;
        let mut pos = 0.0;
        let mut steps = 0;

        while pos <= total && steps < cfg.max_steps {
            if cancel.is_cancelled() {
                return None;
            }
            host.scroll_to(pos).await;
            pause(cfg.collect_step_ms).await;

            let fresh = self.collect_visible(host, &mut log).await;
            total = total.max(host.metrics().await.scroll_height);
            if fresh > 0 {
                debug!(pos, fresh, total = log.len(), "collected new messages");
            }

            if steps % PROGRESS_EVERY == 0 {
                progress.report(ProgressEvent::new(
                    COLLECT_PHASE,
                    "Scanning...",
                    band_percent(50, 40.0, pos, total),
                    log.len(),
                ));
            }
            pos += step;
            steps += 1;
        }
        if cancel.is_cancelled() {
            return None;
        }
        if pos <= total {
            warn!(steps, pos, total, "collection stopped at step bound");
        }

        let bottom = host.metrics().await.scroll_height;
        host.scroll_to(bottom).await;
        pause(cfg.final_settle_ms).await;
        self.collect_visible(host, &mut log).await;

        progress.report(ProgressEvent::new(
            "Phase 2/2: Complete",
            "Sorting messages...",
            90,
            log.len(),
        ));
        Some(log)
    }

    /// Extract every materialized turn not seen before. Returns how many
    /// were new.
    async fn collect_visible(&self, host: &dyn ScrollHost, log: &mut MessageLog) -> usize {
        let snapshot = host.snapshot().await;
        let scroll_top = host.metrics().await.scroll_top;
        let doc = &snapshot.document;

        let users = doc.query_all(snapshot.scope, &Matcher::tag(USER_TAG));
        let assistants = doc.query_all(snapshot.scope, &Matcher::tag(ASSISTANT_TAG));

        let mut fresh = 0;
        for node in merge_in_document_order(doc, users, assistants) {
            let content = self.extractor.extract(doc, node);
            let content = content.trim();
            if !meets_min_length(content, self.config.min_content_chars) {
                continue;
            }

            let dedup_key = DedupKey::new(content, self.config.dedup);
            if log.has_seen(&dedup_key) {
                continue;
            }

            let (author, rule) = self.classifier.explain(doc, node);
            let top = doc
                .element(node)
                .and_then(|e| e.layout)
                .map(|l| l.top)
                .unwrap_or(0.0);
            trace!(author = author.as_str(), rule, position = top + scroll_top, "new message");

            log.insert(Message {
                author,
                content: content.to_string(),
                dedup_key,
                position: top + scroll_top,
            });
            fresh += 1;
        }
        fresh
    }

    /// Poll until no visible loading indicator remains or `max_wait` passes.
    async fn wait_for_loading(&self, host: &dyn ScrollHost, max_wait: Duration) {
        let started = Instant::now();
        loop {
            let snapshot = host.snapshot().await;
            if !has_visible_spinner(&snapshot.document) {
                return;
            }
            if started.elapsed() >= max_wait {
                debug!(?max_wait, "gave up waiting for loading indicator");
                return;
            }
            pause(self.config.loading_poll_ms).await;
        }
    }
}

/// Every step suspends, even with a zero delay, so other tasks (and the
/// cancel token's owner) get to run on a single-threaded runtime.
async fn pause(millis: u64) {
    if millis > 0 {
        tokio::time::sleep(ms(millis)).await;
    } else {
        tokio::task::yield_now().await;
    }
}

/// Merge two lists that are each in document order.
fn merge_in_document_order(doc: &Document, a: Vec<NodeId>, b: Vec<NodeId>) -> Vec<NodeId> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut a, mut b) = (a.into_iter().peekable(), b.into_iter().peekable());
    loop {
        let next = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => {
                if doc.compare_order(*x, *y).is_le() {
                    a.next()
                } else {
                    b.next()
                }
            }
            (Some(_), None) => a.next(),
            (None, Some(_)) => b.next(),
            (None, None) => break,
        };
        merged.extend(next);
    }
    merged
}

/// Loading indicators inside any `infinite-scroller`, ignoring hidden ones.
pub fn has_visible_spinner(doc: &Document) -> bool {
    let spinner = Matcher::Any(vec![
        Matcher::attr_eq("role", "progressbar"),
        Matcher::has_class("loading"),
        Matcher::has_class("spinner"),
    ]);
    doc.query_all(doc.root(), &Matcher::tag("infinite-scroller"))
        .into_iter()
        .flat_map(|scroller| doc.query_all(scroller, &spinner))
        .any(|id| {
            !doc.element(id)
                .and_then(|e| e.layout)
                .is_some_and(|l| l.hidden)
        })
}
