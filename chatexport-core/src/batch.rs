//! Batch deletion of sidebar conversations.
//!
//! The application has no bulk delete, so each conversation is removed the
//! way a user would: hover the entry, open its overflow menu, pick Delete,
//! confirm the dialog. A failure on one entry is recorded and the batch moves
//! on to the next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{ms, BatchConfig};
use crate::dom::{Document, ElementHandle, NodeId};
use crate::error::{DeleteStepError, ExportError, Result};
use crate::host::{UiDriver, UiEvent};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::selector::{Matcher, Selector};

pub const MIN_TITLE_CHARS: usize = 2;
pub const MAX_TITLE_CHARS: usize = 200;

/// Titles are compared on this many chars when re-finding an entry.
const NAME_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidebarConversation {
    pub title: String,
    pub href: String,
    #[serde(skip)]
    pub handle: Option<ElementHandle>,
}

impl SidebarConversation {
    /// Single-line, shortened title used to recognise the entry again after
    /// the sidebar re-renders.
    pub fn name(&self) -> String {
        short_name(&self.title)
    }
}

fn short_name(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
        .trim()
        .chars()
        .take(NAME_CHARS)
        .collect()
}

fn title_len_ok(title: &str) -> bool {
    (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&title.chars().count())
}

/// Conversation links listed under the sidebar's "Chats" heading, or, when
/// the heading is missing, every sidebar link that is not app navigation.
pub fn find_sidebar_conversations(doc: &Document) -> Vec<SidebarConversation> {
    let root = doc.root();
    let sidebar_matcher = Matcher::Any(vec![
        Matcher::tag("nav"),
        Matcher::attr_eq("role", "navigation"),
        Matcher::tag("aside"),
        Matcher::class_contains("sidebar"),
    ]);
    let Some(sidebar) = doc.query_first(root, &sidebar_matcher) else {
        warn!("sidebar not found");
        return Vec::new();
    };

    let text_tags = Matcher::tags(&["h1", "h2", "h3", "h4", "h5", "h6", "p", "span", "div"]);
    let heading = doc
        .query_all(sidebar, &text_tags)
        .into_iter()
        .find(|id| doc.element_children(*id).next().is_none() && doc.text_content(*id).trim() == "Chats");

    let links = doc.query_all(sidebar, &Matcher::tag("a").and(Matcher::attr_present("href")));
    let conversations: Vec<_> = links
        .into_iter()
        .filter_map(|id| {
            let element = doc.element(id)?;
            let href = element.attr("href").unwrap_or("").to_string();
            let title = doc.text_content(id).trim().to_string();
            let keep = match heading {
                Some(heading) => {
                    doc.compare_order(heading, id).is_lt()
                        && title != "Settings & help"
                        && title != "Settings"
                        && !href.contains("settings")
                        && !href.contains("/faq")
                }
                None => {
                    !["New chat", "My stuff", "Gems"].iter().any(|t| title.contains(t))
                        && !["settings", "help", "faq"].iter().any(|t| href.contains(t))
                }
            };
            (keep && title_len_ok(&title)).then(|| SidebarConversation {
                title,
                href,
                handle: element.handle,
            })
        })
        .collect();

    debug!(
        count = conversations.len(),
        under_heading = heading.is_some(),
        "sidebar conversations"
    );
    conversations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterStatus {
    pub conversation_count: usize,
    pub already_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub deleted_count: usize,
    pub total_attempted: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
struct BatchState {
    active: bool,
    conversations: Vec<SidebarConversation>,
    selected: Vec<bool>,
}

impl BatchState {
    fn selected_count(&self) -> usize {
        self.selected.iter().filter(|s| **s).count()
    }
}

/// One batch-delete mode session over the sidebar.
pub struct BatchDeleter {
    config: BatchConfig,
    state: Mutex<BatchState>,
    deleting: AtomicBool,
}

impl BatchDeleter {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BatchState::default()),
            deleting: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BatchState> {
        // The state stays consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting.load(Ordering::SeqCst)
    }

    pub fn enter(&self, doc: &Document) -> Result<EnterStatus> {
        let mut state = self.state();
        if state.active {
            return Ok(EnterStatus {
                conversation_count: state.conversations.len(),
                already_active: true,
            });
        }

        let conversations = find_sidebar_conversations(doc);
        if conversations.is_empty() {
            return Err(ExportError::batch(
                "No conversations found in sidebar. Make sure the sidebar is open.",
            ));
        }

        info!(count = conversations.len(), "batch delete mode on");
        state.selected = vec![false; conversations.len()];
        state.conversations = conversations;
        state.active = true;
        Ok(EnterStatus {
            conversation_count: state.conversations.len(),
            already_active: false,
        })
    }

    pub fn exit(&self) {
        let mut state = self.state();
        if state.active {
            info!("batch delete mode off");
        }
        *state = BatchState::default();
        self.deleting.store(false, Ordering::SeqCst);
    }

    pub fn conversations(&self) -> Vec<SidebarConversation> {
        self.state().conversations.clone()
    }

    pub fn selected(&self) -> Vec<SidebarConversation> {
        let state = self.state();
        state
            .conversations
            .iter()
            .zip(&state.selected)
            .filter(|(_, selected)| **selected)
            .map(|(conversation, _)| conversation.clone())
            .collect()
    }

    fn require_active<'a>(
        &self,
        state: &'a mut BatchState,
    ) -> Result<&'a mut BatchState> {
        if !state.active {
            return Err(ExportError::batch("Batch delete mode is not active"));
        }
        Ok(state)
    }

    /// Returns the number selected afterwards.
    pub fn select_all(&self, selected: bool) -> Result<usize> {
        let mut guard = self.state();
        let state = self.require_active(&mut guard)?;
        state.selected.iter_mut().for_each(|s| *s = selected);
        Ok(state.selected_count())
    }

    /// Select the conversations whose title is one of `titles`. Returns the
    /// number selected afterwards.
    pub fn select<S: AsRef<str>>(&self, titles: &[S]) -> Result<usize> {
        let mut guard = self.state();
        let state = self.require_active(&mut guard)?;
        for (conversation, selected) in state.conversations.iter().zip(state.selected.iter_mut()) {
            if titles.iter().any(|t| t.as_ref().trim() == conversation.title) {
                *selected = true;
            }
        }
        Ok(state.selected_count())
    }

    /// Delete every selected conversation, then leave batch mode.
    #[instrument(skip_all)]
    pub async fn delete_selected(
        &self,
        driver: &dyn UiDriver,
        progress: &dyn ProgressSink,
    ) -> Result<DeleteReport> {
        if self.deleting.swap(true, Ordering::SeqCst) {
            return Err(ExportError::batch("Deletion already in progress"));
        }
        let targets = self.selected();
        if targets.is_empty() {
            self.deleting.store(false, Ordering::SeqCst);
            return Err(ExportError::batch("No conversations selected"));
        }

        let total = targets.len();
        let mut report = DeleteReport {
            total_attempted: total,
            ..DeleteReport::default()
        };

        for (i, target) in targets.iter().enumerate() {
            let name = target.name();
            progress.report(ProgressEvent::new(
                "Deleting conversations",
                format!("Deleting {}/{}: {}", i + 1, total, name),
                ((i + 1) * 100 / total) as u8,
                report.deleted_count,
            ));

            let doc = driver.document().await;
            let handle = match target.handle.filter(|h| doc.contains_handle(*h)) {
                Some(handle) => Some(handle),
                None => find_sidebar_conversations(&doc)
                    .into_iter()
                    .find(|c| c.name() == name)
                    .and_then(|c| c.handle),
            };
            let Some(handle) = handle else {
                debug!(%name, "entry gone, counting as deleted");
                report.deleted_count += 1;
                continue;
            };

            match self.delete_one(driver, handle).await {
                Ok(()) => {
                    report.deleted_count += 1;
                    info!(%name, "deleted ({}/{})", i + 1, total);
                    if i + 1 < total {
                        pause(self.config.between_ms).await;
                    }
                }
                Err(err) => {
                    warn!(%name, error = %err, "delete failed");
                    report.errors.push(format!("\"{name}\": {err}"));
                }
            }
        }

        if report.errors.is_empty() {
            info!(deleted = report.deleted_count, "batch delete complete");
        } else {
            warn!(
                failed = report.errors.len(),
                total, "batch delete finished with errors"
            );
        }
        self.exit();
        Ok(report)
    }

    async fn delete_one(
        &self,
        driver: &dyn UiDriver,
        link: ElementHandle,
    ) -> std::result::Result<(), DeleteStepError> {
        let cfg = &self.config;

        driver.dispatch(link, UiEvent::MouseEnter).await;
        driver.dispatch(link, UiEvent::MouseOver).await;
        pause(cfg.hover_ms).await;

        let doc = driver.document().await;
        let menu_button = doc
            .find_by_handle(link)
            .and_then(|id| find_menu_button(&doc, id))
            .ok_or(DeleteStepError::MenuButtonNotFound)?;
        driver.dispatch(menu_button, UiEvent::Click).await;
        pause(cfg.menu_ms).await;

        let doc = driver.document().await;
        let Some(delete_option) = find_delete_option(&doc) else {
            self.escape(driver, link).await;
            return Err(DeleteStepError::DeleteOptionNotFound);
        };
        driver.dispatch(delete_option, UiEvent::Click).await;
        pause(cfg.dialog_ms).await;

        let doc = driver.document().await;
        let Some(confirm) = find_confirm_button(&doc) else {
            self.escape(driver, link).await;
            return Err(DeleteStepError::ConfirmButtonNotFound);
        };
        driver.dispatch(confirm, UiEvent::Click).await;
        pause(cfg.delete_animation_ms).await;
        Ok(())
    }

    async fn escape(&self, driver: &dyn UiDriver, target: ElementHandle) {
        driver.dispatch(target, UiEvent::Escape).await;
        pause(self.config.escape_ms).await;
    }
}

async fn pause(millis: u64) {
    if millis > 0 {
        tokio::time::sleep(ms(millis)).await;
    } else {
        tokio::task::yield_now().await;
    }
}

fn handle_of(doc: &Document, id: NodeId) -> Option<ElementHandle> {
    doc.element(id).and_then(|e| e.handle)
}

fn lower_text(doc: &Document, id: NodeId) -> String {
    doc.text_content(id).trim().to_lowercase()
}

/// The overflow ("⋮") button that belongs to a sidebar link.
fn find_menu_button(doc: &Document, link: NodeId) -> Option<ElementHandle> {
    let button = Matcher::tag("button");
    let scope = doc
        .closest(link, &Matcher::tag("li"))
        .or_else(|| doc.parent(link));

    if let Some(scope) = scope {
        let labelled = Matcher::Any(vec![
            button.clone().and(Matcher::attr_contains("aria-label", "ore")),
            button.clone().and(Matcher::attr_contains("aria-label", "ption")),
            button.clone().and(Matcher::attr_contains("aria-label", "enu")),
            button.clone().and(Matcher::attr_contains("data-mat-icon-name", "more")),
            Matcher::class_contains("more"),
            Matcher::class_contains("option"),
        ]);
        if let Some(found) = doc.query_first(scope, &labelled) {
            return handle_of(doc, found);
        }

        let by_text = doc.query_all(scope, &button).into_iter().find(|id| {
            let text = lower_text(doc, *id);
            let aria = doc
                .element(*id)
                .and_then(|e| e.attr("aria-label"))
                .unwrap_or("")
                .to_lowercase();
            text.contains("more") || aria.contains("more") || text == "⋮" || text == "..."
        });
        if let Some(found) = by_text {
            return handle_of(doc, found);
        }
    }

    let sibling = doc.next_element_sibling(link)?;
    if doc.matches(sibling, &button) {
        handle_of(doc, sibling)
    } else {
        doc.query_first(sibling, &button)
            .and_then(|id| handle_of(doc, id))
    }
}

fn find_delete_option(doc: &Document) -> Option<ElementHandle> {
    let button = || Matcher::tag("button");
    let menus = [
        Selector::within(Matcher::attr_eq("role", "menu"), Matcher::attr_eq("role", "menuitem")),
        Selector::within(Matcher::attr_eq("role", "listbox"), Matcher::attr_eq("role", "option")),
        Selector::within(Matcher::tag("mat-menu-content"), button()),
        Selector::within(Matcher::has_class("mat-menu-content"), button()),
        Selector::within(Matcher::has_class("mat-mdc-menu-content"), button()),
        Selector::within(Matcher::class_contains("menu"), button()),
        Selector::within(Matcher::class_contains("dropdown"), button()),
        Selector::within(Matcher::class_contains("menu"), Matcher::class_contains("item")),
    ];
    let in_menu = menus.iter().find_map(|selector| {
        selector.select_all(doc).into_iter().find(|id| {
            let text = lower_text(doc, *id);
            text.contains("delete") || text.contains("删除")
        })
    });
    if let Some(found) = in_menu {
        return handle_of(doc, found);
    }

    let overlay = doc.query_first(
        doc.root(),
        &Matcher::Any(vec![
            Matcher::has_class("cdk-overlay-container"),
            Matcher::class_contains("overlay-pane"),
        ]),
    )?;
    let candidates = Matcher::Any(vec![
        button(),
        Matcher::attr_eq("role", "menuitem"),
        Matcher::attr_eq("role", "option"),
        Matcher::class_contains("item"),
    ]);
    doc.query_all(overlay, &candidates)
        .into_iter()
        .find(|id| {
            let text = doc.text_content(*id);
            let text = text.trim();
            text == "Delete" || text == "删除"
        })
        .and_then(|id| handle_of(doc, id))
}

fn find_confirm_button(doc: &Document) -> Option<ElementHandle> {
    let button = || Matcher::tag("button");
    let selectors = [
        Selector::new(button().and(Matcher::attr_contains("aria-label", "elete"))),
        Selector::new(button().and(Matcher::attr_contains("aria-label", "onfirm"))),
        Selector::within(Matcher::attr_eq("role", "dialog"), button()),
        Selector::within(Matcher::class_contains("dialog"), button()),
        Selector::within(Matcher::class_contains("modal"), button()),
        Selector::within(Matcher::tag("mat-dialog-actions"), button()),
        Selector::within(Matcher::has_class("mat-dialog-actions"), button()),
        Selector::within(Matcher::has_class("mat-mdc-dialog-actions"), button()),
        Selector::within(Matcher::has_class("cdk-overlay-container"), button()),
    ];
    let overlay = Matcher::Any(vec![
        Matcher::attr_eq("role", "dialog"),
        Matcher::class_contains("dialog"),
        Matcher::class_contains("modal"),
        Matcher::has_class("cdk-overlay-container"),
        Matcher::class_contains("overlay"),
    ]);

    selectors
        .iter()
        .find_map(|selector| {
            selector.select_all(doc).into_iter().find(|id| {
                let text = lower_text(doc, *id);
                let confirms = ["delete", "删除", "confirm", "确认"]
                    .iter()
                    .any(|word| text.contains(word));
                confirms && doc.closest(*id, &overlay).is_some()
            })
        })
        .and_then(|id| handle_of(doc, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Element, Markup};

    fn link(title: &str, href: &str) -> Markup {
        Markup::el("a").attr("href", href).child(Markup::text(title))
    }

    fn sidebar(children: Vec<Markup>) -> Document {
        Document::from_markup(&Markup::el("body").child(Markup::el("nav").children(children)))
    }

    #[test]
    fn only_links_after_chats_heading() {
        let doc = sidebar(vec![
            link("New chat", "/app"),
            link("Pinned thing", "/app/p1"),
            Markup::el("h2").child(Markup::text(" Chats ")),
            link("Trip to Kyoto", "/app/a1"),
            link("Help me with taxes", "/app/a2"),
            link("x", "/app/a3"),
            link("Settings & help", "/app/s"),
            link("FAQ page", "/faq"),
        ]);
        let titles: Vec<_> = find_sidebar_conversations(&doc)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Trip to Kyoto", "Help me with taxes"]);
    }

    #[test]
    fn fallback_without_heading_excludes_navigation() {
        let doc = sidebar(vec![
            link("New chat", "/app"),
            link("Gems", "/gems"),
            link("Trip to Kyoto", "/app/a1"),
            link("Help me with taxes", "/help/a2"),
        ]);
        let titles: Vec<_> = find_sidebar_conversations(&doc)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Trip to Kyoto"]);
    }

    #[test]
    fn heading_must_be_a_leaf() {
        let doc = sidebar(vec![
            Markup::el("div").child(Markup::el("span").child(Markup::text("Chats"))),
            link("Trip to Kyoto", "/app/a1"),
        ]);
        assert_eq!(find_sidebar_conversations(&doc).len(), 1);
    }

    #[test]
    fn menu_button_by_label_then_sibling() {
        let mut doc = Document::new(Element::new("nav"));
        let root = doc.root();
        let li = doc.append(root, Element::new("li"));
        let a = doc.append(li, Element::new("a").with_attr("href", "/app/1"));
        doc.append(
            li,
            Element::new("button")
                .with_attr("aria-label", "More options")
                .with_handle(ElementHandle(9)),
        );
        assert_eq!(find_menu_button(&doc, a), Some(ElementHandle(9)));

        let mut doc = Document::new(Element::new("nav"));
        let root = doc.root();
        let a = doc.append(root, Element::new("a"));
        let wrapper = doc.append(root, Element::new("span"));
        doc.append(wrapper, Element::new("button").with_handle(ElementHandle(4)));
        assert_eq!(find_menu_button(&doc, a), Some(ElementHandle(4)));
    }

    #[test]
    fn selection_requires_active_mode() {
        let deleter = BatchDeleter::new(BatchConfig::default());
        assert!(deleter.select_all(true).is_err());

        let doc = sidebar(vec![
            Markup::el("h2").child(Markup::text("Chats")),
            link("First chat", "/app/1"),
            link("Second chat", "/app/2"),
        ]);
        let status = deleter.enter(&doc).unwrap();
        assert_eq!(status.conversation_count, 2);
        assert!(deleter.enter(&doc).unwrap().already_active);

        assert_eq!(deleter.select(&["Second chat"]).unwrap(), 1);
        assert_eq!(deleter.select_all(true).unwrap(), 2);
        assert_eq!(deleter.select_all(false).unwrap(), 0);

        deleter.exit();
        assert!(!deleter.is_active());
    }

    #[test]
    fn enter_fails_on_empty_sidebar() {
        let deleter = BatchDeleter::new(BatchConfig::default());
        let doc = sidebar(vec![]);
        let err = deleter.enter(&doc).unwrap_err();
        assert!(err.to_string().contains("No conversations found"));
    }
}
