//! A virtualized chat page driven from a JSON fixture.
//!
//! [`VirtualPage`] behaves like the live application as far as the export
//! engine can tell:
//! - only turns near the viewport are materialized, and every snapshot gives
//!   them fresh element handles
//! - older history is fetched when the list reaches the top, with the scroll
//!   offset anchored so the visible turns stay put
//! - a progressbar is shown for a few snapshots after each fetch
//! - sidebar entries have an overflow menu and a confirm dialog that react
//!   to dispatched UI events
//!
//! The CLI runs exports against saved fixtures; tests use it as the page.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dom::{Document, Element, ElementHandle, Layout, Markup, NodeId};
use crate::error::{ExportError, Result};
use crate::host::{HostSnapshot, Page, ScrollHost, ScrollMetrics, ScrollTarget, UiDriver, UiEvent};
use crate::message::Author;

const ROOT_HANDLE: ElementHandle = ElementHandle(1);
const SCROLLER_HANDLE: ElementHandle = ElementHandle(2);
const MENU_DELETE_HANDLE: ElementHandle = ElementHandle(3);
const MENU_RENAME_HANDLE: ElementHandle = ElementHandle(4);
const DIALOG_CONFIRM_HANDLE: ElementHandle = ElementHandle(5);
const DIALOG_CANCEL_HANDLE: ElementHandle = ElementHandle(6);
const SIDEBAR_HANDLE_BASE: u64 = 100;
const TURN_HANDLE_BASE: u64 = 1_000_000;

fn default_viewport() -> f64 {
    600.0
}

fn default_overscan() -> f64 {
    200.0
}

fn default_turn_height() -> f64 {
    120.0
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFixture {
    pub url: String,
    /// `document.title`
    #[serde(default)]
    pub title: String,
    /// Text of the conversation header, when the page shows one.
    #[serde(default)]
    pub conversation_title: Option<String>,
    #[serde(default = "default_viewport")]
    pub viewport_height: f64,
    /// Extra distance above and below the viewport that stays rendered.
    #[serde(default = "default_overscan")]
    pub overscan: f64,
    #[serde(default)]
    pub turns: Vec<TurnFixture>,
    #[serde(default)]
    pub history: Option<LazyHistory>,
    #[serde(default)]
    pub sidebar: Vec<SidebarEntry>,
    /// Snapshots that show a loading indicator after each history fetch
    /// (and at startup).
    #[serde(default)]
    pub loading_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFixture {
    pub author: Author,
    #[serde(default = "default_turn_height")]
    pub height: f64,
    /// Shorthand for a single paragraph body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<Markup>,
}

impl TurnFixture {
    pub fn new(author: Author, text: impl Into<String>) -> Self {
        Self {
            author,
            height: default_turn_height(),
            text: Some(text.into()),
            body: Vec::new(),
        }
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    fn markup(&self) -> Vec<Markup> {
        let mut body = Vec::new();
        if let Some(text) = &self.text {
            body.push(Markup::el("p").child(Markup::text(text.as_str())));
        }
        body.extend(self.body.iter().cloned());
        body
    }
}

/// Only the newest `initially_loaded` turns exist at first; each time the
/// list hits the top, `batch` older ones are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LazyHistory {
    pub initially_loaded: usize,
    pub batch: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarEntry {
    pub title: String,
    pub href: String,
    /// Whether hovering reveals an overflow menu button.
    #[serde(default = "yes")]
    pub has_menu: bool,
    /// Whether the overflow menu offers Delete.
    #[serde(default = "yes")]
    pub deletable: bool,
}

impl SidebarEntry {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            has_menu: true,
            deletable: true,
        }
    }
}

impl PageFixture {
    pub fn new(url: impl Into<String>, turns: Vec<TurnFixture>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            conversation_title: None,
            viewport_height: default_viewport(),
            overscan: default_overscan(),
            turns,
            history: None,
            sidebar: Vec::new(),
            loading_ticks: 0,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixture: Self = serde_json::from_str(&content)
            .map_err(|e| ExportError::json(path.display().to_string(), e))?;
        fixture
            .validate()
            .map_err(|reason| ExportError::invalid_fixture(path, reason))?;
        Ok(fixture)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("url is empty".to_string());
        }
        if self.viewport_height <= 0.0 {
            return Err("viewport_height must be positive".to_string());
        }
        if let Some(i) = self.turns.iter().position(|t| t.height <= 0.0) {
            return Err(format!("turn {i} has a non-positive height"));
        }
        if let Some(history) = self.history {
            if history.batch == 0 {
                return Err("history.batch must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Overlay {
    Closed,
    Menu { item: usize },
    Dialog { item: usize },
}

#[derive(Debug)]
struct SidebarItem {
    entry: SidebarEntry,
    link: ElementHandle,
    menu_button: ElementHandle,
    deleted: bool,
}

#[derive(Debug)]
struct State {
    fixture: PageFixture,
    /// Index of the oldest turn fetched so far.
    loaded_from: usize,
    scroll_top: f64,
    loading_ticks: u32,
    next_turn_handle: u64,
    sidebar: Vec<SidebarItem>,
    overlay: Overlay,
    hovered: Option<usize>,
    scroll_requests: Vec<f64>,
}

impl State {
    fn loaded(&self) -> &[TurnFixture] {
        &self.fixture.turns[self.loaded_from..]
    }

    fn content_height(&self) -> f64 {
        self.loaded().iter().map(|t| t.height).sum()
    }

    fn scroll_height(&self) -> f64 {
        self.content_height().max(self.fixture.viewport_height)
    }

    fn max_scroll(&self) -> f64 {
        self.scroll_height() - self.fixture.viewport_height
    }

    fn scroll_to(&mut self, top: f64) {
        self.scroll_requests.push(top);
        self.scroll_top = top.clamp(0.0, self.max_scroll());
        if self.scroll_top <= 0.0 {
            self.fetch_older();
        }
    }

    fn fetch_older(&mut self) {
        let Some(history) = self.fixture.history else {
            return;
        };
        if self.loaded_from == 0 {
            return;
        }
        let from = self.loaded_from.saturating_sub(history.batch);
        let added: f64 = self.fixture.turns[from..self.loaded_from]
            .iter()
            .map(|t| t.height)
            .sum();
        debug!(from, added, "fetched older history");
        self.loaded_from = from;
        // Anchor: the turns that were on screen stay on screen.
        self.scroll_top += added;
        self.loading_ticks = self.loading_ticks.max(self.fixture.loading_ticks);
    }

    fn item_by(&self, pick: impl Fn(&SidebarItem) -> bool) -> Option<usize> {
        self.sidebar.iter().position(|item| !item.deleted && pick(item))
    }

    fn dispatch(&mut self, target: ElementHandle, event: UiEvent) {
        trace!(?target, ?event, "ui event");
        match event {
            UiEvent::MouseEnter | UiEvent::MouseOver => {
                self.hovered = self.item_by(|item| item.link == target);
            }
            UiEvent::Escape => self.overlay = Overlay::Closed,
            UiEvent::Click => self.click(target),
        }
    }

    fn click(&mut self, target: ElementHandle) {
        match self.overlay {
            Overlay::Menu { item } if target == MENU_DELETE_HANDLE => {
                self.overlay = Overlay::Dialog { item };
            }
            Overlay::Menu { .. } if target == MENU_RENAME_HANDLE => {
                self.overlay = Overlay::Closed;
            }
            Overlay::Dialog { item } if target == DIALOG_CONFIRM_HANDLE => {
                debug!(title = %self.sidebar[item].entry.title, "conversation deleted");
                self.sidebar[item].deleted = true;
                self.overlay = Overlay::Closed;
            }
            Overlay::Dialog { .. } if target == DIALOG_CANCEL_HANDLE => {
                self.overlay = Overlay::Closed;
            }
            _ => {
                if let Some(item) =
                    self.item_by(|item| item.entry.has_menu && item.menu_button == target)
                {
                    self.overlay = Overlay::Menu { item };
                }
            }
        }
    }

    fn render(&mut self) -> Document {
        let viewport = self.fixture.viewport_height;
        let mut doc = Document::new(Element::new("html").with_handle(ROOT_HANDLE).with_layout(
            Layout {
                scroll_height: viewport,
                client_height: viewport,
                ..Layout::default()
            },
        ));
        doc.title = self.fixture.title.clone();
        let root = doc.root();
        let body = doc.append(root, Element::new("body"));

        if !self.sidebar.is_empty() {
            self.render_sidebar(&mut doc, body);
        }

        let main = doc.append(body, Element::new("main").with_attr("role", "main"));
        if let Some(title) = &self.fixture.conversation_title {
            let header = doc.append(
                main,
                Element::new("div").with_attr("class", "conversation-title-container"),
            );
            let span = doc.append(
                header,
                Element::new("span").with_attr("class", "conversation-title gds-title-m"),
            );
            doc.append_text(span, title.as_str());
        }

        let scroller = doc.append(
            main,
            Element::new("infinite-scroller")
                .with_attr("class", "chat-history")
                .with_handle(SCROLLER_HANDLE)
                .with_layout(Layout {
                    scroll_height: self.scroll_height(),
                    client_height: viewport,
                    ..Layout::default()
                }),
        );
        if self.loading_ticks > 0 {
            self.loading_ticks -= 1;
            doc.append(
                scroller,
                Element::new("div")
                    .with_attr("role", "progressbar")
                    .with_attr("class", "loading"),
            );
        }
        self.render_turns(&mut doc, scroller);
        self.render_overlay(&mut doc, body);
        doc
    }

    fn render_turns(&mut self, doc: &mut Document, scroller: NodeId) {
        let top = self.scroll_top;
        let low = top - self.fixture.overscan;
        let high = top + self.fixture.viewport_height + self.fixture.overscan;

        let mut offset = 0.0;
        let mut rendered = Vec::new();
        for turn in self.loaded() {
            if offset + turn.height > low && offset < high {
                rendered.push((offset, turn.clone()));
            }
            offset += turn.height;
        }

        for (offset, turn) in rendered {
            self.next_turn_handle += 1;
            let container = doc.append(
                scroller,
                Element::new("div")
                    .with_attr("class", "conversation-container")
                    .with_handle(ElementHandle(self.next_turn_handle)),
            );
            let tag = match turn.author {
                Author::User => "user-query",
                Author::Assistant => "model-response",
            };
            self.next_turn_handle += 1;
            let node = doc.append(
                container,
                Element::new(tag)
                    .with_handle(ElementHandle(self.next_turn_handle))
                    .with_layout(Layout {
                        top: offset - top,
                        height: turn.height,
                        ..Layout::default()
                    }),
            );
            for markup in turn.markup() {
                doc.append_markup(node, &markup);
            }
        }
    }

    fn render_sidebar(&self, doc: &mut Document, body: NodeId) {
        let nav = doc.append(body, Element::new("nav").with_attr("class", "sidebar"));
        let new_chat = doc.append(nav, Element::new("a").with_attr("href", "/app"));
        doc.append_text(new_chat, "New chat");
        let heading = doc.append(nav, Element::new("h2"));
        doc.append_text(heading, "Chats");

        let list = doc.append(nav, Element::new("ul"));
        for (i, item) in self.sidebar.iter().enumerate().filter(|(_, item)| !item.deleted) {
            let class = if self.hovered == Some(i) { "conversation hovered" } else { "conversation" };
            let li = doc.append(list, Element::new("li").with_attr("class", class));
            let link = doc.append(
                li,
                Element::new("a")
                    .with_attr("href", item.entry.href.as_str())
                    .with_handle(item.link),
            );
            doc.append_text(link, item.entry.title.as_str());
            if item.entry.has_menu {
                let button = doc.append(
                    li,
                    Element::new("button")
                        .with_attr("aria-label", "More options")
                        .with_handle(item.menu_button),
                );
                doc.append_text(button, "⋮");
            }
        }
    }

    fn render_overlay(&self, doc: &mut Document, body: NodeId) {
        let overlay = doc.append(body, Element::new("div").with_attr("class", "cdk-overlay-container"));
        match self.overlay {
            Overlay::Closed => {}
            Overlay::Menu { item } => {
                let menu = doc.append(overlay, Element::new("div").with_attr("role", "menu"));
                let rename = doc.append(
                    menu,
                    Element::new("button")
                        .with_attr("role", "menuitem")
                        .with_handle(MENU_RENAME_HANDLE),
                );
                doc.append_text(rename, "Rename");
                if self.sidebar[item].entry.deletable {
                    let delete = doc.append(
                        menu,
                        Element::new("button")
                            .with_attr("role", "menuitem")
                            .with_handle(MENU_DELETE_HANDLE),
                    );
                    doc.append_text(delete, "Delete");
                }
            }
            Overlay::Dialog { .. } => {
                let dialog = doc.append(overlay, Element::new("div").with_attr("role", "dialog"));
                let text = doc.append(dialog, Element::new("p"));
                doc.append_text(text, "Delete chat?");
                let cancel = doc.append(dialog, Element::new("button").with_handle(DIALOG_CANCEL_HANDLE));
                doc.append_text(cancel, "Cancel");
                let confirm = doc.append(dialog, Element::new("button").with_handle(DIALOG_CONFIRM_HANDLE));
                doc.append_text(confirm, "Delete");
            }
        }
    }
}

/// In-memory page. Clones share state; each clone may address a different
/// scroll target.
#[derive(Debug, Clone)]
pub struct VirtualPage {
    state: Arc<Mutex<State>>,
    target: ScrollTarget,
}

impl VirtualPage {
    pub fn new(fixture: PageFixture) -> Result<Self> {
        fixture.validate().map_err(|reason| ExportError::invalid_fixture("<inline>", reason))?;

        let loaded_from = match fixture.history {
            Some(history) => fixture.turns.len().saturating_sub(history.initially_loaded),
            None => 0,
        };
        let sidebar = fixture
            .sidebar
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let base = SIDEBAR_HANDLE_BASE + 2 * i as u64;
                SidebarItem {
                    entry: entry.clone(),
                    link: ElementHandle(base),
                    menu_button: ElementHandle(base + 1),
                    deleted: false,
                }
            })
            .collect();

        let state = State {
            loading_ticks: fixture.loading_ticks,
            fixture,
            loaded_from,
            scroll_top: 0.0,
            next_turn_handle: TURN_HANDLE_BASE,
            sidebar,
            overlay: Overlay::Closed,
            hovered: None,
            scroll_requests: Vec::new(),
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            target: ScrollTarget::Element(SCROLLER_HANDLE),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::new(PageFixture::from_path(path)?)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn scrolls_list(&self) -> bool {
        self.target == ScrollTarget::Element(SCROLLER_HANDLE)
    }

    /// Every offset passed to `scroll_to` on the conversation list, in order.
    pub fn scroll_requests(&self) -> Vec<f64> {
        self.lock().scroll_requests.clone()
    }

    /// Titles still present in the sidebar.
    pub fn sidebar_titles(&self) -> Vec<String> {
        self.lock()
            .sidebar
            .iter()
            .filter(|item| !item.deleted)
            .map(|item| item.entry.title.clone())
            .collect()
    }

    pub fn is_overlay_open(&self) -> bool {
        self.lock().overlay != Overlay::Closed
    }

    /// The fixture as the page stands now: deleted sidebar entries are gone.
    pub fn to_fixture(&self) -> PageFixture {
        let state = self.lock();
        let mut fixture = state.fixture.clone();
        fixture.sidebar = state
            .sidebar
            .iter()
            .filter(|item| !item.deleted)
            .map(|item| item.entry.clone())
            .collect();
        fixture
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_fixture())
            .map_err(|e| ExportError::json(path.display().to_string(), e))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[async_trait]
impl ScrollHost for VirtualPage {
    async fn metrics(&self) -> ScrollMetrics {
        let state = self.lock();
        if self.scrolls_list() {
            ScrollMetrics {
                scroll_top: state.scroll_top,
                scroll_height: state.scroll_height(),
                client_height: state.fixture.viewport_height,
            }
        } else {
            // Only the conversation list scrolls on this page.
            ScrollMetrics {
                scroll_top: 0.0,
                scroll_height: state.fixture.viewport_height,
                client_height: state.fixture.viewport_height,
            }
        }
    }

    async fn scroll_to(&self, top: f64) {
        if self.scrolls_list() {
            self.lock().scroll_to(top);
        }
    }

    async fn snapshot(&self) -> HostSnapshot {
        let document = self.lock().render();
        let scope = match self.target {
            ScrollTarget::Element(handle) => document.find_by_handle(handle),
            ScrollTarget::Root => None,
        }
        .unwrap_or_else(|| document.root());
        HostSnapshot { document, scope }
    }
}

#[async_trait]
impl Page for VirtualPage {
    async fn url(&self) -> String {
        self.lock().fixture.url.clone()
    }

    async fn document(&self) -> Document {
        self.lock().render()
    }

    async fn scroll_host(&self, target: ScrollTarget) -> Box<dyn ScrollHost> {
        Box::new(VirtualPage {
            state: Arc::clone(&self.state),
            target,
        })
    }
}

#[async_trait]
impl UiDriver for VirtualPage {
    async fn document(&self) -> Document {
        self.lock().render()
    }

    async fn dispatch(&self, target: ElementHandle, event: UiEvent) {
        self.lock().dispatch(target, event);
    }
}
