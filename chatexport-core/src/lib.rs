pub mod batch;
pub mod classify;
pub mod collector;
pub mod config;
pub mod dom;
pub mod error;
pub mod export;
pub mod extract;
pub mod filename;
pub mod host;
pub mod locate;
pub mod message;
pub mod progress;
pub mod render;
pub mod selector;
pub mod simulate;
pub mod title;

pub use batch::{find_sidebar_conversations, BatchDeleter, DeleteReport, EnterStatus, SidebarConversation};
pub use classify::AuthorClassifier;
pub use collector::{CollectOutcome, Collector, SessionState};
pub use config::ExportConfig;
pub use dom::{Document, Element, ElementHandle, Layout, Markup, NodeId};
pub use error::{DeleteStepError, ExportError, Result};
pub use export::{ExportArtifact, ExportResult, ExportSummary, Exporter};
pub use extract::MessageExtractor;
pub use host::{HostSnapshot, Page, ScrollHost, ScrollMetrics, ScrollTarget, UiDriver, UiEvent};
pub use locate::{locate, Located, LocateStrategy};
pub use message::{Author, DedupKey, DedupStrategy, Message, MessageLog};
pub use progress::{CancelToken, ChannelProgress, NoProgress, ProgressEvent, ProgressSink, TracingProgress};
pub use render::{ExportFormat, RenderContext};
pub use selector::{Matcher, Selector};
pub use simulate::{PageFixture, SidebarEntry, TurnFixture, VirtualPage};
