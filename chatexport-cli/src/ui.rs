//! Progress feedback for the chatexport CLI
//!
//! Bars are suppressed when:
//! - `--quiet` flag is passed
//! - `CHATEXPORT_QUIET=1` environment variable is set
//! - stderr is not a TTY (piped output)

use std::io::IsTerminal;
use std::sync::OnceLock;

use chatexport_core::ProgressEvent;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static QUIET_MODE: OnceLock<bool> = OnceLock::new();

/// Call once at startup with the --quiet flag value.
pub fn init_quiet_mode(quiet_flag: bool) {
    let is_quiet = quiet_flag
        || std::env::var("CHATEXPORT_QUIET").map(|v| v == "1").unwrap_or(false)
        || !std::io::stderr().is_terminal();

    QUIET_MODE.set(is_quiet).ok();
}

pub fn is_quiet() -> bool {
    *QUIET_MODE.get().unwrap_or(&false)
}

/// A 0..=100 bar, or `None` in quiet mode.
pub fn percent_bar(msg: impl Into<String>) -> Option<ProgressBar> {
    if is_quiet() {
        return None;
    }

    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{bar:30.cyan/dim} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─");
    pb.set_style(style);
    pb.set_message(msg.into());
    Some(pb)
}

/// Drain progress events into the bar until every sender is dropped.
pub fn follow(
    pb: Option<ProgressBar>,
    mut rx: mpsc::Receiver<ProgressEvent>,
) -> JoinHandle<Option<ProgressBar>> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(pb) = &pb {
                pb.set_position(u64::from(event.percent));
                pb.set_message(format!("{} {}", event.phase, event.detail));
            }
        }
        pb
    })
}

pub fn finish_success(pb: Option<ProgressBar>, msg: impl Into<String>) {
    if let Some(pb) = pb {
        pb.set_style(ProgressStyle::default_spinner());
        pb.finish_with_message(format!("✓ {}", msg.into()));
    }
}

pub fn finish_error(pb: Option<ProgressBar>, msg: impl Into<String>) {
    if let Some(pb) = pb {
        pb.set_style(ProgressStyle::default_spinner());
        pb.abandon_with_message(format!("✗ {}", msg.into()));
    }
}
