use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chatexport_core::{BatchDeleter, ChannelProgress, ExportConfig, UiDriver, VirtualPage};
use clap::{ArgGroup, Parser};
use inquire::Confirm;

use crate::ui;

#[derive(Parser, Debug)]
#[command(group(
    ArgGroup::new("which")
        .required(true)
        .args(["all", "select", "list"])
))]
pub struct DeleteArgs {
    /// Page fixture (JSON) whose sidebar lists the conversations
    #[arg(long, value_name = "PATH")]
    pub page: PathBuf,

    /// Delete every conversation in the sidebar
    #[arg(long)]
    pub all: bool,

    /// Delete the conversations with these titles
    #[arg(long, value_name = "TITLE", num_args = 1..)]
    pub select: Vec<String>,

    /// Only list the sidebar conversations
    #[arg(long)]
    pub list: bool,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,

    /// Write the page back with the deleted conversations removed
    #[arg(long)]
    pub save: bool,

    /// Print the delete report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Keep the configured UI delays
    #[arg(long)]
    pub paced: bool,
}

pub async fn run_delete(args: DeleteArgs, mut config: ExportConfig) -> Result<()> {
    let page = VirtualPage::from_path(&args.page)
        .with_context(|| format!("Failed to open page {}", args.page.display()))?;
    if !args.paced {
        config.zero_delays();
    }

    let deleter = BatchDeleter::new(config.batch);
    let doc = UiDriver::document(&page).await;
    let status = deleter.enter(&doc)?;

    if args.list {
        for conversation in deleter.conversations() {
            println!("{}\t{}", conversation.title, conversation.href);
        }
        deleter.exit();
        return Ok(());
    }

    let count = if args.all {
        deleter.select_all(true)?
    } else {
        deleter.select(&args.select)?
    };
    if count == 0 {
        deleter.exit();
        bail!(
            "None of the {} sidebar conversations matched the selection",
            status.conversation_count
        );
    }

    if !args.yes {
        let confirmed = Confirm::new(&format!(
            "Delete {count} conversation(s)? This cannot be undone."
        ))
        .with_default(false)
        .prompt()
        .context("Confirmation prompt failed (use --yes to skip it)")?;
        if !confirmed {
            deleter.exit();
            println!("Nothing deleted.");
            return Ok(());
        }
    }

    let (sink, rx) = ChannelProgress::channel(64);
    let bar = if args.json { None } else { ui::percent_bar("Deleting conversations") };
    let follower = ui::follow(bar, rx);
    let outcome = deleter.delete_selected(&page, &sink).await;
    drop(sink);
    let bar = follower.await.unwrap_or(None);

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            ui::finish_error(bar, err.to_string());
            return Err(err).context("Batch delete failed");
        }
    };
    ui::finish_success(
        bar,
        format!("Deleted {}/{}", report.deleted_count, report.total_attempted),
    );

    if args.save {
        page.save(&args.page)
            .with_context(|| format!("Failed to save page {}", args.page.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "🗑️  Deleted {} of {} conversations",
            report.deleted_count, report.total_attempted
        );
        for error in &report.errors {
            println!("   ⚠ {error}");
        }
    }
    Ok(())
}
