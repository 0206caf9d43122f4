use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chatexport_core::{
    CancelToken, ChannelProgress, ExportConfig, ExportFormat, ExportSummary, Exporter, VirtualPage,
};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use tracing::warn;

use crate::ui;

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Page fixture (JSON) to export the conversation from
    #[arg(long, value_name = "PATH")]
    pub page: PathBuf,

    /// Output format (default from config)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Output directory (default: config output.dir, then current directory)
    #[arg(long = "out", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Print the export summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Disable the real-time progress bar output
    #[arg(long = "no-progress", action = ArgAction::SetTrue)]
    pub no_progress: bool,

    /// Keep the configured scroll delays instead of running the fixture
    /// as fast as it settles
    #[arg(long)]
    pub paced: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Md,
    Html,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Md => ExportFormat::Markdown,
            FormatArg::Html => ExportFormat::Html,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportReport<'a> {
    #[serde(flatten)]
    summary: &'a ExportSummary,
    path: String,
}

/// How an export run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Exported,
    /// Interrupted by the user; nothing was written.
    Cancelled,
}

impl ExportStatus {
    /// 130 for a cancelled run, as for a shell job stopped by Ctrl-C.
    pub fn code(self) -> u8 {
        match self {
            ExportStatus::Exported => 0,
            ExportStatus::Cancelled => 130,
        }
    }

    pub fn into_exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

pub async fn run_export(args: ExportArgs, mut config: ExportConfig) -> Result<ExportStatus> {
    let page = VirtualPage::from_path(&args.page)
        .with_context(|| format!("Failed to open page {}", args.page.display()))?;
    if !args.paced {
        config.zero_delays();
    }

    let format = args.format.map(ExportFormat::from).unwrap_or(config.output.format);
    let out_dir = args.output.clone().unwrap_or_else(|| config.output_dir());
    let exporter = Exporter::new(config);

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling export");
            on_ctrl_c.cancel();
        }
    });

    let (sink, rx) = ChannelProgress::channel(64);
    let bar = if args.no_progress || args.json {
        None
    } else {
        ui::percent_bar("Starting export...")
    };
    let follower = ui::follow(bar, rx);

    let outcome = exporter.export(&page, format, cancel, &sink).await;
    drop(sink);
    ctrl_c.abort();
    let bar = follower.await.unwrap_or(None);

    let result = match outcome {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => {
            ui::finish_error(bar, "Export cancelled");
            eprintln!("Export cancelled; nothing was written.");
            return Ok(ExportStatus::Cancelled);
        }
        Err(err) => {
            ui::finish_error(bar, err.to_string());
            return Err(err).context("Export failed");
        }
    };

    let path = result
        .artifact
        .write_to(&out_dir)
        .with_context(|| format!("Failed to write export to {}", out_dir.display()))?;
    let summary = &result.summary;
    ui::finish_success(
        bar,
        format!("Exported {} messages", summary.message_count),
    );

    if args.json {
        let report = ExportReport {
            summary,
            path: path.display().to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "✅ Exported {} messages ({} user, {} assistant) in {}s",
            summary.message_count,
            summary.user_count,
            summary.assistant_count,
            summary.elapsed_secs
        );
        println!("   {}", path.display());
    }
    Ok(ExportStatus::Exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_export_has_its_own_exit_status() {
        assert_eq!(ExportStatus::Exported.code(), 0);
        assert_eq!(ExportStatus::Cancelled.code(), 130);
        assert_ne!(ExportStatus::Cancelled.code(), 1);
    }
}
