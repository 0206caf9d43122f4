//! chatexport CLI - export chat conversations from virtualized chat pages
//!
//! - `export`: collect every turn of a conversation and write Markdown or
//!   printable HTML
//! - `delete`: batch-delete sidebar conversations through the page UI
//! - `config`: manage ~/.chatexport/config.toml
//! - `completions`: shell completion scripts

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod config;
mod tracing_setup;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "chatexport",
    author,
    version,
    about = "Export complete conversations from virtualized chat pages",
    long_about = "Scrolls a virtualized conversation list top to bottom, collects every turn \
                  exactly once in document order, and writes it as Markdown or printable HTML."
)]
struct Cli {
    /// Suppress progress bars (for script consumption)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ~/.chatexport/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "CHATEXPORT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export the conversation shown on a page
    Export(commands::export::ExportArgs),
    /// Delete sidebar conversations one by one through the page UI
    Delete(commands::delete::DeleteArgs),
    /// Manage chatexport configuration (init, show, path)
    Config(config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        quiet: cli.quiet,
    })
    .ok();

    ui::init_quiet_mode(cli.quiet);
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Export(args) => {
            let status = commands::run_export(args, config::load(explicit)?).await?;
            return Ok(status.into_exit_code());
        }
        Commands::Delete(args) => commands::run_delete(args, config::load(explicit)?).await?,
        Commands::Config(args) => config::run_config(args, explicit)?,
        Commands::Completions(args) => run_completions(args)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}
