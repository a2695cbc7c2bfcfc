mod cli;
mod commands;
mod config;
mod paths;
mod resource;
mod state;
mod template;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub state_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub retry_limit: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        state_dir: cli.state_dir.as_deref().map(|dir| paths::expand(&dir.to_string_lossy())),
        config: cli.config,
        retry_limit: cli.retry_limit,
    };

    match cli.command {
        Command::Validate { template } => commands::validate::validate(&ctx, &template),
        Command::Deps { template } => commands::validate::deps(&ctx, &template),
        Command::Types => commands::validate::types(&ctx),
        Command::Apply(args) => commands::apply::apply(&ctx, args).await,
        Command::Destroy { template, yes } => commands::apply::destroy(&ctx, &template, yes).await,
        Command::Status { stack } => commands::status::run(&ctx, stack.as_deref()).await,
        Command::Suspend(args) => commands::resource::suspend(&ctx, &args).await,
        Command::Resume(args) => commands::resource::resume(&ctx, &args).await,
        Command::Check(args) => commands::resource::check(&ctx, &args).await,
        Command::Signal(args) => commands::resource::signal(&ctx, &args).await,
        Command::Abandon(args) => commands::resource::abandon(&ctx, &args).await,
        Command::Adopt(args) => commands::resource::adopt(&ctx, &args).await,
        Command::Shorten { name, limit } => commands::shorten::run(&ctx, &name, limit),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "stackwright", &mut io::stdout());
            Ok(())
        }
    }
}
