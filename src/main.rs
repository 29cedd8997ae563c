mod commands;
mod compare;
mod config;
mod diagnostics;
mod error;
mod freshness;
mod hasher;
mod info;
mod logging;
mod parser;
mod patterns;
mod rewriter;
mod scanner;
mod snapshot;
mod store;
mod types;
mod watch;

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::logging::LogLevel;

#[derive(Parser)]
#[command(name = "docwatch", about = "Keep documentation comments in sync with the code lines they reference")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log verbosity on stderr (overrides DOCWATCH_LOG)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete snapshots that no watch expression references
    Clean,
    /// Compare every watched target against its snapshot
    Compare {
        /// Rewrite moved ranges in documentation and record new targets
        #[arg(long)]
        fix: bool,
    },
    /// Print a reference document: syntax, config keys, exit codes, state
    Info {
        /// Output as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Record snapshots for every watched target that has none
    Init,
    /// Show every watch expression and its outcome (always exits 0)
    Status,
    /// Re-record snapshots after intentional code changes
    Update {
        /// Only targets referenced from this documentation file
        #[arg(long)]
        from: Option<String>,
    },
    /// Re-run compare whenever docs or watched sources change
    Watch,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level);
    let root = Path::new(".");

    let result = match cli.command {
        Commands::Clean => commands::clean(root).map(|()| return ExitCode::SUCCESS),
        Commands::Compare { fix } => commands::compare(root, fix),
        Commands::Info { json } => {
            commands::info(root, json);
            Ok(ExitCode::SUCCESS)
        },
        Commands::Init => commands::init(root).map(|()| return ExitCode::SUCCESS),
        Commands::Status => commands::status(root).map(|()| return ExitCode::SUCCESS),
        Commands::Update { from } => commands::update(root, from.as_deref()).map(|()| return ExitCode::SUCCESS),
        Commands::Watch => watch::run(root),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(3)
        },
    };
}
