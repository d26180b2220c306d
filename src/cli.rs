use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::commands::goals::GoalsAction;
use crate::commands::review::ReviewOptions;
use crate::commands::{self, CommandReport};
use crate::logging;
use crate::organizer::paths::{PathOverrides, resolve_paths};
use crate::organizer::pipeline::IngestOptions;

#[derive(Debug, Parser)]
#[command(
    name = "vault-organizer",
    version,
    about = "Sort an inbox folder into a knowledge vault and keep its journal"
)]
pub struct Cli {
    /// Vault root (defaults to ORGANIZER_VAULT_DIR, then ~/My_Knowledge_Vault)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Inbox folder (defaults to ORGANIZER_INBOX_DIR, then ~/Inbox_Camera_Uploads)
    #[arg(long, global = true)]
    inbox: Option<PathBuf>,

    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log filter, e.g. `info` or `vault_organizer=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process every file currently in the inbox once
    Ingest {
        /// Fingerprint and check for duplicates without moving anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Write the weekly trajectory report
    Review {
        /// Last day of the period (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Number of days to roll up
        #[arg(long)]
        days: Option<u32>,
    },
    /// Manage the goals the weekly review measures against
    Goals {
        #[command(subcommand)]
        action: GoalsCommand,
    },
    /// Show resolved paths, config and vault health
    Status,
}

#[derive(Debug, Subcommand)]
enum GoalsCommand {
    List,
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    Clear,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

pub fn run(dotenv: Option<&Path>) -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json)?;
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let paths = resolve_paths(&PathOverrides {
        vault: cli.vault.clone(),
        inbox: cli.inbox.clone(),
    })?;

    let report = match &cli.command {
        Command::Ingest { dry_run } => commands::ingest::run(
            &paths,
            IngestOptions {
                dry_run: *dry_run,
            },
        )?,
        Command::Review { date, days } => commands::review::run(
            &paths,
            &ReviewOptions {
                date: *date,
                days: *days,
            },
        )?,
        Command::Goals { action } => {
            let action = match action {
                GoalsCommand::List => GoalsAction::List,
                GoalsCommand::Add { text } => GoalsAction::Add(text.join(" ")),
                GoalsCommand::Clear => GoalsAction::Clear,
            };
            commands::goals::run(&paths, &action)?
        }
        Command::Status => commands::status::run(&paths)?,
    };

    print_report(&report, cli.json)?;
    report.into_result()
}
