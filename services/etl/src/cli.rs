use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use loanbook::error::AppError;

use crate::runner;

#[derive(Parser, Debug)]
#[command(
    name = "Loanbook ETL",
    about = "Run the consumer-lending repayment ETL pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: extract, reconcile, load, report (default)
    Run(RunArgs),
    /// Print the quincena calendar for a given month
    Calendar(CalendarArgs),
    /// Ingest new manual channel drops from Drive into the warehouse
    ImportDrops,
    /// Build the accounting reports and publish or print them
    Report(ReportArgs),
    /// Trigger a Metabase schema sync for the warehouse database
    SyncMetabase,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Override the extract data directory
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
    /// Override the warehouse database path
    #[arg(long)]
    pub(crate) warehouse: Option<PathBuf>,
    /// Skip the Drive manual-drop import even when configured
    #[arg(long)]
    pub(crate) skip_drops: bool,
    /// Skip report publication even when configured
    #[arg(long)]
    pub(crate) skip_reports: bool,
    /// Skip the Metabase schema sync even when configured
    #[arg(long)]
    pub(crate) skip_metabase: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CalendarArgs {
    /// Month to print (YYYY-MM-DD, any day of the month; defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) month: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// Evaluation date for the report cutoffs (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the summaries instead of publishing to Drive
    #[arg(long)]
    pub(crate) print: bool,
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| Command::Run(RunArgs::default()));

    match command {
        Command::Run(args) => runner::run_pipeline(args),
        Command::Calendar(args) => runner::run_calendar(args),
        Command::ImportDrops => runner::run_import_drops(),
        Command::Report(args) => runner::run_report(args),
        Command::SyncMetabase => runner::run_sync_metabase(),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
