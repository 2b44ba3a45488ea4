use chrono::{Datelike, Duration, NaiveDate, Utc};
use tracing::info;

use loanbook::calendar;
use loanbook::config::{AppConfig, ConfigError, DriveConfig};
use loanbook::error::AppError;
use loanbook::metabase::MetabaseClient;
use loanbook::pipeline::{build_loan_detail, PipelineInputs};
use loanbook::report::accounting;
use loanbook::report::export::ReportExporter;
use loanbook::sources::csv::CsvExtractStore;
use loanbook::sources::drive::{connect_service_account, GoogleDriveClient, ServiceConnector};
use loanbook::sources::manual_drops::{ManualDropImporter, ManualPaymentRow, ManualTransactionRow};
use loanbook::sources::ExtractSource;
use loanbook::telemetry;
use loanbook::time;
use loanbook::warehouse::{Warehouse, WarehouseSnapshot};

use crate::cli::{CalendarArgs, ReportArgs, RunArgs};

fn load_inputs(store: &CsvExtractStore) -> Result<PipelineInputs, AppError> {
    Ok(PipelineInputs {
        loans: store.loans()?,
        arcus_transactions: store.arcus_transactions()?,
        stripe_transactions: store.stripe_transactions()?,
        cash_transactions: store.cash_transactions()?,
        strategy_assignments: store.strategy_assignments()?,
    })
}

fn wants_drops(drive: &DriveConfig) -> bool {
    drive.payments_folder_id.is_some() || drive.transactions_folder_id.is_some()
}

/// Import new manual drops through the gateway, returning replacement
/// batches only when new folders actually arrived.
fn import_drops(
    client: &GoogleDriveClient<ServiceConnector>,
    drive: &DriveConfig,
    config: &AppConfig,
) -> Result<(Option<Vec<ManualPaymentRow>>, Option<Vec<ManualTransactionRow>>), AppError> {
    let mut payments = None;
    let mut transactions = None;

    if let Some(folder) = &drive.payments_folder_id {
        let importer =
            ManualDropImporter::new(client, config.storage.processed_payments_log());
        let batch = importer.import_payments(folder)?;
        info!(
            rows = batch.rows.len(),
            folders = batch.processed_folders.len(),
            skipped = batch.skipped_files,
            "manual payments import finished"
        );
        if !batch.processed_folders.is_empty() {
            payments = Some(batch.rows);
        }
    }

    if let Some(folder) = &drive.transactions_folder_id {
        let importer =
            ManualDropImporter::new(client, config.storage.processed_transactions_log());
        let batch = importer.import_transactions(folder)?;
        info!(
            rows = batch.rows.len(),
            folders = batch.processed_folders.len(),
            skipped = batch.skipped_files,
            "manual transactions import finished"
        );
        if !batch.processed_folders.is_empty() {
            transactions = Some(batch.rows);
        }
    }

    Ok((payments, transactions))
}

pub(crate) fn run_pipeline(args: RunArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(path) = args.warehouse {
        config.storage.warehouse_path = path;
    }
    telemetry::init(&config.telemetry)?;

    let now = Utc::now();
    let today_cdmx = time::to_cdmx(now).date();
    info!(environment = ?config.environment, "pipeline run starting");

    let store = CsvExtractStore::new(&config.storage.data_dir);
    let inputs = load_inputs(&store)?;
    let rows = build_loan_detail(&inputs, now);
    let calendar_days = calendar::build_calendar(today_cdmx);

    let drive_client = match &config.drive {
        Some(drive)
            if (!args.skip_drops && wants_drops(drive))
                || (!args.skip_reports && drive.report_folders.is_some()) =>
        {
            Some(connect_service_account(&drive.credentials_path)?)
        }
        _ => None,
    };

    let (payments_batch, transactions_batch) = match (&drive_client, &config.drive) {
        (Some(client), Some(drive)) if !args.skip_drops && wants_drops(drive) => {
            import_drops(client, drive, &config)?
        }
        _ => (None, None),
    };

    let warehouse = Warehouse::new(&config.storage.warehouse_path);
    let snapshot = WarehouseSnapshot {
        loans: &rows,
        strategies: &inputs.strategy_assignments,
        calendar: &calendar_days,
        manual_payments: payments_batch.as_deref(),
        manual_transactions: transactions_batch.as_deref(),
    };
    warehouse.load(&snapshot)?;

    if !args.skip_reports {
        let folders = config.drive.as_ref().and_then(|drive| drive.report_folders.clone());
        if let (Some(client), Some(folders)) = (&drive_client, folders) {
            let report = accounting::build_report(&rows, today_cdmx);
            ReportExporter::new(client, folders).publish(&report, now)?;
        }
    }

    if !args.skip_metabase {
        if let Some(settings) = config.metabase.clone() {
            MetabaseClient::new(settings)?.sync_schema()?;
        }
    }

    info!("pipeline run complete");
    Ok(())
}

pub(crate) fn run_calendar(args: CalendarArgs) -> Result<(), AppError> {
    let month = args
        .month
        .unwrap_or_else(|| time::to_cdmx(Utc::now()).date());
    let month_start =
        NaiveDate::from_ymd_opt(month.year(), month.month(), 1).expect("month start exists");
    let next_month = if month.month() == 12 {
        NaiveDate::from_ymd_opt(month.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(month.year(), month.month() + 1, 1)
    }
    .expect("month start exists");
    let month_end = next_month - Duration::days(1);

    let days: Vec<_> = calendar::build_calendar(month_end)
        .into_iter()
        .filter(|day| day.month == month_start)
        .collect();

    println!("Quincena calendar for {}", month_start.format("%Y-%m"));
    for day in &days {
        if day.is_quincena {
            println!("- payday: {} ({})", day.day, day.day.format("%A"));
        }
    }
    println!("{} calendar days generated", days.len());
    Ok(())
}

pub(crate) fn run_import_drops() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let drive = config
        .drive
        .as_ref()
        .filter(|drive| wants_drops(drive))
        .ok_or(ConfigError::DriveNotConfigured)?;

    let client = connect_service_account(&drive.credentials_path)?;
    let (payments, transactions) = import_drops(&client, drive, &config)?;

    let warehouse = Warehouse::new(&config.storage.warehouse_path);
    warehouse.load_manual_batches(payments.as_deref(), transactions.as_deref())?;

    println!(
        "manual drops imported: {} payments, {} transactions",
        payments.map(|rows| rows.len()).unwrap_or(0),
        transactions.map(|rows| rows.len()).unwrap_or(0)
    );
    Ok(())
}

pub(crate) fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let now = Utc::now();
    let today = args.today.unwrap_or_else(|| time::to_cdmx(now).date());

    let store = CsvExtractStore::new(&config.storage.data_dir);
    let inputs = load_inputs(&store)?;
    let rows = build_loan_detail(&inputs, now);
    let report = accounting::build_report(&rows, today);

    let folders = config.drive.as_ref().and_then(|drive| drive.report_folders.clone());
    match (args.print, &config.drive, folders) {
        (false, Some(drive), Some(folders)) => {
            let client = connect_service_account(&drive.credentials_path)?;
            let published = ReportExporter::new(&client, folders).publish(&report, now)?;
            println!(
                "reports published: accounting={} settled={} detail={}",
                published.accounting_file_id,
                published.settled_file_id,
                published.loan_detail_file_id
            );
        }
        _ => render_report(&report),
    }
    Ok(())
}

fn render_report(report: &accounting::AccountingReport) {
    println!("Origination by CDMX issue month");
    for month in &report.origination {
        println!(
            "- {}: due {:.2}, apportioned {:.2}",
            month.issue_month_cdmx, month.total_amount_due, month.apportioned_amount_paid
        );
    }

    println!("\nSettlements by CDMX month");
    for month in &report.settlements {
        println!(
            "- {}: apportioned {:.2}, disputes {:.2}",
            month.settled_month_cdmx, month.apportioned_amount_paid, month.dispute_amount
        );
    }

    println!(
        "\nDetail window {} to {}: {} loans",
        report.detail_window_start,
        report.detail_window_end,
        report.detail.len()
    );
}

pub(crate) fn run_sync_metabase() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let settings = config
        .metabase
        .clone()
        .ok_or(ConfigError::MetabaseNotConfigured)?;
    MetabaseClient::new(settings)?.sync_schema()?;
    println!("metabase schema sync triggered");
    Ok(())
}
