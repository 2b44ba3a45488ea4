//! Local analytical warehouse.
//!
//! Each run rebuilds the named tables from the freshly computed snapshot
//! inside one transaction, so a failed load leaves the previous contents
//! authoritative. The prior database file is copied aside first and only
//! the newest backup is kept. BI tools sometimes hold the file, hence the
//! busy timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use tracing::info;

use crate::calendar::CalendarDay;
use crate::pipeline::domain::{ReconciledLoan, StrategyAssignment};
use crate::sources::manual_drops::{ManualPaymentRow, ManualTransactionRow};
use crate::time;

pub const FACT_LOAN: &str = "fact_loan";
pub const FACT_COLLECTIONS_STRATEGIES: &str = "fact_collections_strategies";
pub const DIM_CALENDAR: &str = "dim_calendar";
pub const ANALYTICS_MANUAL_PAYMENTS: &str = "analytics_manual_payments";
pub const ANALYTICS_MANUAL_TRANSACTIONS: &str = "analytics_manual_transactions";

const DESIRED_TABLES: [&str; 5] = [
    FACT_LOAN,
    FACT_COLLECTIONS_STRATEGIES,
    DIM_CALENDAR,
    ANALYTICS_MANUAL_PAYMENTS,
    ANALYTICS_MANUAL_TRANSACTIONS,
];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("warehouse database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("warehouse backup failed: {0}")]
    Backup(#[from] std::io::Error),
}

/// Everything a run persists.
///
/// The manual-drop tables are `None` when a run found no new drops; the
/// previously loaded batch then stays in place.
#[derive(Debug, Clone, Copy)]
pub struct WarehouseSnapshot<'a> {
    pub loans: &'a [ReconciledLoan],
    pub strategies: &'a [StrategyAssignment],
    pub calendar: &'a [CalendarDay],
    pub manual_payments: Option<&'a [ManualPaymentRow]>,
    pub manual_transactions: Option<&'a [ManualTransactionRow]>,
}

#[derive(Debug, Clone)]
pub struct Warehouse {
    path: PathBuf,
}

impl Warehouse {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the warehouse tables with the snapshot's contents.
    pub fn load(&self, snapshot: &WarehouseSnapshot<'_>) -> Result<(), WarehouseError> {
        self.backup_existing()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let tx = conn.transaction()?;
        write_loans(&tx, snapshot.loans)?;
        write_strategies(&tx, snapshot.strategies)?;
        write_calendar(&tx, snapshot.calendar)?;
        write_manual_payments(&tx, snapshot.manual_payments)?;
        write_manual_transactions(&tx, snapshot.manual_transactions)?;
        drop_outdated_tables(&tx)?;
        tx.commit()?;

        info!(
            loans = snapshot.loans.len(),
            strategies = snapshot.strategies.len(),
            calendar_days = snapshot.calendar.len(),
            path = %self.path.display(),
            "warehouse load committed"
        );
        Ok(())
    }

    /// Replace only the manual-drop tables, leaving the fact tables alone.
    pub fn load_manual_batches(
        &self,
        payments: Option<&[ManualPaymentRow]>,
        transactions: Option<&[ManualTransactionRow]>,
    ) -> Result<(), WarehouseError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let tx = conn.transaction()?;
        write_manual_payments(&tx, payments)?;
        write_manual_transactions(&tx, transactions)?;
        tx.commit()?;
        Ok(())
    }

    /// Copy the current database aside, keeping only the newest backup.
    fn backup_existing(&self) -> Result<(), std::io::Error> {
        if !self.path.exists() {
            return Ok(());
        }

        let stem = self
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("warehouse");
        let prefix = format!("{stem}_backup_");
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let backup_path = parent.join(format!("{prefix}{timestamp}.sqlite"));
        fs::copy(&self.path, &backup_path)?;
        info!(backup = %backup_path.display(), "warehouse backup created");

        let mut backups: Vec<PathBuf> = fs::read_dir(&parent)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
            })
            .collect();
        backups.sort();
        backups.pop();
        for stale in backups {
            fs::remove_file(&stale)?;
        }
        Ok(())
    }
}

fn fmt_utc(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.naive_utc().format(DATETIME_FORMAT).to_string())
}

fn fmt_naive(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(|t| t.format(DATETIME_FORMAT).to_string())
}

fn drop_outdated_tables(tx: &Transaction<'_>) -> Result<(), WarehouseError> {
    let mut stmt = tx.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    for name in names {
        if !DESIRED_TABLES.contains(&name.as_str()) {
            tx.execute_batch(&format!("DROP TABLE \"{name}\""))?;
            info!(table = %name, "dropped outdated warehouse table");
        }
    }
    Ok(())
}

fn write_loans(tx: &Transaction<'_>, rows: &[ReconciledLoan]) -> Result<(), WarehouseError> {
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {FACT_LOAN};
         CREATE TABLE {FACT_LOAN} (
            UserId TEXT NOT NULL,
            UserLoanId TEXT NOT NULL,
            IssueDate TEXT NOT NULL,
            IssueDateCDMX TEXT NOT NULL,
            ModifiedAt TEXT NOT NULL,
            ModifiedAtCDMX TEXT NOT NULL,
            DueDate TEXT NOT NULL,
            PrincipalAmount REAL NOT NULL,
            Fee REAL NOT NULL,
            TaxOnFee REAL NOT NULL,
            LateFee REAL NOT NULL,
            TaxOnLateFee REAL NOT NULL,
            LoanStatus INTEGER NOT NULL,
            LoanStatusDescription TEXT NOT NULL,
            IsLate INTEGER NOT NULL,
            LoanNumber INTEGER NOT NULL,
            LoanCohort TEXT NOT NULL,
            FeeRatio REAL,
            JitOfferPolicy INTEGER,
            JitOfferPolicyName TEXT,
            CreditPolicy INTEGER,
            CreditPolicyName TEXT,
            MlScore REAL,
            AmountPaidArcus REAL NOT NULL,
            LastPaidAtArcus TEXT,
            LastPaidAtArcusCDMX TEXT,
            AmountPaidStripe REAL NOT NULL,
            LastPaidAtStripe TEXT,
            LastPaidAtStripeCDMX TEXT,
            AmountPaidCash REAL NOT NULL,
            LastPaidAtCash TEXT,
            LastPaidAtCashCDMX TEXT,
            DisputeAmount REAL NOT NULL,
            TotalAmountDue REAL NOT NULL,
            TotalAmountPaid REAL NOT NULL,
            TotalOriginalAmountPaid REAL NOT NULL,
            LateFeePaid REAL NOT NULL,
            TaxOnLateFeePaid REAL NOT NULL,
            FeePaid REAL NOT NULL,
            TaxOnFeePaid REAL NOT NULL,
            PrincipalPaid REAL NOT NULL,
            LastPaidDate TEXT,
            LastPaidDateCDMX TEXT,
            SettledAt TEXT,
            SettledAtCDMX TEXT,
            DaysLate INTEGER NOT NULL,
            IsPostDD INTEGER NOT NULL,
            Strategy INTEGER,
            StrategyName TEXT NOT NULL,
            StrategyCreatedAt TEXT,
            StrategyCreatedAtCDMX TEXT,
            LateStrategy INTEGER,
            LateStrategyName TEXT,
            LateStrategyCreatedAt TEXT,
            LateStrategyCreatedAtCDMX TEXT
         );"
    ))?;

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {FACT_LOAN} VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
            ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
            ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40,
            ?41, ?42, ?43, ?44, ?45, ?46, ?47, ?48, ?49, ?50,
            ?51, ?52, ?53, ?54, ?55
         )"
    ))?;

    for row in rows {
        let loan = &row.loan;
        let due = loan.due_breakdown();
        let split = &row.apportionment;
        let collections = &row.collections;
        let late = collections.late_stage_test.as_ref();

        stmt.execute(params![
            loan.borrower_id.0,
            loan.loan_id.0,
            fmt_utc(Some(loan.issued_at)),
            fmt_naive(Some(row.issued_at_cdmx())),
            fmt_utc(Some(loan.modified_at)),
            fmt_naive(Some(row.modified_at_cdmx())),
            fmt_naive(Some(loan.due_date)),
            loan.principal,
            loan.fee,
            due.tax_on_fee,
            due.late_fee,
            due.tax_on_late_fee,
            loan.status.code(),
            loan.status.label(),
            loan.is_late as i64,
            loan.loan_number,
            row.cohort.label(),
            loan.fee_ratio,
            loan.offer_policy.map(|policy| policy.code()),
            loan.offer_policy.map(|policy| policy.label()),
            loan.credit_policy.map(|policy| policy.code()),
            loan.credit_policy.map(|policy| policy.label()),
            loan.ml_score,
            row.arcus.amount_paid,
            fmt_utc(row.arcus.last_paid_at),
            fmt_naive(row.arcus.last_paid_at.map(time::to_cdmx)),
            row.stripe.amount_paid,
            fmt_utc(row.stripe.last_paid_at),
            fmt_naive(row.stripe.last_paid_at.map(time::to_cdmx)),
            row.cash.amount_paid,
            fmt_utc(row.cash.last_paid_at),
            fmt_naive(row.cash.last_paid_at.map(time::to_cdmx)),
            row.dispute_amount,
            row.total_amount_due,
            row.total_amount_paid,
            row.total_original_amount_paid,
            split.late_fee_paid,
            split.tax_on_late_fee_paid,
            split.fee_paid,
            split.tax_on_fee_paid,
            split.principal_paid,
            fmt_utc(row.last_paid_at),
            fmt_naive(row.last_paid_at_cdmx()),
            fmt_utc(row.settled_at),
            fmt_naive(row.settled_at_cdmx),
            row.days_late,
            row.is_post_dd as i64,
            collections.strategy.map(|strategy| strategy.code()),
            collections.strategy_name,
            fmt_utc(collections.assigned_at),
            fmt_naive(collections.assigned_at_cdmx),
            late.map(|test| test.strategy.code()),
            late.map(|test| test.strategy.name()),
            late.and_then(|test| fmt_utc(test.assigned_at)),
            late.and_then(|test| fmt_naive(test.assigned_at_cdmx)),
        ])?;
    }
    Ok(())
}

fn write_strategies(
    tx: &Transaction<'_>,
    rows: &[StrategyAssignment],
) -> Result<(), WarehouseError> {
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {FACT_COLLECTIONS_STRATEGIES};
         CREATE TABLE {FACT_COLLECTIONS_STRATEGIES} (
            UserLoanId TEXT NOT NULL,
            Strategy INTEGER NOT NULL,
            StrategyName TEXT NOT NULL,
            StrategyType TEXT NOT NULL,
            CreatedAt TEXT,
            CreatedAtCDMX TEXT,
            IsDeleted INTEGER NOT NULL
         );"
    ))?;

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {FACT_COLLECTIONS_STRATEGIES} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.loan_id.0,
            row.strategy.code(),
            row.strategy.name(),
            row.strategy.strategy_type().label(),
            fmt_utc(row.assigned_at),
            fmt_naive(row.assigned_at.map(time::to_cdmx)),
            row.is_deleted as i64,
        ])?;
    }
    Ok(())
}

fn write_calendar(tx: &Transaction<'_>, rows: &[CalendarDay]) -> Result<(), WarehouseError> {
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {DIM_CALENDAR};
         CREATE TABLE {DIM_CALENDAR} (
            DateMonth TEXT NOT NULL,
            DateDay TEXT NOT NULL,
            Quincena TEXT NOT NULL,
            IsQuincena INTEGER NOT NULL,
            PrevQuincena TEXT,
            DayOfWeek TEXT NOT NULL,
            DayRelativeToQuincena INTEGER NOT NULL
         );"
    ))?;

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {DIM_CALENDAR} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.month.to_string(),
            row.day.to_string(),
            row.quincena.to_string(),
            row.is_quincena as i64,
            row.prev_quincena.map(|date| date.to_string()),
            row.day.format("%A").to_string(),
            row.day_relative_to_quincena,
        ])?;
    }
    Ok(())
}

fn write_manual_payments(
    tx: &Transaction<'_>,
    rows: Option<&[ManualPaymentRow]>,
) -> Result<(), WarehouseError> {
    let Some(rows) = rows else {
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {ANALYTICS_MANUAL_PAYMENTS} (
                ExternalId TEXT,
                Reference TEXT,
                Amount REAL NOT NULL,
                Status TEXT,
                CreationDate TEXT,
                UpdateDate TEXT
             );"
        ))?;
        return Ok(());
    };

    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {ANALYTICS_MANUAL_PAYMENTS};
         CREATE TABLE {ANALYTICS_MANUAL_PAYMENTS} (
            ExternalId TEXT,
            Reference TEXT,
            Amount REAL NOT NULL,
            Status TEXT,
            CreationDate TEXT,
            UpdateDate TEXT
         );"
    ))?;

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {ANALYTICS_MANUAL_PAYMENTS} VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.external_id,
            row.reference,
            row.amount,
            row.status,
            fmt_utc(row.created_at),
            fmt_utc(row.updated_at),
        ])?;
    }
    Ok(())
}

fn write_manual_transactions(
    tx: &Transaction<'_>,
    rows: Option<&[ManualTransactionRow]>,
) -> Result<(), WarehouseError> {
    let Some(rows) = rows else {
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {ANALYTICS_MANUAL_TRANSACTIONS} (
                ExternalId TEXT,
                Reference TEXT,
                Amount REAL NOT NULL,
                Status TEXT,
                Date TEXT
             );"
        ))?;
        return Ok(());
    };

    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {ANALYTICS_MANUAL_TRANSACTIONS};
         CREATE TABLE {ANALYTICS_MANUAL_TRANSACTIONS} (
            ExternalId TEXT,
            Reference TEXT,
            Amount REAL NOT NULL,
            Status TEXT,
            Date TEXT
         );"
    ))?;

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {ANALYTICS_MANUAL_TRANSACTIONS} VALUES (?1, ?2, ?3, ?4, ?5)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.external_id,
            row.reference,
            row.amount,
            row.status,
            fmt_utc(row.occurred_at),
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar;
    use chrono::NaiveDate;

    fn empty_snapshot<'a>() -> WarehouseSnapshot<'a> {
        WarehouseSnapshot {
            loans: &[],
            strategies: &[],
            calendar: &[],
            manual_payments: Some(&[]),
            manual_transactions: Some(&[]),
        }
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("query prepares");
        stmt.query_map([], |row| row.get::<_, String>(0))
            .expect("query runs")
            .collect::<Result<_, _>>()
            .expect("names collect")
    }

    #[test]
    fn load_creates_every_desired_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = Warehouse::new(dir.path().join("dwh.sqlite"));

        warehouse.load(&empty_snapshot()).expect("load succeeds");

        let conn = Connection::open(warehouse.path()).expect("reopens");
        let names = table_names(&conn);
        for table in DESIRED_TABLES {
            assert!(names.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn calendar_rows_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = Warehouse::new(dir.path().join("dwh.sqlite"));
        let days = calendar::build_calendar(
            NaiveDate::from_ymd_opt(2022, 9, 30).expect("valid date"),
        );

        let snapshot = WarehouseSnapshot {
            calendar: &days,
            ..empty_snapshot()
        };
        warehouse.load(&snapshot).expect("load succeeds");

        let conn = Connection::open(warehouse.path()).expect("reopens");
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {DIM_CALENDAR}"), [], |row| {
                row.get(0)
            })
            .expect("count queries");
        assert_eq!(count, days.len() as i64);
    }

    #[test]
    fn absent_manual_batches_keep_the_previous_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = Warehouse::new(dir.path().join("dwh.sqlite"));

        let payments = vec![ManualPaymentRow {
            external_id: Some("P1".to_string()),
            reference: None,
            amount: 1234.56,
            status: Some("paid".to_string()),
            created_at: None,
            updated_at: None,
        }];
        let snapshot = WarehouseSnapshot {
            manual_payments: Some(&payments),
            ..empty_snapshot()
        };
        warehouse.load(&snapshot).expect("first load succeeds");

        let keep_previous = WarehouseSnapshot {
            manual_payments: None,
            ..empty_snapshot()
        };
        warehouse.load(&keep_previous).expect("second load succeeds");

        let conn = Connection::open(warehouse.path()).expect("reopens");
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {ANALYTICS_MANUAL_PAYMENTS}"),
                [],
                |row| row.get(0),
            )
            .expect("count queries");
        assert_eq!(count, 1);
    }

    #[test]
    fn stale_tables_are_dropped_and_a_backup_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dwh.sqlite");

        {
            let conn = Connection::open(&path).expect("creates");
            conn.execute_batch("CREATE TABLE dim_retired (x INTEGER)")
                .expect("stale table creates");
        }

        let warehouse = Warehouse::new(&path);
        warehouse.load(&empty_snapshot()).expect("load succeeds");

        let conn = Connection::open(&path).expect("reopens");
        assert!(!table_names(&conn).contains(&"dim_retired".to_string()));

        let backups: Vec<_> = fs::read_dir(dir.path())
            .expect("dir lists")
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("dwh_backup_")
            })
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
