//! Accounting views over the reconciled loan table.
//!
//! Finance closes its books on complete calendar months in Mexico City
//! civil time, so every summary cuts at the last day of the month before
//! the evaluation date. The per-loan audit fields keep the silent
//! repayment correction visible: underpayment is judged against the
//! preserved original total, never the corrected one.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::pipeline::apportionment::round2;
use crate::pipeline::domain::{LoanStatus, ReconciledLoan};

/// Detail exports only cover loans issued from this date on.
const DETAIL_ISSUE_CUTOFF: (i32, u32, u32) = (2025, 1, 1);

/// Whether a settled loan originally paid less than it owed.
pub fn underpaid_flag(row: &ReconciledLoan) -> bool {
    row.loan.status == LoanStatus::Repaid
        && row.total_original_amount_paid < row.total_amount_due
}

/// The amount paid beyond the due total, if any.
pub fn overpaid_amount(row: &ReconciledLoan) -> f64 {
    if row.total_amount_paid > row.total_amount_due {
        round2(row.total_amount_paid - row.total_amount_due)
    } else {
        0.0
    }
}

/// The paid amount that actually lands in the apportionment buckets.
pub fn apportioned_amount_paid(row: &ReconciledLoan) -> f64 {
    round2(row.total_amount_paid.min(row.total_amount_due))
}

/// Floor a civil datetime to the first day of its month.
pub fn month_floor(ts: NaiveDateTime) -> NaiveDate {
    NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1).expect("month start exists")
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("month start exists")
}

/// The last day of the month before `today`.
pub fn last_day_of_previous_month(today: NaiveDate) -> NaiveDate {
    first_of_month(today) - Duration::days(1)
}

fn months_back(month_start: NaiveDate, months: u32) -> NaiveDate {
    let total = month_start.year() * 12 + month_start.month0() as i32 - months as i32;
    NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)
        .expect("month start exists")
}

/// One row of the monthly origination summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyOrigination {
    pub issue_month_cdmx: NaiveDate,
    pub principal_amount: f64,
    pub fee: f64,
    pub tax_on_fee: f64,
    pub late_fee: f64,
    pub tax_on_late_fee: f64,
    pub total_amount_due: f64,
    pub principal_paid: f64,
    pub fee_paid: f64,
    pub tax_on_fee_paid: f64,
    pub late_fee_paid: f64,
    pub tax_on_late_fee_paid: f64,
    pub apportioned_amount_paid: f64,
}

/// One row of the monthly settlement summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySettlement {
    pub settled_month_cdmx: NaiveDate,
    pub principal_paid: f64,
    pub fee_paid: f64,
    pub tax_on_fee_paid: f64,
    pub late_fee_paid: f64,
    pub tax_on_late_fee_paid: f64,
    pub apportioned_amount_paid: f64,
    pub dispute_amount: f64,
}

/// One loan in the rolling three-month detail export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanDetailRow {
    pub user_id: String,
    pub user_loan_id: String,
    pub issue_month_cdmx: NaiveDate,
    pub issue_date_cdmx: NaiveDateTime,
    pub due_date: NaiveDateTime,
    pub loan_status: i64,
    pub loan_number: u32,
    pub principal_amount: f64,
    pub fee: f64,
    pub tax_on_fee: f64,
    pub late_fee: f64,
    pub tax_on_late_fee: f64,
    pub fee_ratio: Option<f64>,
    pub total_amount_due: f64,
    pub total_amount_paid: f64,
    pub apportioned_amount_paid: f64,
    pub overpaid_amount: f64,
    pub underpaid_flag: bool,
    pub principal_paid: f64,
    pub fee_paid: f64,
    pub tax_on_fee_paid: f64,
    pub late_fee_paid: f64,
    pub tax_on_late_fee_paid: f64,
    pub dispute_amount: f64,
    pub settled_at_cdmx: Option<NaiveDateTime>,
    pub days_late: i64,
}

/// The full accounting bundle for one evaluation date.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountingReport {
    pub origination: Vec<MonthlyOrigination>,
    pub settlements: Vec<MonthlySettlement>,
    pub detail: Vec<LoanDetailRow>,
    pub detail_window_start: NaiveDate,
    pub detail_window_end: NaiveDate,
}

#[derive(Debug, Default)]
struct BucketSums {
    principal: f64,
    fee: f64,
    tax_on_fee: f64,
    late_fee: f64,
    tax_on_late_fee: f64,
    total_due: f64,
    principal_paid: f64,
    fee_paid: f64,
    tax_on_fee_paid: f64,
    late_fee_paid: f64,
    tax_on_late_fee_paid: f64,
    apportioned_paid: f64,
    dispute: f64,
}

impl BucketSums {
    fn add(&mut self, row: &ReconciledLoan) {
        let due = row.loan.due_breakdown();
        self.principal += due.principal;
        self.fee += due.fee;
        self.tax_on_fee += due.tax_on_fee;
        self.late_fee += due.late_fee;
        self.tax_on_late_fee += due.tax_on_late_fee;
        self.total_due += row.total_amount_due;
        self.principal_paid += row.apportionment.principal_paid;
        self.fee_paid += row.apportionment.fee_paid;
        self.tax_on_fee_paid += row.apportionment.tax_on_fee_paid;
        self.late_fee_paid += row.apportionment.late_fee_paid;
        self.tax_on_late_fee_paid += row.apportionment.tax_on_late_fee_paid;
        self.apportioned_paid += apportioned_amount_paid(row);
        self.dispute += row.dispute_amount;
    }
}

/// Build the accounting bundle from reconciled rows.
pub fn build_report(rows: &[ReconciledLoan], today: NaiveDate) -> AccountingReport {
    let cutoff = last_day_of_previous_month(today);
    let detail_window_start = months_back(first_of_month(cutoff), 2);
    let detail_window_end = first_of_month(cutoff);
    let (cy, cm, cd) = DETAIL_ISSUE_CUTOFF;
    let issue_cutoff = NaiveDate::from_ymd_opt(cy, cm, cd).expect("cutoff is a valid date");

    let mut origination: BTreeMap<NaiveDate, BucketSums> = BTreeMap::new();
    let mut settlements: BTreeMap<NaiveDate, BucketSums> = BTreeMap::new();
    let mut detail = Vec::new();

    for row in rows {
        let issue_month = month_floor(row.issued_at_cdmx());
        if issue_month < cutoff {
            origination.entry(issue_month).or_default().add(row);
        }

        if let Some(settled) = row.settled_at_cdmx {
            let settled_month = month_floor(settled);
            if settled_month <= cutoff {
                settlements.entry(settled_month).or_default().add(row);
            }
        }

        if issue_month >= issue_cutoff
            && issue_month >= detail_window_start
            && issue_month <= detail_window_end
        {
            detail.push(detail_row(row, issue_month));
        }
    }

    AccountingReport {
        origination: origination
            .into_iter()
            .map(|(month, sums)| MonthlyOrigination {
                issue_month_cdmx: month,
                principal_amount: round2(sums.principal),
                fee: round2(sums.fee),
                tax_on_fee: round2(sums.tax_on_fee),
                late_fee: round2(sums.late_fee),
                tax_on_late_fee: round2(sums.tax_on_late_fee),
                total_amount_due: round2(sums.total_due),
                principal_paid: round2(sums.principal_paid),
                fee_paid: round2(sums.fee_paid),
                tax_on_fee_paid: round2(sums.tax_on_fee_paid),
                late_fee_paid: round2(sums.late_fee_paid),
                tax_on_late_fee_paid: round2(sums.tax_on_late_fee_paid),
                apportioned_amount_paid: round2(sums.apportioned_paid),
            })
            .collect(),
        settlements: settlements
            .into_iter()
            .map(|(month, sums)| MonthlySettlement {
                settled_month_cdmx: month,
                principal_paid: round2(sums.principal_paid),
                fee_paid: round2(sums.fee_paid),
                tax_on_fee_paid: round2(sums.tax_on_fee_paid),
                late_fee_paid: round2(sums.late_fee_paid),
                tax_on_late_fee_paid: round2(sums.tax_on_late_fee_paid),
                apportioned_amount_paid: round2(sums.apportioned_paid),
                dispute_amount: round2(sums.dispute),
            })
            .collect(),
        detail,
        detail_window_start,
        detail_window_end,
    }
}

fn detail_row(row: &ReconciledLoan, issue_month: NaiveDate) -> LoanDetailRow {
    let loan = &row.loan;
    let due = loan.due_breakdown();
    let fee_ratio = if loan.principal > 0.0 {
        Some(loan.fee / loan.principal)
    } else {
        None
    };

    LoanDetailRow {
        user_id: loan.borrower_id.0.clone(),
        user_loan_id: loan.loan_id.0.clone(),
        issue_month_cdmx: issue_month,
        issue_date_cdmx: row.issued_at_cdmx(),
        due_date: loan.due_date,
        loan_status: loan.status.code(),
        loan_number: loan.loan_number,
        principal_amount: loan.principal,
        fee: loan.fee,
        tax_on_fee: due.tax_on_fee,
        late_fee: due.late_fee,
        tax_on_late_fee: due.tax_on_late_fee,
        fee_ratio,
        total_amount_due: row.total_amount_due,
        total_amount_paid: row.total_amount_paid,
        apportioned_amount_paid: apportioned_amount_paid(row),
        overpaid_amount: overpaid_amount(row),
        underpaid_flag: underpaid_flag(row),
        principal_paid: row.apportionment.principal_paid,
        fee_paid: row.apportionment.fee_paid,
        tax_on_fee_paid: row.apportionment.tax_on_fee_paid,
        late_fee_paid: row.apportionment.late_fee_paid,
        tax_on_late_fee_paid: row.apportionment.tax_on_late_fee_paid,
        dispute_amount: row.dispute_amount,
        settled_at_cdmx: row.settled_at_cdmx,
        days_late: row.days_late,
    }
}
