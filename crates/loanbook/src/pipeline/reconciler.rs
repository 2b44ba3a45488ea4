//! Repayment reconciliation.
//!
//! Merges a loan with its channel aggregates into the paid totals,
//! settlement timestamp, and days past due. The one deliberate mutation of
//! upstream data lives here: a loan the source system already marked
//! Repaid is raised to its full due amount when the recorded payments fall
//! short, with the uncorrected total preserved for audit.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::aggregator::PaymentAggregates;
use super::domain::{Loan, LoanStatus};
use crate::time;

/// Derived repayment figures for one loan.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub total_amount_due: f64,
    pub total_amount_paid: f64,
    pub total_original_amount_paid: f64,
    pub last_paid_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub settled_at_cdmx: Option<NaiveDateTime>,
    pub days_late: i64,
}

/// Reconcile one loan against its payment aggregates.
///
/// `now_cdmx` is the evaluation instant in the reporting zone; passing it
/// in keeps the function pure and runs reproducible.
pub fn reconcile(loan: &Loan, payments: &PaymentAggregates, now_cdmx: NaiveDateTime) -> Reconciliation {
    let total_amount_due = loan.due_breakdown().total();

    let total_original_amount_paid = payments.arcus.amount_paid
        + payments.stripe.amount_paid
        + payments.cash.amount_paid
        - payments.dispute_amount;

    let total_amount_paid = if loan.status == LoanStatus::Repaid
        && total_original_amount_paid < total_amount_due
    {
        total_amount_due
    } else {
        total_original_amount_paid
    };

    let last_paid_at = [
        payments.arcus.last_paid_at,
        payments.stripe.last_paid_at,
        payments.cash.last_paid_at,
    ]
    .into_iter()
    .flatten()
    .max();

    let (settled_at, settled_at_cdmx) = match (loan.status, last_paid_at) {
        (LoanStatus::Repaid, Some(paid_at)) => (Some(paid_at), Some(time::to_cdmx(paid_at))),
        // Repaid with no payment on record: assume settlement on the due date.
        (LoanStatus::Repaid, None) => {
            (Some(time::cdmx_to_utc(loan.due_date)), Some(loan.due_date))
        }
        _ => (None, None),
    };

    let reference = settled_at_cdmx.unwrap_or(now_cdmx);
    let days_late = time::whole_days_between(reference, loan.due_date).max(0);

    Reconciliation {
        total_amount_due,
        total_amount_paid,
        total_original_amount_paid,
        last_paid_at,
        settled_at,
        settled_at_cdmx,
        days_late,
    }
}
