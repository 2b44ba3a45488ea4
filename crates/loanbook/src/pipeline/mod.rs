//! Loan repayment reconciliation pipeline.
//!
//! Stages run as pure transformations over immutable snapshots: channel
//! aggregation, reconciliation, apportionment, delinquency classification,
//! and strategy deduplication, in that order. Each loan's computation is
//! independent of every other loan's, and the output preserves input loan
//! cardinality: one reconciled row per loan.

pub mod aggregator;
pub mod apportionment;
pub mod delinquency;
pub mod domain;
pub mod reconciler;
pub mod strategy;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::time;
use aggregator::{ArcusTransaction, OpenpayTransaction, PaymentLedger, StripeTransaction};
use domain::{Loan, LoanId, ReconciledLoan, StrategyAssignment};

/// Immutable snapshot of every extract the pipeline consumes.
#[derive(Debug, Default)]
pub struct PipelineInputs {
    pub loans: Vec<Loan>,
    pub arcus_transactions: Vec<ArcusTransaction>,
    pub stripe_transactions: Vec<StripeTransaction>,
    pub cash_transactions: Vec<OpenpayTransaction>,
    pub strategy_assignments: Vec<StrategyAssignment>,
}

/// Build the reconciled loan table for one run.
///
/// `now` is the evaluation instant; the same inputs and instant always
/// produce the same table.
pub fn build_loan_detail(inputs: &PipelineInputs, now: DateTime<Utc>) -> Vec<ReconciledLoan> {
    let now_cdmx = time::to_cdmx(now);

    let ledger = PaymentLedger::aggregate(
        &inputs.arcus_transactions,
        &inputs.stripe_transactions,
        &inputs.cash_transactions,
    );

    let mut assignments_by_loan: HashMap<&LoanId, Vec<&StrategyAssignment>> = HashMap::new();
    for row in &inputs.strategy_assignments {
        assignments_by_loan.entry(&row.loan_id).or_default().push(row);
    }

    let rows: Vec<ReconciledLoan> = inputs
        .loans
        .iter()
        .map(|loan| {
            let payments = ledger.for_loan(&loan.loan_id);
            let recon = reconciler::reconcile(loan, &payments, now_cdmx);
            let split = apportionment::apportion(recon.total_amount_paid, &loan.due_breakdown());

            let empty = Vec::new();
            let assignments = assignments_by_loan.get(&loan.loan_id).unwrap_or(&empty);
            let (is_post_dd, collections) = strategy::resolve_collections(
                assignments,
                loan.due_date,
                recon.settled_at_cdmx,
                now_cdmx,
            );

            ReconciledLoan {
                cohort: loan.cohort(),
                loan: loan.clone(),
                arcus: payments.arcus,
                stripe: payments.stripe,
                cash: payments.cash,
                dispute_amount: payments.dispute_amount,
                total_amount_due: recon.total_amount_due,
                total_amount_paid: recon.total_amount_paid,
                total_original_amount_paid: recon.total_original_amount_paid,
                last_paid_at: recon.last_paid_at,
                settled_at: recon.settled_at,
                settled_at_cdmx: recon.settled_at_cdmx,
                days_late: recon.days_late,
                apportionment: split,
                is_post_dd,
                collections,
            }
        })
        .collect();

    info!(
        loans = rows.len(),
        post_dd = rows.iter().filter(|row| row.is_post_dd).count(),
        "reconciled loan table built"
    );

    rows
}
