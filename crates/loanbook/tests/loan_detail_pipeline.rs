use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::io::Cursor;

use loanbook::pipeline::domain::{CollectionStrategy, LoanId, ReconciledLoan};
use loanbook::pipeline::{build_loan_detail, PipelineInputs};
use loanbook::sources::csv::{
    read_arcus_transactions, read_cash_transactions, read_loans, read_strategy_assignments,
    read_stripe_transactions,
};

const LOANS_CSV: &str = "\
UserId,UserLoanId,IssueDate,ModifiedAt,DueDate,PrincipalAmount,Fee,LateFee,LoanStatus,IsLate,LoanNumber,FeeRatio,JitOfferPolicy,CreditPolicy,MlScore
U1,L1,2024-12-27 18:00:00,2025-01-09 12:00:00,2025-01-10 00:00:00,1000,150,0,2,0,1,0.15,1,16,0.91
U1,L2,2025-01-02 18:00:00,2025-01-12 15:00:00,2025-01-10 00:00:00,1000,150,0,2,0,2,0.15,,,
U2,L3,2025-02-14 18:00:00,2025-02-14 18:00:00,2025-03-01 00:00:00,2000,300,0,1,0,1,0.15,,,
U3,L4,2024-12-20 18:00:00,2025-01-20 18:00:00,2025-01-10 00:00:00,1000,150,80,5,1,1,0.15,,,
U4,L5,2025-02-01 18:00:00,2025-02-01 18:00:00,2025-02-20 00:00:00,800,120,0,1,0,3,0.15,,,
";

const ARCUS_CSV: &str = "\
UserLoanId,Amount,Status,IsDistribution,CompletedAt
L1,500,1,0,2025-01-08 10:00:00
L1,9999,1,1,2025-01-08 11:00:00
L4,92.8,1,0,2025-01-11 10:00:00
";

const STRIPE_CSV: &str = "\
UserLoanId,Amount,Status,CreatedAt,DisputeStatus
L1,674,1,2025-01-09 12:00:00,
L5,400,1,2025-02-10 12:00:00,
L5,150,1,2025-02-11 12:00:00,2
";

const OPENPAY_CSV: &str = "\
UserLoanId,Amount,Status,IsDistribution,CreatedAt
L2,100,2,0,2025-01-12 15:00:00
";

const STRATEGIES_CSV: &str = "\
UserLoanId,Strategy,CreatedAt,IsDeleted
L4,3,2025-01-12 10:00:00,0
L4,4,2025-01-15 10:00:00,1
L4,14,2025-02-01 10:00:00,0
";

fn inputs() -> PipelineInputs {
    PipelineInputs {
        loans: read_loans(Cursor::new(LOANS_CSV)).expect("loans parse"),
        arcus_transactions: read_arcus_transactions(Cursor::new(ARCUS_CSV))
            .expect("arcus parses"),
        stripe_transactions: read_stripe_transactions(Cursor::new(STRIPE_CSV))
            .expect("stripe parses"),
        cash_transactions: read_cash_transactions(Cursor::new(OPENPAY_CSV))
            .expect("openpay parses"),
        strategy_assignments: read_strategy_assignments(Cursor::new(STRATEGIES_CSV))
            .expect("strategies parse"),
    }
}

/// 2025-03-03 08:00 in Mexico City.
fn evaluation_instant() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 14, 0, 0).single().expect("valid")
}

fn build() -> Vec<ReconciledLoan> {
    build_loan_detail(&inputs(), evaluation_instant())
}

fn row<'a>(rows: &'a [ReconciledLoan], id: &str) -> &'a ReconciledLoan {
    rows.iter()
        .find(|row| row.loan.loan_id == LoanId(id.to_string()))
        .unwrap_or_else(|| panic!("row {id} present"))
}

fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
        .and_hms_opt(h, min, 0)
        .expect("valid time")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.005,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn output_keeps_one_row_per_loan_in_input_order() {
    let rows = build();
    let ids: Vec<&str> = rows.iter().map(|row| row.loan.loan_id.0.as_str()).collect();
    assert_eq!(ids, vec!["L1", "L2", "L3", "L4", "L5"]);
}

#[test]
fn fully_paid_repaid_loan_settles_on_its_last_payment() {
    let rows = build();
    let l1 = row(&rows, "L1");

    assert_close(l1.total_amount_due, 1174.0);
    assert_close(l1.total_amount_paid, 1174.0);
    assert_close(l1.arcus.amount_paid, 500.0);
    assert_close(l1.stripe.amount_paid, 674.0);
    // 2025-01-09 12:00 UTC is 06:00 in Mexico City, before the due date.
    assert_eq!(l1.settled_at_cdmx, Some(naive(2025, 1, 9, 6, 0)));
    assert_eq!(l1.days_late, 0);

    assert_close(l1.apportionment.fee_paid, 150.0);
    assert_close(l1.apportionment.tax_on_fee_paid, 24.0);
    assert_close(l1.apportionment.principal_paid, 1000.0);
    assert_close(l1.apportionment.late_fee_paid, 0.0);
}

#[test]
fn repaid_underpayment_is_corrected_but_audited() {
    let rows = build();
    let l2 = row(&rows, "L2");

    assert_close(l2.total_amount_paid, 1174.0);
    assert_close(l2.total_original_amount_paid, 100.0);
    // The corrected total apportions in full.
    assert_close(l2.apportionment.total(), 1174.0);
    assert_eq!(l2.days_late, 2);
}

#[test]
fn unsettled_loan_past_grace_enters_post_dd_with_the_voice_fallback() {
    let rows = build();
    let l3 = row(&rows, "L3");

    assert!(l3.is_post_dd);
    assert_eq!(l3.settled_at_cdmx, None);
    assert_eq!(l3.days_late, 2);
    assert_eq!(l3.collections.strategy, None);
    assert_eq!(l3.collections.strategy_name, "Twilio");
}

#[test]
fn late_fee_payment_apportions_before_fee_and_principal() {
    let rows = build();
    let l4 = row(&rows, "L4");

    assert_close(l4.total_amount_due, 1000.0 + 150.0 + 24.0 + 80.0 + 12.8);
    assert_close(l4.apportionment.late_fee_paid, 80.0);
    assert_close(l4.apportionment.tax_on_late_fee_paid, 12.8);
    assert_close(l4.apportionment.fee_paid, 0.0);
    assert_close(l4.apportionment.principal_paid, 0.0);
}

#[test]
fn soft_deleted_strategy_loses_to_the_older_survivor() {
    let rows = build();
    let l4 = row(&rows, "L4");

    assert_eq!(l4.collections.strategy, Some(CollectionStrategy::Cmd));
    // CMD is explicitly post due date.
    assert!(l4.is_post_dd);
    // The survivor keeps its recorded assignment time (04:00 CDMX).
    assert_eq!(l4.collections.assigned_at_cdmx, Some(naive(2025, 1, 12, 4, 0)));

    let test = l4
        .collections
        .late_stage_test
        .as_ref()
        .expect("late stage test attached");
    assert_eq!(test.strategy, CollectionStrategy::PypperLate20);
}

#[test]
fn disputed_stripe_amounts_subtract_from_the_total() {
    let rows = build();
    let l5 = row(&rows, "L5");

    assert_close(l5.stripe.amount_paid, 550.0);
    assert_close(l5.dispute_amount, 150.0);
    assert_close(l5.total_amount_paid, 400.0);
    assert_close(l5.total_original_amount_paid, 400.0);
}

#[test]
fn rerunning_on_unchanged_inputs_is_bit_identical() {
    let first = build();
    let second = build();
    assert_eq!(first, second);
}

#[test]
fn apportioned_buckets_always_reconcile_with_the_paid_total() {
    for row in build() {
        let split = &row.apportionment;
        let expected = row.total_amount_paid.min(row.total_amount_due).max(0.0);
        assert!(
            (split.total() - expected).abs() < 0.01,
            "loan {}: buckets {} vs expected {expected}",
            row.loan.loan_id,
            split.total()
        );
        assert!(split.principal_paid >= 0.0);
        assert!(split.fee_paid >= 0.0);
        assert!(split.late_fee_paid >= 0.0);
        assert!(row.days_late >= 0);
    }
}
