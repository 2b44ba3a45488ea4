//! CSV snapshot implementation of [`ExtractSource`].
//!
//! Reads the extract files the database collaborator leaves in the data
//! directory. Loans with a failed disbursement never reach the pipeline,
//! and strategy rows outside the catalogue are dropped with a warning.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::pipeline::aggregator::{ArcusTransaction, OpenpayTransaction, StripeTransaction};
use crate::pipeline::domain::{Loan, LoanStatus, StrategyAssignment};

use super::records::{ArcusRow, LoanRow, OpenpayRow, StripeRow, StrategyRow};
use super::{ExtractError, ExtractSource};

pub const LOANS_FILE: &str = "loans.csv";
pub const ARCUS_FILE: &str = "arcus_transactions.csv";
pub const STRIPE_FILE: &str = "stripe_transactions.csv";
pub const OPENPAY_FILE: &str = "openpay_transactions.csv";
pub const STRATEGIES_FILE: &str = "collections_strategies.csv";

/// Extract store backed by CSV snapshot files in one directory.
#[derive(Debug, Clone)]
pub struct CsvExtractStore {
    data_dir: PathBuf,
}

impl CsvExtractStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn open(&self, file: &str) -> Result<File, ExtractError> {
        Ok(File::open(self.data_dir.join(file))?)
    }
}

fn reader<R: Read>(source: R) -> ::csv::Reader<R> {
    ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_reader(source)
}

/// Parse the loan extract, dropping failed disbursements.
pub fn read_loans<R: Read>(source: R) -> Result<Vec<Loan>, ExtractError> {
    let mut loans = Vec::new();
    for row in reader(source).deserialize::<LoanRow>() {
        let loan = row?.into_loan()?;
        if loan.status == LoanStatus::DisbursementFailed {
            continue;
        }
        loans.push(loan);
    }
    Ok(loans)
}

pub fn read_arcus_transactions<R: Read>(source: R) -> Result<Vec<ArcusTransaction>, ExtractError> {
    reader(source)
        .deserialize::<ArcusRow>()
        .map(|row| row.map_err(ExtractError::from)?.into_transaction())
        .collect()
}

pub fn read_stripe_transactions<R: Read>(source: R) -> Result<Vec<StripeTransaction>, ExtractError> {
    reader(source)
        .deserialize::<StripeRow>()
        .map(|row| Ok(row?.into_transaction()))
        .collect()
}

pub fn read_cash_transactions<R: Read>(source: R) -> Result<Vec<OpenpayTransaction>, ExtractError> {
    reader(source)
        .deserialize::<OpenpayRow>()
        .map(|row| Ok(row?.into_transaction()))
        .collect()
}

pub fn read_strategy_assignments<R: Read>(
    source: R,
) -> Result<Vec<StrategyAssignment>, ExtractError> {
    let mut assignments = Vec::new();
    for row in reader(source).deserialize::<StrategyRow>() {
        let row = row?;
        let code = row.strategy;
        match row.into_assignment() {
            Some(assignment) => assignments.push(assignment),
            None => warn!(code, "skipping strategy row outside the catalogue"),
        }
    }
    Ok(assignments)
}

impl ExtractSource for CsvExtractStore {
    fn loans(&self) -> Result<Vec<Loan>, ExtractError> {
        read_loans(self.open(LOANS_FILE)?)
    }

    fn arcus_transactions(&self) -> Result<Vec<ArcusTransaction>, ExtractError> {
        read_arcus_transactions(self.open(ARCUS_FILE)?)
    }

    fn stripe_transactions(&self) -> Result<Vec<StripeTransaction>, ExtractError> {
        read_stripe_transactions(self.open(STRIPE_FILE)?)
    }

    fn cash_transactions(&self) -> Result<Vec<OpenpayTransaction>, ExtractError> {
        read_cash_transactions(self.open(OPENPAY_FILE)?)
    }

    fn strategy_assignments(&self) -> Result<Vec<StrategyAssignment>, ExtractError> {
        read_strategy_assignments(self.open(STRATEGIES_FILE)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::domain::{CollectionStrategy, LoanId};
    use std::io::Cursor;

    #[test]
    fn reads_loans_and_drops_failed_disbursements() {
        let csv = "UserId,UserLoanId,IssueDate,ModifiedAt,DueDate,PrincipalAmount,Fee,LateFee,LoanStatus,IsLate,LoanNumber,FeeRatio,JitOfferPolicy,CreditPolicy,MlScore\n\
U1,L1,2025-01-01 10:00:00,2025-01-02 10:00:00,2025-01-15 00:00:00,1000,150,0,2,0,1,0.15,1,16,0.83\n\
U2,L2,2025-01-03 10:00:00,2025-01-03 10:00:00,2025-01-17 00:00:00,500,75,,6,0,2,,,,\n";

        let loans = read_loans(Cursor::new(csv)).expect("loans parse");
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].loan_id, LoanId("L1".to_string()));
        assert_eq!(loans[0].status, LoanStatus::Repaid);
        assert_eq!(loans[0].fee_ratio, Some(0.15));
    }

    #[test]
    fn malformed_completion_timestamps_become_null() {
        let csv = "UserLoanId,Amount,Status,IsDistribution,CompletedAt\n\
L1,500,1,0,bogus\n";

        let txs = read_arcus_transactions(Cursor::new(csv)).expect("arcus parses");
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].completed_at, None);
        assert_eq!(txs[0].amount, 500.0);
    }

    #[test]
    fn unlinked_stripe_rows_keep_a_null_loan_id() {
        let csv = "UserLoanId,Amount,Status,CreatedAt,DisputeStatus\n\
,500,1,2025-01-05 00:00:00,\n\
L9,250,1,2025-01-06 00:00:00,2\n";

        let txs = read_stripe_transactions(Cursor::new(csv)).expect("stripe parses");
        assert_eq!(txs[0].loan_id, None);
        assert_eq!(txs[1].dispute_status, Some(2));
    }

    #[test]
    fn strategy_rows_outside_the_catalogue_are_skipped() {
        let csv = "UserLoanId,Strategy,CreatedAt,IsDeleted\n\
L1,3,2025-01-05 00:00:00,0\n\
L1,99,2025-01-06 00:00:00,0\n\
L1,14,,1\n";

        let rows = read_strategy_assignments(Cursor::new(csv)).expect("strategies parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].strategy, CollectionStrategy::Cmd);
        assert!(rows[1].is_deleted);
        assert_eq!(rows[1].assigned_at, None);
    }
}
