//! Upstream extract ingestion.
//!
//! Raw SQL extraction belongs to a separate collaborator; this module
//! consumes its output. The [`ExtractSource`] trait keeps the pipeline
//! runnable against fakes, with [`csv::CsvExtractStore`] as the snapshot
//! implementation and the Drive importer handling manual operator drops.

pub mod csv;
pub mod drive;
pub mod manual_drops;
pub mod records;

use crate::pipeline::aggregator::{ArcusTransaction, OpenpayTransaction, StripeTransaction};
use crate::pipeline::domain::{Loan, StrategyAssignment};

/// Errors raised while reading upstream extracts. Fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read extract file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid extract data: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("loan {loan_id}: missing or malformed {field}")]
    MalformedTimestamp { field: &'static str, loan_id: String },
    #[error("loan {loan_id}: unknown loan status code {code}")]
    UnknownLoanStatus { code: i64, loan_id: String },
    #[error("unknown arcus status code {code}")]
    UnknownArcusStatus { code: i64 },
}

/// Gateway over the upstream extracts the pipeline consumes.
pub trait ExtractSource {
    fn loans(&self) -> Result<Vec<Loan>, ExtractError>;
    fn arcus_transactions(&self) -> Result<Vec<ArcusTransaction>, ExtractError>;
    fn stripe_transactions(&self) -> Result<Vec<StripeTransaction>, ExtractError>;
    fn cash_transactions(&self) -> Result<Vec<OpenpayTransaction>, ExtractError>;
    fn strategy_assignments(&self) -> Result<Vec<StrategyAssignment>, ExtractError>;
}
