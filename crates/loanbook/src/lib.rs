//! Batch ETL engine for consumer-lending repayment analytics.
//!
//! Each run rebuilds the reconciled loan table from upstream extracts:
//! per-channel payment aggregation, repayment reconciliation, a strict
//! apportionment waterfall, delinquency classification, and collections
//! strategy deduplication, followed by a warehouse load and finance
//! report exports. See the `pipeline` module for the core stages and
//! `sources`/`warehouse`/`report` for the boundary adapters.

pub mod calendar;
pub mod config;
pub mod error;
pub mod metabase;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod telemetry;
pub mod time;
pub mod warehouse;

pub use error::AppError;
pub use pipeline::domain::ReconciledLoan;
pub use pipeline::{build_loan_detail, PipelineInputs};
