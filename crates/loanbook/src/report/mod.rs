//! Finance-facing reporting on top of the reconciled loan table.
//!
//! `accounting` builds the monthly views and audit fields; `export`
//! renders them as CSV workbooks and publishes them to Drive.

pub mod accounting;
pub mod export;

use crate::sources::drive::DriveOperationError;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Drive(#[from] DriveOperationError),
    #[error("failed to render report csv: {0}")]
    Render(#[from] csv::Error),
}
