//! CSV workbook rendering and Drive publication.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::sources::drive::DriveGateway;

use super::accounting::AccountingReport;
use super::ReportError;

/// Destination folders for the published workbooks.
#[derive(Debug, Clone)]
pub struct ReportFolders {
    pub accounting_folder_id: String,
    pub settled_folder_id: String,
    pub loan_detail_folder_id: String,
}

/// Drive file ids of one published report bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReports {
    pub accounting_file_id: String,
    pub settled_file_id: String,
    pub loan_detail_file_id: String,
}

/// Render serializable rows into CSV bytes.
pub fn render_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| ReportError::Render(csv::Error::from(err.into_error())))
}

/// Publisher for the accounting bundle.
#[derive(Debug)]
pub struct ReportExporter<'a> {
    gateway: &'a dyn DriveGateway,
    folders: ReportFolders,
}

impl<'a> ReportExporter<'a> {
    pub fn new(gateway: &'a dyn DriveGateway, folders: ReportFolders) -> Self {
        Self { gateway, folders }
    }

    /// Upload the three workbooks with timestamped filenames.
    pub fn publish(
        &self,
        report: &AccountingReport,
        now: DateTime<Utc>,
    ) -> Result<PublishedReports, ReportError> {
        let stamp = now.format("%Y%m%d_%H%M%S");

        let accounting_file_id = self.gateway.upload_workbook(
            &self.folders.accounting_folder_id,
            &format!("accounting_cdmx_{stamp}.csv"),
            render_csv(&report.origination)?,
        )?;

        let settled_file_id = self.gateway.upload_workbook(
            &self.folders.settled_folder_id,
            &format!("settled_cdmx_{stamp}.csv"),
            render_csv(&report.settlements)?,
        )?;

        let loan_detail_file_id = self.gateway.upload_workbook(
            &self.folders.loan_detail_folder_id,
            &format!(
                "loan_origination_repayment_detail_{}_to_{}.csv",
                report.detail_window_start, report.detail_window_end
            ),
            render_csv(&report.detail)?,
        )?;

        info!(
            origination_months = report.origination.len(),
            settlement_months = report.settlements.len(),
            detail_rows = report.detail.len(),
            "accounting reports published"
        );

        Ok(PublishedReports {
            accounting_file_id,
            settled_file_id,
            loan_detail_file_id,
        })
    }
}
