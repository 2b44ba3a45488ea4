//! Manual operator drops from Google Drive.
//!
//! Operations uploads raw channel exports into dated subfolders
//! (`payments_YYYYMMDD`, `transactions_YYYYMMDD`). Each export carries a
//! trailing totals row and amounts in cents. Folders are processed once;
//! a local log file remembers which ids have already been ingested so
//! re-runs only pick up new drops.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::drive::{DriveGateway, DriveOperationError};
use super::records::parse_utc_timestamp;

pub const PAYMENTS_FOLDER_PREFIX: &str = "payments_";
pub const TRANSACTIONS_FOLDER_PREFIX: &str = "transactions_";

#[derive(Debug, thiserror::Error)]
pub enum DriveImportError {
    #[error(transparent)]
    Drive(#[from] DriveOperationError),
    #[error("failed to read or update the processed-folder log: {0}")]
    Log(#[from] std::io::Error),
}

/// One row of a manual payments export.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualPaymentRow {
    pub external_id: Option<String>,
    pub reference: Option<String>,
    pub amount: f64,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row of a manual transactions export.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualTransactionRow {
    pub external_id: Option<String>,
    pub reference: Option<String>,
    pub amount: f64,
    pub status: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Result of one import pass over a drop folder tree.
#[derive(Debug, Default)]
pub struct ManualDropBatch<T> {
    pub rows: Vec<T>,
    pub processed_folders: Vec<String>,
    pub skipped_files: usize,
}

#[derive(Debug, Deserialize)]
struct PaymentCsvRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    amount: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    update_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionCsvRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    amount: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

/// Importer for manual channel exports dropped into Drive.
#[derive(Debug)]
pub struct ManualDropImporter<'a> {
    gateway: &'a dyn DriveGateway,
    processed_log: PathBuf,
}

impl<'a> ManualDropImporter<'a> {
    pub fn new<P: AsRef<Path>>(gateway: &'a dyn DriveGateway, processed_log: P) -> Self {
        Self {
            gateway,
            processed_log: processed_log.as_ref().to_path_buf(),
        }
    }

    pub fn import_payments(
        &self,
        root_folder_id: &str,
    ) -> Result<ManualDropBatch<ManualPaymentRow>, DriveImportError> {
        self.import(root_folder_id, PAYMENTS_FOLDER_PREFIX, |content, skipped| {
            parse_export::<PaymentCsvRow>(content, skipped)
                .into_iter()
                .map(|row| ManualPaymentRow {
                    external_id: row.id,
                    reference: row.reference,
                    amount: row.amount / 100.0,
                    status: row.status,
                    created_at: row.creation_date.as_deref().and_then(parse_utc_timestamp),
                    updated_at: row.update_date.as_deref().and_then(parse_utc_timestamp),
                })
                .collect()
        })
    }

    pub fn import_transactions(
        &self,
        root_folder_id: &str,
    ) -> Result<ManualDropBatch<ManualTransactionRow>, DriveImportError> {
        self.import(root_folder_id, TRANSACTIONS_FOLDER_PREFIX, |content, skipped| {
            parse_export::<TransactionCsvRow>(content, skipped)
                .into_iter()
                .map(|row| ManualTransactionRow {
                    external_id: row.id,
                    reference: row.reference,
                    amount: row.amount / 100.0,
                    status: row.status,
                    occurred_at: row.date.as_deref().and_then(parse_utc_timestamp),
                })
                .collect()
        })
    }

    fn import<T, F>(
        &self,
        root_folder_id: &str,
        prefix: &str,
        parse: F,
    ) -> Result<ManualDropBatch<T>, DriveImportError>
    where
        F: Fn(&[u8], &mut usize) -> Vec<T>,
    {
        let processed = self.read_processed_log()?;

        let mut folders: Vec<_> = self
            .gateway
            .list_folder(root_folder_id)?
            .into_iter()
            .filter(|entry| entry.is_folder() && entry.name.starts_with(prefix))
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));

        let mut batch = ManualDropBatch {
            rows: Vec::new(),
            processed_folders: Vec::new(),
            skipped_files: 0,
        };

        for folder in folders {
            if processed.contains(&folder.file_id) {
                continue;
            }
            info!(folder = %folder.name, "processing manual drop folder");

            for file in self.gateway.list_folder(&folder.file_id)? {
                if !file.name.to_ascii_lowercase().ends_with(".csv") {
                    continue;
                }
                match self.gateway.download(&file.file_id) {
                    Ok(content) => {
                        let parsed = parse(&content, &mut batch.skipped_files);
                        batch.rows.extend(parsed);
                    }
                    Err(err) => {
                        warn!(file = %file.name, error = %err, "skipping unreadable drop file");
                        batch.skipped_files += 1;
                    }
                }
            }

            batch.processed_folders.push(folder.file_id);
        }

        self.append_processed_log(&batch.processed_folders)?;
        Ok(batch)
    }

    fn read_processed_log(&self) -> Result<HashSet<String>, std::io::Error> {
        if !self.processed_log.exists() {
            return Ok(HashSet::new());
        }
        let content = fs::read_to_string(&self.processed_log)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn append_processed_log(&self, folder_ids: &[String]) -> Result<(), std::io::Error> {
        if folder_ids.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.processed_log.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.processed_log)?;
        for folder_id in folder_ids {
            writeln!(log, "{folder_id}")?;
        }
        Ok(())
    }
}

/// Parse one export, dropping the trailing totals row.
///
/// Files with one data row or fewer carry no transactions and are skipped.
fn parse_export<T: for<'de> Deserialize<'de>>(content: &[u8], skipped: &mut usize) -> Vec<T> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content);

    let mut rows: Vec<T> = Vec::new();
    for row in reader.deserialize::<T>() {
        match row {
            Ok(row) => rows.push(row),
            Err(err) => {
                warn!(error = %err, "dropping malformed manual drop row");
            }
        }
    }

    if rows.len() <= 1 {
        *skipped += 1;
        return Vec::new();
    }

    rows.pop();
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::drive::DriveFileMeta;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeDrive {
        folders: HashMap<String, Vec<DriveFileMeta>>,
        files: HashMap<String, Vec<u8>>,
        downloads: Mutex<Vec<String>>,
    }

    impl FakeDrive {
        fn folder(id: &str, name: &str) -> DriveFileMeta {
            DriveFileMeta {
                file_id: id.to_string(),
                name: name.to_string(),
                mime_type: Some(super::super::drive::FOLDER_MIME_TYPE.to_string()),
            }
        }

        fn file(id: &str, name: &str) -> DriveFileMeta {
            DriveFileMeta {
                file_id: id.to_string(),
                name: name.to_string(),
                mime_type: Some("text/csv".to_string()),
            }
        }
    }

    impl DriveGateway for FakeDrive {
        fn list_folder(&self, folder_id: &str) -> Result<Vec<DriveFileMeta>, DriveOperationError> {
            Ok(self.folders.get(folder_id).cloned().unwrap_or_default())
        }

        fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveOperationError> {
            self.downloads.lock().expect("lock").push(file_id.to_string());
            self.files
                .get(file_id)
                .cloned()
                .ok_or_else(|| DriveOperationError::Backend("missing file".to_string()))
        }

        fn upload_workbook(
            &self,
            _folder_id: &str,
            _filename: &str,
            _content: Vec<u8>,
        ) -> Result<String, DriveOperationError> {
            Ok("uploaded".to_string())
        }
    }

    const PAYMENTS_CSV: &str = "id,reference,amount,status,creation_date,update_date\n\
P1,R1,123456,paid,2025-06-01T10:00:00Z,2025-06-01T11:00:00Z\n\
P2,R2,50000,paid,2025-06-02T10:00:00Z,2025-06-02T10:00:00Z\n\
,,173456,,,\n";

    fn fake_with_one_drop() -> FakeDrive {
        let mut fake = FakeDrive::default();
        fake.folders.insert(
            "root".to_string(),
            vec![
                FakeDrive::folder("f1", "payments_20250601"),
                FakeDrive::folder("f2", "notes"),
            ],
        );
        fake.folders.insert(
            "f1".to_string(),
            vec![
                FakeDrive::file("c1", "export.csv"),
                FakeDrive::file("x1", "readme.txt"),
            ],
        );
        fake.files.insert("c1".to_string(), PAYMENTS_CSV.as_bytes().to_vec());
        fake
    }

    #[test]
    fn drops_the_totals_row_and_converts_cents() {
        let fake = fake_with_one_drop();
        let dir = tempfile::tempdir().expect("tempdir");
        let importer = ManualDropImporter::new(&fake, dir.path().join("processed.txt"));

        let batch = importer.import_payments("root").expect("import succeeds");
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].amount, 1234.56);
        assert_eq!(batch.rows[1].amount, 500.0);
        assert_eq!(batch.processed_folders, vec!["f1".to_string()]);
    }

    #[test]
    fn processed_folders_are_skipped_on_the_next_run() {
        let fake = fake_with_one_drop();
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("processed.txt");

        let importer = ManualDropImporter::new(&fake, &log);
        importer.import_payments("root").expect("first run succeeds");

        let second = importer.import_payments("root").expect("second run succeeds");
        assert!(second.rows.is_empty());
        assert!(second.processed_folders.is_empty());
        // The file was fetched exactly once across both runs.
        assert_eq!(fake.downloads.lock().expect("lock").len(), 1);
    }

    #[test]
    fn single_row_exports_are_counted_as_skipped() {
        let mut fake = FakeDrive::default();
        fake.folders.insert(
            "root".to_string(),
            vec![FakeDrive::folder("f1", "payments_20250601")],
        );
        fake.folders
            .insert("f1".to_string(), vec![FakeDrive::file("c1", "export.csv")]);
        fake.files.insert(
            "c1".to_string(),
            b"id,reference,amount,status,creation_date,update_date\n,,100,,,\n".to_vec(),
        );

        let dir = tempfile::tempdir().expect("tempdir");
        let importer = ManualDropImporter::new(&fake, dir.path().join("processed.txt"));
        let batch = importer.import_payments("root").expect("import succeeds");

        assert!(batch.rows.is_empty());
        assert_eq!(batch.skipped_files, 1);
    }
}
