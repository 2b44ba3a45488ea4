//! Environment-driven configuration.
//!
//! Everything comes from the process environment (a `.env` file is honored
//! in development). The Drive and Metabase integrations are optional: with
//! their variables unset the pipeline runs extract-to-warehouse only.

use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::metabase::MetabaseSettings;
use crate::report::export::ReportFolders;

/// Distinguishes runtime behavior for different stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub storage: StorageConfig,
    pub drive: Option<DriveConfig>,
    pub metabase: Option<MetabaseSettings>,
    pub telemetry: TelemetryConfig,
}

/// Local filesystem layout.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub warehouse_path: PathBuf,
}

impl StorageConfig {
    pub fn processed_payments_log(&self) -> PathBuf {
        self.data_dir.join("arcus_processed_payments_folders.txt")
    }

    pub fn processed_transactions_log(&self) -> PathBuf {
        self.data_dir.join("arcus_processed_transactions_folders.txt")
    }
}

/// Google Drive integration settings.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub credentials_path: PathBuf,
    pub payments_folder_id: Option<String>,
    pub transactions_folder_id: Option<String>,
    pub report_folders: Option<ReportFolders>,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let warehouse_path = PathBuf::from(
            env::var("WAREHOUSE_PATH").unwrap_or_else(|_| "db/loanbook_dwh.sqlite".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            storage: StorageConfig {
                data_dir,
                warehouse_path,
            },
            drive: load_drive()?,
            metabase: load_metabase()?,
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn load_drive() -> Result<Option<DriveConfig>, ConfigError> {
    let Some(credentials) = optional_var("GOOGLE_CREDENTIALS_PATH") else {
        return Ok(None);
    };

    let accounting = optional_var("ACCOUNTING_FOLDER_ID");
    let settled = optional_var("SETTLED_CDMX_FOLDER_ID");
    let loan_detail = optional_var("LOAN_DETAIL_FOLDER_ID");

    let report_folders = match (accounting, settled, loan_detail) {
        (Some(accounting_folder_id), Some(settled_folder_id), Some(loan_detail_folder_id)) => {
            Some(ReportFolders {
                accounting_folder_id,
                settled_folder_id,
                loan_detail_folder_id,
            })
        }
        (None, None, None) => None,
        _ => return Err(ConfigError::IncompleteReportFolders),
    };

    Ok(Some(DriveConfig {
        credentials_path: PathBuf::from(credentials),
        payments_folder_id: optional_var("ARCUS_PAYMENTS_FOLDER_ID"),
        transactions_folder_id: optional_var("ARCUS_TRANSACTIONS_FOLDER_ID"),
        report_folders,
    }))
}

fn load_metabase() -> Result<Option<MetabaseSettings>, ConfigError> {
    let base_url = optional_var("METABASE_URL");
    let username = optional_var("METABASE_USERNAME");
    let password = optional_var("METABASE_PASSWORD");
    let database_id = optional_var("METABASE_DB_ID");

    match (base_url, username, password, database_id) {
        (Some(base_url), Some(username), Some(password), Some(database_id)) => {
            Ok(Some(MetabaseSettings {
                base_url,
                username,
                password,
                database_id,
            }))
        }
        (None, None, None, None) => Ok(None),
        _ => Err(ConfigError::IncompleteMetabase),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IncompleteReportFolders,
    IncompleteMetabase,
    MetabaseNotConfigured,
    DriveNotConfigured,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IncompleteReportFolders => write!(
                f,
                "ACCOUNTING_FOLDER_ID, SETTLED_CDMX_FOLDER_ID and LOAN_DETAIL_FOLDER_ID must be set together"
            ),
            ConfigError::IncompleteMetabase => write!(
                f,
                "METABASE_URL, METABASE_USERNAME, METABASE_PASSWORD and METABASE_DB_ID must be set together"
            ),
            ConfigError::MetabaseNotConfigured => {
                write!(f, "metabase is not configured; set the METABASE_* variables")
            }
            ConfigError::DriveNotConfigured => {
                write!(f, "drive is not configured; set GOOGLE_CREDENTIALS_PATH")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
