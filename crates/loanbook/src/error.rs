//! Top-level error composition for the pipeline binary.

use std::fmt;

use crate::config::ConfigError;
use crate::metabase::MetabaseError;
use crate::report::ReportError;
use crate::sources::drive::DriveOperationError;
use crate::sources::manual_drops::DriveImportError;
use crate::sources::ExtractError;
use crate::telemetry::TelemetryError;
use crate::warehouse::WarehouseError;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Extract(ExtractError),
    Warehouse(WarehouseError),
    Drive(DriveOperationError),
    DriveImport(DriveImportError),
    Report(ReportError),
    Metabase(MetabaseError),
    Io(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Extract(err) => write!(f, "extract error: {}", err),
            AppError::Warehouse(err) => write!(f, "warehouse error: {}", err),
            AppError::Drive(err) => write!(f, "drive error: {}", err),
            AppError::DriveImport(err) => write!(f, "manual drop import error: {}", err),
            AppError::Report(err) => write!(f, "report error: {}", err),
            AppError::Metabase(err) => write!(f, "metabase error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Extract(err) => Some(err),
            AppError::Warehouse(err) => Some(err),
            AppError::Drive(err) => Some(err),
            AppError::DriveImport(err) => Some(err),
            AppError::Report(err) => Some(err),
            AppError::Metabase(err) => Some(err),
            AppError::Io(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<ExtractError> for AppError {
    fn from(value: ExtractError) -> Self {
        Self::Extract(value)
    }
}

impl From<WarehouseError> for AppError {
    fn from(value: WarehouseError) -> Self {
        Self::Warehouse(value)
    }
}

impl From<DriveOperationError> for AppError {
    fn from(value: DriveOperationError) -> Self {
        Self::Drive(value)
    }
}

impl From<DriveImportError> for AppError {
    fn from(value: DriveImportError) -> Self {
        Self::DriveImport(value)
    }
}

impl From<ReportError> for AppError {
    fn from(value: ReportError) -> Self {
        Self::Report(value)
    }
}

impl From<MetabaseError> for AppError {
    fn from(value: MetabaseError) -> Self {
        Self::Metabase(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
