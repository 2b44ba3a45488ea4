//! Google Drive access for manual drops and report publication.
//!
//! The gateway trait keeps the importer and report exporter testable
//! without network access; [`GoogleDriveClient`] wraps the generated
//! google-drive3 client so synchronous pipeline code can use Drive without
//! exposing async details.

use std::fmt::Debug;
use std::io::Cursor;
use std::path::Path;

use google_drive3::{api::File, api::Scope, hyper_rustls, hyper_util, yup_oauth2, DriveHub};
use http_body_util::BodyExt;
use tokio::runtime::Runtime;

/// Drive's folder MIME type.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Minimal file metadata the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveFileMeta {
    pub file_id: String,
    pub name: String,
    pub mime_type: Option<String>,
}

impl DriveFileMeta {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriveOperationError {
    #[error("drive operation failed: {0}")]
    Backend(String),
    #[error("drive runtime unavailable: {0}")]
    Runtime(String),
    #[error("drive credentials unusable: {0}")]
    Credentials(String),
}

/// Synchronous Drive surface used by the importer and exporters.
pub trait DriveGateway: Debug {
    fn list_folder(&self, folder_id: &str) -> Result<Vec<DriveFileMeta>, DriveOperationError>;
    fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveOperationError>;
    fn upload_workbook(
        &self,
        folder_id: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<String, DriveOperationError>;
}

/// Connector type produced by [`connect_service_account`].
pub type ServiceConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Thin wrapper around the generated google-drive3 client allowing
/// synchronous pipeline stages to interact with Drive.
pub struct GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    hub: DriveHub<C>,
    runtime: Runtime,
}

impl<C> GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    pub fn new(hub: DriveHub<C>, runtime: Runtime) -> Self {
        Self { hub, runtime }
    }

    pub fn with_runtime(hub: DriveHub<C>) -> Result<Self, DriveOperationError> {
        let runtime =
            Runtime::new().map_err(|err| DriveOperationError::Runtime(err.to_string()))?;
        Ok(Self::new(hub, runtime))
    }

    fn map_error<E: std::fmt::Display>(err: E) -> DriveOperationError {
        DriveOperationError::Backend(err.to_string())
    }
}

impl<C> Debug for GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveClient").finish_non_exhaustive()
    }
}

/// Build a Drive client from a service-account key file.
pub fn connect_service_account(
    credentials: &Path,
) -> Result<GoogleDriveClient<ServiceConnector>, DriveOperationError> {
    let runtime = Runtime::new().map_err(|err| DriveOperationError::Runtime(err.to_string()))?;

    let hub = runtime.block_on(async {
        let key = yup_oauth2::read_service_account_key(credentials)
            .await
            .map_err(|err| DriveOperationError::Credentials(err.to_string()))?;
        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|err| DriveOperationError::Credentials(err.to_string()))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|err| DriveOperationError::Runtime(err.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(connector);

        Ok::<_, DriveOperationError>(DriveHub::new(client, auth))
    })?;

    Ok(GoogleDriveClient::new(hub, runtime))
}

impl<C> DriveGateway for GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn list_folder(&self, folder_id: &str) -> Result<Vec<DriveFileMeta>, DriveOperationError> {
        let folder = folder_id.to_string();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = page_token.clone();
            let result = self.runtime.block_on(async {
                let mut call = self
                    .hub
                    .files()
                    .list()
                    .q(&format!("'{folder}' in parents and trashed=false"))
                    .param("fields", "nextPageToken, files(id,name,mimeType)")
                    .include_items_from_all_drives(true)
                    .supports_all_drives(true)
                    .add_scope(Scope::Readonly);
                if let Some(token) = token.as_deref() {
                    call = call.page_token(token);
                }
                call.doit().await
            });

            let (_, file_list) = result.map_err(Self::map_error)?;
            files.extend(file_list.files.unwrap_or_default().into_iter().map(|file| {
                DriveFileMeta {
                    file_id: file.id.unwrap_or_default(),
                    name: file.name.unwrap_or_else(|| "untitled".to_string()),
                    mime_type: file.mime_type,
                }
            }));

            page_token = file_list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(files)
    }

    fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveOperationError> {
        let id = file_id.to_string();
        let bytes = self.runtime.block_on(async {
            let (response, _) = self
                .hub
                .files()
                .get(&id)
                .param("alt", "media")
                .supports_all_drives(true)
                .add_scope(Scope::Readonly)
                .doit()
                .await
                .map_err(Self::map_error)?;

            response
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(Self::map_error)
        })?;

        Ok(bytes.to_vec())
    }

    fn upload_workbook(
        &self,
        folder_id: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<String, DriveOperationError> {
        let metadata = File {
            name: Some(filename.to_string()),
            parents: Some(vec![folder_id.to_string()]),
            ..File::default()
        };

        let cursor = Cursor::new(content);
        let result = self.runtime.block_on(async {
            self.hub
                .files()
                .create(metadata)
                .param("fields", "id")
                .supports_all_drives(true)
                .add_scope(Scope::File)
                .upload(cursor, mime::TEXT_CSV)
                .await
        });

        let (_, file) = result.map_err(Self::map_error)?;
        Ok(file.id.unwrap_or_default())
    }
}
