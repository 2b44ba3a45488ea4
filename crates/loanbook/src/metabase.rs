//! Metabase schema-sync trigger.
//!
//! After a warehouse load, Metabase needs a schema refresh before new
//! columns show up in its data model. Authentication is a session token
//! obtained per run; failures are reported to the caller, never retried.

use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MetabaseError {
    #[error("metabase request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metabase runtime unavailable: {0}")]
    Runtime(String),
}

/// Connection settings for one Metabase instance.
#[derive(Debug, Clone)]
pub struct MetabaseSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub database_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

/// Blocking client over the Metabase HTTP API.
#[derive(Debug)]
pub struct MetabaseClient {
    settings: MetabaseSettings,
    http: reqwest::Client,
    runtime: Runtime,
}

impl MetabaseClient {
    pub fn new(settings: MetabaseSettings) -> Result<Self, MetabaseError> {
        let runtime = Runtime::new().map_err(|err| MetabaseError::Runtime(err.to_string()))?;
        Ok(Self {
            settings,
            http: reqwest::Client::new(),
            runtime,
        })
    }

    /// Trigger a schema sync for the configured database.
    pub fn sync_schema(&self) -> Result<(), MetabaseError> {
        let base = self.settings.base_url.trim_end_matches('/');

        self.runtime.block_on(async {
            let session: SessionResponse = self
                .http
                .post(format!("{base}/api/session"))
                .json(&json!({
                    "username": self.settings.username,
                    "password": self.settings.password,
                }))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            self.http
                .post(format!(
                    "{base}/api/database/{}/sync_schema",
                    self.settings.database_id
                ))
                .header("X-Metabase-Session", session.id)
                .send()
                .await?
                .error_for_status()?;

            Ok::<_, MetabaseError>(())
        })?;

        info!(database_id = %self.settings.database_id, "metabase schema sync triggered");
        Ok(())
    }
}
