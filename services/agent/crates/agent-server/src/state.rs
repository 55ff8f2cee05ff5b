//! Shared application state: immutable configuration plus the long-lived
//! outbound clients.

use std::time::Duration;

use tokio::sync::Mutex;

use serverspy_common::{AgentConfig, AgentError};

use crate::api::ApiClient;
use crate::upload::{TlsUploadConnector, UploadConnector};

/// State shared by every request. Holds no per-task data.
pub struct AppState<U = TlsUploadConnector> {
    pub config: AgentConfig,
    pub api: ApiClient,
    pub uploader: U,
    /// Held for the whole pipeline so at most one task executes at a time.
    task_lock: Mutex<()>,
}

impl<U: UploadConnector> AppState<U> {
    /// # Errors
    ///
    /// Returns an error if the control-API client cannot be built.
    pub fn new(config: AgentConfig, uploader: U) -> Result<Self, AgentError> {
        let api = ApiClient::new(
            config.api_base.clone(),
            config.api_timeout_secs.map(Duration::from_secs),
        )?;
        Ok(Self {
            config,
            api,
            uploader,
            task_lock: Mutex::new(()),
        })
    }

    pub(crate) async fn exclusive(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.task_lock.lock().await
    }
}

impl<U> std::fmt::Debug for AppState<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("api", &self.api.base())
            .field("uploader", &"<UploadConnector>")
            .finish_non_exhaustive()
    }
}
